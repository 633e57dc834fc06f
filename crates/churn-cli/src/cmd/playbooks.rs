use crate::app::App;
use crate::cmd::show_panel;
use crate::output::{format_table, print_json};
use clap::Subcommand;
use churn_core::types::{Playbook, PlaybookDraft, PlaybookPatch, Rule};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum PlaybooksSubcommand {
    /// List playbooks
    List,

    /// Create a playbook
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Rule as CONDITION=>ACTION (repeatable)
        #[arg(long = "rule", value_parser = parse_rule)]
        rules: Vec<Rule>,
    },

    /// Change a playbook's name or description
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Replace all rules (repeatable)
        #[arg(long = "rule", value_parser = parse_rule)]
        rules: Vec<Rule>,
    },

    /// Delete a playbook
    Delete { id: String },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run(app: &App, subcmd: PlaybooksSubcommand, json: bool) -> anyhow::Result<()> {
    app.require_session()?;
    match subcmd {
        PlaybooksSubcommand::List => {
            app.data.fetch_playbooks().await;
        }
        PlaybooksSubcommand::Create {
            name,
            description,
            rules,
        } => {
            let created = app
                .data
                .create_playbook(PlaybookDraft {
                    name,
                    description,
                    rules,
                })
                .await?;
            if json {
                return print_json(&created);
            }
            println!("Created playbook {}: {}", created.id, created.name);
        }
        PlaybooksSubcommand::Update {
            id,
            name,
            description,
            rules,
        } => {
            let patch = PlaybookPatch {
                name,
                description,
                rules: (!rules.is_empty()).then_some(rules),
            };
            if patch.is_empty() {
                anyhow::bail!("nothing to update: pass --name, --description or --rule");
            }
            let updated = app.data.update_playbook(&id, patch).await?;
            if json {
                return print_json(&updated);
            }
            println!("Updated playbook {}: {}", updated.id, updated.name);
        }
        PlaybooksSubcommand::Delete { id } => {
            app.data.delete_playbook(&id).await?;
            if json {
                return print_json(&serde_json::json!({ "deleted": id }));
            }
            println!("Deleted playbook {id}");
        }
    }
    app.check_session()?;
    let state = app.data.state();
    show_panel("Playbooks", false, &state.playbooks, json, |p| render(p))
}

fn parse_rule(s: &str) -> Result<Rule, String> {
    let (condition, action) = s
        .split_once("=>")
        .ok_or_else(|| format!("rule '{s}' must look like CONDITION=>ACTION"))?;
    let (condition, action) = (condition.trim(), action.trim());
    if condition.is_empty() || action.is_empty() {
        return Err(format!("rule '{s}' needs both a condition and an action"));
    }
    Ok(Rule {
        condition: condition.to_string(),
        action: action.to_string(),
    })
}

pub(crate) fn render(playbooks: &[Playbook]) -> String {
    if playbooks.is_empty() {
        return "No playbooks.\n".to_string();
    }
    let rows: Vec<Vec<String>> = playbooks
        .iter()
        .map(|p| {
            vec![
                p.id.clone(),
                p.name.clone(),
                p.rules.len().to_string(),
                p.description.clone(),
            ]
        })
        .collect();
    format_table(&["ID", "NAME", "RULES", "DESCRIPTION"], &rows)
}
