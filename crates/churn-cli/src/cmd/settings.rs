use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use churn_core::config::{BackendKind, ClientConfig, WarnLevel};
use std::path::Path;

#[derive(Subcommand)]
pub enum SettingsSubcommand {
    /// Show the current settings
    Show,

    /// Change one setting
    Set {
        /// backend, api_base_url, model_api_url, default_customer_id,
        /// default_range_days, request_timeout_secs or mock_fixtures
        key: String,
        value: String,
    },

    /// Validate the settings for common mistakes
    Validate,
}

pub fn run(state_dir: &Path, subcmd: SettingsSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        SettingsSubcommand::Show => show(state_dir, json),
        SettingsSubcommand::Set { key, value } => set(state_dir, &key, &value),
        SettingsSubcommand::Validate => validate(state_dir, json),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(state_dir: &Path, json: bool) -> anyhow::Result<()> {
    let config = ClientConfig::load(state_dir).context("failed to load config")?;
    if json {
        return print_json(&config);
    }
    print_table(&["KEY", "VALUE"], rows(&config));
    Ok(())
}

fn rows(config: &ClientConfig) -> Vec<Vec<String>> {
    let backend = match config.backend {
        BackendKind::Http => "http",
        BackendKind::Mock => "mock",
    };
    let unset = || "(none)".to_string();
    vec![
        vec!["backend".into(), backend.into()],
        vec!["api_base_url".into(), config.api_base_url.clone()],
        vec!["model_api_url".into(), config.model_api_url.clone()],
        vec!["default_customer_id".into(), config.default_customer_id.clone()],
        vec![
            "default_range_days".into(),
            config.default_range_days.to_string(),
        ],
        vec![
            "request_timeout_secs".into(),
            config
                .request_timeout_secs
                .map(|s| s.to_string())
                .unwrap_or_else(unset),
        ],
        vec![
            "mock_fixtures".into(),
            config
                .mock_fixtures
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(unset),
        ],
    ]
}

// ---------------------------------------------------------------------------
// set
// ---------------------------------------------------------------------------

fn set(state_dir: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let mut config = ClientConfig::load(state_dir).context("failed to load config")?;
    config.set(key, value).map_err(|e| anyhow::anyhow!(e))?;
    config.save(state_dir).context("failed to save config")?;
    for w in config.validate() {
        eprintln!("warning: {}", w.message);
    }
    println!("Set {key} = {value}");
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(state_dir: &Path, json: bool) -> anyhow::Result<()> {
    let config = ClientConfig::load(state_dir).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Settings are valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("settings validation found errors");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn set_persists_and_show_lists_it() {
        let dir = TempDir::new().unwrap();
        set(dir.path(), "default_range_days", "90").unwrap();
        let config = ClientConfig::load(dir.path()).unwrap();
        assert_eq!(config.default_range_days, 90);

        let rows = rows(&config);
        assert!(rows.contains(&vec!["default_range_days".to_string(), "90".to_string()]));
        assert!(rows.contains(&vec!["mock_fixtures".to_string(), "(none)".to_string()]));
    }

    #[test]
    fn unknown_key_is_rejected_and_nothing_is_written() {
        let dir = TempDir::new().unwrap();
        assert!(set(dir.path(), "colour", "blue").is_err());
        assert!(!churn_core::paths::config_path(dir.path()).exists());
    }
}
