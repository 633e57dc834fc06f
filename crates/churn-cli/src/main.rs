mod app;
mod cmd;
mod output;

use app::{App, Overrides};
use churn_core::paths;
use clap::{Parser, Subcommand};
use cmd::{
    alerts::AlertsSubcommand, playbooks::PlaybooksSubcommand, settings::SettingsSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "churn",
    about = "ChurnBuster dashboard: churn risk overview, customer metrics, playbooks and alerts",
    version,
    propagate_version = true
)]
struct Cli {
    /// Directory holding config.yaml and the stored session
    #[arg(long, global = true, env = "CHURN_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// API base URL (implies the HTTP backend)
    #[arg(long, global = true, env = "CHURN_API_URL")]
    base_url: Option<String>,

    /// Use the built-in mock backend
    #[arg(long, global = true)]
    mock: bool,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log debug output to stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    View(ViewCommand),

    /// Show and change client settings
    Settings {
        #[command(subcommand)]
        subcommand: SettingsSubcommand,
    },
}

/// Commands that run against a backend and the stored session.
#[derive(Subcommand)]
enum ViewCommand {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CHURN_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and clear the stored session
    Logout,

    /// Show the signed-in user
    Whoami {
        /// Check the stored session with the backend
        #[arg(long)]
        validate: bool,
    },

    /// Churn risk overview
    Overview,

    /// Behaviour metrics for one customer
    Metrics {
        /// Customer id (default: default_customer_id from config)
        #[arg(long)]
        customer: Option<String>,
        /// Days of history (default: default_range_days from config)
        #[arg(long)]
        range: Option<u32>,
    },

    /// Manage retention playbooks
    Playbooks {
        #[command(subcommand)]
        subcommand: PlaybooksSubcommand,
    },

    /// List and act on alerts
    Alerts {
        #[command(subcommand)]
        subcommand: AlertsSubcommand,
    },

    /// Score churn risk from usage and support activity
    Predict {
        /// Usage score
        #[arg(long)]
        usage: f64,
        /// Support tickets opened
        #[arg(long)]
        tickets: u32,
    },

    /// Load every panel at once
    Dashboard,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let state_dir = paths::resolve_state_dir(cli.state_dir.as_deref())?;
    let json = cli.json;

    let view = match cli.command {
        // Settings edit config.yaml directly and must work even when the
        // current config cannot build a backend.
        Commands::Settings { subcommand } => {
            return cmd::settings::run(&state_dir, subcommand, json)
        }
        Commands::View(view) => view,
    };

    let overrides = Overrides {
        base_url: cli.base_url,
        mock: cli.mock,
    };
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let app = App::open(&state_dir, overrides)?;
        dispatch(&app, view, json).await
    })
}

async fn dispatch(app: &App, view: ViewCommand, json: bool) -> anyhow::Result<()> {
    match view {
        ViewCommand::Login { email, password } => {
            cmd::session::login(app, &email, &password, json).await
        }
        ViewCommand::Logout => cmd::session::logout(app, json).await,
        ViewCommand::Whoami { validate } => cmd::session::whoami(app, validate, json).await,
        ViewCommand::Overview => cmd::overview::run(app, json).await,
        ViewCommand::Metrics { customer, range } => {
            cmd::metrics::run(app, customer, range, json).await
        }
        ViewCommand::Playbooks { subcommand } => cmd::playbooks::run(app, subcommand, json).await,
        ViewCommand::Alerts { subcommand } => cmd::alerts::run(app, subcommand, json).await,
        ViewCommand::Predict { usage, tickets } => {
            cmd::predict::run(app, usage, tickets, json).await
        }
        ViewCommand::Dashboard => cmd::dashboard::run(app, json).await,
    }
}
