mod app;
mod application;
mod config;
mod domain;
mod infrastructure;
mod report;
mod shared;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "riskguard")]
#[command(version, about = "Risk & MEV threat monitoring engine for DEX trading systems")]
struct Cli {
    /// Path to config file (defaults to Config.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring loops
    Monitor {
        /// Stop after this many seconds (runs until Ctrl-C by default)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Disable automatic mitigation actions
        #[arg(long)]
        no_auto_mitigate: bool,
    },

    /// Run a single risk assessment cycle and print the verdict
    Assess {
        /// Include stress-test scenarios
        #[arg(long, default_value_t = true)]
        stress: bool,
    },

    /// Run threat detection over a JSON file of pending transactions
    Detect {
        /// Input file ([{hash, gas_price, to, input_data, timestamp}, ...])
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Show effective configuration and component state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .init();

    let cli = Cli::parse();

    // Config priority: --config > ./Config.toml > built-in defaults
    let mut config = match &cli.config {
        Some(path) => config::Config::from_file(path)?,
        None => {
            if std::path::Path::new("Config.toml").exists() {
                config::Config::from_file("Config.toml")?
            } else {
                info!("No Config.toml found, using built-in defaults");
                config::Config::default()
            }
        }
    };

    match cli.command {
        Commands::Monitor {
            duration,
            no_auto_mitigate,
        } => {
            if no_auto_mitigate {
                config.monitor.auto_mitigate = false;
            }
            let app = app::App::build(config).await?;
            app.run_monitor(duration).await
        }
        Commands::Assess { stress } => {
            let app = app::App::build(config).await?;
            app.run_assess(stress).await
        }
        Commands::Detect { input } => {
            let app = app::App::build(config).await?;
            app.run_detect(input).await
        }
        Commands::Status => {
            let app = app::App::build(config).await?;
            app.status().await
        }
    }
}
