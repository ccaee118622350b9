use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use purramid_core::Config;

mod commands;

#[derive(Parser)]
#[command(name = "purramid-cli", version, about = "Purramid CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Spawn, inspect and close overlay instances
    Instance {
        #[command(subcommand)]
        action: commands::instance::InstanceAction,
    },
    /// Timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Dice rolling and configuration
    Dice {
        #[command(subcommand)]
        action: commands::dice::DiceAction,
    },
    /// Coin flipping and configuration
    Coin {
        #[command(subcommand)]
        action: commands::coin::CoinAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Install the stderr subscriber. `PURRAMID_LOG` overrides the configured
/// filter; an unparsable filter falls back to `info`.
fn init_logging(configured: &str) {
    let filter = EnvFilter::try_from_env("PURRAMID_LOG")
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&Config::load_or_default().logging.filter);

    let result = match cli.command {
        Commands::Instance { action } => commands::instance::run(action).await,
        Commands::Timer { action } => commands::timer::run(action).await,
        Commands::Dice { action } => commands::dice::run(action).await,
        Commands::Coin { action } => commands::coin::run(action).await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
