use clap::{Parser, Subcommand};
use colored::Colorize;
use intune_sync::cmd;
use intune_sync::config::ConfigManager;
use intune_sync::error;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "intune-sync",
    about = "Keep Intune device attributes and compliance build ranges in sync",
    version,
    long_about = "Intune reconciliation jobs for Microsoft Graph\n\n\
                  attribute-sync  tag Entra ID devices from custom attribute script results\n\
                  build-ranges    rebuild compliance build ranges from the Windows Update catalog"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long, global = true, env = "INTUNE_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set or clear the device extension attribute from script results
    AttributeSync(cmd::attribute_sync::AttributeSyncArgs),

    /// Rebuild compliance policy build ranges from the update catalog
    BuildRanges(cmd::build_ranges::BuildRangesArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Write a configuration template
    Init(cmd::config::InitArgs),

    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> error::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "intune_sync=debug"
    } else {
        "intune_sync=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let manager = ConfigManager::new(cli.config)?;

    match cli.command {
        Commands::AttributeSync(args) => {
            let config = manager.load()?;
            cmd::attribute_sync::run(args, &config).await?
        }
        Commands::BuildRanges(args) => {
            let config = manager.load()?;
            cmd::build_ranges::run(args, &config).await?
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Init(args) => cmd::config::init(args, &manager)?,
            ConfigCommands::Show => cmd::config::show(&manager)?,
        },
    }

    Ok(())
}
