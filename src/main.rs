use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use ratefinder::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    /// Keep rates in memory instead of the on-disk store
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for ratefinder::AppCommand {
    fn from(cmd: Commands) -> ratefinder::AppCommand {
        match cmd {
            Commands::Serve => ratefinder::AppCommand::Serve,
            Commands::Refresh => ratefinder::AppCommand::Refresh,
            Commands::Rates { pair } => ratefinder::AppCommand::Rates(pair),
            Commands::Pairs => ratefinder::AppCommand::Pairs,
            Commands::Providers => ratefinder::AppCommand::Providers,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Refresh rates on the configured interval until Ctrl-C
    Serve,
    /// Run a single refresh pass
    Refresh,
    /// Show stored rates for a currency pair, best first
    Rates {
        /// Currency pair such as USD_EUR
        pair: String,
    },
    /// List supported currency pairs
    Pairs,
    /// List registered providers
    Providers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => ratefinder::cli::setup::setup(),
        Some(cmd) => {
            ratefinder::run_command(cmd.into(), cli.config_path.as_deref(), cli.ephemeral).await
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
