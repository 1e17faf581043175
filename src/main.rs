use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use pulseboard::log::init_logging;
use pulseboard::period::Period;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    /// Viewing period for cards (24H, 1W, 1M)
    #[arg(short, long, global = true)]
    period: Option<String>,

    /// Display currency code (e.g. USD, EUR)
    #[arg(long, global = true)]
    currency: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for pulseboard::AppCommand {
    fn from(cmd: Commands) -> pulseboard::AppCommand {
        match cmd {
            Commands::Board => pulseboard::AppCommand::Board,
            Commands::Watch => pulseboard::AppCommand::Watch,
            Commands::Add { symbol, quantity } => {
                pulseboard::AppCommand::Add { symbol, quantity }
            }
            Commands::Edit { symbol, quantity } => {
                pulseboard::AppCommand::Edit { symbol, quantity }
            }
            Commands::Remove { symbol } => pulseboard::AppCommand::Remove { symbol },
            Commands::Holdings => pulseboard::AppCommand::Holdings,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch once and render the dashboard
    Board,
    /// Render the dashboard on a refresh interval
    Watch,
    /// Add a portfolio holding
    Add { symbol: String, quantity: f64 },
    /// Change an existing holding's quantity
    Edit { symbol: String, quantity: f64 },
    /// Remove a holding
    Remove { symbol: String },
    /// List holdings with current values
    Holdings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let period = cli
        .period
        .as_deref()
        .map(str::parse::<Period>)
        .transpose()?;

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => {
            pulseboard::run_command(
                cmd.into(),
                cli.config_path.as_deref(),
                period,
                cli.currency.as_deref(),
            )
            .await
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

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = pulseboard::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
symbols: [HASH, FIGR, BTC, ETH]

providers:
  figure_markets:
    base_url: "https://www.figuremarkets.com"
  twelve_data:
    base_url: "https://api.twelvedata.com"
    api_key: ""

currency: "USD"
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
