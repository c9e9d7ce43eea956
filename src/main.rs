use clap::Parser;
use tradesim::cli::{Cli, Commands};
use tradesim::config::Config;
use tradesim::strategy::BUILTIN_STRATEGIES;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let (config, load_error) = match Config::load(&cli.config) {
        Ok(config) => (config, None),
        Err(e) => (
            toml::from_str::<Config>(include_str!("../config.toml.example"))?,
            Some(e),
        ),
    };

    // Initialize telemetry
    tradesim::telemetry::init_telemetry(&config.telemetry)?;
    if let Some(e) = load_error {
        tracing::warn!(path = %cli.config, error = %e, "Could not load config, using defaults");
    }

    match cli.command {
        Commands::Backtest(args) => {
            tracing::info!("Starting backtest");
            args.execute(&config.backtest).await?;
        }
        Commands::Strategies => {
            println!("Built-in strategies:");
            for (name, description) in BUILTIN_STRATEGIES {
                println!("  {:<16} {}", name, description);
            }
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
