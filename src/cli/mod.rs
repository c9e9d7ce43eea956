//! CLI interface for tradesim
//!
//! Provides subcommands for:
//! - `backtest`: Replay candle files through strategies
//! - `strategies`: List built-in strategies
//! - `config`: Show the effective configuration

mod backtest;

pub use backtest::{BacktestArgs, OutputFormat};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tradesim")]
#[command(about = "Historical strategy simulator with performance metrics")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a backtest over JSON candle files
    Backtest(BacktestArgs),
    /// List built-in strategies
    Strategies,
    /// Show configuration
    Config,
}
