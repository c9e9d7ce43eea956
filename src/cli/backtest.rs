//! Backtest command implementation

use crate::backtest::{BacktestEngine, BacktestResult, RunControl};
use crate::config::{BacktestConfig, SizingMode};
use crate::data::load_json;
use crate::strategy::create_strategy;
use anyhow::Context;
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;

/// Result output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Args, Debug, Default)]
pub struct BacktestArgs {
    /// JSON candle files, one symbol each
    #[arg(long = "data", required = true, num_args = 1..)]
    pub data: Vec<PathBuf>,

    /// Initial capital
    #[arg(long)]
    pub capital: Option<Decimal>,

    /// Fee per fill, percent of notional
    #[arg(long)]
    pub fee: Option<Decimal>,

    /// Adverse slippage per fill, percent
    #[arg(long)]
    pub slippage: Option<Decimal>,

    /// Maximum concurrent positions
    #[arg(long)]
    pub max_positions: Option<usize>,

    /// Position sizing mode: fixed, percent or kelly
    #[arg(long)]
    pub sizing: Option<SizingMode>,

    /// Position size (quote amount for fixed, percent otherwise)
    #[arg(long)]
    pub position_size: Option<Decimal>,

    /// Stop-loss distance in percent; enables stops
    #[arg(long)]
    pub stop_loss: Option<Decimal>,

    /// Take-profit distance in percent; enables targets
    #[arg(long)]
    pub take_profit: Option<Decimal>,

    /// Allow sell signals to open shorts
    #[arg(long)]
    pub allow_short: bool,

    /// Leverage multiplier
    #[arg(long)]
    pub leverage: Option<Decimal>,

    /// Strategy to run (repeatable)
    #[arg(long = "strategy")]
    pub strategies: Vec<String>,

    /// Candles per strategy window; defaults to the longest strategy need
    #[arg(long)]
    pub lookback: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Write results to a file instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl BacktestArgs {
    /// Apply command-line overrides on top of the file configuration
    pub fn apply_overrides(&self, mut config: BacktestConfig) -> BacktestConfig {
        if let Some(capital) = self.capital {
            config.initial_capital = capital;
        }
        if let Some(fee) = self.fee {
            config.fee_rate = fee / dec!(100);
        }
        if let Some(slippage) = self.slippage {
            config.slippage_rate = slippage / dec!(100);
        }
        if let Some(max) = self.max_positions {
            config.max_positions = max;
        }
        if let Some(mode) = self.sizing {
            config.position_sizing = mode;
        }
        if let Some(size) = self.position_size {
            config.position_size = size;
        }
        if let Some(stop) = self.stop_loss {
            config.stop_loss_enabled = true;
            config.stop_loss_percent = stop;
        }
        if let Some(target) = self.take_profit {
            config.take_profit_enabled = true;
            config.take_profit_percent = target;
        }
        if self.allow_short {
            config.allow_short = true;
        }
        if let Some(leverage) = self.leverage {
            config.leverage = leverage;
        }
        config
    }

    fn strategy_names(&self) -> Vec<&str> {
        if self.strategies.is_empty() {
            vec!["sma_crossover"]
        } else {
            self.strategies.iter().map(String::as_str).collect()
        }
    }

    pub async fn execute(&self, config: &BacktestConfig) -> anyhow::Result<()> {
        let config = self.apply_overrides(config.clone());

        let mut data = Vec::with_capacity(self.data.len());
        for path in &self.data {
            let series =
                load_json(path).with_context(|| format!("Failed to load {}", path.display()))?;
            data.push(series);
        }

        let mut engine = BacktestEngine::new(config)?;
        for name in self.strategy_names() {
            engine.add_strategy(create_strategy(name)?)?;
        }
        let lookback = self.lookback.unwrap_or_else(|| engine.required_lookback());

        let control = RunControl::new().on_progress(|event| {
            tracing::trace!(percent = event.percent, step = event.step, "Progress");
        });
        let result = engine.run(&data, lookback, &control).await?;

        let rendered = render(&result, self.format)?;
        match &self.output {
            Some(path) => {
                std::fs::write(path, rendered)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                tracing::info!(path = %path.display(), "Results written");
            }
            None => println!("{}", rendered),
        }
        Ok(())
    }
}

fn render(result: &BacktestResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Table => {
            let mut out = result.overall_metrics.format_table();
            if result.metrics_by_strategy.len() > 1 {
                for (id, metrics) in &result.metrics_by_strategy {
                    out.push_str(&format!(
                        "\n{:<20} trades {:>4}  pnl {:>+12.2}  win {:>5.1}%  sharpe {:>6.2}",
                        id,
                        metrics.total_trades,
                        metrics.total_pnl,
                        metrics.win_rate * 100.0,
                        metrics.sharpe_ratio,
                    ));
                }
                out.push('\n');
            }
            Ok(out)
        }
    }
}
