//! Strategy module
//!
//! Pluggable signal generators. A strategy sees a rolling window of candles
//! for one symbol and returns zero or more signals.

mod indicators;
mod rsi_reversion;
mod sma_crossover;

pub use indicators::{rsi, sma};
pub use rsi_reversion::RsiReversion;
pub use sma_crossover::SmaCrossover;

use crate::config::ConfigError;
use crate::data::Candle;
use crate::signal::Signal;
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised inside a strategy's `analyze`
///
/// The engine catches these per strategy per step; they never abort a run.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// Window shorter than the strategy needs
    #[error("Insufficient data: need {needed} candles, got {got}")]
    InsufficientData { needed: usize, got: usize },
    /// Strategy-specific failure
    #[error("Strategy failed: {0}")]
    Failed(String),
    /// Strategy panicked while analyzing
    #[error("Strategy panicked: {0}")]
    Panicked(String),
}

/// Rolling window of the most recent candles for one symbol
///
/// The last candle is the current step.
#[derive(Debug, Clone, Copy)]
pub struct MarketWindow<'a> {
    pub symbol: &'a str,
    pub candles: &'a [Candle],
}

impl<'a> MarketWindow<'a> {
    pub fn new(symbol: &'a str, candles: &'a [Candle]) -> Self {
        Self { symbol, candles }
    }

    /// The current candle
    pub fn latest(&self) -> Option<&'a Candle> {
        self.candles.last()
    }

    /// Close prices, oldest first
    pub fn closes(&self) -> Vec<Decimal> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

/// Trait for signal-generating strategies
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Unique identifier; signals must carry it
    fn id(&self) -> &str;

    /// Candles of history the strategy needs to produce signals
    fn required_history(&self) -> usize {
        1
    }

    /// Produce signals for the current step
    async fn analyze(&self, window: &MarketWindow<'_>) -> Result<Vec<Signal>, StrategyError>;
}

/// Names accepted by [`create_strategy`]
pub const BUILTIN_STRATEGIES: &[(&str, &str)] = &[
    (
        "sma_crossover",
        "Buy on fast/slow SMA golden cross, sell on death cross (10/30)",
    ),
    (
        "rsi_reversion",
        "Buy when RSI(14) drops below 30, sell when it rises above 70",
    ),
];

/// Build a built-in strategy with default parameters
pub fn create_strategy(name: &str) -> Result<Box<dyn Strategy>, ConfigError> {
    match name {
        "sma_crossover" => Ok(Box::new(SmaCrossover::default())),
        "rsi_reversion" => Ok(Box::new(RsiReversion::default())),
        other => Err(ConfigError::UnknownStrategy(other.to_string())),
    }
}
