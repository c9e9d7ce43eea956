//! Position sizing implementations
//!
//! Sizers return the capital to commit (margin). Notional exposure is the
//! margin times leverage, applied by the engine.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{KellyCalculator, TradeStats};
use crate::config::{BacktestConfig, SizingMode};

/// Inputs available to a sizer when a signal is accepted
#[derive(Debug, Clone, Copy)]
pub struct SizingContext<'a> {
    /// Current total equity
    pub equity: Decimal,
    /// Closed-trade statistics of the signalling strategy
    pub stats: &'a TradeStats,
}

/// Trait for position sizing implementations
pub trait PositionSizer: Send + Sync {
    /// Capital to commit for a new position
    fn margin(&self, ctx: &SizingContext<'_>) -> Decimal;

    /// Get the sizing mode name
    fn mode_name(&self) -> &'static str;
}

/// Fixed capital per trade
#[derive(Debug, Clone)]
pub struct FixedSizer {
    /// Capital committed per trade
    pub amount: Decimal,
}

impl FixedSizer {
    pub fn new(amount: Decimal) -> Self {
        Self { amount }
    }
}

impl PositionSizer for FixedSizer {
    fn margin(&self, _ctx: &SizingContext<'_>) -> Decimal {
        self.amount
    }

    fn mode_name(&self) -> &'static str {
        "fixed"
    }
}

/// Percentage of current equity per trade
#[derive(Debug, Clone)]
pub struct PercentSizer {
    /// Percent of equity (10 = 10%)
    pub percent: Decimal,
}

impl PercentSizer {
    pub fn new(percent: Decimal) -> Self {
        Self { percent }
    }
}

impl PositionSizer for PercentSizer {
    fn margin(&self, ctx: &SizingContext<'_>) -> Decimal {
        if ctx.equity <= Decimal::ZERO {
            return dec!(0);
        }
        ctx.equity * self.percent / dec!(100)
    }

    fn mode_name(&self) -> &'static str {
        "percent"
    }
}

/// Fractional Kelly from the strategy's trailing win rate and payoff
pub struct KellySizer {
    calculator: KellyCalculator,
}

impl KellySizer {
    /// `cap_percent` bounds the bet as a percent of equity
    pub fn new(fraction: Decimal, cap_percent: Decimal, min_trades: usize) -> Self {
        Self {
            calculator: KellyCalculator::new(fraction, cap_percent / dec!(100), min_trades),
        }
    }
}

impl PositionSizer for KellySizer {
    fn margin(&self, ctx: &SizingContext<'_>) -> Decimal {
        self.calculator.calculate(ctx.stats, ctx.equity)
    }

    fn mode_name(&self) -> &'static str {
        "kelly"
    }
}

/// Create a position sizer based on configuration
pub fn create_sizer(config: &BacktestConfig) -> Box<dyn PositionSizer> {
    match config.position_sizing {
        SizingMode::Fixed => Box::new(FixedSizer::new(config.position_size)),
        SizingMode::Percent => Box::new(PercentSizer::new(config.position_size)),
        SizingMode::Kelly => Box::new(KellySizer::new(
            config.kelly_fraction,
            config.position_size,
            config.kelly_min_trades,
        )),
    }
}
