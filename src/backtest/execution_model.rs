//! Fill simulation: slippage, fees, and protective exits

use crate::config::{BacktestConfig, IntrabarPolicy};
use crate::data::Candle;
use crate::risk::{CloseReason, Position};
use crate::signal::Side;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Converts reference prices into simulated fills
///
/// Slippage is always adverse: entries pay up, exits give back.
#[derive(Debug, Clone)]
pub struct FillModel {
    pub fee_rate: Decimal,
    pub slippage_rate: Decimal,
    /// Stop distance as a fraction of entry
    pub stop_loss: Option<Decimal>,
    /// Target distance as a fraction of entry
    pub take_profit: Option<Decimal>,
    pub intrabar_policy: IntrabarPolicy,
}

impl FillModel {
    pub fn from_config(config: &BacktestConfig) -> Self {
        Self {
            fee_rate: config.fee_rate,
            slippage_rate: config.slippage_rate,
            stop_loss: config
                .stop_loss_enabled
                .then(|| config.stop_loss_percent / dec!(100)),
            take_profit: config
                .take_profit_enabled
                .then(|| config.take_profit_percent / dec!(100)),
            intrabar_policy: config.intrabar_policy,
        }
    }

    /// Fill price when opening on `side`
    pub fn entry_price(&self, side: Side, reference: Decimal) -> Decimal {
        match side {
            Side::Buy => reference.saturating_mul(Decimal::ONE + self.slippage_rate),
            Side::Sell => reference.saturating_mul(Decimal::ONE - self.slippage_rate),
        }
    }

    /// Fill price when closing a position opened on `side`
    pub fn exit_price(&self, side: Side, reference: Decimal) -> Decimal {
        match side {
            Side::Buy => reference.saturating_mul(Decimal::ONE - self.slippage_rate),
            Side::Sell => reference.saturating_mul(Decimal::ONE + self.slippage_rate),
        }
    }

    /// Fee charged on a fill of the given notional
    pub fn fee(&self, notional: Decimal) -> Decimal {
        notional.abs() * self.fee_rate
    }

    /// Stop-loss and take-profit levels for an entry fill
    pub fn protective_levels(&self, side: Side, entry: Decimal) -> (Option<Decimal>, Option<Decimal>) {
        let stop = self.stop_loss.map(|d| match side {
            Side::Buy => entry.saturating_mul(Decimal::ONE - d),
            Side::Sell => entry.saturating_mul(Decimal::ONE + d),
        });
        let target = self.take_profit.map(|d| match side {
            Side::Buy => entry.saturating_mul(Decimal::ONE + d),
            Side::Sell => entry.saturating_mul(Decimal::ONE - d),
        });
        (stop, target)
    }

    /// Check whether a candle's range triggers the position's stop or target
    ///
    /// Returns the level price (before exit slippage) and the close reason.
    /// When both levels fall inside the same candle the intrabar policy picks.
    pub fn check_exit(&self, position: &Position, candle: &Candle) -> Option<(Decimal, CloseReason)> {
        let stop_hit = position.stop_loss.filter(|&stop| match position.side {
            Side::Buy => candle.low <= stop,
            Side::Sell => candle.high >= stop,
        });
        let target_hit = position.take_profit.filter(|&target| match position.side {
            Side::Buy => candle.high >= target,
            Side::Sell => candle.low <= target,
        });

        match (stop_hit, target_hit) {
            (Some(stop), Some(target)) => match self.intrabar_policy {
                IntrabarPolicy::StopFirst => Some((stop, CloseReason::StopLoss)),
                IntrabarPolicy::TargetFirst => Some((target, CloseReason::TakeProfit)),
            },
            (Some(stop), None) => Some((stop, CloseReason::StopLoss)),
            (None, Some(target)) => Some((target, CloseReason::TakeProfit)),
            (None, None) => None,
        }
    }
}
