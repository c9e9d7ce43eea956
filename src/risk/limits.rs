//! Entry risk filters

use super::{PositionTracker, RejectReason};
use crate::config::BacktestConfig;
use crate::signal::{Side, Signal};
use rust_decimal::Decimal;

/// Limits checked before any entry is sized
#[derive(Debug, Clone)]
pub struct RiskLimits {
    /// Maximum concurrent positions
    pub max_positions: usize,
    /// Whether sell signals may open shorts
    pub allow_short: bool,
    /// Minimum signal confidence
    pub min_confidence: Decimal,
}

impl RiskLimits {
    pub fn from_config(config: &BacktestConfig) -> Self {
        Self {
            max_positions: config.max_positions,
            allow_short: config.allow_short,
            min_confidence: config.min_confidence,
        }
    }

    /// Apply pre-sizing filters to an entry signal
    pub fn check_entry(&self, signal: &Signal, tracker: &PositionTracker) -> Result<(), RejectReason> {
        if signal.confidence < self.min_confidence {
            return Err(RejectReason::LowConfidence(signal.confidence));
        }

        if let Some(existing) = tracker.find(&signal.strategy_id, &signal.symbol) {
            if existing.side == signal.side {
                return Err(RejectReason::AlreadyPositioned);
            }
        }

        if tracker.open_count() >= self.max_positions {
            return Err(RejectReason::MaxPositionsReached);
        }

        if signal.side == Side::Sell && !self.allow_short {
            return Err(RejectReason::ShortingDisabled);
        }

        Ok(())
    }

    /// Capital check once the cost of the entry is known
    pub fn check_capital(
        &self,
        margin: Decimal,
        entry_fee: Decimal,
        tracker: &PositionTracker,
    ) -> Result<(), RejectReason> {
        if margin <= Decimal::ZERO {
            return Err(RejectReason::ZeroSize);
        }
        let required = margin + entry_fee;
        let available = tracker.cash();
        if required > available {
            return Err(RejectReason::InsufficientCapital {
                required,
                available,
            });
        }
        Ok(())
    }
}
