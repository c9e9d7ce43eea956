//! Moving-average crossover strategy

use super::{sma, MarketWindow, Strategy, StrategyError};
use crate::signal::{Side, Signal};
use async_trait::async_trait;

/// Buys when the fast SMA crosses above the slow SMA and sells on the
/// reverse cross. Signals are priced at the current close.
#[derive(Debug, Clone)]
pub struct SmaCrossover {
    id: String,
    fast: usize,
    slow: usize,
}

impl SmaCrossover {
    /// Create a crossover strategy; `fast` must be shorter than `slow`
    pub fn new(id: impl Into<String>, fast: usize, slow: usize) -> Self {
        Self {
            id: id.into(),
            fast: fast.max(1),
            slow: slow.max(fast + 1),
        }
    }
}

impl Default for SmaCrossover {
    fn default() -> Self {
        Self::new("sma_crossover", 10, 30)
    }
}

#[async_trait]
impl Strategy for SmaCrossover {
    fn id(&self) -> &str {
        &self.id
    }

    fn required_history(&self) -> usize {
        // One extra candle to compare against the previous step
        self.slow + 1
    }

    async fn analyze(&self, window: &MarketWindow<'_>) -> Result<Vec<Signal>, StrategyError> {
        let needed = self.required_history();
        if window.len() < needed {
            return Err(StrategyError::InsufficientData {
                needed,
                got: window.len(),
            });
        }

        let closes = window.closes();
        let previous = &closes[..closes.len() - 1];
        let (Some(fast_now), Some(slow_now), Some(fast_prev), Some(slow_prev)) = (
            sma(&closes, self.fast),
            sma(&closes, self.slow),
            sma(previous, self.fast),
            sma(previous, self.slow),
        ) else {
            return Ok(vec![]);
        };

        let side = if fast_prev <= slow_prev && fast_now > slow_now {
            Side::Buy
        } else if fast_prev >= slow_prev && fast_now < slow_now {
            Side::Sell
        } else {
            return Ok(vec![]);
        };

        let Some(candle) = window.latest() else {
            return Ok(vec![]);
        };
        Ok(vec![Signal::new(
            &self.id,
            window.symbol,
            side,
            candle.close,
            candle.timestamp,
        )])
    }
}
