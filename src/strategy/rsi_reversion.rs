//! RSI mean-reversion strategy

use super::{rsi, MarketWindow, Strategy, StrategyError};
use crate::signal::{Side, Signal};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Buys when RSI crosses down through the oversold level and sells when it
/// crosses up through the overbought level.
#[derive(Debug, Clone)]
pub struct RsiReversion {
    id: String,
    period: usize,
    oversold: Decimal,
    overbought: Decimal,
}

impl RsiReversion {
    pub fn new(id: impl Into<String>, period: usize, oversold: Decimal, overbought: Decimal) -> Self {
        Self {
            id: id.into(),
            period: period.max(1),
            oversold,
            overbought,
        }
    }
}

impl Default for RsiReversion {
    fn default() -> Self {
        Self::new("rsi_reversion", 14, dec!(30), dec!(70))
    }
}

#[async_trait]
impl Strategy for RsiReversion {
    fn id(&self) -> &str {
        &self.id
    }

    fn required_history(&self) -> usize {
        self.period + 2
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
        let (Some(now), Some(prev)) = (
            rsi(&closes, self.period),
            rsi(&closes[..closes.len() - 1], self.period),
        ) else {
            return Ok(vec![]);
        };

        let side = if prev >= self.oversold && now < self.oversold {
            Side::Buy
        } else if prev <= self.overbought && now > self.overbought {
            Side::Sell
        } else {
            return Ok(vec![]);
        };

        // Confidence grows with distance past the threshold
        let distance = match side {
            Side::Buy => self.oversold - now,
            Side::Sell => now - self.overbought,
        };
        let confidence = (dec!(0.5) + distance / dec!(60)).min(Decimal::ONE);

        let Some(candle) = window.latest() else {
            return Ok(vec![]);
        };
        Ok(vec![Signal::new(
            &self.id,
            window.symbol,
            side,
            candle.close,
            candle.timestamp,
        )
        .with_confidence(confidence)])
    }
}
