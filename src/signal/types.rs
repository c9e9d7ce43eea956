//! Signal types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Trading side
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Go long, or close a short
    Buy,
    /// Go short, or close a long
    Sell,
}

impl Side {
    /// The opposite side
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for longs, -1 for shorts
    pub fn sign(self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Why a signal was dropped as malformed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("reference price must be positive, got {0}")]
    InvalidPrice(Decimal),
    #[error("requested amount must be positive, got {0}")]
    InvalidAmount(Decimal),
    #[error("confidence must be in [0, 1], got {0}")]
    InvalidConfidence(Decimal),
    #[error("signal for {got} emitted on a {expected} window")]
    SymbolMismatch { expected: String, got: String },
    #[error("signal attributed to {got} but emitted by {expected}")]
    StrategyMismatch { expected: String, got: String },
    #[error("signal timestamp {signal} is after the current candle {current}")]
    Lookahead {
        signal: DateTime<Utc>,
        current: DateTime<Utc>,
    },
}

/// A trading signal produced by a strategy
///
/// Consumed by the engine on the step it is emitted; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Instrument symbol
    pub symbol: String,
    /// Trade direction
    pub side: Side,
    /// Requested amount in base units; caps the sized quantity
    pub amount: Option<Decimal>,
    /// Price the strategy expects to trade at
    pub price: Decimal,
    /// Originating strategy identifier
    pub strategy_id: String,
    /// Confidence score in [0, 1]
    pub confidence: Decimal,
    /// Signal timestamp
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    /// Create a new signal with full confidence and no amount cap
    pub fn new(
        strategy_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            amount: None,
            price,
            strategy_id: strategy_id.into(),
            confidence: Decimal::ONE,
            timestamp,
        }
    }

    /// Set a requested amount
    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Set a confidence score
    pub fn with_confidence(mut self, confidence: Decimal) -> Self {
        self.confidence = confidence;
        self
    }

    /// Check the signal against the window it was emitted for
    pub fn validate(
        &self,
        strategy_id: &str,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SignalError> {
        if self.price <= Decimal::ZERO {
            return Err(SignalError::InvalidPrice(self.price));
        }
        if let Some(amount) = self.amount {
            if amount <= Decimal::ZERO {
                return Err(SignalError::InvalidAmount(amount));
            }
        }
        if self.confidence < Decimal::ZERO || self.confidence > Decimal::ONE {
            return Err(SignalError::InvalidConfidence(self.confidence));
        }
        if self.symbol != symbol {
            return Err(SignalError::SymbolMismatch {
                expected: symbol.to_string(),
                got: self.symbol.clone(),
            });
        }
        if self.strategy_id != strategy_id {
            return Err(SignalError::StrategyMismatch {
                expected: strategy_id.to_string(),
                got: self.strategy_id.clone(),
            });
        }
        if self.timestamp > now {
            return Err(SignalError::Lookahead {
                signal: self.timestamp,
                current: now,
            });
        }
        Ok(())
    }
}
