//! Candle and historical series types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Data errors; all of them abort a run
#[derive(Debug, Error)]
pub enum DataError {
    /// No series supplied to a run
    #[error("No historical data supplied")]
    NoData,
    /// A series without candles
    #[error("Series {0} has no candles")]
    EmptySeries(String),
    /// Same symbol supplied twice
    #[error("Duplicate series for symbol {0}")]
    DuplicateSymbol(String),
    /// Candle failed validation
    #[error("Invalid candle {index} for {symbol}: {reason}")]
    InvalidCandle {
        symbol: String,
        index: usize,
        reason: String,
    },
    /// Timestamps not strictly ascending
    #[error("Out-of-order candle {index} for {symbol}: {current} does not follow {previous}")]
    OutOfOrder {
        symbol: String,
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
    /// Series too short to simulate any step after the lookback window
    #[error("Series {symbol} has {len} candles, lookback {lookback} needs more")]
    InsufficientHistory {
        symbol: String,
        len: usize,
        lookback: usize,
    },
    /// Lookback must be at least one candle
    #[error("Lookback must be at least 1")]
    InvalidLookback,
    /// Data file could not be read
    #[error("Failed to read data: {0}")]
    Io(#[from] std::io::Error),
    /// Data file could not be parsed
    #[error("Failed to parse data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One OHLCV bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Create a new candle
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Check price positivity and OHLC consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.open <= Decimal::ZERO
            || self.high <= Decimal::ZERO
            || self.low <= Decimal::ZERO
            || self.close <= Decimal::ZERO
        {
            return Err("prices must be positive".to_string());
        }
        if self.volume < Decimal::ZERO {
            return Err(format!("negative volume {}", self.volume));
        }
        if self.low > self.open.min(self.close) {
            return Err(format!("low {} above open/close", self.low));
        }
        if self.high < self.open.max(self.close) {
            return Err(format!("high {} below open/close", self.high));
        }
        Ok(())
    }
}

/// A validated, strictly ascending candle series for one symbol
///
/// Only constructible through [`HistoricalData::new`], so the engine never
/// sees unvalidated candles. Gaps between candles are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoricalData {
    symbol: String,
    candles: Vec<Candle>,
}

impl HistoricalData {
    /// Validate and wrap a candle series
    pub fn new(symbol: impl Into<String>, candles: Vec<Candle>) -> Result<Self, DataError> {
        let symbol = symbol.into();
        if candles.is_empty() {
            return Err(DataError::EmptySeries(symbol));
        }

        for (index, candle) in candles.iter().enumerate() {
            candle.validate().map_err(|reason| DataError::InvalidCandle {
                symbol: symbol.clone(),
                index,
                reason,
            })?;

            if index > 0 {
                let previous = candles[index - 1].timestamp;
                if candle.timestamp <= previous {
                    return Err(DataError::OutOfOrder {
                        symbol,
                        index,
                        previous,
                        current: candle.timestamp,
                    });
                }
            }
        }

        Ok(Self { symbol, candles })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}
