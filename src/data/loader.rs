//! JSON candle file loader
//!
//! Validation happens here, at the boundary, so the replay loop only ever
//! receives a [`HistoricalData`].

use super::{Candle, DataError, HistoricalData};
use serde::Deserialize;
use std::path::Path;

/// On-disk layout: `{ "symbol": "...", "candles": [ ... ] }`
#[derive(Debug, Deserialize)]
struct CandleFile {
    symbol: String,
    candles: Vec<Candle>,
}

/// Parse a JSON document into validated historical data
pub fn parse_json(content: &str) -> Result<HistoricalData, DataError> {
    let file: CandleFile = serde_json::from_str(content)?;
    HistoricalData::new(file.symbol, file.candles)
}

/// Load and validate a JSON candle file
pub fn load_json(path: impl AsRef<Path>) -> Result<HistoricalData, DataError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let data = parse_json(&content)?;
    tracing::debug!(
        path = %path.display(),
        symbol = data.symbol(),
        candles = data.len(),
        "Loaded historical data"
    );
    Ok(data)
}
