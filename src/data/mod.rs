//! Historical data module
//!
//! Validated candle series and the JSON file loader

mod loader;
mod types;

pub use loader::{load_json, parse_json};
pub use types::{Candle, DataError, HistoricalData};
