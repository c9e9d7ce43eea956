//! Risk management module
//!
//! Position tracking, sizing, and entry filters

mod kelly;
mod limits;
mod position;
mod sizing;
mod types;

pub use kelly::{KellyCalculator, TradeStats};
pub use limits::RiskLimits;
pub use position::{CloseReason, Position, PositionId, PositionTracker, Trade};
pub use sizing::{create_sizer, FixedSizer, KellySizer, PercentSizer, PositionSizer, SizingContext};
pub use types::RejectReason;
