//! Risk management types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why an entry signal was skipped
///
/// Skips are a normal outcome of the risk filters, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Signal confidence below the configured minimum
    LowConfidence(Decimal),
    /// Strategy already holds this symbol on this side
    AlreadyPositioned,
    /// Maximum concurrent positions reached
    MaxPositionsReached,
    /// Sell entry while short selling is disabled
    ShortingDisabled,
    /// Sizer produced no capital to commit
    ZeroSize,
    /// Margin plus entry fee exceeds free cash
    InsufficientCapital { required: Decimal, available: Decimal },
    /// Quantity or notional falls outside the representable range
    SizeOutOfRange,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::LowConfidence(c) => write!(f, "confidence {c} below minimum"),
            RejectReason::AlreadyPositioned => write!(f, "already positioned"),
            RejectReason::MaxPositionsReached => write!(f, "maximum positions reached"),
            RejectReason::ShortingDisabled => write!(f, "short selling disabled"),
            RejectReason::ZeroSize => write!(f, "zero position size"),
            RejectReason::InsufficientCapital {
                required,
                available,
            } => write!(f, "insufficient capital: need {required}, have {available}"),
            RejectReason::SizeOutOfRange => write!(f, "position size out of range"),
        }
    }
}
