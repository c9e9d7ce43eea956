//! Signal module
//!
//! Trading intents emitted by strategies and their validation

mod types;

pub use types::{Side, Signal, SignalError};
