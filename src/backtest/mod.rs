//! Backtesting module
//!
//! Replays historical candles through strategies with simulated fills

mod analytics;
mod engine;
mod execution_model;
mod progress;
mod replay;

pub use analytics::{
    calculate_metrics, calculate_metrics_with_rate, period_returns, realized_equity_curve, stddev,
    BacktestResult, EquityCurveBuilder, EquityPoint, PerformanceMetrics, SkippedSignal,
    PERIODS_PER_YEAR,
};
pub use engine::BacktestEngine;
pub use execution_model::FillModel;
pub use progress::{CancelFlag, ProgressCallback, ProgressEvent, RunControl};
pub use replay::{EventStream, ReplayStep, StepBar};

use crate::config::ConfigError;
use crate::data::DataError;
use thiserror::Error;

/// Fatal backtest errors
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
