//! Telemetry module
//!
//! Logging and run metrics

mod logging;
mod run_metrics;

pub use logging::init_logging;
pub use run_metrics::{increment, record_run, set_gauge, CounterMetric, GaugeMetric};

use crate::config::TelemetryConfig;

/// Initialize all telemetry subsystems
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    init_logging(&config.log_level, config.log_format)
}
