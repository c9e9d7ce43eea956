//! Run metrics
//!
//! Recorded through the `metrics` facade; no-ops unless a recorder is
//! installed by the host.

use crate::backtest::BacktestResult;
use metrics::{counter, gauge};

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Completed runs
    Runs,
    /// Replay steps processed
    Steps,
    /// Closed trades
    Trades,
    /// Signals refused by risk filters
    SkippedSignals,
    /// Caught strategy failures
    StrategyErrors,
    /// Malformed signals dropped
    MalformedSignals,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Equity at the end of the last run
    FinalEquity,
    /// Max drawdown percent of the last run
    MaxDrawdownPct,
    /// Positions left open by the last run
    OpenPositions,
}

impl CounterMetric {
    fn name(self) -> &'static str {
        match self {
            CounterMetric::Runs => "tradesim_runs_total",
            CounterMetric::Steps => "tradesim_steps_total",
            CounterMetric::Trades => "tradesim_trades_total",
            CounterMetric::SkippedSignals => "tradesim_skipped_signals_total",
            CounterMetric::StrategyErrors => "tradesim_strategy_errors_total",
            CounterMetric::MalformedSignals => "tradesim_malformed_signals_total",
        }
    }
}

impl GaugeMetric {
    fn name(self) -> &'static str {
        match self {
            GaugeMetric::FinalEquity => "tradesim_final_equity",
            GaugeMetric::MaxDrawdownPct => "tradesim_max_drawdown_pct",
            GaugeMetric::OpenPositions => "tradesim_open_positions",
        }
    }
}

/// Increment a counter
pub fn increment(metric: CounterMetric, value: u64) {
    counter!(metric.name()).increment(value);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    gauge!(metric.name()).set(value);
}

/// Record the outcome of a finished run
pub fn record_run(result: &BacktestResult, steps: usize) {
    increment(CounterMetric::Runs, 1);
    increment(CounterMetric::Steps, steps as u64);
    increment(CounterMetric::Trades, result.trades.len() as u64);
    increment(
        CounterMetric::SkippedSignals,
        result.skipped_signals.len() as u64,
    );
    increment(CounterMetric::StrategyErrors, result.strategy_errors as u64);
    increment(
        CounterMetric::MalformedSignals,
        result.malformed_signals as u64,
    );

    set_gauge(GaugeMetric::FinalEquity, result.overall_metrics.final_equity);
    set_gauge(
        GaugeMetric::MaxDrawdownPct,
        result.overall_metrics.max_drawdown_pct,
    );
    set_gauge(GaugeMetric::OpenPositions, result.open_positions.len() as f64);
}
