//! tradesim: historical strategy simulator with performance metrics
//!
//! This library provides the core components for:
//! - Loading and validating OHLCV candle series
//! - Pluggable async strategies emitting trading signals
//! - Deterministic multi-symbol replay with fees, slippage and leverage
//! - Risk filters and fixed, percent or Kelly position sizing
//! - Stop-loss and take-profit simulation
//! - Performance metrics over trades and the equity curve
//! - Structured logging and run metrics

pub mod backtest;
pub mod cli;
pub mod config;
pub mod data;
pub mod risk;
pub mod signal;
pub mod strategy;
pub mod telemetry;
