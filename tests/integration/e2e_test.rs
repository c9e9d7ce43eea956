//! End-to-end integration tests

use crate::common::*;
use rust_decimal_macros::dec;
use std::io::Write;
use tradesim::backtest::{BacktestEngine, RunControl};
use tradesim::config::Config;
use tradesim::data::load_json;
use tradesim::strategy::{create_strategy, BUILTIN_STRATEGIES};

#[test]
fn test_config_example_loads() {
    let config = Config::load("config.toml.example").unwrap();
    assert!(config.backtest.validate().is_ok());
    assert_eq!(config.backtest.initial_capital, dec!(10000));
}

#[tokio::test]
async fn test_builtin_strategies_on_loaded_file() {
    let closes = zigzag(300);
    let candles: Vec<_> = closes
        .iter()
        .enumerate()
        .map(|(i, c)| {
            serde_json::json!({
                "timestamp": ts(i).to_rfc3339(),
                "open": c.to_string(),
                "high": (c + dec!(1)).to_string(),
                "low": (c - dec!(1)).to_string(),
                "close": c.to_string(),
                "volume": "10",
            })
        })
        .collect();
    let body = serde_json::json!({ "symbol": "BTCUSDT", "candles": candles });

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(body.to_string().as_bytes()).unwrap();
    let data = load_json(file.path()).unwrap();
    assert_eq!(data.len(), 300);

    let config = Config::load("config.toml.example").unwrap();
    let mut engine = BacktestEngine::new(config.backtest).unwrap();
    for (name, _) in BUILTIN_STRATEGIES {
        engine.add_strategy(create_strategy(name).unwrap()).unwrap();
    }
    let lookback = engine.required_lookback();
    assert_eq!(lookback, 31);

    let result = engine.run(&[data], lookback, &RunControl::new()).await.unwrap();

    assert_eq!(result.equity_curve.len(), 300 - lookback);
    assert_eq!(result.strategy_errors, 0);
    assert!(!result.trades.is_empty());
    assert!(result.open_positions.is_empty());
    assert_eq!(
        result.metrics_by_strategy.keys().collect::<Vec<_>>(),
        vec!["rsi_reversion", "sma_crossover"]
    );

    let json = serde_json::to_value(&result).unwrap();
    assert!(json["overall_metrics"]["total_trades"].is_u64());
    assert_eq!(json["cancelled"], false);
}
