//! Engine integration tests

use crate::common::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use tradesim::backtest::{BacktestEngine, BacktestError, CancelFlag, RunControl};
use tradesim::config::{BacktestConfig, ConfigError, IntrabarPolicy, SizingMode};
use tradesim::data::{Candle, DataError, HistoricalData};
use tradesim::risk::{CloseReason, RejectReason};
use tradesim::signal::Side;
use tradesim::strategy::{RsiReversion, SmaCrossover, Strategy};

fn engine(config: BacktestConfig, strategies: Vec<Box<dyn Strategy>>) -> BacktestEngine {
    let mut engine = BacktestEngine::new(config).unwrap();
    for strategy in strategies {
        engine.add_strategy(strategy).unwrap();
    }
    engine
}

fn flat(len: usize) -> Vec<Decimal> {
    vec![dec!(100); len]
}

/// 100 until `at`, then `after`
fn step_change(len: usize, at: usize, after: Decimal) -> Vec<Decimal> {
    (0..len)
        .map(|i| if i < at { dec!(100) } else { after })
        .collect()
}

#[tokio::test]
async fn test_single_round_trip() {
    let closes: Vec<_> = (0..30)
        .map(|i| match i {
            0..=10 => dec!(100),
            11..=19 => dec!(110),
            _ => dec!(120),
        })
        .collect();
    let config = BacktestConfig {
        slippage_rate: dec!(0),
        ..Default::default()
    };
    let engine = engine(
        config,
        vec![Box::new(Scripted::new("s", &[(10, Side::Buy), (20, Side::Sell)]))],
    );

    let result = engine
        .run(&[series("BTCUSDT", &closes)], 1, &RunControl::new())
        .await
        .unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.amount, dec!(10));
    assert_eq!(trade.fees, dec!(2.2));
    assert_eq!(trade.pnl, trade.amount * dec!(20) - trade.fees);
    assert_eq!(trade.close_reason, CloseReason::Signal);
    assert_eq!(result.overall_metrics.win_rate, 1.0);
    assert!((result.overall_metrics.final_equity - 10197.8).abs() < 1e-9);
    assert_eq!(result.equity_curve.len(), 29);
    assert_eq!(result.equity_curve[0].timestamp, ts(1));
}

#[tokio::test]
async fn test_stop_loss_fills_at_level() {
    let data = bars(
        "BTCUSDT",
        &[
            (dec!(101), dec!(99), dec!(100)),
            (dec!(101), dec!(99), dec!(100)),
            (dec!(101), dec!(99), dec!(100)),
            (dec!(101), dec!(99), dec!(100)),
            (dec!(100), dec!(97.9), dec!(98.5)),
            (dec!(99), dec!(98), dec!(98.5)),
        ],
    );
    let config = BacktestConfig {
        stop_loss_enabled: true,
        stop_loss_percent: dec!(2),
        ..frictionless()
    };
    let engine = engine(config, vec![Box::new(Scripted::new("s", &[(2, Side::Buy)]))]);

    let result = engine.run(&[data], 1, &RunControl::new()).await.unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.exit_price, dec!(98));
    assert_eq!(trade.close_reason, CloseReason::StopLoss);
    assert_eq!(trade.exit_time, ts(4));
    assert_eq!(trade.pnl, dec!(-20));
}

#[tokio::test]
async fn test_intrabar_policy_decides_double_touch() {
    let hlc = [
        (dec!(100), dec!(100), dec!(100)),
        (dec!(100), dec!(100), dec!(100)),
        (dec!(110), dec!(90), dec!(100)),
    ];
    for (policy, reason, exit) in [
        (IntrabarPolicy::StopFirst, CloseReason::StopLoss, dec!(98)),
        (IntrabarPolicy::TargetFirst, CloseReason::TakeProfit, dec!(105)),
    ] {
        let config = BacktestConfig {
            stop_loss_enabled: true,
            take_profit_enabled: true,
            intrabar_policy: policy,
            ..frictionless()
        };
        let engine = engine(config, vec![Box::new(Scripted::new("s", &[(1, Side::Buy)]))]);
        let result = engine
            .run(&[bars("BTCUSDT", &hlc)], 1, &RunControl::new())
            .await
            .unwrap();

        assert_eq!(result.trades[0].close_reason, reason);
        assert_eq!(result.trades[0].exit_price, exit);
    }
}

#[tokio::test]
async fn test_first_registered_strategy_wins_slot() {
    let engine = engine(
        BacktestConfig::default(),
        vec![
            Box::new(Scripted::new("first", &[(5, Side::Buy)])),
            Box::new(Scripted::new("second", &[(5, Side::Buy)])),
        ],
    );

    let result = engine
        .run(&[series("BTCUSDT", &flat(10))], 1, &RunControl::new())
        .await
        .unwrap();

    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].strategy_id, "first");
    assert_eq!(result.trades[0].close_reason, CloseReason::EndOfData);

    assert_eq!(result.skipped_signals.len(), 1);
    let skip = &result.skipped_signals[0];
    assert_eq!(skip.strategy_id, "second");
    assert_eq!(skip.reason, RejectReason::MaxPositionsReached);
    assert_eq!(skip.timestamp, ts(5));

    assert_eq!(result.metrics_by_strategy["first"].total_trades, 1);
    assert_eq!(result.metrics_by_strategy["second"].total_trades, 0);
}

#[tokio::test]
async fn test_deterministic_runs() {
    let data = [series("BTCUSDT", &zigzag(200)), series("ETHUSDT", &zigzag(230)[30..])];
    let config = BacktestConfig {
        allow_short: true,
        max_positions: 3,
        stop_loss_enabled: true,
        ..Default::default()
    };
    let build = || {
        engine(
            config.clone(),
            vec![
                Box::new(SmaCrossover::new("sma_fast", 3, 8)),
                Box::new(RsiReversion::default()),
            ],
        )
    };

    let a = build().run(&data, 16, &RunControl::new()).await.unwrap();
    let b = build().run(&data, 16, &RunControl::new()).await.unwrap();

    assert!(!a.trades.is_empty());
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[tokio::test]
async fn test_open_positions_never_exceed_limit() {
    let shifted: Vec<_> = zigzag(220)[13..].to_vec();
    let data = [
        series("BTCUSDT", &zigzag(200)),
        series("ETHUSDT", &shifted),
        series("SOLUSDT", &zigzag(240)[29..]),
    ];
    let config = BacktestConfig {
        allow_short: true,
        max_positions: 2,
        ..Default::default()
    };
    let engine = engine(
        config,
        vec![
            Box::new(SmaCrossover::new("sma_3_8", 3, 8)),
            Box::new(SmaCrossover::new("sma_5_13", 5, 13)),
        ],
    );

    let result = engine.run(&data, 14, &RunControl::new()).await.unwrap();

    assert!(result.equity_curve.iter().all(|p| p.open_positions <= 2));
    assert!(result
        .skipped_signals
        .iter()
        .any(|s| s.reason == RejectReason::MaxPositionsReached));
}

#[tokio::test]
async fn test_percent_sizing_notional() {
    let engine = engine(
        BacktestConfig::default(),
        vec![Box::new(Scripted::new("s", &[(3, Side::Buy)]))],
    );
    let result = engine
        .run(&[series("BTCUSDT", &flat(10))], 1, &RunControl::new())
        .await
        .unwrap();

    let trade = &result.trades[0];
    let notional = trade.entry_price * trade.amount;
    assert!((notional - dec!(1000)).abs() < dec!(0.000001));
    // Entry paid up by the slippage rate
    assert_eq!(trade.entry_price, dec!(100.05));
}

#[tokio::test]
async fn test_full_equity_sizing_leaves_room_for_fee() {
    let config = BacktestConfig {
        position_size: dec!(100),
        fee_rate: dec!(0.001),
        ..Default::default()
    };
    let engine = engine(config, vec![Box::new(Scripted::new("s", &[(3, Side::Buy)]))]);
    let result = engine
        .run(&[series("BTCUSDT", &flat(10))], 1, &RunControl::new())
        .await
        .unwrap();

    assert!(result.skipped_signals.is_empty());
    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    // Margin plus entry fee uses up the whole of free cash
    let notional = trade.entry_price * trade.amount;
    assert!((notional * dec!(1.001) - dec!(10000)).abs() < dec!(0.000001));
}

#[tokio::test]
async fn test_unrepresentable_size_is_skipped() {
    let tiny = vec![Decimal::new(1, 26); 6];
    let engine = engine(
        BacktestConfig::default(),
        vec![Box::new(Scripted::new("s", &[(2, Side::Buy)]))],
    );
    let result = engine
        .run(&[series("DUSTUSDT", &tiny)], 1, &RunControl::new())
        .await
        .unwrap();

    assert!(result.trades.is_empty());
    assert_eq!(result.skipped_signals.len(), 1);
    assert_eq!(result.skipped_signals[0].reason, RejectReason::SizeOutOfRange);
    assert_eq!(result.overall_metrics.final_equity, 10000.0);
}

#[tokio::test]
async fn test_fixed_sizing_insufficient_capital_is_skipped() {
    let config = BacktestConfig {
        position_sizing: SizingMode::Fixed,
        position_size: dec!(20000),
        ..Default::default()
    };
    let engine = engine(config, vec![Box::new(Scripted::new("s", &[(3, Side::Buy)]))]);
    let result = engine
        .run(&[series("BTCUSDT", &flat(10))], 1, &RunControl::new())
        .await
        .unwrap();

    assert!(result.trades.is_empty());
    assert!(matches!(
        result.skipped_signals[0].reason,
        RejectReason::InsufficientCapital { .. }
    ));
}

#[tokio::test]
async fn test_kelly_sparse_history_uses_damped_fraction() {
    let config = BacktestConfig {
        position_sizing: SizingMode::Kelly,
        ..frictionless()
    };
    let engine = engine(config, vec![Box::new(Scripted::new("s", &[(1, Side::Buy)]))]);
    let result = engine
        .run(&[series("BTCUSDT", &flat(5))], 1, &RunControl::new())
        .await
        .unwrap();

    // 10% cap * 0.25 Kelly fraction of 10000
    assert_eq!(result.trades[0].amount, dec!(2.5));
}

#[tokio::test]
async fn test_requested_amount_caps_quantity() {
    let engine = engine(
        frictionless(),
        vec![Box::new(
            Scripted::new("s", &[(1, Side::Buy)]).with_amount(dec!(1)),
        )],
    );
    let result = engine
        .run(&[series("BTCUSDT", &flat(5))], 1, &RunControl::new())
        .await
        .unwrap();

    assert_eq!(result.trades[0].amount, dec!(1));
}

#[tokio::test]
async fn test_short_round_trip() {
    let config = BacktestConfig {
        allow_short: true,
        ..frictionless()
    };
    let engine = engine(
        config,
        vec![Box::new(Scripted::new("s", &[(2, Side::Sell), (7, Side::Buy)]))],
    );
    let result = engine
        .run(&[series("BTCUSDT", &step_change(10, 6, dec!(90)))], 1, &RunControl::new())
        .await
        .unwrap();

    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].side, Side::Sell);
    assert_eq!(result.trades[0].pnl, dec!(100));
}

#[tokio::test]
async fn test_opposite_signal_closes_without_reversing() {
    let engine = engine(
        frictionless(),
        vec![Box::new(Scripted::new(
            "s",
            &[(2, Side::Buy), (3, Side::Buy), (4, Side::Sell), (6, Side::Sell)],
        ))],
    );
    let result = engine
        .run(&[series("BTCUSDT", &flat(10))], 1, &RunControl::new())
        .await
        .unwrap();

    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].exit_time, ts(4));
    let reasons: Vec<_> = result.skipped_signals.iter().map(|s| s.reason.clone()).collect();
    assert_eq!(
        reasons,
        vec![RejectReason::AlreadyPositioned, RejectReason::ShortingDisabled]
    );
}

#[tokio::test]
async fn test_leverage_scales_exposure() {
    let config = BacktestConfig {
        leverage: dec!(2),
        ..frictionless()
    };
    let engine = engine(
        config,
        vec![Box::new(Scripted::new("s", &[(1, Side::Buy), (4, Side::Sell)]))],
    );
    let result = engine
        .run(&[series("BTCUSDT", &step_change(6, 3, dec!(110)))], 1, &RunControl::new())
        .await
        .unwrap();

    let trade = &result.trades[0];
    assert_eq!(trade.amount, dec!(20));
    assert_eq!(trade.pnl, dec!(200));
    assert_eq!(trade.pnl_pct, dec!(20));
}

#[tokio::test]
async fn test_positions_stay_open_without_close_at_end() {
    let config = BacktestConfig {
        close_at_end: false,
        ..frictionless()
    };
    let engine = engine(config, vec![Box::new(Scripted::new("s", &[(1, Side::Buy)]))]);
    let result = engine
        .run(&[series("BTCUSDT", &flat(5))], 1, &RunControl::new())
        .await
        .unwrap();

    assert!(result.trades.is_empty());
    assert_eq!(result.open_positions.len(), 1);
}

#[tokio::test]
async fn test_warm_up_steps_have_no_equity_points() {
    let engine = engine(BacktestConfig::default(), vec![]);
    let result = engine
        .run(&[series("BTCUSDT", &flat(20))], 5, &RunControl::new())
        .await
        .unwrap();

    assert_eq!(result.equity_curve.len(), 15);
    assert_eq!(result.equity_curve[0].timestamp, ts(5));
    assert!(result
        .equity_curve
        .iter()
        .all(|p| p.equity == dec!(10000) && p.drawdown == dec!(0)));
}

#[tokio::test]
async fn test_strategies_start_after_lookback_candles() {
    let seen = Arc::new(Mutex::new(vec![]));
    let engine = engine(
        BacktestConfig::default(),
        vec![Box::new(Recording::new(seen.clone()))],
    );
    let result = engine
        .run(&[series("BTCUSDT", &flat(10))], 5, &RunControl::new())
        .await
        .unwrap();

    assert_eq!(result.equity_curve.len(), 5);
    assert_eq!(result.equity_curve[0].timestamp, ts(5));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 5);
    // Window of five candles ending with the current one
    assert_eq!(seen[0], (ts(1), ts(5), 5));
    assert_eq!(seen[4], (ts(5), ts(9), 5));
}

#[tokio::test]
async fn test_multiple_symbols_with_different_ranges() {
    let late: Vec<Candle> = (5..10)
        .map(|i| Candle::new(ts(i), dec!(50), dec!(50), dec!(50), dec!(50), dec!(1)))
        .collect();
    let data = [
        series("BTCUSDT", &flat(10)),
        HistoricalData::new("ETHUSDT", late).unwrap(),
    ];
    let config = BacktestConfig {
        max_positions: 2,
        ..frictionless()
    };
    let engine = engine(config, vec![Box::new(Scripted::new("s", &[(7, Side::Buy)]))]);

    let result = engine.run(&data, 1, &RunControl::new()).await.unwrap();

    assert_eq!(result.equity_curve.len(), 9);
    let symbols: Vec<_> = result.trades.iter().map(|t| t.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);
}

#[tokio::test]
async fn test_strategy_errors_are_isolated() {
    let engine = engine(
        frictionless(),
        vec![
            Box::new(Failing),
            Box::new(Panicking),
            Box::new(Scripted::new("s", &[(1, Side::Buy)])),
        ],
    );
    let result = engine
        .run(&[series("BTCUSDT", &flat(10))], 1, &RunControl::new())
        .await
        .unwrap();

    // Two failing strategies over nine simulated steps
    assert_eq!(result.strategy_errors, 18);
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].strategy_id, "s");
}

#[tokio::test]
async fn test_malformed_signals_are_dropped() {
    let engine = engine(frictionless(), vec![Box::new(Malformed)]);
    let result = engine
        .run(&[series("BTCUSDT", &flat(4))], 1, &RunControl::new())
        .await
        .unwrap();

    assert_eq!(result.malformed_signals, 15);
    assert!(result.trades.is_empty());
    assert!(result.skipped_signals.is_empty());
}

#[tokio::test]
async fn test_cancellation_returns_partial_result() {
    let flag = CancelFlag::new();
    let trigger = flag.clone();
    let control = RunControl::new()
        .with_cancel(flag)
        .on_progress(move |event| {
            if event.percent >= 50.0 {
                trigger.cancel();
            }
        });
    let engine = engine(frictionless(), vec![Box::new(Scripted::new("s", &[(2, Side::Buy)]))]);

    let result = engine
        .run(&[series("BTCUSDT", &flat(101))], 1, &control)
        .await
        .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.equity_curve.len(), 50);
    assert!(result.trades.is_empty());
    assert_eq!(result.open_positions.len(), 1);
}

#[tokio::test]
async fn test_progress_events() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let calls = Arc::new(Mutex::new(0usize));
    let counter = calls.clone();
    let control = RunControl::new()
        .progress_channel(tx)
        .on_progress(move |_| *counter.lock().unwrap() += 1);
    let engine = engine(BacktestConfig::default(), vec![]);

    engine
        .run(&[series("BTCUSDT", &flat(201))], 1, &control)
        .await
        .unwrap();

    let mut events = vec![];
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 101);
    assert_eq!(*calls.lock().unwrap(), 101);
    assert!(events.windows(2).all(|w| w[0].percent < w[1].percent));
    let last = events.last().unwrap();
    assert_eq!(last.percent, 100.0);
    assert_eq!(last.step, 200);
    assert_eq!(last.total_steps, 200);
}

#[tokio::test]
async fn test_invalid_inputs_are_fatal() {
    let engine = engine(BacktestConfig::default(), vec![]);

    let err = engine
        .run(&[series("BTCUSDT", &flat(3))], 5, &RunControl::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BacktestError::Data(DataError::InsufficientHistory { len: 3, lookback: 5, .. })
    ));

    // Exactly `lookback` candles leave nothing to simulate
    let err = engine
        .run(&[series("BTCUSDT", &flat(5))], 5, &RunControl::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BacktestError::Data(DataError::InsufficientHistory { len: 5, lookback: 5, .. })
    ));

    let err = engine.run(&[], 1, &RunControl::new()).await.unwrap_err();
    assert!(matches!(err, BacktestError::Data(DataError::NoData)));
}

#[test]
fn test_duplicate_strategy_rejected() {
    let mut engine = BacktestEngine::new(BacktestConfig::default()).unwrap();
    engine.add_strategy(Box::new(Failing)).unwrap();
    assert!(matches!(
        engine.add_strategy(Box::new(Failing)),
        Err(ConfigError::DuplicateStrategy(_))
    ));
}

#[test]
fn test_invalid_config_rejected() {
    let config = BacktestConfig {
        initial_capital: dec!(0),
        ..Default::default()
    };
    assert!(BacktestEngine::new(config).is_err());
}

#[test]
fn test_run_from_sync_context() {
    let engine = engine(frictionless(), vec![Box::new(Scripted::new("s", &[(1, Side::Buy)]))]);
    let data = [series("BTCUSDT", &flat(5))];
    let result = tokio_test::block_on(engine.run(&data, 1, &RunControl::new())).unwrap();
    assert_eq!(result.trades.len(), 1);
}
