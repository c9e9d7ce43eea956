//! Backtest engine

use super::analytics::{
    calculate_metrics_with_rate, realized_equity_curve, BacktestResult, EquityCurveBuilder,
    SkippedSignal,
};
use super::progress::{ProgressTracker, RunControl};
use super::{BacktestError, EventStream, FillModel, ReplayStep};
use crate::config::{BacktestConfig, ConfigError};
use crate::data::HistoricalData;
use crate::risk::{
    create_sizer, CloseReason, Position, PositionId, PositionSizer, PositionTracker, RejectReason,
    RiskLimits, SizingContext,
};
use crate::signal::Signal;
use crate::strategy::{MarketWindow, Strategy, StrategyError};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use rust_decimal::Decimal;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use tracing::{debug, info, warn};

/// Mutable state of a single run
struct RunState {
    tracker: PositionTracker,
    curve: EquityCurveBuilder,
    skipped: Vec<SkippedSignal>,
    strategy_errors: usize,
    malformed_signals: usize,
}

/// Replays candle series through registered strategies
pub struct BacktestEngine {
    config: BacktestConfig,
    strategies: Vec<Box<dyn Strategy>>,
    fills: FillModel,
    limits: RiskLimits,
    sizer: Box<dyn PositionSizer>,
}

impl std::fmt::Debug for BacktestEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BacktestEngine")
            .field("config", &self.config)
            .field("strategies", &self.strategy_ids())
            .field("sizer", &self.sizer.mode_name())
            .finish()
    }
}

impl BacktestEngine {
    /// Create an engine from a validated configuration
    pub fn new(config: BacktestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            fills: FillModel::from_config(&config),
            limits: RiskLimits::from_config(&config),
            sizer: create_sizer(&config),
            strategies: Vec::new(),
            config,
        })
    }

    /// Register a strategy; ids must be unique
    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>) -> Result<(), ConfigError> {
        if self.strategies.iter().any(|s| s.id() == strategy.id()) {
            return Err(ConfigError::DuplicateStrategy(strategy.id().to_string()));
        }
        self.strategies.push(strategy);
        Ok(())
    }

    /// Registered strategy ids in registration order
    pub fn strategy_ids(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.id()).collect()
    }

    /// Longest history any registered strategy needs
    pub fn required_lookback(&self) -> usize {
        self.strategies
            .iter()
            .map(|s| s.required_history())
            .max()
            .unwrap_or(1)
            .max(1)
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run a deterministic replay over `data`
    ///
    /// Simulation for a symbol starts at candle index `lookback`, once that
    /// many candles precede it. Each strategy sees the last `lookback`
    /// candles of the symbol, ending with the current one. Steps where no
    /// symbol has started are warm-up and produce no equity points.
    pub async fn run(
        &self,
        data: &[HistoricalData],
        lookback: usize,
        control: &RunControl,
    ) -> Result<BacktestResult, BacktestError> {
        let stream = EventStream::new(data, lookback)?;
        let total_steps = stream.active_steps(lookback);

        info!(
            strategies = self.strategies.len(),
            series = data.len(),
            lookback,
            total_steps,
            sizing = self.sizer.mode_name(),
            "Starting backtest"
        );

        let mut state = RunState {
            tracker: PositionTracker::new(self.config.initial_capital),
            curve: EquityCurveBuilder::new(self.config.initial_capital),
            skipped: Vec::new(),
            strategy_errors: 0,
            malformed_signals: 0,
        };
        let mut progress = ProgressTracker::new(total_steps);
        let mut processed = 0usize;
        let mut cancelled = false;

        let mut steps = stream.peekable();
        while let Some(step) = steps.next() {
            if control.is_cancelled() {
                info!(processed, total_steps, "Backtest cancelled");
                cancelled = true;
                break;
            }
            if !step.is_active(lookback) {
                continue;
            }
            let is_last = steps.peek().is_none();

            self.mark_and_check_exits(&mut state, &step, data);
            self.run_strategies(&mut state, &step, data, lookback).await;

            if is_last && self.config.close_at_end {
                self.close_all(&mut state, step.timestamp);
            }

            state.curve.push(
                step.timestamp,
                state.tracker.equity(),
                state.tracker.open_count(),
            );

            processed += 1;
            progress.advance(processed, control);
        }

        let result = self.finish(state, cancelled);
        crate::telemetry::record_run(&result, processed);

        info!(
            trades = result.trades.len(),
            skipped = result.skipped_signals.len(),
            strategy_errors = result.strategy_errors,
            final_equity = result.overall_metrics.final_equity,
            cancelled,
            "Backtest complete"
        );
        Ok(result)
    }

    /// Mark open positions at the close and fire stops and targets
    fn mark_and_check_exits(
        &self,
        state: &mut RunState,
        step: &ReplayStep<'_>,
        data: &[HistoricalData],
    ) {
        for bar in &step.bars {
            let candle = bar.candle;
            let symbol = data[bar.series].symbol();
            state.tracker.update_mark(symbol, candle.close);

            let exits: Vec<(PositionId, Decimal, CloseReason)> = state
                .tracker
                .positions()
                .iter()
                .filter(|p| p.symbol == symbol)
                .filter_map(|p| {
                    self.fills
                        .check_exit(p, candle)
                        .map(|(level, reason)| (p.id, level, reason))
                })
                .collect();

            for (id, level, reason) in exits {
                self.close_position(state, id, level, step.timestamp, reason);
            }
        }
    }

    async fn run_strategies(
        &self,
        state: &mut RunState,
        step: &ReplayStep<'_>,
        data: &[HistoricalData],
        lookback: usize,
    ) {
        for bar in &step.bars {
            if bar.index < lookback {
                continue;
            }
            let series = &data[bar.series];
            let candles = &series.candles()[bar.index + 1 - lookback..=bar.index];
            let window = MarketWindow::new(series.symbol(), candles);

            for strategy in &self.strategies {
                let outcome = AssertUnwindSafe(strategy.analyze(&window))
                    .catch_unwind()
                    .await;
                let signals = match outcome {
                    Ok(Ok(signals)) => signals,
                    Ok(Err(e)) => {
                        self.strategy_failed(state, strategy.id(), series.symbol(), &e);
                        continue;
                    }
                    Err(panic) => {
                        let e = StrategyError::Panicked(panic_message(panic.as_ref()));
                        self.strategy_failed(state, strategy.id(), series.symbol(), &e);
                        continue;
                    }
                };

                for signal in signals {
                    self.process_signal(
                        state,
                        signal,
                        strategy.id(),
                        series.symbol(),
                        step.timestamp,
                        bar.candle.close,
                    );
                }
            }
        }
    }

    fn strategy_failed(&self, state: &mut RunState, strategy: &str, symbol: &str, e: &StrategyError) {
        warn!(strategy, symbol, error = %e, "Strategy failed");
        state.strategy_errors += 1;
    }

    fn process_signal(
        &self,
        state: &mut RunState,
        signal: Signal,
        strategy_id: &str,
        symbol: &str,
        now: DateTime<Utc>,
        mark: Decimal,
    ) {
        if let Err(e) = signal.validate(strategy_id, symbol, now) {
            warn!(strategy = strategy_id, symbol, error = %e, "Dropping malformed signal");
            state.malformed_signals += 1;
            return;
        }

        let opposite = state
            .tracker
            .find(strategy_id, symbol)
            .filter(|p| p.side == signal.side.opposite())
            .map(|p| p.id);
        if let Some(id) = opposite {
            self.close_position(state, id, signal.price, now, CloseReason::Signal);
            return;
        }

        if let Err(reason) = self.open_position(state, &signal, now, mark) {
            debug!(
                strategy = strategy_id,
                symbol,
                side = %signal.side,
                reason = %reason,
                "Signal skipped"
            );
            state.skipped.push(SkippedSignal {
                timestamp: now,
                strategy_id: strategy_id.to_string(),
                symbol: symbol.to_string(),
                side: signal.side,
                reason,
            });
        }
    }

    fn open_position(
        &self,
        state: &mut RunState,
        signal: &Signal,
        now: DateTime<Utc>,
        mark: Decimal,
    ) -> Result<(), RejectReason> {
        self.limits.check_entry(signal, &state.tracker)?;

        let stats = state.tracker.stats(&signal.strategy_id);
        let budget = self.sizer.margin(&SizingContext {
            equity: state.tracker.equity(),
            stats: &stats,
        });

        let leverage = self.config.leverage;
        let cash = state.tracker.cash();
        let (budget, fee_inclusive) = self.fit_budget(budget, cash, leverage);

        let entry_price = self.fills.entry_price(signal.side, signal.price);
        let mut amount = if budget > Decimal::ZERO && entry_price > Decimal::ZERO {
            budget
                .checked_mul(leverage)
                .and_then(|exposure| exposure.checked_div(entry_price))
                .ok_or(RejectReason::SizeOutOfRange)?
        } else {
            Decimal::ZERO
        };
        if let Some(cap) = signal.amount {
            amount = amount.min(cap);
        }

        let notional = entry_price
            .checked_mul(amount)
            .ok_or(RejectReason::SizeOutOfRange)?;
        let margin = notional
            .checked_div(leverage)
            .ok_or(RejectReason::SizeOutOfRange)?;
        let mut entry_fee = self.fills.fee(notional);
        if fee_inclusive && margin < cash {
            // Rounding residue of the all-in size stays within free cash
            entry_fee = entry_fee.min(cash - margin);
        }
        self.limits.check_capital(margin, entry_fee, &state.tracker)?;

        let (stop_loss, take_profit) = self.fills.protective_levels(signal.side, entry_price);
        let mut position = Position {
            id: 0,
            symbol: signal.symbol.clone(),
            side: signal.side,
            entry_price,
            amount,
            margin,
            entry_fee,
            stop_loss,
            take_profit,
            entry_time: now,
            strategy_id: signal.strategy_id.clone(),
            mark_price: mark,
            unrealized_pnl: Decimal::ZERO,
        };
        position.unrealized_pnl = position.pnl_at(mark);

        let id = state.tracker.open(position);
        debug!(
            id,
            strategy = %signal.strategy_id,
            symbol = %signal.symbol,
            side = %signal.side,
            price = %entry_price,
            amount = %amount,
            "Opened position"
        );
        Ok(())
    }

    /// Trim a margin budget that free cash covers so the entry fee fits too
    ///
    /// A budget above free cash is returned unchanged and later reported as
    /// insufficient capital. The flag tells whether the budget was trimmed.
    fn fit_budget(&self, budget: Decimal, cash: Decimal, leverage: Decimal) -> (Decimal, bool) {
        if budget > cash {
            return (budget, false);
        }
        let cost_per_margin = Decimal::ONE + self.fills.fee_rate.saturating_mul(leverage);
        match cash.checked_div(cost_per_margin) {
            Some(all_in) if all_in < budget => (all_in, true),
            _ => (budget, false),
        }
    }

    /// Close at a reference price; exit slippage and fees apply
    fn close_position(
        &self,
        state: &mut RunState,
        id: PositionId,
        reference: Decimal,
        now: DateTime<Utc>,
        reason: CloseReason,
    ) {
        let Some(position) = state.tracker.positions().iter().find(|p| p.id == id) else {
            return;
        };
        let exit_price = self.fills.exit_price(position.side, reference);
        let exit_fee = self.fills.fee(exit_price.saturating_mul(position.amount));

        if let Some(trade) = state.tracker.close(id, exit_price, exit_fee, now, reason) {
            debug!(
                id,
                strategy = %trade.strategy_id,
                symbol = %trade.symbol,
                reason = ?reason,
                price = %exit_price,
                pnl = %trade.pnl,
                "Closed position"
            );
        }
    }

    /// Close everything at its last mark
    fn close_all(&self, state: &mut RunState, now: DateTime<Utc>) {
        let open: Vec<(PositionId, Decimal)> = state
            .tracker
            .positions()
            .iter()
            .map(|p| (p.id, p.mark_price))
            .collect();
        for (id, mark) in open {
            self.close_position(state, id, mark, now, CloseReason::EndOfData);
        }
    }

    fn finish(&self, state: RunState, cancelled: bool) -> BacktestResult {
        let equity_curve = state.curve.finish();
        let (trades, open_positions) = state.tracker.into_parts();
        let initial = self.config.initial_capital;
        let rate = self.config.risk_free_rate;

        let overall_metrics = calculate_metrics_with_rate(&trades, &equity_curve, initial, rate);

        let mut metrics_by_strategy = BTreeMap::new();
        for strategy in &self.strategies {
            let own: Vec<_> = trades
                .iter()
                .filter(|t| t.strategy_id == strategy.id())
                .cloned()
                .collect();
            let curve = realized_equity_curve(&own, equity_curve.iter().map(|p| p.timestamp), initial);
            metrics_by_strategy.insert(
                strategy.id().to_string(),
                calculate_metrics_with_rate(&own, &curve, initial, rate),
            );
        }

        BacktestResult {
            trades,
            equity_curve,
            skipped_signals: state.skipped,
            open_positions,
            metrics_by_strategy,
            overall_metrics,
            strategy_errors: state.strategy_errors,
            malformed_signals: state.malformed_signals,
            cancelled,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
