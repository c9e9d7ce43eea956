//! Backtest analytics and reporting
//!
//! [`calculate_metrics`] is pure: identical inputs always give identical
//! output, and degenerate inputs resolve to documented sentinels instead of
//! NaN. Ratios use `f64` so that `Infinity` can be represented.

use crate::risk::{Position, RejectReason, Trade};
use crate::signal::Side;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::BTreeMap;

/// Trading periods per year used to annualize per-step returns
pub const PERIODS_PER_YEAR: f64 = 252.0;

/// One point of the equity curve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    /// Cash + committed margin + unrealized P&L
    pub equity: Decimal,
    /// Running peak minus equity
    pub drawdown: Decimal,
    /// Drawdown relative to the running peak, in percent
    pub drawdown_pct: Decimal,
    /// Open positions after the step
    pub open_positions: usize,
}

/// Builds equity points with a running peak
#[derive(Debug, Clone)]
pub struct EquityCurveBuilder {
    peak: Decimal,
    points: Vec<EquityPoint>,
}

impl EquityCurveBuilder {
    /// The peak starts at the initial capital
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            peak: initial_capital,
            points: vec![],
        }
    }

    pub fn push(&mut self, timestamp: DateTime<Utc>, equity: Decimal, open_positions: usize) {
        self.peak = self.peak.max(equity);
        let drawdown = self.peak.saturating_sub(equity);
        let drawdown_pct = if self.peak > Decimal::ZERO {
            percent_of(drawdown, self.peak)
        } else {
            dec!(0)
        };
        self.points.push(EquityPoint {
            timestamp,
            equity,
            drawdown,
            drawdown_pct,
            open_positions,
        });
    }

    pub fn finish(self) -> Vec<EquityPoint> {
        self.points
    }
}

/// An entry signal refused by the risk filters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSignal {
    pub timestamp: DateTime<Utc>,
    pub strategy_id: String,
    pub symbol: String,
    pub side: Side,
    pub reason: RejectReason,
}

/// Performance statistics derived from a trade ledger and equity curve
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Winning trades / total trades, as a fraction
    pub win_rate: f64,
    /// Sum of net P&L
    pub total_pnl: f64,
    /// Sum of winning P&L
    pub gross_profit: f64,
    /// Sum of losing P&L magnitudes
    pub gross_loss: f64,
    pub total_fees: f64,
    /// Gross profit / gross loss; Infinity without losses, 0 without wins
    pub profit_factor: f64,
    pub avg_win: f64,
    /// Magnitude of the average losing trade
    pub avg_loss: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_trade_pnl: f64,
    pub expectancy: f64,
    pub expectancy_pct: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub avg_holding_secs: f64,
    pub final_equity: f64,
    /// Percent
    pub total_return_pct: f64,
    pub max_drawdown: f64,
    /// Percent
    pub max_drawdown_pct: f64,
    pub max_drawdown_duration_days: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub annualized_volatility: f64,
}

/// Complete backtest results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    /// Closed trades in closing order
    pub trades: Vec<Trade>,
    /// One point per simulated step
    pub equity_curve: Vec<EquityPoint>,
    /// Entry signals refused by the risk filters
    pub skipped_signals: Vec<SkippedSignal>,
    /// Positions still open (cancelled runs or `close_at_end = false`)
    pub open_positions: Vec<Position>,
    pub metrics_by_strategy: BTreeMap<String, PerformanceMetrics>,
    pub overall_metrics: PerformanceMetrics,
    /// Strategy failures caught during the run
    pub strategy_errors: usize,
    /// Signals dropped as malformed
    pub malformed_signals: usize,
    /// Whether the run stopped early on cancellation
    pub cancelled: bool,
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// `part / whole * 100`, saturating when the quotient leaves Decimal range
fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    match part.checked_div(whole).and_then(|q| q.checked_mul(dec!(100))) {
        Some(pct) => pct,
        None if part.is_sign_negative() == whole.is_sign_negative() => Decimal::MAX,
        None => Decimal::MIN,
    }
}

/// Relative change from `from` to `to`, leaving Decimal for f64 on overflow
fn relative_change(from: Decimal, to: Decimal) -> f64 {
    to.checked_sub(from)
        .and_then(|change| change.checked_div(from))
        .map(to_f64)
        .unwrap_or_else(|| clean(to_f64(to) / to_f64(from) - 1.0))
}

fn clean(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; 0 with fewer than two samples
pub fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    clean(variance.sqrt())
}

/// Ratio with a sentinel for a zero denominator
fn ratio_or_sentinel(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        clean(numerator / denominator)
    } else if numerator > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Calculate performance metrics with a zero risk-free rate
pub fn calculate_metrics(
    trades: &[Trade],
    equity_curve: &[EquityPoint],
    initial_capital: Decimal,
) -> PerformanceMetrics {
    calculate_metrics_with_rate(trades, equity_curve, initial_capital, 0.0)
}

/// Calculate performance metrics; `risk_free_rate` is annual
pub fn calculate_metrics_with_rate(
    trades: &[Trade],
    equity_curve: &[EquityPoint],
    initial_capital: Decimal,
    risk_free_rate: f64,
) -> PerformanceMetrics {
    let mut metrics = PerformanceMetrics::default();
    trade_metrics(&mut metrics, trades);
    drawdown_metrics(&mut metrics, equity_curve, initial_capital);
    return_metrics(
        &mut metrics,
        trades,
        equity_curve,
        initial_capital,
        risk_free_rate,
    );
    metrics
}

fn trade_metrics(m: &mut PerformanceMetrics, trades: &[Trade]) {
    m.total_trades = trades.len();
    if trades.is_empty() {
        return;
    }

    let mut gross_profit = Decimal::ZERO;
    let mut gross_loss = Decimal::ZERO;
    let mut total_fees = Decimal::ZERO;
    let mut win_pct_sum = Decimal::ZERO;
    let mut loss_pct_sum = Decimal::ZERO;
    let mut largest_win = Decimal::ZERO;
    let mut largest_loss = Decimal::ZERO;
    let mut holding_secs = 0i64;

    let mut win_streak = 0usize;
    let mut loss_streak = 0usize;

    for trade in trades {
        total_fees += trade.fees;
        holding_secs += (trade.exit_time - trade.entry_time).num_seconds().max(0);

        if trade.pnl > Decimal::ZERO {
            m.winning_trades += 1;
            gross_profit += trade.pnl;
            win_pct_sum += trade.pnl_pct;
            largest_win = largest_win.max(trade.pnl);
            win_streak += 1;
            loss_streak = 0;
        } else if trade.pnl < Decimal::ZERO {
            m.losing_trades += 1;
            gross_loss -= trade.pnl;
            loss_pct_sum -= trade.pnl_pct;
            largest_loss = largest_loss.max(-trade.pnl);
            loss_streak += 1;
            win_streak = 0;
        } else {
            win_streak = 0;
            loss_streak = 0;
        }
        m.max_consecutive_wins = m.max_consecutive_wins.max(win_streak);
        m.max_consecutive_losses = m.max_consecutive_losses.max(loss_streak);
    }

    let total = trades.len() as f64;
    m.win_rate = m.winning_trades as f64 / total;
    m.gross_profit = to_f64(gross_profit);
    m.gross_loss = to_f64(gross_loss);
    m.total_pnl = to_f64(gross_profit - gross_loss);
    m.total_fees = to_f64(total_fees);
    m.largest_win = to_f64(largest_win);
    m.largest_loss = to_f64(largest_loss);
    m.avg_trade_pnl = m.total_pnl / total;
    m.avg_holding_secs = holding_secs as f64 / total;

    m.profit_factor = if m.winning_trades == 0 {
        0.0
    } else if gross_loss.is_zero() {
        f64::INFINITY
    } else {
        clean(m.gross_profit / m.gross_loss)
    };

    if m.winning_trades > 0 {
        let wins = m.winning_trades as f64;
        m.avg_win = m.gross_profit / wins;
        m.avg_win_pct = to_f64(win_pct_sum) / wins;
    }
    if m.losing_trades > 0 {
        let losses = m.losing_trades as f64;
        m.avg_loss = m.gross_loss / losses;
        m.avg_loss_pct = to_f64(loss_pct_sum) / losses;
    }

    m.expectancy = m.win_rate * m.avg_win - (1.0 - m.win_rate) * m.avg_loss;
    m.expectancy_pct = m.win_rate * m.avg_win_pct - (1.0 - m.win_rate) * m.avg_loss_pct;
}

fn drawdown_metrics(m: &mut PerformanceMetrics, curve: &[EquityPoint], initial_capital: Decimal) {
    let Some(first) = curve.first() else {
        return;
    };

    let mut peak = initial_capital;
    let mut peak_time = first.timestamp;
    let mut underwater = false;
    let mut max_drawdown = Decimal::ZERO;
    let mut max_drawdown_pct = Decimal::ZERO;
    let mut longest = chrono::Duration::zero();

    for point in curve {
        if point.equity >= peak {
            if underwater {
                longest = longest.max(point.timestamp - peak_time);
                underwater = false;
            }
            peak = point.equity;
            peak_time = point.timestamp;
            continue;
        }

        underwater = true;
        let drawdown = peak.saturating_sub(point.equity);
        max_drawdown = max_drawdown.max(drawdown);
        if peak > Decimal::ZERO {
            max_drawdown_pct = max_drawdown_pct.max(percent_of(drawdown, peak));
        }
    }

    if underwater {
        if let Some(last) = curve.last() {
            longest = longest.max(last.timestamp - peak_time);
        }
    }

    m.max_drawdown = to_f64(max_drawdown);
    m.max_drawdown_pct = to_f64(max_drawdown_pct);
    m.max_drawdown_duration_days = longest.num_milliseconds() as f64 / 86_400_000.0;
}

/// Per-step returns, the first measured from the initial capital
pub fn period_returns(curve: &[EquityPoint], initial_capital: Decimal) -> Vec<f64> {
    let mut returns = Vec::with_capacity(curve.len());
    let mut previous = initial_capital;
    for point in curve {
        if previous > Decimal::ZERO {
            returns.push(relative_change(previous, point.equity));
        }
        previous = point.equity;
    }
    returns
}

fn return_metrics(
    m: &mut PerformanceMetrics,
    trades: &[Trade],
    curve: &[EquityPoint],
    initial_capital: Decimal,
    risk_free_rate: f64,
) {
    let final_equity = match curve.last() {
        Some(point) => point.equity,
        None => trades
            .iter()
            .fold(initial_capital, |equity, t| equity.saturating_add(t.pnl)),
    };
    m.final_equity = to_f64(final_equity);
    if initial_capital > Decimal::ZERO {
        m.total_return_pct = to_f64(percent_of(
            final_equity.saturating_sub(initial_capital),
            initial_capital,
        ));
    }

    let returns = period_returns(curve, initial_capital);
    let daily_rf = risk_free_rate / PERIODS_PER_YEAR;
    let annualizer = PERIODS_PER_YEAR.sqrt();

    let volatility = stddev(&returns);
    m.annualized_volatility = volatility * annualizer;

    if !returns.is_empty() {
        let excess = mean(&returns) - daily_rf;

        m.sharpe_ratio = if volatility > 0.0 {
            clean(excess / volatility * annualizer)
        } else {
            0.0
        };

        // Infinity is reserved for curves that never lost; a loss whose
        // deviation cannot be measured reports 0
        let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        let downside_dev = stddev(&downside);
        m.sortino_ratio = if downside_dev > 0.0 {
            clean(excess / downside_dev * annualizer)
        } else if downside.is_empty() && excess > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
    }

    m.calmar_ratio = ratio_or_sentinel(m.total_return_pct, m.max_drawdown_pct);
}

/// Realized-P&L equity curve for a subset of trades
///
/// At each timestamp equity is the initial capital plus the P&L of trades
/// that exited at or before it. `trades` must be in exit order.
pub fn realized_equity_curve(
    trades: &[Trade],
    timestamps: impl IntoIterator<Item = DateTime<Utc>>,
    initial_capital: Decimal,
) -> Vec<EquityPoint> {
    let mut builder = EquityCurveBuilder::new(initial_capital);
    let mut realized = Decimal::ZERO;
    let mut next = 0;

    for timestamp in timestamps {
        while let Some(trade) = trades.get(next) {
            if trade.exit_time > timestamp {
                break;
            }
            realized += trade.pnl;
            next += 1;
        }
        builder.push(timestamp, initial_capital + realized, 0);
    }
    builder.finish()
}

fn fmt_ratio(value: f64) -> String {
    if value.is_infinite() {
        "∞".to_string()
    } else {
        format!("{:.2}", value)
    }
}

impl PerformanceMetrics {
    /// Format as table for CLI output
    pub fn format_table(&self) -> String {
        format!(
            r#"
══════════════════════════════════════════════════════
               BACKTEST RESULTS
══════════════════════════════════════════════════════

PERFORMANCE
───────────────────────────────────────────────────────
Final Equity:     {:.2}
Net P&L:          {:+.2} ({:+.2}%)
Sharpe Ratio:     {}
Sortino Ratio:    {}
Calmar Ratio:     {}
Max Drawdown:     {:.2} ({:.2}%)
DD Duration:      {:.1} days
Volatility:       {:.2}%

TRADES
───────────────────────────────────────────────────────
Total Trades:     {} ({} won / {} lost)
Win Rate:         {:.1}%
Profit Factor:    {}
Avg Win / Loss:   {:.2} / {:.2}
Expectancy:       {:+.2} ({:+.2}%)
Max Streak:       {} wins / {} losses
Avg Duration:     {:.0}s
Fees Paid:        {:.2}
══════════════════════════════════════════════════════
"#,
            self.final_equity,
            self.total_pnl,
            self.total_return_pct,
            fmt_ratio(self.sharpe_ratio),
            fmt_ratio(self.sortino_ratio),
            fmt_ratio(self.calmar_ratio),
            self.max_drawdown,
            self.max_drawdown_pct,
            self.max_drawdown_duration_days,
            self.annualized_volatility * 100.0,
            self.total_trades,
            self.winning_trades,
            self.losing_trades,
            self.win_rate * 100.0,
            fmt_ratio(self.profit_factor),
            self.avg_win,
            self.avg_loss,
            self.expectancy,
            self.expectancy_pct,
            self.max_consecutive_wins,
            self.max_consecutive_losses,
            self.avg_holding_secs,
            self.total_fees,
        )
    }
}
