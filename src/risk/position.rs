//! Position tracking

use super::TradeStats;
use crate::signal::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Position identifier, sequential within a run
pub type PositionId = u64;

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseReason {
    /// Opposite signal from the owning strategy
    Signal,
    /// Stop-loss level touched
    StopLoss,
    /// Take-profit level touched
    TakeProfit,
    /// Closed on the final step
    EndOfData,
}

/// An open position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Position identifier
    pub id: PositionId,
    /// Instrument symbol
    pub symbol: String,
    /// Long (buy) or short (sell)
    pub side: Side,
    /// Entry fill price, slippage included
    pub entry_price: Decimal,
    /// Position size in base units
    pub amount: Decimal,
    /// Capital committed; notional / leverage
    pub margin: Decimal,
    /// Fee paid on entry
    pub entry_fee: Decimal,
    /// Stop-loss level
    pub stop_loss: Option<Decimal>,
    /// Take-profit level
    pub take_profit: Option<Decimal>,
    /// Entry timestamp
    pub entry_time: DateTime<Utc>,
    /// Owning strategy
    pub strategy_id: String,
    /// Last mark price
    pub mark_price: Decimal,
    /// Current unrealized P&L at the mark price
    pub unrealized_pnl: Decimal,
}

impl Position {
    /// Gross P&L if closed at `price`, before exit costs
    ///
    /// Saturates at the Decimal bounds instead of overflowing.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        price
            .saturating_sub(self.entry_price)
            .saturating_mul(self.amount)
            .saturating_mul(self.side.sign())
    }
}

/// A closed position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Id of the position this trade closed
    pub id: PositionId,
    pub symbol: String,
    pub side: Side,
    pub amount: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    /// Realized P&L net of entry and exit fees
    pub pnl: Decimal,
    /// Realized P&L relative to committed margin, in percent
    pub pnl_pct: Decimal,
    /// Entry plus exit fees
    pub fees: Decimal,
    pub strategy_id: String,
    pub close_reason: CloseReason,
}

/// Tracks cash, open positions and the closed-trade ledger
#[derive(Debug, Clone)]
pub struct PositionTracker {
    /// Free cash, excluding committed margin
    cash: Decimal,
    /// Open positions in opening order
    open_positions: Vec<Position>,
    /// Closed position history
    closed_positions: Vec<Trade>,
    /// Closed-trade statistics by strategy
    stats: BTreeMap<String, TradeStats>,
    next_id: PositionId,
}

impl PositionTracker {
    /// Create a new position tracker
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            cash: initial_cash,
            open_positions: vec![],
            closed_positions: vec![],
            stats: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Open a position, committing its margin and entry fee from cash
    ///
    /// The position's `id` is assigned here.
    pub fn open(&mut self, mut position: Position) -> PositionId {
        position.id = self.next_id;
        self.next_id += 1;

        self.cash -= position.margin + position.entry_fee;
        let id = position.id;
        self.open_positions.push(position);
        id
    }

    /// Close a position at an exit fill price
    pub fn close(
        &mut self,
        position_id: PositionId,
        exit_price: Decimal,
        exit_fee: Decimal,
        exit_time: DateTime<Utc>,
        reason: CloseReason,
    ) -> Option<Trade> {
        let index = self
            .open_positions
            .iter()
            .position(|p| p.id == position_id)?;
        let position = self.open_positions.remove(index);

        let gross = position.pnl_at(exit_price);
        let fees = position.entry_fee.saturating_add(exit_fee);
        let pnl = gross.saturating_sub(fees);
        let pnl_pct = if position.margin.is_zero() {
            dec!(0)
        } else {
            pnl.checked_div(position.margin)
                .and_then(|r| r.checked_mul(dec!(100)))
                .unwrap_or(if pnl.is_sign_negative() { Decimal::MIN } else { Decimal::MAX })
        };

        self.cash = self
            .cash
            .saturating_add(position.margin)
            .saturating_add(gross)
            .saturating_sub(exit_fee);

        let trade = Trade {
            id: position.id,
            symbol: position.symbol,
            side: position.side,
            amount: position.amount,
            entry_price: position.entry_price,
            exit_price,
            entry_time: position.entry_time,
            exit_time,
            pnl,
            pnl_pct,
            fees,
            strategy_id: position.strategy_id,
            close_reason: reason,
        };

        self.stats
            .entry(trade.strategy_id.clone())
            .or_default()
            .record(trade.pnl);
        self.closed_positions.push(trade.clone());
        Some(trade)
    }

    /// Update mark-to-market for open positions on a symbol
    pub fn update_mark(&mut self, symbol: &str, price: Decimal) {
        for position in self.open_positions.iter_mut() {
            if position.symbol == symbol {
                position.mark_price = price;
                position.unrealized_pnl = position.pnl_at(price);
            }
        }
    }

    /// Cash + committed margin + unrealized P&L
    pub fn equity(&self) -> Decimal {
        self.open_positions.iter().fold(self.cash, |equity, p| {
            equity.saturating_add(p.margin).saturating_add(p.unrealized_pnl)
        })
    }

    /// Free cash
    pub fn cash(&self) -> Decimal {
        self.cash
    }

    /// Get number of open positions
    pub fn open_count(&self) -> usize {
        self.open_positions.len()
    }

    /// Open positions in opening order
    pub fn positions(&self) -> &[Position] {
        &self.open_positions
    }

    /// Position a strategy holds on a symbol, if any
    pub fn find(&self, strategy_id: &str, symbol: &str) -> Option<&Position> {
        self.open_positions
            .iter()
            .find(|p| p.strategy_id == strategy_id && p.symbol == symbol)
    }

    /// Closed trades in closing order
    pub fn trades(&self) -> &[Trade] {
        &self.closed_positions
    }

    /// Closed-trade statistics for a strategy
    pub fn stats(&self, strategy_id: &str) -> TradeStats {
        self.stats.get(strategy_id).cloned().unwrap_or_default()
    }

    /// Consume the tracker into its ledger and remaining open positions
    pub fn into_parts(self) -> (Vec<Trade>, Vec<Position>) {
        (self.closed_positions, self.open_positions)
    }
}
