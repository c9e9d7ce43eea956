//! Kelly criterion position sizing

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Running win/loss statistics for one strategy's closed trades
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeStats {
    /// Closed trades
    pub trades: usize,
    /// Trades with positive pnl
    pub wins: usize,
    /// Trades with negative pnl
    pub losses: usize,
    /// Sum of winning pnl
    pub total_win: Decimal,
    /// Sum of losing pnl magnitudes
    pub total_loss: Decimal,
}

impl TradeStats {
    /// Fold one closed trade's pnl into the statistics
    pub fn record(&mut self, pnl: Decimal) {
        self.trades += 1;
        if pnl > Decimal::ZERO {
            self.wins += 1;
            self.total_win += pnl;
        } else if pnl < Decimal::ZERO {
            self.losses += 1;
            self.total_loss -= pnl;
        }
    }

    pub fn win_rate(&self) -> Decimal {
        if self.trades == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.wins) / Decimal::from(self.trades)
    }

    pub fn avg_win(&self) -> Decimal {
        if self.wins == 0 {
            return Decimal::ZERO;
        }
        self.total_win / Decimal::from(self.wins)
    }

    pub fn avg_loss(&self) -> Decimal {
        if self.losses == 0 {
            return Decimal::ZERO;
        }
        self.total_loss / Decimal::from(self.losses)
    }
}

/// Fractional Kelly calculator over a strategy's trailing trades
pub struct KellyCalculator {
    /// Kelly fraction (e.g., 0.25 for quarter Kelly)
    pub fraction: Decimal,
    /// Maximum bet as a fraction of equity
    pub max_bet_pct: Decimal,
    /// Trades required before the estimate is used
    pub min_trades: usize,
}

impl KellyCalculator {
    /// Create a new Kelly calculator
    pub fn new(fraction: Decimal, max_bet_pct: Decimal, min_trades: usize) -> Self {
        Self {
            fraction,
            max_bet_pct,
            min_trades,
        }
    }

    /// Raw Kelly fraction: f* = W - (1 - W) / R, with R = avg win / avg loss
    ///
    /// With no losing trades R is unbounded and f* reduces to W.
    pub fn raw_fraction(stats: &TradeStats) -> Decimal {
        let win_rate = stats.win_rate();
        let avg_loss = stats.avg_loss();
        if avg_loss.is_zero() {
            return win_rate;
        }
        let payoff = stats.avg_win() / avg_loss;
        if payoff.is_zero() {
            return -Decimal::ONE;
        }
        win_rate - (Decimal::ONE - win_rate) / payoff
    }

    /// Fraction of equity to commit, clamped to [0, max_bet_pct]
    ///
    /// Sparse history falls back to a damped share of the cap.
    pub fn bet_fraction(&self, stats: &TradeStats) -> Decimal {
        if stats.trades < self.min_trades {
            return self.max_bet_pct * self.fraction;
        }
        let adjusted = Self::raw_fraction(stats) * self.fraction;
        adjusted.min(self.max_bet_pct).max(dec!(0))
    }

    /// Capital to commit for the given equity
    pub fn calculate(&self, stats: &TradeStats, equity: Decimal) -> Decimal {
        if equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.bet_fraction(stats) * equity
    }
}

impl Default for KellyCalculator {
    fn default() -> Self {
        Self::new(dec!(0.25), dec!(0.10), 5)
    }
}
