//! Technical indicators over close prices

use rust_decimal::Decimal;

/// Simple moving average of the last `period` values
pub fn sma(values: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || values.len() < period {
        return None;
    }
    let sum: Decimal = values[values.len() - period..].iter().sum();
    Some(sum / Decimal::from(period))
}

/// Relative strength index over the last `period` changes
///
/// Uses simple averages of gains and losses. Returns 100 when there were
/// no losing changes and 50 on a completely flat window.
pub fn rsi(values: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }

    let tail = &values[values.len() - period - 1..];
    let mut gains = Decimal::ZERO;
    let mut losses = Decimal::ZERO;
    for pair in tail.windows(2) {
        let change = pair[1] - pair[0];
        if change > Decimal::ZERO {
            gains += change;
        } else {
            losses -= change;
        }
    }

    if losses.is_zero() {
        return Some(if gains.is_zero() {
            Decimal::from(50)
        } else {
            Decimal::ONE_HUNDRED
        });
    }

    let rs = gains / losses;
    Some(Decimal::ONE_HUNDRED - Decimal::ONE_HUNDRED / (Decimal::ONE + rs))
}
