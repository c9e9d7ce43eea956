//! Chronological replay over one or more candle series

use crate::data::{Candle, DataError, HistoricalData};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// One candle of one series at a replay step
#[derive(Debug, Clone, Copy)]
pub struct StepBar<'a> {
    /// Position of the series in the input slice
    pub series: usize,
    /// Index of the candle within its series
    pub index: usize,
    pub candle: &'a Candle,
}

/// All candles sharing one timestamp
#[derive(Debug, Clone)]
pub struct ReplayStep<'a> {
    pub timestamp: DateTime<Utc>,
    /// Bars in input-series order
    pub bars: Vec<StepBar<'a>>,
}

impl ReplayStep<'_> {
    /// A step is active once one of its symbols has `lookback` earlier candles
    pub fn is_active(&self, lookback: usize) -> bool {
        self.bars.iter().any(|bar| bar.index >= lookback)
    }
}

/// Merges multiple series and yields steps in timestamp order
///
/// Series may have different lengths and gaps; a step only carries the
/// series that have a candle at that timestamp.
#[derive(Debug, Clone)]
pub struct EventStream<'a> {
    series: &'a [HistoricalData],
    cursors: Vec<usize>,
}

impl<'a> EventStream<'a> {
    /// Create a stream after checking the inputs can support `lookback`
    ///
    /// Every series needs more than `lookback` candles so that at least one
    /// step is simulated for it.
    pub fn new(series: &'a [HistoricalData], lookback: usize) -> Result<Self, DataError> {
        if series.is_empty() {
            return Err(DataError::NoData);
        }
        if lookback == 0 {
            return Err(DataError::InvalidLookback);
        }

        let mut symbols = BTreeSet::new();
        for data in series {
            if !symbols.insert(data.symbol()) {
                return Err(DataError::DuplicateSymbol(data.symbol().to_string()));
            }
            if data.is_empty() {
                return Err(DataError::EmptySeries(data.symbol().to_string()));
            }
            if data.len() <= lookback {
                return Err(DataError::InsufficientHistory {
                    symbol: data.symbol().to_string(),
                    len: data.len(),
                    lookback,
                });
            }
        }

        Ok(Self {
            series,
            cursors: vec![0; series.len()],
        })
    }

    /// Number of remaining steps that will be simulated
    pub fn active_steps(&self, lookback: usize) -> usize {
        self.clone().filter(|step| step.is_active(lookback)).count()
    }

    /// Get next step in timestamp order
    fn next_step(&mut self) -> Option<ReplayStep<'a>> {
        let timestamp = self
            .series
            .iter()
            .zip(&self.cursors)
            .filter_map(|(data, &cursor)| data.candles().get(cursor))
            .map(|c| c.timestamp)
            .min()?;

        let mut bars = Vec::new();
        for (series, data) in self.series.iter().enumerate() {
            let index = self.cursors[series];
            if let Some(candle) = data.candles().get(index) {
                if candle.timestamp == timestamp {
                    bars.push(StepBar {
                        series,
                        index,
                        candle,
                    });
                    self.cursors[series] += 1;
                }
            }
        }

        Some(ReplayStep { timestamp, bars })
    }
}

impl<'a> Iterator for EventStream<'a> {
    type Item = ReplayStep<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_step()
    }
}
