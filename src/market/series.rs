//! Forward-filled scalar series (spot, volatility index, rates).
//!
//! Input series are sparse; the simulation reads them at calendar stamps
//! with last-value-carried-forward semantics, the reindex-and-ffill step of
//! the data pipeline.

use chrono::NaiveDateTime;

/// A sparse time series read with last-value-carried-forward semantics.
#[derive(Debug, Clone, Default)]
pub struct ForwardFilled {
    points: Vec<(NaiveDateTime, f64)>,
}

impl ForwardFilled {
    /// Build from unordered points; on duplicate timestamps the last value
    /// wins.
    pub fn new(mut points: Vec<(NaiveDateTime, f64)>) -> Self {
        points.sort_by_key(|(ts, _)| *ts);
        points.reverse();
        points.dedup_by_key(|(ts, _)| *ts);
        points.reverse();
        Self { points }
    }

    /// A constant series, defined for every timestamp.
    pub fn flat(value: f64) -> Self {
        Self {
            points: vec![(NaiveDateTime::MIN, value)],
        }
    }

    /// Last value at-or-before `ts`, if the series has started by then.
    pub fn at(&self, ts: NaiveDateTime) -> Option<f64> {
        let idx = self.points.partition_point(|(t, _)| *t <= ts);
        idx.checked_sub(1).map(|i| self.points[i].1)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
