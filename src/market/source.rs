//! Snapshot sources and the single-slot monthly cache.
//!
//! Chain data arrives in monthly files. The simulation walks the calendar
//! strictly forward, so at most one month needs to be resident at a time:
//! [`SnapshotCache`] holds exactly one [`MonthlyChain`] and reloads only
//! when the derived file identity of the requested date changes.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use super::types::{MarketSnapshot, MonthlyChain};

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("no market snapshot available for {0}")]
    MissingSnapshot(NaiveDate),

    #[error("snapshot source failure: {0}")]
    Source(String),
}

/// Derived identity of the monthly chain file covering a date.
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}{:02}", date.year(), date.month())
}

/// Provider of monthly chain data.
pub trait SnapshotSource {
    /// File identity for the month containing `date`; a change invalidates
    /// the cache slot.
    fn month_key(&self, date: NaiveDate) -> String {
        month_key(date)
    }

    /// Load the full month of snapshots containing `date`.
    fn load_month(&mut self, date: NaiveDate) -> Result<MonthlyChain, MarketDataError>;
}

/// Single-slot cache over a snapshot source.
pub struct SnapshotCache<S: SnapshotSource> {
    source: S,
    slot: Option<MonthlyChain>,
}

impl<S: SnapshotSource> SnapshotCache<S> {
    pub fn new(source: S) -> Self {
        Self { source, slot: None }
    }

    /// The snapshot for `date`, reloading the monthly chain only when the
    /// date's file identity differs from the resident one.
    pub fn snapshot(&mut self, date: NaiveDate) -> Result<&MarketSnapshot, MarketDataError> {
        let key = self.source.month_key(date);
        let stale = self.slot.as_ref().map_or(true, |chain| chain.key != key);
        if stale {
            self.slot = Some(self.source.load_month(date)?);
        }
        let chain = self
            .slot
            .as_ref()
            .ok_or_else(|| MarketDataError::Source("empty cache slot".to_string()))?;
        chain
            .days
            .get(&date)
            .ok_or(MarketDataError::MissingSnapshot(date))
    }
}

/// In-memory source for tests and programmatic runs.
#[derive(Debug, Default)]
pub struct InMemorySource {
    days: BTreeMap<NaiveDate, MarketSnapshot>,
    /// Number of month loads served, for cache verification.
    pub loads: usize,
}

impl InMemorySource {
    pub fn new(snapshots: Vec<MarketSnapshot>) -> Self {
        Self {
            days: snapshots.into_iter().map(|s| (s.date, s)).collect(),
            loads: 0,
        }
    }
}

impl SnapshotSource for InMemorySource {
    fn load_month(&mut self, date: NaiveDate) -> Result<MonthlyChain, MarketDataError> {
        self.loads += 1;
        let key = month_key(date);
        let days = self
            .days
            .iter()
            .filter(|(d, _)| d.year() == date.year() && d.month() == date.month())
            .map(|(d, s)| (*d, s.clone()))
            .collect();
        Ok(MonthlyChain { key, days })
    }
}
