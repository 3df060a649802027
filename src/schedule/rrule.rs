//! Recurrence rules for roll, maturity and unwind schedules.
//!
//! A [`RecurrenceRule`] is a pure value describing a frequency / weekday /
//! month / set-position pattern. It produces ordered, bounded date sequences
//! used to build roll calendars and to look up a position's target maturity
//! and unwind date by offset.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Upper bound on the forward scan in [`RecurrenceRule::nth`], in days.
/// A rule that never matches within this window yields `None`.
const MAX_SCAN_DAYS: i64 = 30 * 366;

/// Base frequency of a recurrence pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Monthly,
}

/// A frequency / weekday / month / set-position recurrence pattern.
///
/// `Daily` rules match every date passing the weekday and month filters.
/// `Monthly` rules collect, per calendar month passing the month filter, the
/// days matching the weekday filter and keep the `set_position`-th of them
/// (1-indexed); without `set_position` every matching day is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    #[serde(default)]
    pub weekdays: Option<Vec<Weekday>>,
    /// Month filter, 1..=12.
    #[serde(default)]
    pub months: Option<Vec<u32>>,
    /// Nth occurrence within the month, 1-indexed.
    #[serde(default)]
    pub set_position: Option<u32>,
}

impl RecurrenceRule {
    /// Every Monday through Friday.
    pub fn every_weekday() -> Self {
        Self {
            frequency: Frequency::Daily,
            weekdays: Some(vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ]),
            months: None,
            set_position: None,
        }
    }

    /// Mondays, Wednesdays and Fridays.
    pub fn mon_wed_fri() -> Self {
        Self {
            frequency: Frequency::Daily,
            weekdays: Some(vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]),
            months: None,
            set_position: None,
        }
    }

    /// Every Friday.
    pub fn fridays() -> Self {
        Self {
            frequency: Frequency::Daily,
            weekdays: Some(vec![Weekday::Fri]),
            months: None,
            set_position: None,
        }
    }

    /// Third Friday of every month.
    pub fn third_friday_monthly() -> Self {
        Self {
            frequency: Frequency::Monthly,
            weekdays: Some(vec![Weekday::Fri]),
            months: None,
            set_position: Some(3),
        }
    }

    /// Third Friday of March, June, September and December.
    pub fn third_friday_quarterly() -> Self {
        Self {
            frequency: Frequency::Monthly,
            weekdays: Some(vec![Weekday::Fri]),
            months: Some(vec![3, 6, 9, 12]),
            set_position: Some(3),
        }
    }

    fn passes_filters(&self, date: NaiveDate) -> bool {
        if let Some(ref weekdays) = self.weekdays {
            if !weekdays.contains(&date.weekday()) {
                return false;
            }
        }
        if let Some(ref months) = self.months {
            if !months.contains(&date.month()) {
                return false;
            }
        }
        true
    }

    /// Matching days within one calendar month, honoring `set_position`.
    fn month_occurrences(&self, year: i32, month: u32) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let mut date = match NaiveDate::from_ymd_opt(year, month, 1) {
            Some(d) => d,
            None => return days,
        };
        while date.month() == month {
            if self.passes_filters(date) {
                days.push(date);
            }
            date += Duration::days(1);
        }
        match self.set_position {
            Some(pos) => days
                .into_iter()
                .nth(pos.saturating_sub(1) as usize)
                .into_iter()
                .collect(),
            None => days,
        }
    }

    /// Ordered dates matching the rule within `[start, end]`, both inclusive.
    pub fn generate(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        if start > end {
            return Vec::new();
        }
        match self.frequency {
            Frequency::Daily => {
                let mut dates = Vec::new();
                let mut date = start;
                while date <= end {
                    if self.passes_filters(date) {
                        dates.push(date);
                    }
                    date += Duration::days(1);
                }
                dates
            }
            Frequency::Monthly => {
                let mut dates = Vec::new();
                let (mut year, mut month) = (start.year(), start.month());
                while NaiveDate::from_ymd_opt(year, month, 1).is_some_and(|d| d <= end) {
                    for day in self.month_occurrences(year, month) {
                        if day >= start && day <= end {
                            dates.push(day);
                        }
                    }
                    month += 1;
                    if month > 12 {
                        month = 1;
                        year += 1;
                    }
                }
                dates
            }
        }
    }

    /// The `count`-th date (0-indexed) on/after `start` matching the rule.
    ///
    /// `count = 0` is the first matching date on/after `start`, inclusive.
    /// This is the offset convention used for maturity and unwind lookups.
    pub fn nth(&self, start: NaiveDate, count: usize) -> Option<NaiveDate> {
        let end = start + Duration::days(MAX_SCAN_DAYS);
        self.generate(start, end).into_iter().nth(count)
    }

    /// The subset of a trading-day index matching the rule, in order.
    ///
    /// A date matching the rule but absent from the index (a holiday) is
    /// dropped, so roll calendars only ever contain actual sessions.
    pub fn filter(&self, days: &[NaiveDate]) -> Vec<NaiveDate> {
        let (start, end) = match (days.iter().min(), days.iter().max()) {
            (Some(&lo), Some(&hi)) => (lo, hi),
            _ => return Vec::new(),
        };
        let matches: std::collections::BTreeSet<NaiveDate> =
            self.generate(start, end).into_iter().collect();
        days.iter().copied().filter(|d| matches.contains(d)).collect()
    }
}
