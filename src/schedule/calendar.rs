//! Simulation calendar construction.
//!
//! Every per-date container in the engine is keyed by this calendar: an
//! ordered sequence of [`SessionStamp`]s, one per observation time per
//! session day. The valuation mode (close vs intraday) is carried on the
//! stamp itself rather than inferred from clock equality, so a hedge time
//! that happens to equal the close cannot be misclassified.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// Valuation mode of a calendar stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    /// Intraday hedge observation: live positions revalued via the pricer,
    /// no lifecycle transitions.
    Intraday,
    /// Reference close: snapshot valuation, rolls, expiries and unwinds.
    Close,
}

/// One observation timestamp on the simulation calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStamp {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub kind: ObservationKind,
}

impl SessionStamp {
    pub fn datetime(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn is_close(&self) -> bool {
        self.kind == ObservationKind::Close
    }
}

/// Build the simulation calendar from a trading-day index.
///
/// Per session day, the sorted union of the configured intraday observation
/// times and the reference close; a hedge time equal to the close collapses
/// into the close stamp. The result is strictly ascending.
pub fn build_calendar(
    trading_days: &[NaiveDate],
    close_time: NaiveTime,
    hedging_times: &[NaiveTime],
) -> Vec<SessionStamp> {
    let mut times: Vec<NaiveTime> = hedging_times.to_vec();
    times.push(close_time);
    times.sort();
    times.dedup();

    let mut days: Vec<NaiveDate> = trading_days.to_vec();
    days.sort();
    days.dedup();

    let mut calendar = Vec::with_capacity(days.len() * times.len());
    for date in days {
        for &time in &times {
            let kind = if time == close_time {
                ObservationKind::Close
            } else {
                ObservationKind::Intraday
            };
            calendar.push(SessionStamp { date, time, kind });
        }
    }
    calendar
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_close_only_calendar() {
        let cal = build_calendar(&[d(2022, 1, 3), d(2022, 1, 4)], t(16, 0), &[]);
        assert_eq!(cal.len(), 2);
        assert!(cal.iter().all(|s| s.is_close()));
        assert_eq!(cal[0].date, d(2022, 1, 3));
        assert_eq!(cal[0].time, t(16, 0));
    }

    #[test]
    fn test_intraday_times_precede_close() {
        let cal = build_calendar(&[d(2022, 1, 3)], t(16, 0), &[t(10, 0), t(14, 0)]);
        assert_eq!(cal.len(), 3);
        assert_eq!(cal[0].kind, ObservationKind::Intraday);
        assert_eq!(cal[0].time, t(10, 0));
        assert_eq!(cal[1].time, t(14, 0));
        assert!(cal[2].is_close());
    }

    #[test]
    fn test_hedge_time_equal_to_close_collapses() {
        let cal = build_calendar(&[d(2022, 1, 3)], t(16, 0), &[t(16, 0)]);
        assert_eq!(cal.len(), 1);
        assert!(cal[0].is_close());
    }

    #[test]
    fn test_strictly_ascending() {
        let cal = build_calendar(
            &[d(2022, 1, 4), d(2022, 1, 3)],
            t(16, 0),
            &[t(10, 0)],
        );
        for w in cal.windows(2) {
            assert!(w[0].datetime() < w[1].datetime());
        }
    }
}
