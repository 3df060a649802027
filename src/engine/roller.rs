//! Position lifecycle: rolling, expiry, and unwind.
//!
//! The roller walks the observation calendar once and produces one
//! [`PortfolioState`] per stamp. All lifecycle transitions happen at close
//! stamps; intraday stamps carry the previous close's live set forward
//! unchanged. Market data is attached in a later pass.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::config::Leg;
use crate::market::{
    select_contract, Greeks, OptionType, SnapshotCache, SnapshotSource,
};
use crate::schedule::{ObservationKind, SessionStamp};

use super::EngineError;

/// Quote values attached to a position at one stamp.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundQuote {
    pub mid: f64,
    pub spread: f64,
    pub implied_vol: f64,
    pub greeks: Greeks,
}

/// One open option contract held by a leg.
#[derive(Debug, Clone)]
pub struct OptionPosition {
    pub open_date: NaiveDate,
    pub strike: f64,
    pub maturity: NaiveDate,
    pub unwind: NaiveDate,
    pub option_type: OptionType,
    /// Signed contract quantity; negative is short.
    pub quantity: f64,
    /// Index of the owning leg.
    pub leg: usize,
    /// Attached market data, present once the bind pass has run.
    pub market: Option<BoundQuote>,
}

impl OptionPosition {
    /// Same listed contract: strike, maturity, and type match.
    pub fn same_contract(&self, other: &OptionPosition) -> bool {
        (self.strike - other.strike).abs() < 1e-9
            && self.maturity == other.maturity
            && self.option_type == other.option_type
    }

    /// Bound quote, zero-valued before the bind pass.
    pub fn bound(&self) -> BoundQuote {
        self.market.unwrap_or_default()
    }
}

/// Portfolio contents at one observation stamp.
#[derive(Debug, Clone)]
pub struct PortfolioState {
    pub stamp: SessionStamp,
    /// Positions held at this stamp, carried ones first, newly opened last.
    pub live: Vec<OptionPosition>,
    /// Positions that reached maturity at this stamp.
    pub expired: Vec<OptionPosition>,
    /// Positions terminated early at this stamp.
    pub unwound: Vec<OptionPosition>,
    pub(crate) first_opened: usize,
}

impl PortfolioState {
    pub(crate) fn empty(stamp: SessionStamp) -> Self {
        Self {
            stamp,
            live: Vec::new(),
            expired: Vec::new(),
            unwound: Vec::new(),
            first_opened: 0,
        }
    }

    /// Positions opened at this stamp, as a suffix of `live`.
    pub fn opened(&self) -> &[OptionPosition] {
        &self.live[self.first_opened..]
    }
}

/// Walks the calendar and maintains the per-leg position lifecycle.
pub struct PortfolioRoller<'a> {
    legs: &'a [Leg],
    notional: f64,
    roll_days: Vec<BTreeSet<NaiveDate>>,
}

impl<'a> PortfolioRoller<'a> {
    /// Precompute each leg's roll dates on the trading-day index.
    pub fn new(legs: &'a [Leg], notional: f64, trading_days: &[NaiveDate]) -> Self {
        let roll_days = legs
            .iter()
            .map(|leg| leg.roll.filter(trading_days).into_iter().collect())
            .collect();
        Self {
            legs,
            notional,
            roll_days,
        }
    }

    /// One forward pass over the calendar. Positions are opened, expired and
    /// unwound at close stamps; intraday stamps replicate the previous live
    /// set with no market data attached.
    pub fn roll<S: SnapshotSource>(
        &self,
        calendar: &[SessionStamp],
        cache: &mut SnapshotCache<S>,
    ) -> Result<Vec<PortfolioState>, EngineError> {
        let mut states: Vec<PortfolioState> = Vec::with_capacity(calendar.len());

        for &stamp in calendar {
            let carried: Vec<OptionPosition> = states
                .last()
                .map(|prev| {
                    prev.live
                        .iter()
                        .map(|p| OptionPosition {
                            market: None,
                            ..p.clone()
                        })
                        .collect()
                })
                .unwrap_or_default();

            let mut state = PortfolioState::empty(stamp);

            if stamp.kind == ObservationKind::Intraday {
                state.live = carried;
                state.first_opened = state.live.len();
                states.push(state);
                continue;
            }

            let date = stamp.date;
            for position in carried {
                if position.maturity <= date {
                    state.expired.push(position);
                } else if position.unwind <= date {
                    state.unwound.push(position);
                } else {
                    state.live.push(position);
                }
            }
            state.first_opened = state.live.len();

            for (ix, leg) in self.legs.iter().enumerate() {
                if !self.roll_days[ix].contains(&date) {
                    continue;
                }
                let position = self.open_position(ix, leg, date, cache)?;
                state.live.push(position);
            }

            states.push(state);
        }

        Ok(states)
    }

    fn open_position<S: SnapshotSource>(
        &self,
        ix: usize,
        leg: &Leg,
        date: NaiveDate,
        cache: &mut SnapshotCache<S>,
    ) -> Result<OptionPosition, EngineError> {
        let maturity_floor = leg
            .eligible_maturities
            .nth(date, leg.maturity_offset)
            .ok_or(EngineError::ScheduleExhausted { date, leg: ix })?;
        let unwind = leg
            .unwind
            .nth(date, leg.holding_period)
            .ok_or(EngineError::ScheduleExhausted { date, leg: ix })?;

        let snapshot = cache.snapshot(date)?;
        let selected = select_contract(
            snapshot,
            leg.option_type,
            maturity_floor,
            &leg.strike_selection,
            snapshot.spot,
        )
        .map_err(|e| EngineError::NoEligibleContract {
            date: e.date,
            leg: ix,
            reason: e.reason,
        })?;

        Ok(OptionPosition {
            open_date: date,
            strike: selected.strike,
            maturity: selected.maturity,
            unwind,
            option_type: leg.option_type,
            quantity: leg.leverage * self.notional / snapshot.spot,
            leg: ix,
            market: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LegSpec, RuleSpec, StrikeSelection};
    use crate::market::{ContractQuote, InMemorySource, MarketSnapshot};
    use crate::schedule::build_calendar;
    use chrono::{Datelike, NaiveTime, Weekday};

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, m, day).unwrap()
    }

    fn close() -> NaiveTime {
        NaiveTime::from_hms_opt(16, 0, 0).unwrap()
    }

    fn weekdays(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let mut day = from;
        while day <= to {
            if day.weekday() != Weekday::Sat && day.weekday() != Weekday::Sun {
                days.push(day);
            }
            day = day.succ_opt().unwrap();
        }
        days
    }

    fn quote(strike: f64, maturity: NaiveDate) -> ContractQuote {
        ContractQuote {
            strike,
            maturity,
            option_type: OptionType::Put,
            bid: 1.0,
            ask: 1.2,
            volume: 10.0,
            implied_vol: 0.2,
            greeks: Greeks::default(),
        }
    }

    fn source(days: &[NaiveDate]) -> InMemorySource {
        let snaps = days
            .iter()
            .map(|&date| {
                let mut snap = MarketSnapshot::new(date, 100.0);
                for fri in [d(1, 7), d(1, 14), d(1, 21), d(1, 28), d(2, 4), d(2, 11)] {
                    for strike in [90.0, 95.0, 100.0] {
                        snap.push(quote(strike, fri));
                    }
                }
                snap
            })
            .collect();
        InMemorySource::new(snaps)
    }

    fn weekly_leg() -> Leg {
        let spec = LegSpec {
            roll: RuleSpec::Preset("fridays".to_string()),
            eligible_maturities: RuleSpec::Preset("fridays".to_string()),
            maturity_offset: 2,
            unwind: RuleSpec::Preset("fridays".to_string()),
            holding_period: 1,
            option_type: OptionType::Put,
            moneyness: Some(1.0),
            delta_target: None,
            leverage: -1.0,
            hedging_times: vec![],
        };
        spec.validate(0).unwrap()
    }

    #[test]
    fn test_weekly_roll_lifecycle() {
        let days = weekdays(d(1, 3), d(1, 31));
        let calendar = build_calendar(&days, close(), &[]);
        let legs = [weekly_leg()];
        let roller = PortfolioRoller::new(&legs, 100.0, &days);
        let mut cache = SnapshotCache::new(source(&days));
        let states = roller.roll(&calendar, &mut cache).unwrap();
        assert_eq!(states.len(), days.len());

        // First roll: Friday Jan 7 opens one position, maturity two Fridays
        // out, unwind one Friday out.
        let ix_open = days.iter().position(|&x| x == d(1, 7)).unwrap();
        let state = &states[ix_open];
        assert_eq!(state.live.len(), 1);
        assert_eq!(state.opened().len(), 1);
        let pos = &state.live[0];
        assert_eq!(pos.maturity, d(1, 21));
        assert_eq!(pos.unwind, d(1, 14));
        assert_eq!(pos.quantity, -1.0);

        // Next Friday: the first position is unwound, a new one opens.
        let ix_next = days.iter().position(|&x| x == d(1, 14)).unwrap();
        let state = &states[ix_next];
        assert_eq!(state.unwound.len(), 1);
        assert_eq!(state.live.len(), 1);
        assert_eq!(state.opened().len(), 1);
        assert_eq!(state.live[0].open_date, d(1, 14));
    }

    #[test]
    fn test_every_position_terminates_once() {
        let days = weekdays(d(1, 3), d(1, 31));
        let calendar = build_calendar(&days, close(), &[]);
        let legs = [weekly_leg()];
        let roller = PortfolioRoller::new(&legs, 100.0, &days);
        let mut cache = SnapshotCache::new(source(&days));
        let states = roller.roll(&calendar, &mut cache).unwrap();
        let opened: usize = states.iter().map(|s| s.opened().len()).sum();
        let closed: usize = states
            .iter()
            .map(|s| s.expired.len() + s.unwound.len())
            .sum();
        let still_live = states.last().unwrap().live.len();
        assert_eq!(opened, closed + still_live);
    }

    #[test]
    fn test_intraday_stamps_replicate_live_set() {
        let days = weekdays(d(1, 3), d(1, 14));
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let calendar = build_calendar(&days, close(), &[noon]);
        let legs = [weekly_leg()];
        let roller = PortfolioRoller::new(&legs, 100.0, &days);
        let mut cache = SnapshotCache::new(source(&days));
        let states = roller.roll(&calendar, &mut cache).unwrap();
        // Noon stamp on Monday Jan 10 carries Friday's open position.
        let noon_state = states
            .iter()
            .find(|s| s.stamp.date == d(1, 10) && s.stamp.kind == ObservationKind::Intraday)
            .unwrap();
        assert_eq!(noon_state.live.len(), 1);
        assert!(noon_state.opened().is_empty());
        assert!(noon_state.expired.is_empty() && noon_state.unwound.is_empty());
        assert!(noon_state.live[0].market.is_none());
    }

    #[test]
    fn test_delta_target_leg_selects_by_delta() {
        let days = weekdays(d(1, 3), d(1, 7));
        let calendar = build_calendar(&days, close(), &[]);
        let mut leg = weekly_leg();
        leg.strike_selection = StrikeSelection::DeltaTarget(0.30);

        let snaps = days
            .iter()
            .map(|&date| {
                let mut snap = MarketSnapshot::new(date, 100.0);
                for &(strike, delta) in &[(90.0, -0.10), (95.0, -0.25), (100.0, -0.50)] {
                    let mut q = quote(strike, d(1, 21));
                    q.greeks.delta = delta;
                    snap.push(q);
                }
                snap
            })
            .collect();
        let mut cache = SnapshotCache::new(InMemorySource::new(snaps));
        let legs = [leg];
        let roller = PortfolioRoller::new(&legs, 100.0, &days);
        let states = roller.roll(&calendar, &mut cache).unwrap();
        let opened = states.last().unwrap().opened();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].strike, 95.0);
    }
}
