//! Attaches market data to rolled portfolio states.
//!
//! Close stamps read quotes straight from the day's snapshot. Intraday
//! stamps have no chain data, so each live position is repriced analytically
//! at the intraday spot, reusing the implied vol it carried at the previous
//! stamp.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::warn;

use crate::engine::{BoundQuote, OptionPosition, PortfolioState};
use crate::pricing::BlackScholes;

use super::source::{MarketDataError, SnapshotCache, SnapshotSource};
use super::types::{Greeks, MarketSnapshot};

/// Binds quotes and Greeks onto portfolio states, close and intraday.
pub struct MarketDataBinder<S: SnapshotSource> {
    cache: SnapshotCache<S>,
}

impl<S: SnapshotSource> MarketDataBinder<S> {
    pub fn new(source: S) -> Self {
        Self {
            cache: SnapshotCache::new(source),
        }
    }

    /// The underlying cache, shared with the roll pass.
    pub fn cache_mut(&mut self) -> &mut SnapshotCache<S> {
        &mut self.cache
    }

    /// Attach close-of-day quotes to every position in the state.
    ///
    /// Every position, including those expiring at this stamp, takes the
    /// day's snapshot quote; a missing quote is logged and falls back to
    /// intrinsic value with terminal Greeks. Expiring contracts usually
    /// drop out of the snapshot and settle through that fallback.
    pub fn bind_close(
        &mut self,
        state: &mut PortfolioState,
        date: NaiveDate,
    ) -> Result<(), MarketDataError> {
        let snapshot = self.cache.snapshot(date)?;
        let spot = snapshot.spot;

        for position in state
            .expired
            .iter_mut()
            .chain(state.live.iter_mut())
            .chain(state.unwound.iter_mut())
        {
            position.market = Some(quote_from_snapshot(snapshot, position, spot));
        }
        Ok(())
    }

    /// Reprice live positions at an intraday stamp.
    ///
    /// Each position inherits implied vol and spread from its match in the
    /// previous stamp's live set and is repriced at the intraday spot, with
    /// time to maturity measured to the second against the maturity close.
    pub fn bind_intraday(
        &mut self,
        state: &mut PortfolioState,
        prev_live: &[OptionPosition],
        ts: NaiveDateTime,
        close_time: NaiveTime,
        spot: f64,
        rate: f64,
        dividend: f64,
    ) {
        let pricer = BlackScholes::new(rate, dividend);

        for position in &mut state.live {
            let prev = prev_live
                .iter()
                .find(|p| p.same_contract(position))
                .and_then(|p| p.market);
            let Some(prev) = prev else {
                warn!(
                    strike = position.strike,
                    maturity = %position.maturity,
                    ts = %ts,
                    "no prior quote for intraday repricing, using intrinsic value"
                );
                position.market = Some(intrinsic_quote(position, spot));
                continue;
            };

            let days = (position.maturity.and_time(close_time) - ts).num_seconds() as f64
                / 86_400.0;
            let vol = prev.implied_vol;
            position.market = Some(BoundQuote {
                mid: pricer.price(spot, position.strike, days, vol, position.option_type),
                spread: prev.spread,
                implied_vol: vol,
                greeks: pricer.greeks(spot, position.strike, days, vol, position.option_type),
            });
        }
    }
}

fn intrinsic_quote(position: &OptionPosition, spot: f64) -> BoundQuote {
    BoundQuote {
        mid: position.option_type.intrinsic(spot, position.strike),
        spread: 0.0,
        implied_vol: 0.0,
        greeks: Greeks {
            delta: position.option_type.terminal_delta(spot, position.strike),
            ..Greeks::default()
        },
    }
}

fn quote_from_snapshot(
    snapshot: &MarketSnapshot,
    position: &OptionPosition,
    spot: f64,
) -> BoundQuote {
    match snapshot.find(position.strike, position.option_type, position.maturity) {
        Some(quote) => BoundQuote {
            mid: quote.mid(),
            spread: quote.spread(),
            implied_vol: quote.implied_vol,
            greeks: quote.greeks,
        },
        None => {
            warn!(
                date = %snapshot.date,
                strike = position.strike,
                maturity = %position.maturity,
                "quote missing from snapshot, using intrinsic value"
            );
            intrinsic_quote(position, spot)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PortfolioState;
    use crate::market::{ContractQuote, InMemorySource, OptionType};
    use crate::schedule::{ObservationKind, SessionStamp};
    use approx::assert_relative_eq;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, day).unwrap()
    }

    fn close() -> NaiveTime {
        NaiveTime::from_hms_opt(16, 0, 0).unwrap()
    }

    fn position(strike: f64, maturity: NaiveDate) -> OptionPosition {
        OptionPosition {
            open_date: d(3),
            strike,
            maturity,
            unwind: maturity,
            option_type: OptionType::Put,
            quantity: -1.0,
            leg: 0,
            market: None,
        }
    }

    fn snapshot_source() -> InMemorySource {
        let mut snap = MarketSnapshot::new(d(4), 100.0);
        snap.push(ContractQuote {
            strike: 95.0,
            maturity: d(21),
            option_type: OptionType::Put,
            bid: 1.0,
            ask: 1.4,
            volume: 5.0,
            implied_vol: 0.25,
            greeks: Greeks {
                delta: -0.3,
                ..Greeks::default()
            },
        });
        InMemorySource::new(vec![snap])
    }

    fn state_with(live: Vec<OptionPosition>) -> PortfolioState {
        let mut state = PortfolioState::empty(SessionStamp {
            date: d(4),
            time: close(),
            kind: ObservationKind::Close,
        });
        state.live = live;
        state.first_opened = state.live.len();
        state
    }

    #[test]
    fn test_bind_close_attaches_quote() {
        let mut binder = MarketDataBinder::new(snapshot_source());
        let mut state = state_with(vec![position(95.0, d(21))]);
        binder.bind_close(&mut state, d(4)).unwrap();

        let bound = state.live[0].bound();
        assert_relative_eq!(bound.mid, 1.2);
        assert_relative_eq!(bound.spread, 0.4);
        assert_relative_eq!(bound.implied_vol, 0.25);
        assert_relative_eq!(bound.greeks.delta, -0.3);
    }

    #[test]
    fn test_bind_close_missing_quote_falls_back_to_intrinsic() {
        let mut binder = MarketDataBinder::new(snapshot_source());
        let mut state = state_with(vec![position(110.0, d(21))]);
        binder.bind_close(&mut state, d(4)).unwrap();

        let bound = state.live[0].bound();
        // In-the-money put at spot 100, strike 110.
        assert_relative_eq!(bound.mid, 10.0);
        assert_relative_eq!(bound.spread, 0.0);
        assert_relative_eq!(bound.greeks.delta, -1.0);
    }

    #[test]
    fn test_bind_close_expired_takes_snapshot_quote() {
        // The expiring contract is still quoted on its last day; the
        // settlement takes the quoted mid and spread, not intrinsic.
        let mut snap = MarketSnapshot::new(d(4), 95.0);
        snap.push(ContractQuote {
            strike: 100.0,
            maturity: d(4),
            option_type: OptionType::Put,
            bid: 5.0,
            ask: 6.0,
            volume: 10.0,
            implied_vol: 0.2,
            greeks: Greeks {
                delta: -1.0,
                ..Greeks::default()
            },
        });
        let mut binder = MarketDataBinder::new(InMemorySource::new(vec![snap]));
        let mut state = state_with(vec![]);
        state.expired.push(position(100.0, d(4)));
        binder.bind_close(&mut state, d(4)).unwrap();

        let bound = state.expired[0].bound();
        assert_relative_eq!(bound.mid, 5.5);
        assert_relative_eq!(bound.spread, 1.0);
    }

    #[test]
    fn test_bind_close_expired_missing_quote_settles_at_intrinsic() {
        // The expired contract is gone from the snapshot: intrinsic value.
        let mut binder = MarketDataBinder::new(snapshot_source());
        let mut state = state_with(vec![]);
        state.expired.push(position(95.0, d(4)));
        binder.bind_close(&mut state, d(4)).unwrap();

        let bound = state.expired[0].bound();
        assert_relative_eq!(bound.mid, 0.0);
        assert_relative_eq!(bound.implied_vol, 0.0);
    }

    #[test]
    fn test_bind_intraday_reuses_prior_vol() {
        let mut binder = MarketDataBinder::new(snapshot_source());

        // Prior close: 17 days to the maturity close, spot 100, IV 0.25.
        let prior_mid = BlackScholes::new(0.0, 0.0).price(
            100.0,
            95.0,
            17.0,
            0.25,
            OptionType::Put,
        );
        let mut prev = position(95.0, d(21));
        prev.market = Some(BoundQuote {
            mid: prior_mid,
            spread: 0.4,
            implied_vol: 0.25,
            greeks: Greeks::default(),
        });

        let mut state = state_with(vec![position(95.0, d(21))]);
        let ts = d(5).and_hms_opt(12, 0, 0).unwrap();
        binder.bind_intraday(&mut state, &[prev], ts, close(), 98.0, 0.0, 0.0);

        let bound = state.live[0].bound();
        assert_relative_eq!(bound.implied_vol, 0.25);
        assert_relative_eq!(bound.spread, 0.4);
        // Spot dropped, the put is worth more than at the prior close.
        assert!(bound.mid > prior_mid);
        assert!(bound.greeks.delta < 0.0);
    }

    #[test]
    fn test_bind_intraday_without_prior_match() {
        let mut binder = MarketDataBinder::new(snapshot_source());
        let mut state = state_with(vec![position(110.0, d(21))]);
        let ts = d(5).and_hms_opt(12, 0, 0).unwrap();
        binder.bind_intraday(&mut state, &[], ts, close(), 100.0, 0.0, 0.0);
        assert_relative_eq!(state.live[0].bound().mid, 10.0);
    }
}
