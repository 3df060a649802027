//! The backtest engine: roll, bind, account, attribute.
//!
//! [`Backtest::run`] is the single entry point. It builds the observation
//! calendar, walks it once to roll positions, attaches market data in a
//! second pass, then computes the ledger and the optional PnL attribution.

pub mod attribution;
pub mod ledger;
pub mod roller;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;
use tracing::info;

use crate::config::{BacktestConfig, ConfigError, Leg, VegaAttribution};
use crate::market::series::ForwardFilled;
use crate::market::{MarketDataBinder, MarketDataError, SnapshotSource};
use crate::report::BacktestReport;
use crate::schedule::{build_calendar, ObservationKind};

pub use attribution::{explain, AttributionRecord};
pub use ledger::{LedgerBuilder, LedgerRecord};
pub use roller::{BoundQuote, OptionPosition, PortfolioRoller, PortfolioState};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("leg {leg}, {date}: {reason}")]
    NoEligibleContract {
        date: NaiveDate,
        leg: usize,
        reason: String,
    },

    #[error("leg {leg}: recurrence rule exhausted stepping from {date}")]
    ScheduleExhausted { date: NaiveDate, leg: usize },

    #[error("no series value at {0}")]
    MissingSeries(NaiveDateTime),

    #[error("vol-index vega attribution requires a vol index series")]
    MissingVolIndex,

    #[error(transparent)]
    Market(#[from] MarketDataError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Everything the engine reads from the outside world.
pub struct MarketInputs<S: SnapshotSource> {
    /// Monthly option-chain provider.
    pub chains: S,
    /// Exchange trading days; the simulation calendar is built from these.
    pub trading_days: Vec<NaiveDate>,
    /// Underlying close (and intraday, if hedging intraday) prices.
    pub spot: ForwardFilled,
    /// Reference volatility index closes, if available.
    pub vol_index: Option<ForwardFilled>,
    /// Risk-free rate as a decimal.
    pub rate: ForwardFilled,
    /// Continuous dividend yield as a decimal, used for intraday repricing.
    pub dividend: ForwardFilled,
}

/// A configured, validated backtest.
pub struct Backtest {
    config: BacktestConfig,
    legs: Vec<Leg>,
}

impl Backtest {
    pub fn new(config: BacktestConfig) -> Result<Self, ConfigError> {
        let legs = config.validate()?;
        Ok(Self { config, legs })
    }

    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    /// Run the full simulation and produce the report.
    pub fn run<S: SnapshotSource>(
        &self,
        inputs: MarketInputs<S>,
    ) -> Result<BacktestReport, EngineError> {
        if self.config.attribution
            && self.config.vega_attribution == VegaAttribution::VolIndexChange
            && inputs.vol_index.is_none()
        {
            return Err(EngineError::MissingVolIndex);
        }

        let days: Vec<NaiveDate> = inputs
            .trading_days
            .iter()
            .copied()
            .filter(|d| *d >= self.config.start_date && *d <= self.config.end_date)
            .collect();

        let mut hedging_times: Vec<NaiveTime> = self
            .legs
            .iter()
            .flat_map(|leg| leg.hedging_times.iter().copied())
            .collect();
        hedging_times.sort();
        hedging_times.dedup();

        let calendar = build_calendar(&days, self.config.close_time, &hedging_times);
        info!(
            stamps = calendar.len(),
            days = days.len(),
            legs = self.legs.len(),
            "starting backtest"
        );

        let mut binder = MarketDataBinder::new(inputs.chains);
        let roller = PortfolioRoller::new(&self.legs, self.config.notional, &days);
        let mut states = roller.roll(&calendar, binder.cache_mut())?;

        for ix in 0..states.len() {
            let (before, rest) = states.split_at_mut(ix);
            let state = &mut rest[0];
            match state.stamp.kind {
                ObservationKind::Close => {
                    let date = state.stamp.date;
                    binder.bind_close(state, date)?;
                }
                ObservationKind::Intraday => {
                    let prev_live = before.last().map(|s| s.live.as_slice()).unwrap_or(&[]);
                    let ts = state.stamp.datetime();
                    let spot = inputs.spot.at(ts).ok_or(EngineError::MissingSeries(ts))?;
                    let rate = inputs.rate.at(ts).ok_or(EngineError::MissingSeries(ts))?;
                    let dividend =
                        inputs.dividend.at(ts).ok_or(EngineError::MissingSeries(ts))?;
                    binder.bind_intraday(
                        state,
                        prev_live,
                        ts,
                        self.config.close_time,
                        spot,
                        rate,
                        dividend,
                    );
                }
            }
        }

        let vol_index = inputs
            .vol_index
            .unwrap_or_else(|| ForwardFilled::flat(f64::NAN));
        let builder =
            LedgerBuilder::new(&self.legs, self.config.notional, self.config.hedge_fee_rate());
        let ledger = builder.compute(&states, &inputs.spot, &vol_index)?;

        let attribution = if self.config.attribution {
            Some(explain(
                &states,
                &ledger,
                &inputs.rate,
                self.config.vega_attribution,
            )?)
        } else {
            None
        };

        info!(
            final_level = ledger.last().map(|r| r.index_level).unwrap_or(f64::NAN),
            "backtest finished"
        );
        Ok(BacktestReport::new(&states, ledger, attribution))
    }
}
