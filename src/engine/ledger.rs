//! Cash, market value, and index-level accounting.
//!
//! One [`LedgerRecord`] per observation stamp. The index level is always
//! cash plus the market value of open positions; every cash flow at a stamp
//! (premiums, payoffs, unwinds, spread fees, hedging) is recorded in its own
//! column so the output explains itself.

use crate::config::Leg;
use crate::market::series::ForwardFilled;
use crate::schedule::SessionStamp;

use super::roller::PortfolioState;
use super::EngineError;

/// Full accounting state at one observation stamp.
#[derive(Debug, Clone, Copy)]
pub struct LedgerRecord {
    pub stamp: SessionStamp,
    pub spot: f64,
    pub vol_index: f64,
    /// Cash account after this stamp's flows.
    pub cash: f64,
    /// Market value of open positions, mid times signed quantity.
    pub mvop: f64,
    /// Strategy index level, cash plus mvop.
    pub index_level: f64,
    /// Index-level change since the previous stamp.
    pub pnl: f64,
    /// Premium flow from positions opened at this stamp (negative buys).
    pub premiums: f64,
    /// Settlement value of positions expiring at this stamp.
    pub payoffs: f64,
    /// Settlement value of positions unwound at this stamp.
    pub unwinds: f64,
    /// Half-spread transaction costs on all positions traded at this stamp.
    pub fees: f64,
    /// Underlying held against the portfolio delta after rebalancing, in
    /// shares; the negative of the hedged positions' aggregate delta.
    pub hedge_notional: f64,
    /// PnL on the underlying held since the previous stamp.
    pub hedge_pnl: f64,
    /// Rebalancing cost on the traded underlying notional.
    pub hedge_fees: f64,
}

/// Computes the ledger from bound portfolio states.
pub struct LedgerBuilder<'a> {
    legs: &'a [Leg],
    notional: f64,
    hedge_fee_rate: f64,
}

impl<'a> LedgerBuilder<'a> {
    pub fn new(legs: &'a [Leg], notional: f64, hedge_fee_rate: f64) -> Self {
        Self {
            legs,
            notional,
            hedge_fee_rate,
        }
    }

    /// One record per state. States must already carry bound market data.
    pub fn compute(
        &self,
        states: &[PortfolioState],
        spot: &ForwardFilled,
        vol_index: &ForwardFilled,
    ) -> Result<Vec<LedgerRecord>, EngineError> {
        let mut records: Vec<LedgerRecord> = Vec::with_capacity(states.len());

        for state in states {
            let ts = state.stamp.datetime();
            let spot_value = spot.at(ts).ok_or(EngineError::MissingSeries(ts))?;
            let vol_value = vol_index.at(ts).unwrap_or(f64::NAN);

            let premiums: f64 = state
                .opened()
                .iter()
                .map(|p| -p.bound().mid * p.quantity)
                .sum();
            let payoffs: f64 = state
                .expired
                .iter()
                .map(|p| p.bound().mid * p.quantity)
                .sum();
            let unwinds: f64 = state
                .unwound
                .iter()
                .map(|p| p.bound().mid * p.quantity)
                .sum();
            let fees: f64 = state
                .opened()
                .iter()
                .chain(&state.expired)
                .chain(&state.unwound)
                .map(|p| 0.5 * p.bound().spread * p.quantity.abs())
                .sum();
            let mvop: f64 = state
                .live
                .iter()
                .map(|p| p.bound().mid * p.quantity)
                .sum();

            let hedge_notional: f64 = -state
                .live
                .iter()
                .filter(|p| self.legs[p.leg].hedging_times.contains(&state.stamp.time))
                .map(|p| p.bound().greeks.delta * p.quantity)
                .sum::<f64>();

            let (prev_cash, prev_spot, prev_hedge, prev_il) = match records.last() {
                Some(prev) => (prev.cash, prev.spot, prev.hedge_notional, prev.index_level),
                None => (self.notional, spot_value, 0.0, self.notional),
            };

            let hedge_pnl = prev_hedge * (spot_value - prev_spot);
            let hedge_fees =
                (hedge_notional - prev_hedge).abs() * spot_value * self.hedge_fee_rate;

            let cash =
                prev_cash + premiums + payoffs + unwinds - fees + hedge_pnl - hedge_fees;
            let index_level = cash + mvop;

            records.push(LedgerRecord {
                stamp: state.stamp,
                spot: spot_value,
                vol_index: vol_value,
                cash,
                mvop,
                index_level,
                pnl: index_level - prev_il,
                premiums,
                payoffs,
                unwinds,
                fees,
                hedge_notional,
                hedge_pnl,
                hedge_fees,
            });
        }

        Ok(records)
    }
}
