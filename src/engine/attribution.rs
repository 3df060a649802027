//! Greek-bucketed PnL decomposition.
//!
//! Every bucket at stamp t is driven by the Greeks of the live set at the
//! previous stamp, using the market data bound there.
//!
//! The residual is PnL minus the buckets and nothing else. Trade flows
//! (premiums, payoffs, unwinds) are deliberately not subtracted: each flow
//! cancels against the mark-to-market change of the position it settles
//! inside the index-level PnL, so subtracting them again would leave a
//! structural flow term in the residual on every roll date. Hedge PnL is
//! likewise not subtracted; the delta bucket carries it through the hedge
//! notional. Whatever the Greeks do not explain lands in the residual,
//! including transaction and hedge fees.

use crate::config::VegaAttribution;
use crate::market::series::ForwardFilled;
use crate::market::Greeks;
use crate::schedule::SessionStamp;

use super::ledger::LedgerRecord;
use super::roller::PortfolioState;
use super::EngineError;

/// One row of the PnL decomposition.
#[derive(Debug, Clone, Copy)]
pub struct AttributionRecord {
    pub stamp: SessionStamp,
    /// Index-level change at this stamp, repeated from the ledger.
    pub pnl: f64,
    pub pnl_delta: f64,
    pub pnl_gamma: f64,
    pub pnl_vega: f64,
    pub pnl_theta: f64,
    pub pnl_rho: f64,
    /// PnL not explained by the Greek buckets.
    pub residual: f64,
}

/// Decompose the ledger PnL into Greek buckets, one record per stamp.
///
/// The first stamp has no predecessor and is all zeros.
pub fn explain(
    states: &[PortfolioState],
    ledger: &[LedgerRecord],
    rate: &ForwardFilled,
    mode: VegaAttribution,
) -> Result<Vec<AttributionRecord>, EngineError> {
    let mut records: Vec<AttributionRecord> = Vec::with_capacity(states.len());

    for (ix, state) in states.iter().enumerate() {
        if ix == 0 {
            records.push(AttributionRecord {
                stamp: state.stamp,
                pnl: 0.0,
                pnl_delta: 0.0,
                pnl_gamma: 0.0,
                pnl_vega: 0.0,
                pnl_theta: 0.0,
                pnl_rho: 0.0,
                residual: 0.0,
            });
            continue;
        }

        let prev = &states[ix - 1];
        let row = &ledger[ix];
        let prev_row = &ledger[ix - 1];

        let mut greeks = Greeks::default();
        for p in &prev.live {
            greeks.accumulate(&p.bound().greeks.scaled(p.quantity));
        }

        let d_spot = row.spot - prev_row.spot;
        let ts = state.stamp.datetime();
        let prev_ts = prev.stamp.datetime();
        let elapsed_days = (ts - prev_ts).num_seconds() as f64 / 86_400.0;

        let rate_now = rate.at(ts).ok_or(EngineError::MissingSeries(ts))?;
        let rate_prev = rate.at(prev_ts).ok_or(EngineError::MissingSeries(prev_ts))?;

        // The hedge book holds the negative of the hedged delta, so the net
        // spot exposure is the sum of the two.
        let pnl_delta = (greeks.delta + prev_row.hedge_notional) * d_spot;
        let pnl_gamma = 0.5 * greeks.gamma * d_spot * d_spot;
        let pnl_theta = greeks.theta * elapsed_days;
        let pnl_rho = greeks.rho * (rate_now - rate_prev);

        let pnl_vega = match mode {
            VegaAttribution::ImpliedVolChange => vega_from_matched_positions(prev, state),
            VegaAttribution::VolIndexChange => {
                greeks.vega * (row.vol_index - prev_row.vol_index) / 100.0
            }
        };

        let pnl = row.pnl;
        let residual = pnl - pnl_delta - pnl_gamma - pnl_vega - pnl_theta - pnl_rho;

        records.push(AttributionRecord {
            stamp: state.stamp,
            pnl,
            pnl_delta,
            pnl_gamma,
            pnl_vega,
            pnl_theta,
            pnl_rho,
            residual,
        });
    }

    Ok(records)
}

/// Vega PnL from per-position implied-vol changes, matching each surviving
/// contract between the previous and current live sets.
fn vega_from_matched_positions(prev: &PortfolioState, current: &PortfolioState) -> f64 {
    let date = current.stamp.date;
    prev.live
        .iter()
        .filter(|p| p.maturity > date && p.unwind > date)
        .filter_map(|p| {
            current
                .live
                .iter()
                .find(|q| q.same_contract(p) && q.unwind == p.unwind)
                .map(|q| p.quantity * p.bound().greeks.vega * (q.bound().implied_vol - p.bound().implied_vol))
        })
        .sum()
}
