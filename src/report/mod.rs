//! Backtest output: ledger rows, attribution rows, and the trade blotter.

use std::fmt::Write as _;

use chrono::NaiveDate;

use crate::engine::{AttributionRecord, LedgerRecord, PortfolioState};
use crate::market::OptionType;
use crate::schedule::ObservationKind;

/// One opened position, as it appears in the trade blotter.
#[derive(Debug, Clone)]
pub struct PositionDetail {
    pub open_date: NaiveDate,
    pub leg: usize,
    pub option_type: OptionType,
    pub strike: f64,
    pub maturity: NaiveDate,
    pub unwind: NaiveDate,
    pub quantity: f64,
    /// Mid price paid or received at the open.
    pub open_mid: f64,
}

/// Headline statistics over the ledger.
#[derive(Debug, Clone, Copy)]
pub struct Summary {
    pub initial_level: f64,
    pub final_level: f64,
    pub total_pnl: f64,
    pub max_drawdown: f64,
    pub total_fees: f64,
    pub total_hedge_fees: f64,
    pub positions_opened: usize,
}

/// Complete output of one backtest run.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub ledger: Vec<LedgerRecord>,
    pub attribution: Option<Vec<AttributionRecord>>,
    pub positions: Vec<PositionDetail>,
}

impl BacktestReport {
    pub fn new(
        states: &[PortfolioState],
        ledger: Vec<LedgerRecord>,
        attribution: Option<Vec<AttributionRecord>>,
    ) -> Self {
        let positions = states
            .iter()
            .flat_map(|state| {
                state.opened().iter().map(|p| PositionDetail {
                    open_date: p.open_date,
                    leg: p.leg,
                    option_type: p.option_type,
                    strike: p.strike,
                    maturity: p.maturity,
                    unwind: p.unwind,
                    quantity: p.quantity,
                    open_mid: p.bound().mid,
                })
            })
            .collect();
        Self {
            ledger,
            attribution,
            positions,
        }
    }

    /// Headline statistics; drawdown is measured on close-stamp index levels.
    pub fn summary(&self) -> Summary {
        let initial_level = self.ledger.first().map(|r| r.index_level).unwrap_or(0.0);
        let final_level = self.ledger.last().map(|r| r.index_level).unwrap_or(0.0);

        let mut peak = f64::MIN;
        let mut max_drawdown = 0.0f64;
        for record in self
            .ledger
            .iter()
            .filter(|r| r.stamp.kind == ObservationKind::Close)
        {
            peak = peak.max(record.index_level);
            if peak > 0.0 {
                max_drawdown = max_drawdown.max((peak - record.index_level) / peak);
            }
        }

        Summary {
            initial_level,
            final_level,
            total_pnl: self.ledger.iter().map(|r| r.pnl).sum(),
            max_drawdown,
            total_fees: self.ledger.iter().map(|r| r.fees).sum(),
            total_hedge_fees: self.ledger.iter().map(|r| r.hedge_fees).sum(),
            positions_opened: self.positions.len(),
        }
    }

    /// Ledger as CSV, one row per observation stamp.
    pub fn ledger_csv(&self) -> String {
        let mut out = String::from(
            "timestamp,kind,spot,vol_index,cash,mvop,index_level,pnl,premiums,payoffs,unwinds,fees,hedge_notional,hedge_pnl,hedge_fees\n",
        );
        for r in &self.ledger {
            let kind = match r.stamp.kind {
                ObservationKind::Close => "close",
                ObservationKind::Intraday => "intraday",
            };
            let _ = writeln!(
                out,
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
                r.stamp.datetime(),
                kind,
                r.spot,
                r.vol_index,
                r.cash,
                r.mvop,
                r.index_level,
                r.pnl,
                r.premiums,
                r.payoffs,
                r.unwinds,
                r.fees,
                r.hedge_notional,
                r.hedge_pnl,
                r.hedge_fees
            );
        }
        out
    }

    /// Attribution as CSV, empty string when attribution was not run.
    pub fn attribution_csv(&self) -> String {
        let Some(rows) = &self.attribution else {
            return String::new();
        };
        let mut out = String::from(
            "timestamp,pnl,pnl_delta,pnl_gamma,pnl_vega,pnl_theta,pnl_rho,residual\n",
        );
        for r in rows {
            let _ = writeln!(
                out,
                "{},{},{},{},{},{},{},{}",
                r.stamp.datetime(),
                r.pnl,
                r.pnl_delta,
                r.pnl_gamma,
                r.pnl_vega,
                r.pnl_theta,
                r.pnl_rho,
                r.residual
            );
        }
        out
    }

    /// Trade blotter as CSV, one row per opened position.
    pub fn positions_csv(&self) -> String {
        let mut out = String::from(
            "open_date,leg,option_type,strike,maturity,unwind,quantity,open_mid\n",
        );
        for p in &self.positions {
            let _ = writeln!(
                out,
                "{},{},{},{},{},{},{},{}",
                p.open_date,
                p.leg,
                p.option_type.as_str(),
                p.strike,
                p.maturity,
                p.unwind,
                p.quantity,
                p.open_mid
            );
        }
        out
    }
}
