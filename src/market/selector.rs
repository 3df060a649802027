//! Contract selection on a roll date.
//!
//! Stateless: given one snapshot and a selection policy, pick the single
//! contract a new position is struck on. The earliest eligible maturity at
//! or after the target floor is always used, never an earlier one.

use chrono::NaiveDate;
use thiserror::Error;

use crate::config::StrikeSelection;
use super::types::{ContractQuote, MarketSnapshot, OptionType};

/// No contract satisfies the maturity/strike/type filters on a roll date.
#[derive(Debug, Error)]
#[error("no eligible contract on {date}: {reason}")]
pub struct NoEligibleContract {
    pub date: NaiveDate,
    pub reason: String,
}

/// The contract a new position is struck on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedContract {
    pub strike: f64,
    pub maturity: NaiveDate,
}

/// Pick one contract from the snapshot.
///
/// Moneyness mode: puts take the largest strike at or below spot x ratio,
/// calls the smallest strike at or above it. Delta-target mode: among quotes
/// with |delta| <= target, puts take the signed minimum delta and calls the
/// signed maximum, i.e. the candidate closest to the target from below.
pub fn select_contract(
    snapshot: &MarketSnapshot,
    option_type: OptionType,
    maturity_floor: NaiveDate,
    selection: &StrikeSelection,
    spot: f64,
) -> Result<SelectedContract, NoEligibleContract> {
    let maturity = snapshot
        .contracts
        .iter()
        .filter(|q| q.option_type == option_type && q.maturity >= maturity_floor)
        .map(|q| q.maturity)
        .min()
        .ok_or_else(|| NoEligibleContract {
            date: snapshot.date,
            reason: format!(
                "no {} maturity on/after {}",
                option_type.as_str(),
                maturity_floor
            ),
        })?;

    let at_maturity: Vec<&ContractQuote> = snapshot
        .contracts
        .iter()
        .filter(|q| q.option_type == option_type && q.maturity == maturity)
        .collect();

    let strike = match *selection {
        StrikeSelection::Moneyness(ratio) => {
            let target = spot * ratio;
            let strike = match option_type {
                OptionType::Put => at_maturity
                    .iter()
                    .map(|q| q.strike)
                    .filter(|&k| k <= target)
                    .max_by(f64::total_cmp),
                OptionType::Call => at_maturity
                    .iter()
                    .map(|q| q.strike)
                    .filter(|&k| k >= target)
                    .min_by(f64::total_cmp),
            };
            strike.ok_or_else(|| NoEligibleContract {
                date: snapshot.date,
                reason: format!(
                    "no {} strike at moneyness {} (spot {})",
                    option_type.as_str(),
                    ratio,
                    spot
                ),
            })?
        }
        StrikeSelection::DeltaTarget(target) => {
            let candidates = at_maturity
                .iter()
                .filter(|q| q.greeks.delta.abs() <= target);
            let chosen = match option_type {
                OptionType::Put => {
                    candidates.min_by(|a, b| a.greeks.delta.total_cmp(&b.greeks.delta))
                }
                OptionType::Call => {
                    candidates.max_by(|a, b| a.greeks.delta.total_cmp(&b.greeks.delta))
                }
            };
            chosen
                .ok_or_else(|| NoEligibleContract {
                    date: snapshot.date,
                    reason: format!(
                        "no {} with |delta| <= {}",
                        option_type.as_str(),
                        target
                    ),
                })?
                .strike
        }
    };

    Ok(SelectedContract { strike, maturity })
}
