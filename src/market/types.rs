//! Core market data types for the overlay simulation.
//!
//! A [`MarketSnapshot`] is the per-date table of tradable contracts consumed
//! by the contract selector and the market data binder. Snapshots arrive in
//! monthly batches ([`MonthlyChain`]), matching the layout of the
//! preprocessed end-of-day chain files.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Parse from the encodings seen in vendor files: letters or the
    /// numeric convention (1 = call, 0 = put).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "C" | "CALL" | "1" => Some(Self::Call),
            "P" | "PUT" | "0" => Some(Self::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "C",
            Self::Put => "P",
        }
    }

    /// Sign factor used by the closed-form pricer: +1 for calls, -1 for puts.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Call => 1.0,
            Self::Put => -1.0,
        }
    }

    /// Terminal payoff of one contract at the given spot.
    pub fn intrinsic(&self, spot: f64, strike: f64) -> f64 {
        match self {
            Self::Call => (spot - strike).max(0.0),
            Self::Put => (strike - spot).max(0.0),
        }
    }

    /// Terminal delta: +/-1 in the money, 0 otherwise.
    pub fn terminal_delta(&self, spot: f64, strike: f64) -> f64 {
        match self {
            Self::Call => {
                if spot > strike {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Put => {
                if spot < strike {
                    -1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// First and second order sensitivities of one contract.
///
/// Units follow the engine's conventions: theta is per calendar day, vega per
/// unit of volatility, rho per unit of (decimal) rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
    pub rho: f64,
}

impl Greeks {
    /// All five sensitivities scaled by a position quantity.
    pub fn scaled(&self, quantity: f64) -> Greeks {
        Greeks {
            delta: self.delta * quantity,
            gamma: self.gamma * quantity,
            vega: self.vega * quantity,
            theta: self.theta * quantity,
            rho: self.rho * quantity,
        }
    }

    /// Accumulate another set of sensitivities in place.
    pub fn accumulate(&mut self, other: &Greeks) {
        self.delta += other.delta;
        self.gamma += other.gamma;
        self.vega += other.vega;
        self.theta += other.theta;
        self.rho += other.rho;
    }
}

/// One tradable contract row in a market snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractQuote {
    pub strike: f64,
    pub maturity: NaiveDate,
    pub option_type: OptionType,
    pub bid: f64,
    pub ask: f64,
    pub volume: f64,
    pub implied_vol: f64,
    pub greeks: Greeks,
}

impl ContractQuote {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// All tradable contracts for one underlying on one session date.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub date: NaiveDate,
    /// Underlying close recorded in the chain file for this date.
    pub spot: f64,
    pub contracts: Vec<ContractQuote>,
}

impl MarketSnapshot {
    pub fn new(date: NaiveDate, spot: f64) -> Self {
        Self {
            date,
            spot,
            contracts: Vec::new(),
        }
    }

    pub fn push(&mut self, quote: ContractQuote) {
        self.contracts.push(quote);
    }

    /// Quote matching a tracked position's contract identity, if present.
    pub fn find(
        &self,
        strike: f64,
        option_type: OptionType,
        maturity: NaiveDate,
    ) -> Option<&ContractQuote> {
        self.contracts.iter().find(|q| {
            q.option_type == option_type
                && q.maturity == maturity
                && (q.strike - strike).abs() < 1e-9
        })
    }
}

/// One month of snapshots, the unit cached by the market data binder.
#[derive(Debug, Clone, Default)]
pub struct MonthlyChain {
    /// Derived file identity; a change invalidates the binder's cache slot.
    pub key: String,
    pub days: BTreeMap<NaiveDate, MarketSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(strike: f64, maturity: NaiveDate, ty: OptionType) -> ContractQuote {
        ContractQuote {
            strike,
            maturity,
            option_type: ty,
            bid: 1.0,
            ask: 1.2,
            volume: 10.0,
            implied_vol: 0.2,
            greeks: Greeks::default(),
        }
    }

    #[test]
    fn test_option_type_parsing() {
        assert_eq!(OptionType::parse("C"), Some(OptionType::Call));
        assert_eq!(OptionType::parse("put"), Some(OptionType::Put));
        assert_eq!(OptionType::parse("0"), Some(OptionType::Put));
        assert_eq!(OptionType::parse("1"), Some(OptionType::Call));
        assert_eq!(OptionType::parse("X"), None);
    }

    #[test]
    fn test_intrinsic_and_terminal_delta() {
        assert_eq!(OptionType::Call.intrinsic(105.0, 100.0), 5.0);
        assert_eq!(OptionType::Call.intrinsic(95.0, 100.0), 0.0);
        assert_eq!(OptionType::Put.intrinsic(95.0, 100.0), 5.0);
        assert_eq!(OptionType::Put.terminal_delta(95.0, 100.0), -1.0);
        assert_eq!(OptionType::Put.terminal_delta(105.0, 100.0), 0.0);
        assert_eq!(OptionType::Call.terminal_delta(105.0, 100.0), 1.0);
    }

    #[test]
    fn test_mid_and_spread() {
        let d = NaiveDate::from_ymd_opt(2022, 3, 18).unwrap();
        let q = quote(100.0, d, OptionType::Put);
        assert!((q.mid() - 1.1).abs() < 1e-12);
        assert!((q.spread() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_snapshot_find_matches_full_identity() {
        let date = NaiveDate::from_ymd_opt(2022, 3, 1).unwrap();
        let m1 = NaiveDate::from_ymd_opt(2022, 3, 18).unwrap();
        let m2 = NaiveDate::from_ymd_opt(2022, 4, 15).unwrap();
        let mut snap = MarketSnapshot::new(date, 100.0);
        snap.push(quote(100.0, m1, OptionType::Put));
        snap.push(quote(100.0, m2, OptionType::Put));
        snap.push(quote(100.0, m1, OptionType::Call));

        assert!(snap.find(100.0, OptionType::Put, m1).is_some());
        assert!(snap.find(100.0, OptionType::Call, m2).is_none());
        assert!(snap.find(95.0, OptionType::Put, m1).is_none());
    }
}
