//! Analytic option valuation.

pub mod black_scholes;

pub use black_scholes::{BlackScholes, ImpliedVol, DAYS_PER_YEAR};
