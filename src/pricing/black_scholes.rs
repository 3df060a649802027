//! Closed-form option valuation and Greeks (continuous dividend yield).
//!
//! Conventions used throughout the engine:
//! - time to maturity is passed in calendar days and annualized by 365; an
//!   `f64` day count lets intraday revaluation measure to the second
//! - theta is per calendar day (annual theta / 365)
//! - vega is per unit of volatility, rho per unit of (decimal) rate
//!
//! These formulas are the valuation fallback whenever a matching market
//! quote is unavailable; at `days <= 0` they collapse to intrinsic values.

use std::f64::consts::PI;

use statrs::distribution::{ContinuousCDF, Normal};

use crate::market::{Greeks, OptionType};

pub const DAYS_PER_YEAR: f64 = 365.0;

/// Below this volatility gamma is defined as exactly 0 and the remaining
/// formulas are evaluated at the floor, avoiding division blow-up.
const VOL_FLOOR: f64 = 1e-10;

const IV_LOW: f64 = 0.0;
const IV_HIGH: f64 = 2.0;
const IV_MAX_ITER: u32 = 20;
const IV_TOLERANCE: f64 = 0.01;

/// Result of the bisection implied-volatility solver.
///
/// `converged == false` means the iteration cap was exhausted before the
/// price error fell below tolerance; `vol` is still the best estimate (the
/// midpoint of the final bracket) and the caller decides severity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpliedVol {
    pub vol: f64,
    pub converged: bool,
    pub iterations: u32,
}

/// Black-Scholes pricer with continuously-compounded rate and dividend yield.
#[derive(Debug, Clone, Copy)]
pub struct BlackScholes {
    /// Risk-free rate, decimal.
    pub rate: f64,
    /// Dividend yield, decimal.
    pub dividend: f64,
}

impl BlackScholes {
    pub fn new(rate: f64, dividend: f64) -> Self {
        Self { rate, dividend }
    }

    fn norm_cdf(x: f64) -> f64 {
        // Normal::new(0, 1) cannot fail.
        match Normal::new(0.0, 1.0) {
            Ok(n) => n.cdf(x),
            Err(_) => f64::NAN,
        }
    }

    fn norm_pdf(x: f64) -> f64 {
        (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
    }

    /// d1/d2 at an already-annualized maturity, with the volatility floored.
    fn d1_d2(&self, spot: f64, strike: f64, years: f64, vol: f64) -> (f64, f64) {
        let vol = vol.max(VOL_FLOOR);
        let d1 = ((spot / strike).ln()
            + (self.rate - self.dividend + 0.5 * vol * vol) * years)
            / (vol * years.sqrt());
        (d1, d1 - vol * years.sqrt())
    }

    /// Option price; `days` is the time to maturity in calendar days.
    pub fn price(&self, spot: f64, strike: f64, days: f64, vol: f64, ty: OptionType) -> f64 {
        if days <= 0.0 {
            return ty.intrinsic(spot, strike);
        }
        let t = days / DAYS_PER_YEAR;
        let (d1, d2) = self.d1_d2(spot, strike, t, vol);
        let s = ty.sign();
        s * spot * (-self.dividend * t).exp() * Self::norm_cdf(s * d1)
            - s * strike * (-self.rate * t).exp() * Self::norm_cdf(s * d2)
    }

    pub fn delta(&self, spot: f64, strike: f64, days: f64, vol: f64, ty: OptionType) -> f64 {
        if days <= 0.0 {
            return ty.terminal_delta(spot, strike);
        }
        let t = days / DAYS_PER_YEAR;
        let (d1, _) = self.d1_d2(spot, strike, t, vol);
        let s = ty.sign();
        s * Self::norm_cdf(s * d1) * (-self.dividend * t).exp()
    }

    /// Gamma (same for calls and puts); exactly 0 at or below the vol floor.
    pub fn gamma(&self, spot: f64, strike: f64, days: f64, vol: f64) -> f64 {
        if days <= 0.0 || vol <= VOL_FLOOR {
            return 0.0;
        }
        let t = days / DAYS_PER_YEAR;
        let (d1, _) = self.d1_d2(spot, strike, t, vol);
        Self::norm_pdf(d1) * (-self.dividend * t).exp() / (spot * vol * t.sqrt())
    }

    /// Vega per unit of volatility (same for calls and puts).
    pub fn vega(&self, spot: f64, strike: f64, days: f64, vol: f64) -> f64 {
        if days <= 0.0 {
            return 0.0;
        }
        let t = days / DAYS_PER_YEAR;
        let (d1, _) = self.d1_d2(spot, strike, t, vol);
        Self::norm_pdf(d1) * spot * (-self.dividend * t).exp() * t.sqrt()
    }

    /// Theta per calendar day.
    pub fn theta(&self, spot: f64, strike: f64, days: f64, vol: f64, ty: OptionType) -> f64 {
        if days <= 0.0 {
            return 0.0;
        }
        let t = days / DAYS_PER_YEAR;
        let (d1, d2) = self.d1_d2(spot, strike, t, vol);
        let s = ty.sign();
        let vol = vol.max(VOL_FLOOR);
        let annual = -(-self.dividend * t).exp() * spot * Self::norm_pdf(d1) * vol
            / (2.0 * t.sqrt())
            - s * self.rate * strike * (-self.rate * t).exp() * Self::norm_cdf(s * d2)
            + s * self.dividend * spot * (-self.dividend * t).exp() * Self::norm_cdf(s * d1);
        annual / DAYS_PER_YEAR
    }

    /// Rho per unit of (decimal) rate.
    pub fn rho(&self, spot: f64, strike: f64, days: f64, vol: f64, ty: OptionType) -> f64 {
        if days <= 0.0 {
            return 0.0;
        }
        let t = days / DAYS_PER_YEAR;
        let (_, d2) = self.d1_d2(spot, strike, t, vol);
        let s = ty.sign();
        s * strike * t * (-self.rate * t).exp() * Self::norm_cdf(s * d2)
    }

    /// All five sensitivities in one call.
    pub fn greeks(&self, spot: f64, strike: f64, days: f64, vol: f64, ty: OptionType) -> Greeks {
        Greeks {
            delta: self.delta(spot, strike, days, vol, ty),
            gamma: self.gamma(spot, strike, days, vol),
            vega: self.vega(spot, strike, days, vol),
            theta: self.theta(spot, strike, days, vol, ty),
            rho: self.rho(spot, strike, days, vol, ty),
        }
    }

    /// Implied volatility by bisection over `[0, 2]`.
    ///
    /// Terminates after a fixed iteration cap or when the price error falls
    /// below tolerance, returning the midpoint of the final bracket.
    pub fn implied_vol(
        &self,
        spot: f64,
        strike: f64,
        days: f64,
        price: f64,
        ty: OptionType,
    ) -> ImpliedVol {
        let (mut low, mut high) = (IV_LOW, IV_HIGH);
        let mut mid = 0.5 * (low + high);
        let mut converged = false;
        let mut iterations = 0;

        for n in 1..=IV_MAX_ITER {
            mid = 0.5 * (low + high);
            iterations = n;
            let mid_price = self.price(spot, strike, days, mid, ty);
            if (price - mid_price).abs() < IV_TOLERANCE {
                converged = true;
                break;
            }
            if mid_price > price {
                high = mid;
            } else {
                low = mid;
            }
        }

        ImpliedVol {
            vol: mid,
            converged,
            iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_atm_call_price() {
        let bs = BlackScholes::new(0.05, 0.0);
        // S=100, K=100, T=1y, vol=20%: ~10.45.
        let price = bs.price(100.0, 100.0, 365.0, 0.20, OptionType::Call);
        assert!(price > 9.0 && price < 12.0);
    }

    #[test]
    fn test_put_call_parity() {
        let bs = BlackScholes::new(0.03, 0.01);
        for &(spot, strike, days, vol) in &[
            (100.0, 100.0, 365.0, 0.20),
            (100.0, 90.0, 30.0, 0.45),
            (250.0, 260.0, 180.0, 0.12),
        ] {
            let t = days / DAYS_PER_YEAR;
            let call = bs.price(spot, strike, days, vol, OptionType::Call);
            let put = bs.price(spot, strike, days, vol, OptionType::Put);
            let rhs = spot * (-bs.dividend * t).exp() - strike * (-bs.rate * t).exp();
            assert_relative_eq!(call - put, rhs, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_delta_bounds_and_parity() {
        let bs = BlackScholes::new(0.05, 0.0);
        let call = bs.delta(100.0, 100.0, 180.0, 0.25, OptionType::Call);
        let put = bs.delta(100.0, 100.0, 180.0, 0.25, OptionType::Put);
        assert!(call > 0.0 && call < 1.0);
        assert!(put > -1.0 && put < 0.0);
        // With no dividend, call delta - put delta = 1.
        assert_relative_eq!(call - put, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_expired_falls_back_to_intrinsic() {
        let bs = BlackScholes::new(0.05, 0.0);
        assert_eq!(bs.price(105.0, 100.0, 0.0, 0.2, OptionType::Call), 5.0);
        assert_eq!(bs.price(105.0, 100.0, 0.0, 0.2, OptionType::Put), 0.0);
        assert_eq!(bs.delta(95.0, 100.0, 0.0, 0.2, OptionType::Put), -1.0);
        assert_eq!(bs.gamma(100.0, 100.0, 0.0, 0.2), 0.0);
    }

    #[test]
    fn test_gamma_zero_at_vol_floor() {
        let bs = BlackScholes::new(0.0, 0.0);
        assert_eq!(bs.gamma(100.0, 100.0, 30.0, 0.0), 0.0);
        assert_eq!(bs.gamma(100.0, 100.0, 30.0, 1e-12), 0.0);
        assert!(bs.gamma(100.0, 100.0, 30.0, 0.2) > 0.0);
    }

    #[test]
    fn test_zero_vol_does_not_blow_up() {
        let bs = BlackScholes::new(0.0, 0.0);
        // Deep ITM put at zero vol is worth its intrinsic.
        let price = bs.price(80.0, 100.0, 30.0, 0.0, OptionType::Put);
        assert!(price.is_finite());
        assert_relative_eq!(price, 20.0, epsilon = 1e-6);
    }

    #[test]
    fn test_theta_negative_for_atm_long() {
        let bs = BlackScholes::new(0.0, 0.0);
        let theta = bs.theta(100.0, 100.0, 30.0, 0.2, OptionType::Call);
        assert!(theta < 0.0);
        // Per calendar day: small relative to price.
        let price = bs.price(100.0, 100.0, 30.0, 0.2, OptionType::Call);
        assert!(theta.abs() < price);
    }

    #[test]
    fn test_implied_vol_is_right_inverse() {
        let bs = BlackScholes::new(0.02, 0.01);
        for &vol in &[0.1, 0.25, 0.6, 1.5] {
            let price = bs.price(100.0, 105.0, 90.0, vol, OptionType::Put);
            let iv = bs.implied_vol(100.0, 105.0, 90.0, price, OptionType::Put);
            assert!(iv.converged);
            // Tolerance is on price, so allow a loose vol band.
            let recovered = bs.price(100.0, 105.0, 90.0, iv.vol, OptionType::Put);
            assert!((recovered - price).abs() < IV_TOLERANCE);
        }
    }

    #[test]
    fn test_implied_vol_flags_non_convergence() {
        let bs = BlackScholes::new(0.0, 0.0);
        // Price above any vol in [0, 2] can produce: cap is hit.
        let iv = bs.implied_vol(100.0, 100.0, 30.0, 90.0, OptionType::Call);
        assert!(!iv.converged);
        assert_eq!(iv.iterations, 20);
        assert!(iv.vol <= 2.0);
    }
}
