//! Closed-form Black-Scholes delta and gamma for a European contract.

use chain_core::OptionType;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;
use std::f64::consts::{PI, SQRT_2};

pub const DAYS_PER_YEAR: f64 = 365.0;

/// Flat-volatility pricing inputs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingParams {
    /// Annualized volatility used when a contract carries none
    pub volatility: f64,
    pub risk_free_rate: f64,
}

impl Default for PricingParams {
    fn default() -> Self {
        Self {
            volatility: 0.30,
            risk_free_rate: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
}

/// Standard normal CDF
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal PDF
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

pub fn years_to_expiry(expiration_days: u32) -> f64 {
    expiration_days as f64 / DAYS_PER_YEAR
}

pub fn d1(spot: f64, strike: f64, t: f64, vol: f64, rate: f64) -> f64 {
    ((spot / strike).ln() + (rate + 0.5 * vol * vol) * t) / (vol * t.sqrt())
}

fn intrinsic_delta(spot: f64, strike: f64, option_type: OptionType) -> f64 {
    match option_type {
        OptionType::Call => {
            if spot > strike {
                1.0
            } else {
                0.0
            }
        }
        OptionType::Put => {
            if spot < strike {
                -1.0
            } else {
                0.0
            }
        }
    }
}

/// Call: N(d1). Put: -N(-d1). At or past expiry the payoff indicator.
pub fn delta(spot: f64, strike: f64, t: f64, vol: f64, rate: f64, option_type: OptionType) -> f64 {
    if t <= 0.0 || vol <= 0.0 || spot <= 0.0 {
        return intrinsic_delta(spot, strike, option_type);
    }
    let d1 = d1(spot, strike, t, vol, rate);
    match option_type {
        OptionType::Call => norm_cdf(d1),
        OptionType::Put => -norm_cdf(-d1),
    }
}

/// Same for calls and puts. Zero when `t`, `spot` or `vol` is non-positive.
pub fn gamma(spot: f64, strike: f64, t: f64, vol: f64, rate: f64) -> f64 {
    if t <= 0.0 || spot <= 0.0 || vol <= 0.0 {
        return 0.0;
    }
    let d1 = d1(spot, strike, t, vol, rate);
    norm_pdf(d1) / (spot * vol * t.sqrt())
}

pub fn greeks(
    spot: f64,
    strike: f64,
    expiration_days: u32,
    vol: f64,
    rate: f64,
    option_type: OptionType,
) -> Greeks {
    let t = years_to_expiry(expiration_days);
    Greeks {
        delta: delta(spot, strike, t, vol, rate, option_type),
        gamma: gamma(spot, strike, t, vol, rate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_norm_cdf_reference_values() {
        assert_abs_diff_eq!(norm_cdf(0.0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(norm_cdf(1.96), 0.9750021, epsilon = 1e-6);
        assert_abs_diff_eq!(norm_cdf(-1.0), 0.1586553, epsilon = 1e-6);
    }

    #[test]
    fn test_atm_one_year_reference() {
        // d1 = (0 + 0.07) / 0.2 = 0.35
        let g = greeks(100.0, 100.0, 365, 0.2, 0.05, OptionType::Call);
        assert_abs_diff_eq!(g.delta, 0.6368307, epsilon = 1e-6);
        assert_abs_diff_eq!(g.gamma, 0.0187620, epsilon = 1e-6);
    }

    #[test]
    fn test_put_call_delta_parity() {
        for &(s, k, days, vol, r) in &[
            (100.0, 100.0, 30, 0.3, 0.05),
            (450.0, 500.0, 7, 0.18, 0.04),
            (65000.0, 60000.0, 90, 0.65, 0.0),
            (20.0, 35.0, 365, 1.2, 0.05),
        ] {
            let call = greeks(s, k, days, vol, r, OptionType::Call);
            let put = greeks(s, k, days, vol, r, OptionType::Put);
            assert_abs_diff_eq!(call.delta - put.delta, 1.0, epsilon = 1e-6);
            assert_abs_diff_eq!(call.gamma, put.gamma, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_delta_range() {
        for strike in [50.0, 90.0, 100.0, 110.0, 200.0] {
            let c = delta(100.0, strike, 0.25, 0.3, 0.05, OptionType::Call);
            let p = delta(100.0, strike, 0.25, 0.3, 0.05, OptionType::Put);
            assert!((0.0..=1.0).contains(&c));
            assert!((-1.0..=0.0).contains(&p));
        }
    }

    #[test]
    fn test_expiry_boundary() {
        assert_eq!(delta(105.0, 100.0, 0.0, 0.3, 0.05, OptionType::Call), 1.0);
        assert_eq!(delta(95.0, 100.0, 0.0, 0.3, 0.05, OptionType::Call), 0.0);
        assert_eq!(delta(95.0, 100.0, 0.0, 0.3, 0.05, OptionType::Put), -1.0);
        assert_eq!(delta(105.0, 100.0, 0.0, 0.3, 0.05, OptionType::Put), 0.0);
        assert_eq!(gamma(100.0, 100.0, 0.0, 0.3, 0.05), 0.0);
    }

    #[test]
    fn test_delta_converges_to_indicator() {
        let t = 1e-8;
        assert_abs_diff_eq!(delta(105.0, 100.0, t, 0.3, 0.05, OptionType::Call), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(delta(95.0, 100.0, t, 0.3, 0.05, OptionType::Call), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(delta(95.0, 100.0, t, 0.3, 0.05, OptionType::Put), -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(delta(105.0, 100.0, t, 0.3, 0.05, OptionType::Put), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_gamma_zero_guards() {
        assert_eq!(gamma(0.0, 100.0, 0.5, 0.3, 0.05), 0.0);
        assert_eq!(gamma(100.0, 100.0, 0.5, 0.0, 0.05), 0.0);
        assert_eq!(gamma(100.0, 100.0, -1.0, 0.3, 0.05), 0.0);
    }
}
