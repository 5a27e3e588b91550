//! Chain-level summary: totals, walls and the gamma flip.

use chain_core::StrikeExposure;
use serde::{Deserialize, Serialize};

use crate::exposure::Multipliers;
use crate::gamma_flip::find_gamma_flip;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureSummary {
    pub put_call_ratio: f64,
    pub call_multiplier: f64,
    pub put_multiplier: f64,
    pub total_call_open_interest: u64,
    pub total_put_open_interest: u64,
    pub net_gamma_exposure: f64,
    pub net_hedging_shares: f64,
    /// Strike with the most call open interest
    pub call_wall: Option<f64>,
    /// Strike with the most put open interest
    pub put_wall: Option<f64>,
    pub gamma_flip: Option<f64>,
}

/// Largest nonzero value wins; ties keep the lower strike.
fn wall(strikes: &[StrikeExposure], oi: impl Fn(&StrikeExposure) -> u64) -> Option<f64> {
    let mut best: Option<(f64, u64)> = None;
    for s in strikes {
        let value = oi(s);
        if value == 0 {
            continue;
        }
        match best {
            Some((_, top)) if value <= top => {}
            _ => best = Some((s.strike, value)),
        }
    }
    best.map(|(strike, _)| strike)
}

pub fn summarize(multipliers: &Multipliers, strikes: &[StrikeExposure]) -> ExposureSummary {
    ExposureSummary {
        put_call_ratio: multipliers.put_call_ratio,
        call_multiplier: multipliers.call,
        put_multiplier: multipliers.put,
        total_call_open_interest: strikes.iter().map(|s| s.call_open_interest).sum(),
        total_put_open_interest: strikes.iter().map(|s| s.put_open_interest).sum(),
        net_gamma_exposure: strikes.iter().map(|s| s.net_gamma_exposure).sum(),
        net_hedging_shares: strikes.iter().map(|s| s.net_hedging_shares).sum(),
        call_wall: wall(strikes, |s| s.call_open_interest),
        put_wall: wall(strikes, |s| s.put_open_interest),
        gamma_flip: find_gamma_flip(strikes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strike(k: f64, call_oi: u64, put_oi: u64, gex: f64) -> StrikeExposure {
        StrikeExposure {
            strike: k,
            call_open_interest: call_oi,
            put_open_interest: put_oi,
            net_hedging_shares: 1.0,
            net_gamma_exposure: gex,
            buy_pressure: 1.0,
            sell_pressure: 0.0,
        }
    }

    #[test]
    fn test_summary_levels() {
        let multipliers = Multipliers {
            put_call_ratio: 0.8,
            call: 0.6,
            put: 0.6,
        };
        let strikes = vec![
            strike(90.0, 10, 500, 40.0),
            strike(100.0, 300, 300, 10.0),
            strike(110.0, 800, 20, -60.0),
            strike(120.0, 800, 0, -10.0),
        ];
        let summary = summarize(&multipliers, &strikes);

        assert_eq!(summary.total_call_open_interest, 1910);
        assert_eq!(summary.total_put_open_interest, 820);
        assert_eq!(summary.call_wall, Some(110.0));
        assert_eq!(summary.put_wall, Some(90.0));
        assert_eq!(summary.net_gamma_exposure, -20.0);
        assert_eq!(summary.net_hedging_shares, 4.0);
        let flip = summary.gamma_flip.unwrap();
        assert!(flip > 100.0 && flip < 110.0);
    }

    #[test]
    fn test_empty_summary() {
        let multipliers = Multipliers {
            put_call_ratio: 1.0,
            call: 0.6,
            put: 0.6,
        };
        let summary = summarize(&multipliers, &[]);
        assert_eq!(summary.call_wall, None);
        assert_eq!(summary.put_wall, None);
        assert_eq!(summary.gamma_flip, None);
        assert_eq!(summary.net_gamma_exposure, 0.0);
    }
}
