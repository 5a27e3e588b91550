//! Max pain: the settlement strike minimizing aggregate option-holder payoff.

use chain_core::{MaxPainResult, OptionType, OptionsChain};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::exposure::CONTRACT_MULTIPLIER;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaxPainConfig {
    /// Fewer distinct strikes than this marks the result unreliable
    pub min_strikes: usize,
    /// Max relative distance between the winning strike and spot
    pub max_spot_distance: f64,
    /// Multi-expiration variant: only expirations within this many days
    pub horizon_days: u32,
    /// Multi-expiration variant: at most this many expirations
    pub max_expirations: usize,
}

impl Default for MaxPainConfig {
    fn default() -> Self {
        Self {
            min_strikes: 8,
            max_spot_distance: 0.40,
            horizon_days: 60,
            max_expirations: 4,
        }
    }
}

/// Open interest per strike for one expiration: (strike, call OI, put OI), ascending.
fn strike_ladder(chain: &OptionsChain, expiration_days: u32) -> Vec<(f64, u64, u64)> {
    let mut ladder: BTreeMap<i64, (f64, u64, u64)> = BTreeMap::new();
    for c in chain.contracts().filter(|c| c.expiration_days == expiration_days) {
        let entry = ladder
            .entry((c.strike * 100.0).round() as i64)
            .or_insert((c.strike, 0, 0));
        match c.option_type {
            OptionType::Call => entry.1 += c.open_interest,
            OptionType::Put => entry.2 += c.open_interest,
        }
    }
    ladder.into_values().collect()
}

fn pain_at(ladder: &[(f64, u64, u64)], price: f64) -> f64 {
    ladder
        .iter()
        .map(|&(strike, call_oi, put_oi)| {
            if strike < price {
                call_oi as f64 * (price - strike) * CONTRACT_MULTIPLIER
            } else if strike > price {
                put_oi as f64 * (strike - price) * CONTRACT_MULTIPLIER
            } else {
                0.0
            }
        })
        .sum()
}

/// Max pain for one expiration. `None` when no contract matches it.
pub fn max_pain_for_expiration(
    chain: &OptionsChain,
    expiration_days: u32,
    config: &MaxPainConfig,
) -> Option<MaxPainResult> {
    let ladder = strike_ladder(chain, expiration_days);
    if ladder.is_empty() {
        return None;
    }

    // Strict comparison: ties keep the lowest strike
    let mut best_strike = ladder[0].0;
    let mut best_pain = f64::INFINITY;
    for &(candidate, _, _) in &ladder {
        let pain = pain_at(&ladder, candidate);
        if pain < best_pain {
            best_pain = pain;
            best_strike = candidate;
        }
    }

    let total_open_interest: u64 = ladder.iter().map(|&(_, c, p)| c + p).sum();
    let strike_count = ladder.len();
    let min_strike = ladder[0].0;
    let max_strike = ladder[strike_count - 1].0;

    let caveat = if strike_count < config.min_strikes {
        Some(format!(
            "only {} strikes (need {})",
            strike_count, config.min_strikes
        ))
    } else if total_open_interest == 0 {
        Some("no open interest".to_string())
    } else if best_strike == min_strike || best_strike == max_strike {
        Some("max pain at the edge of the strike range".to_string())
    } else {
        chain.spot().and_then(|spot| {
            let distance = (best_strike - spot).abs() / spot;
            if distance > config.max_spot_distance {
                Some(format!(
                    "{:.0}% from spot (limit {:.0}%)",
                    distance * 100.0,
                    config.max_spot_distance * 100.0
                ))
            } else {
                None
            }
        })
    };

    Some(MaxPainResult {
        max_pain_strike: best_strike,
        max_pain_value: best_pain,
        expiration_days,
        total_open_interest,
        strike_count,
        is_reliable: caveat.is_none(),
        caveat,
    })
}

/// One result per expiration within the horizon, nearest first.
pub fn max_pain_by_expiration(chain: &OptionsChain, config: &MaxPainConfig) -> Vec<MaxPainResult> {
    chain
        .expirations()
        .into_iter()
        .filter(|&days| days <= config.horizon_days)
        .take(config.max_expirations)
        .filter_map(|days| max_pain_for_expiration(chain, days, config))
        .collect()
}
