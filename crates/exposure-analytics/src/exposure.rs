//! Dealer hedging exposure
//!
//! Open interest mixes hedged positions (covered calls, longs) with the naked
//! short exposure dealers actually hedge. A base multiplier keeps only the
//! hedged fraction, and the call side is discounted further when the put/call
//! ratio is high.

use chain_core::{Contract, DeltaData, OptionType, OptionsChain, StrikeExposure};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::pricing::{self, PricingParams};

/// Shares per contract
pub const CONTRACT_MULTIPLIER: f64 = 100.0;

/// Which per-contract quantity drives the exposure figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityBasis {
    #[default]
    OpenInterest,
    Volume,
}

impl QuantityBasis {
    pub fn quantity(&self, contract: &Contract) -> f64 {
        match self {
            QuantityBasis::OpenInterest => contract.open_interest as f64,
            QuantityBasis::Volume => contract.volume.unwrap_or(0) as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HedgingConfig {
    /// Fraction of open interest assumed to need dealer hedging
    pub base_multiplier: f64,
    /// Put/call ratio above which the call multiplier is discounted
    pub put_call_threshold: f64,
    /// Call multiplier reduction per unit of put/call ratio above the threshold
    pub call_discount_slope: f64,
    pub min_call_multiplier: f64,
    pub basis: QuantityBasis,
    pub pricing: PricingParams,
}

impl Default for HedgingConfig {
    fn default() -> Self {
        Self {
            base_multiplier: 0.6,
            put_call_threshold: 1.5,
            call_discount_slope: 0.1,
            min_call_multiplier: 0.4,
            basis: QuantityBasis::OpenInterest,
            pricing: PricingParams::default(),
        }
    }
}

/// Effective multipliers for one chain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Multipliers {
    pub put_call_ratio: f64,
    pub call: f64,
    pub put: f64,
}

pub struct HedgingExposure {
    config: HedgingConfig,
}

impl Default for HedgingExposure {
    fn default() -> Self {
        Self::new(HedgingConfig::default())
    }
}

impl HedgingExposure {
    pub fn new(config: HedgingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HedgingConfig {
        &self.config
    }

    /// Put/call ratio over the whole chain; 1 when there is no call quantity.
    pub fn put_call_ratio(&self, chain: &OptionsChain) -> f64 {
        let basis = self.config.basis;
        let calls: f64 = chain.calls.iter().map(|c| basis.quantity(c)).sum();
        let puts: f64 = chain.puts.iter().map(|c| basis.quantity(c)).sum();
        if calls > 0.0 {
            puts / calls
        } else {
            1.0
        }
    }

    pub fn call_multiplier(&self, put_call_ratio: f64) -> f64 {
        let cfg = &self.config;
        if put_call_ratio > cfg.put_call_threshold {
            let discounted =
                cfg.base_multiplier - cfg.call_discount_slope * (put_call_ratio - cfg.put_call_threshold);
            discounted.max(cfg.min_call_multiplier.min(cfg.base_multiplier))
        } else {
            cfg.base_multiplier
        }
    }

    pub fn multipliers(&self, chain: &OptionsChain) -> Multipliers {
        let put_call_ratio = self.put_call_ratio(chain);
        Multipliers {
            put_call_ratio,
            call: self.call_multiplier(put_call_ratio),
            put: self.config.base_multiplier,
        }
    }

    /// Per-contract hedging figures at `spot`, optionally for one expiration only.
    ///
    /// The put/call ratio, and so the multipliers, always come from the whole chain.
    pub fn compute(&self, chain: &OptionsChain, spot: f64, expiration: Option<u32>) -> Vec<DeltaData> {
        let multipliers = self.multipliers(chain);
        let pricing = self.config.pricing;

        let rows: Vec<DeltaData> = chain
            .contracts()
            .filter(|c| expiration.map_or(true, |days| c.expiration_days == days))
            .map(|c| {
                let vol = c.implied_volatility.unwrap_or(pricing.volatility);
                let greeks = pricing::greeks(
                    spot,
                    c.strike,
                    c.expiration_days,
                    vol,
                    pricing.risk_free_rate,
                    c.option_type,
                );
                let multiplier = match c.option_type {
                    OptionType::Call => multipliers.call,
                    OptionType::Put => multipliers.put,
                };
                let quantity = self.config.basis.quantity(c);

                let total_delta = greeks.delta * quantity * CONTRACT_MULTIPLIER * multiplier;
                let total_gamma = greeks.gamma * quantity * CONTRACT_MULTIPLIER * multiplier;
                let gamma_exposure = match c.option_type {
                    OptionType::Call => -total_gamma,
                    OptionType::Put => total_gamma,
                };

                DeltaData {
                    strike: c.strike,
                    option_type: c.option_type,
                    expiration_days: c.expiration_days,
                    open_interest: c.open_interest,
                    volume: c.volume,
                    delta: greeks.delta,
                    gamma: greeks.gamma,
                    hedging_shares: -total_delta,
                    gamma_exposure,
                }
            })
            .collect();

        tracing::debug!(
            "{}: {} delta rows (pcr {:.2}, call mult {:.2}, put mult {:.2})",
            chain.ticker,
            rows.len(),
            multipliers.put_call_ratio,
            multipliers.call,
            multipliers.put
        );

        rows
    }
}

fn strike_key(strike: f64) -> i64 {
    (strike * 100.0).round() as i64
}

/// Sum per-contract figures by strike, ascending.
///
/// Buy and sell pressure are accumulated from the signed per-contract values,
/// so offsetting calls and puts at one strike still show on both sides.
pub fn aggregate_by_strike(deltas: &[DeltaData]) -> Vec<StrikeExposure> {
    let mut by_strike: BTreeMap<i64, StrikeExposure> = BTreeMap::new();

    for d in deltas {
        let entry = by_strike.entry(strike_key(d.strike)).or_insert_with(|| StrikeExposure {
            strike: d.strike,
            call_open_interest: 0,
            put_open_interest: 0,
            net_hedging_shares: 0.0,
            net_gamma_exposure: 0.0,
            buy_pressure: 0.0,
            sell_pressure: 0.0,
        });

        match d.option_type {
            OptionType::Call => entry.call_open_interest += d.open_interest,
            OptionType::Put => entry.put_open_interest += d.open_interest,
        }
        entry.net_hedging_shares += d.hedging_shares;
        entry.net_gamma_exposure += d.gamma_exposure;
        entry.buy_pressure += d.hedging_shares.max(0.0);
        entry.sell_pressure += (-d.hedging_shares).max(0.0);
    }

    by_strike.into_values().collect()
}
