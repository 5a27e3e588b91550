//! Crypto multi-venue merge.
//!
//! Contracts sharing (strike, expiration) within one side are collapsed by
//! summing open interest and volume. Implied volatility becomes the
//! open-interest-weighted mean of the venues that quoted one. Spot is taken
//! from the last chain, in provider order, with a known price.

use chain_core::{ChainSource, Contract, OptionType, OptionsChain};
use std::collections::BTreeMap;

#[derive(Default)]
struct MergedContract {
    strike: f64,
    open_interest: u64,
    volume: Option<u64>,
    iv_weighted: f64,
    iv_weight: f64,
    iv_plain: Vec<f64>,
}

impl MergedContract {
    fn add(&mut self, c: &Contract) {
        self.strike = c.strike;
        self.open_interest += c.open_interest;
        if let Some(v) = c.volume {
            self.volume = Some(self.volume.unwrap_or(0) + v);
        }
        if let Some(iv) = c.implied_volatility {
            self.iv_weighted += iv * c.open_interest as f64;
            self.iv_weight += c.open_interest as f64;
            self.iv_plain.push(iv);
        }
    }

    fn implied_volatility(&self) -> Option<f64> {
        if self.iv_weight > 0.0 {
            Some(self.iv_weighted / self.iv_weight)
        } else if !self.iv_plain.is_empty() {
            Some(self.iv_plain.iter().sum::<f64>() / self.iv_plain.len() as f64)
        } else {
            None
        }
    }
}

fn merge_side<'a>(contracts: impl Iterator<Item = &'a Contract>, option_type: OptionType) -> Vec<Contract> {
    let mut by_key: BTreeMap<(i64, u32), MergedContract> = BTreeMap::new();
    for c in contracts {
        let key = ((c.strike * 100.0).round() as i64, c.expiration_days);
        by_key.entry(key).or_default().add(c);
    }
    by_key
        .into_iter()
        .map(|((_, days), m)| {
            Contract::new(m.strike, m.open_interest, days, option_type)
                .with_volume(m.volume)
                .with_implied_volatility(m.implied_volatility())
        })
        .collect()
}

/// Merge successful venue chains for one underlying. `None` when there is
/// nothing to merge.
pub fn merge_chains(ticker: &str, chains: Vec<OptionsChain>) -> Option<OptionsChain> {
    let chains: Vec<OptionsChain> = chains.into_iter().filter(|c| !c.is_empty()).collect();
    if chains.is_empty() {
        return None;
    }

    let spot = chains.iter().rev().find_map(|c| c.spot()).unwrap_or(0.0);
    let providers: Vec<String> = chains.iter().map(|c| c.source.label()).collect();
    let source = if providers.len() == 1 {
        chains[0].source.clone()
    } else {
        ChainSource::Merged(providers)
    };

    let mut merged = OptionsChain::new(ticker, spot, source);
    merged.company_name = chains.iter().find_map(|c| c.company_name.clone());
    merged.change_24h = chains.iter().find_map(|c| c.change_24h);
    merged.change_24h_percent = chains.iter().find_map(|c| c.change_24h_percent);
    merged.calls = merge_side(chains.iter().flat_map(|c| c.calls.iter()), OptionType::Call);
    merged.puts = merge_side(chains.iter().flat_map(|c| c.puts.iter()), OptionType::Put);
    merged.implied_volatility = merged.average_implied_volatility();

    Some(merged)
}
