//! Placeholder chains for tickers with no obtainable real data.
//!
//! The shape is fixed (strikes within 30% of spot in 2% steps, a fixed
//! expiration ladder) and the open interest is random but concentrated at the
//! money. Every chain produced here carries [`ChainSource::Synthetic`].

use chain_core::{ChainSource, Contract, OptionType, OptionsChain};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

pub const SYNTHETIC_EXPIRATIONS: [u32; 7] = [7, 14, 21, 30, 45, 60, 90];

pub const DEFAULT_SPOT: f64 = 100.0;

/// Approximate reference prices for well-known underlyings
const REFERENCE_SPOTS: &[(&str, f64)] = &[
    ("SPY", 510.0),
    ("QQQ", 440.0),
    ("IWM", 205.0),
    ("DIA", 390.0),
    ("AAPL", 180.0),
    ("MSFT", 415.0),
    ("NVDA", 880.0),
    ("TSLA", 175.0),
    ("AMZN", 178.0),
    ("META", 500.0),
    ("GOOGL", 150.0),
    ("AMD", 170.0),
    ("BTC", 65000.0),
    ("ETH", 3500.0),
    ("SOL", 150.0),
];

/// Strike steps either side of spot (15 x 2% = 30%)
const STRIKE_STEPS: i32 = 15;
const STRIKE_STEP_PCT: f64 = 0.02;
const PEAK_OPEN_INTEREST: f64 = 5000.0;

pub struct SyntheticGenerator {
    rng: Mutex<StdRng>,
}

impl Default for SyntheticGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticGenerator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible output, for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn spot_for(ticker: &str) -> f64 {
        REFERENCE_SPOTS
            .iter()
            .find(|(t, _)| *t == ticker)
            .map(|(_, spot)| *spot)
            .unwrap_or(DEFAULT_SPOT)
    }

    pub fn generate(&self, ticker: &str) -> OptionsChain {
        let spot = Self::spot_for(ticker);
        let mut chain = OptionsChain::new(ticker, spot, ChainSource::Synthetic);
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        for &days in SYNTHETIC_EXPIRATIONS.iter() {
            // Nearer expirations carry more open interest
            let expiry_scale = 1.0 / (1.0 + days as f64 / 60.0);

            for step in -STRIKE_STEPS..=STRIKE_STEPS {
                let moneyness = step as f64 * STRIKE_STEP_PCT;
                let strike = round_strike(spot * (1.0 + moneyness));
                let atm_weight = (-moneyness.abs() / 0.08).exp();
                let smile_iv = 0.25 + 0.5 * moneyness * moneyness;

                for option_type in [OptionType::Call, OptionType::Put] {
                    // Calls skew to upside strikes, puts to downside
                    let skew = match option_type {
                        OptionType::Call if moneyness > 0.0 => 1.2,
                        OptionType::Put if moneyness < 0.0 => 1.3,
                        _ => 0.8,
                    };
                    let noise: f64 = rng.gen_range(0.6..1.4);
                    let oi = (PEAK_OPEN_INTEREST * atm_weight * expiry_scale * skew * noise).round() as u64
                        + rng.gen_range(0..50);
                    let volume = (oi as f64 * rng.gen_range(0.05..0.30)).round() as u64;
                    let iv = smile_iv + rng.gen_range(-0.01..0.01);

                    chain.push(
                        Contract::new(strike, oi, days, option_type)
                            .with_volume(Some(volume))
                            .with_implied_volatility(Some(iv)),
                    );
                }
            }
        }

        chain.implied_volatility = chain.average_implied_volatility();
        chain
    }
}

fn round_strike(strike: f64) -> f64 {
    (strike * 100.0).round() / 100.0
}
