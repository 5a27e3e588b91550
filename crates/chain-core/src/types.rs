use serde::{Deserialize, Serialize};

/// Option side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Parse the side codes vendors use ("C", "call", "CALL", "P", ...).
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "C" | "CALL" => Some(OptionType::Call),
            "P" | "PUT" => Some(OptionType::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Call => "call",
            OptionType::Put => "put",
        }
    }
}

/// One strike/expiration/side row as returned by a provider after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub strike: f64,
    pub open_interest: u64,
    #[serde(default)]
    pub volume: Option<u64>,
    #[serde(default)]
    pub implied_volatility: Option<f64>,
    /// Days from the query time to expiry, not a calendar date.
    pub expiration_days: u32,
    #[serde(rename = "type")]
    pub option_type: OptionType,
}

impl Contract {
    pub fn new(strike: f64, open_interest: u64, expiration_days: u32, option_type: OptionType) -> Self {
        Self {
            strike,
            open_interest,
            volume: None,
            implied_volatility: None,
            expiration_days,
            option_type,
        }
    }

    pub fn with_volume(mut self, volume: Option<u64>) -> Self {
        self.volume = volume;
        self
    }

    /// Non-positive or non-finite volatilities are dropped so the engine falls
    /// back to its configured flat volatility.
    pub fn with_implied_volatility(mut self, iv: Option<f64>) -> Self {
        self.implied_volatility = iv.filter(|v| v.is_finite() && *v > 0.0);
        self
    }
}

/// Where a chain came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "providers", rename_all = "snake_case")]
pub enum ChainSource {
    Provider(String),
    Merged(Vec<String>),
    Synthetic,
}

impl ChainSource {
    pub fn label(&self) -> String {
        match self {
            ChainSource::Provider(name) => name.clone(),
            ChainSource::Merged(names) => names.join("+"),
            ChainSource::Synthetic => "synthetic".to_string(),
        }
    }
}

/// Normalized options chain for one underlying. Replaced wholesale on refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsChain {
    pub ticker: String,
    #[serde(default)]
    pub company_name: Option<String>,
    /// Zero means unknown. Use [`OptionsChain::spot`] rather than reading this directly.
    pub spot_price: f64,
    #[serde(default)]
    pub change_24h: Option<f64>,
    #[serde(default)]
    pub change_24h_percent: Option<f64>,
    /// Index-level average implied volatility
    #[serde(default)]
    pub implied_volatility: Option<f64>,
    pub calls: Vec<Contract>,
    pub puts: Vec<Contract>,
    pub source: ChainSource,
}

impl OptionsChain {
    pub fn new(ticker: impl Into<String>, spot_price: f64, source: ChainSource) -> Self {
        Self {
            ticker: ticker.into(),
            company_name: None,
            spot_price,
            change_24h: None,
            change_24h_percent: None,
            implied_volatility: None,
            calls: Vec::new(),
            puts: Vec::new(),
            source,
        }
    }

    /// Spot price, with the zero sentinel mapped to `None`.
    pub fn spot(&self) -> Option<f64> {
        if self.spot_price.is_finite() && self.spot_price > 0.0 {
            Some(self.spot_price)
        } else {
            None
        }
    }

    pub fn push(&mut self, contract: Contract) {
        match contract.option_type {
            OptionType::Call => self.calls.push(contract),
            OptionType::Put => self.puts.push(contract),
        }
    }

    pub fn contracts(&self) -> impl Iterator<Item = &Contract> {
        self.calls.iter().chain(self.puts.iter())
    }

    pub fn len(&self) -> usize {
        self.calls.len() + self.puts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.puts.is_empty()
    }

    pub fn is_synthetic(&self) -> bool {
        self.source == ChainSource::Synthetic
    }

    /// Distinct expirations present, ascending.
    pub fn expirations(&self) -> Vec<u32> {
        let mut days: Vec<u32> = self.contracts().map(|c| c.expiration_days).collect();
        days.sort_unstable();
        days.dedup();
        days
    }

    /// Mean of the per-contract implied volatilities that are present.
    pub fn average_implied_volatility(&self) -> Option<f64> {
        let ivs: Vec<f64> = self.contracts().filter_map(|c| c.implied_volatility).collect();
        if ivs.is_empty() {
            None
        } else {
            Some(ivs.iter().sum::<f64>() / ivs.len() as f64)
        }
    }
}

/// Per-contract hedging figures. Derived on every analytics pass, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaData {
    pub strike: f64,
    #[serde(rename = "type")]
    pub option_type: OptionType,
    pub expiration_days: u32,
    pub open_interest: u64,
    pub volume: Option<u64>,
    pub delta: f64,
    pub gamma: f64,
    /// Positive = dealers must buy, negative = dealers must sell.
    pub hedging_shares: f64,
    /// Dealer-short convention: calls negative, puts positive.
    pub gamma_exposure: f64,
}

/// Per-strike aggregation of [`DeltaData`] across calls and puts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeExposure {
    pub strike: f64,
    pub call_open_interest: u64,
    pub put_open_interest: u64,
    pub net_hedging_shares: f64,
    pub net_gamma_exposure: f64,
    /// Sum of positive per-contract hedging shares at this strike
    pub buy_pressure: f64,
    /// Sum of magnitudes of negative per-contract hedging shares at this strike
    pub sell_pressure: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxPainResult {
    pub max_pain_strike: f64,
    /// Aggregate holder payoff at the winning strike, in currency units
    pub max_pain_value: f64,
    pub expiration_days: u32,
    pub total_open_interest: u64,
    pub strike_count: usize,
    pub is_reliable: bool,
    /// Why the result is flagged unreliable, if it is
    #[serde(default)]
    pub caveat: Option<String>,
}
