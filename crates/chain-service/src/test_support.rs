use async_trait::async_trait;
use chain_core::{ChainSource, Contract, InstrumentClass, OptionType, OptionsChain, OptionsProvider, ProviderError};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cascade::FetchCascade;
use crate::synthetic::SyntheticGenerator;

#[derive(Clone)]
pub enum Behavior {
    /// Chain with strikes 80..=120 step 5 around `spot`
    Chain { spot: f64, open_interest: u64 },
    Fail(ProviderError),
    Hang,
}

/// Provider double that counts its calls.
pub struct StubProvider {
    name: String,
    class: InstrumentClass,
    behavior: Behavior,
    delay: Option<Duration>,
    pub calls: Arc<AtomicUsize>,
}

impl StubProvider {
    pub fn new(name: &str, class: InstrumentClass, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            class,
            behavior,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn equity(name: &str, behavior: Behavior) -> Self {
        Self::new(name, InstrumentClass::Equity, behavior)
    }

    pub fn crypto(name: &str, behavior: Behavior) -> Self {
        Self::new(name, InstrumentClass::Crypto, behavior)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

pub fn sample_chain(ticker: &str, spot: f64, open_interest: u64, provider: &str) -> OptionsChain {
    let mut chain = OptionsChain::new(ticker, spot, ChainSource::Provider(provider.to_string()));
    for step in 0..9 {
        let strike = spot * (0.8 + 0.05 * step as f64);
        chain.push(Contract::new(strike, open_interest, 30, OptionType::Call));
        chain.push(Contract::new(strike, open_interest, 30, OptionType::Put));
    }
    chain
}

#[async_trait]
impl OptionsProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn instrument_class(&self) -> InstrumentClass {
        self.class
    }

    async fn fetch(&self, ticker: &str, _now: DateTime<Utc>) -> Result<OptionsChain, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behavior {
            Behavior::Chain { spot, open_interest } => Ok(sample_chain(ticker, *spot, *open_interest, &self.name)),
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::Transport("unreachable".to_string()))
            }
        }
    }
}

pub fn cascade_of(providers: Vec<StubProvider>, provider_timeout: Duration) -> FetchCascade {
    let providers: Vec<Arc<dyn OptionsProvider>> = providers
        .into_iter()
        .map(|p| Arc::new(p) as Arc<dyn OptionsProvider>)
        .collect();
    FetchCascade::new(providers, SyntheticGenerator::seeded(1), provider_timeout)
}

pub fn calls(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
