//! Provider fallback cascade.
//!
//! Equity tickers try providers one at a time from a rotating start index and
//! stop at the first usable chain; an auth rejection marks the whole equity
//! class as failed until a forced refresh. Crypto tickers fan out to every
//! venue and merge whatever comes back. Both paths end in the synthetic
//! generator when no real data is available.

use chain_core::{ChainError, InstrumentClass, OptionsChain, OptionsProvider, ProviderError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::merge::merge_chains;
use crate::state::{SourceEvent, SourceState};
use crate::synthetic::SyntheticGenerator;

pub struct FetchCascade {
    equity: Vec<Arc<dyn OptionsProvider>>,
    crypto: Vec<Arc<dyn OptionsProvider>>,
    rotation: AtomicUsize,
    class_state: DashMap<InstrumentClass, SourceState>,
    synthetic: SyntheticGenerator,
    provider_timeout: Duration,
}

impl FetchCascade {
    /// Providers are split by their declared instrument class, keeping order.
    pub fn new(
        providers: Vec<Arc<dyn OptionsProvider>>,
        synthetic: SyntheticGenerator,
        provider_timeout: Duration,
    ) -> Self {
        let (equity, crypto): (Vec<_>, Vec<_>) = providers
            .into_iter()
            .partition(|p| p.instrument_class() == InstrumentClass::Equity);

        tracing::info!(
            "Fetch cascade: equity [{}], crypto [{}]",
            names(&equity),
            names(&crypto)
        );

        Self {
            equity,
            crypto,
            rotation: AtomicUsize::new(0),
            class_state: DashMap::new(),
            synthetic,
            provider_timeout,
        }
    }

    pub fn class_state(&self, class: InstrumentClass) -> SourceState {
        self.class_state.get(&class).map(|s| *s).unwrap_or_default()
    }

    fn transition(&self, class: InstrumentClass, event: SourceEvent) {
        let mut state = self.class_state.entry(class).or_default();
        *state = state.on(event);
    }

    /// Clear a sticky auth failure so the next fetch tries real providers again.
    pub fn reset(&self, class: InstrumentClass) {
        self.transition(class, SourceEvent::ForcedRefresh);
    }

    /// Synthetic chain without touching any provider.
    pub fn synthetic(&self, ticker: &str) -> OptionsChain {
        self.synthetic.generate(ticker)
    }

    /// Fetch a chain for a normalized ticker. Only fails if even the synthetic
    /// fallback comes back empty.
    pub async fn fetch(&self, ticker: &str, now: DateTime<Utc>) -> Result<OptionsChain, ChainError> {
        let class = InstrumentClass::of(ticker);
        let real = match class {
            InstrumentClass::Equity => self.fetch_equity(ticker, now).await,
            InstrumentClass::Crypto => self.fetch_crypto(ticker, now).await,
        };

        if let Some(chain) = real {
            return Ok(chain);
        }

        tracing::warn!("No real options data for {}, using synthetic chain", ticker);
        let chain = self.synthetic.generate(ticker);
        if chain.is_empty() {
            return Err(ChainError::Exhausted {
                ticker: ticker.to_string(),
                strategy: format!("{:?} providers and synthetic fallback", class).to_lowercase(),
            });
        }
        Ok(chain)
    }

    async fn call(
        &self,
        provider: &dyn OptionsProvider,
        ticker: &str,
        now: DateTime<Utc>,
    ) -> Result<OptionsChain, ProviderError> {
        match tokio::time::timeout(self.provider_timeout, provider.fetch(ticker, now)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.provider_timeout)),
        }
    }

    async fn fetch_equity(&self, ticker: &str, now: DateTime<Utc>) -> Option<OptionsChain> {
        if self.class_state(InstrumentClass::Equity) == SourceState::AuthFailed {
            tracing::debug!("Equity providers disabled after auth failure, skipping for {}", ticker);
            return None;
        }

        let candidates: Vec<&Arc<dyn OptionsProvider>> =
            self.equity.iter().filter(|p| p.supports(ticker)).collect();
        let n = candidates.len();
        if n == 0 {
            tracing::debug!("No equity providers configured for {}", ticker);
            return None;
        }

        let start = self.rotation.load(Ordering::Relaxed) % n;
        for offset in 0..n {
            let idx = (start + offset) % n;
            let provider = candidates[idx];
            match self.call(provider.as_ref(), ticker, now).await {
                Ok(chain) if !chain.is_empty() => {
                    self.rotation.store((idx + 1) % n, Ordering::Relaxed);
                    self.transition(InstrumentClass::Equity, SourceEvent::FetchSucceeded);
                    tracing::info!(
                        "{}: {} contracts for {} (spot {:.2})",
                        provider.name(),
                        chain.len(),
                        ticker,
                        chain.spot_price
                    );
                    return Some(chain);
                }
                Ok(_) => {
                    tracing::warn!("{} returned an empty chain for {}", provider.name(), ticker);
                }
                Err(e) if e.is_auth() => {
                    tracing::warn!(
                        "{} rejected credentials ({}), disabling equity providers until forced refresh",
                        provider.name(),
                        e
                    );
                    self.transition(InstrumentClass::Equity, SourceEvent::AuthRejected);
                    return None;
                }
                Err(e) => {
                    tracing::warn!("{} failed for {}: {}", provider.name(), ticker, e);
                }
            }
        }
        None
    }

    async fn fetch_crypto(&self, ticker: &str, now: DateTime<Utc>) -> Option<OptionsChain> {
        let providers: Vec<&Arc<dyn OptionsProvider>> =
            self.crypto.iter().filter(|p| p.supports(ticker)).collect();
        if providers.is_empty() {
            tracing::debug!("No crypto venues list {}", ticker);
            return None;
        }

        // Collect everything before merging
        let results = join_all(providers.iter().map(|p| self.call(p.as_ref(), ticker, now))).await;

        let mut chains = Vec::new();
        for (provider, result) in providers.iter().zip(results) {
            match result {
                Ok(chain) => {
                    tracing::info!("{}: {} contracts for {}", provider.name(), chain.len(), ticker);
                    chains.push(chain);
                }
                Err(e) => tracing::warn!("{} failed for {}: {}", provider.name(), ticker, e),
            }
        }

        merge_chains(ticker, chains)
    }
}

fn names(providers: &[Arc<dyn OptionsProvider>]) -> String {
    providers.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
}
