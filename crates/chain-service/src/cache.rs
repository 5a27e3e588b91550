//! In-memory chain cache.
//!
//! One entry per normalized ticker. Refreshes for the same ticker are
//! serialized through a per-ticker async mutex, and the staleness check is
//! repeated after the lock is taken so waiters reuse the winner's result.

use chain_core::{normalize_ticker, ChainError, ChainSource, InstrumentClass, OptionsChain};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cascade::FetchCascade;
use crate::schedule::RefreshSchedule;
use crate::state::{SourceEvent, SourceState};

/// Internal cache entry with timestamp
struct CacheEntry {
    chain: Arc<OptionsChain>,
    cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub ticker: String,
    pub cached_at: DateTime<Utc>,
    pub age_seconds: i64,
    /// e.g. "2h 5m ago"
    pub age: String,
    pub source: ChainSource,
    pub is_synthetic: bool,
    pub contracts: usize,
}

pub struct ChainCache {
    cascade: Arc<FetchCascade>,
    schedule: RefreshSchedule,
    entries: DashMap<String, CacheEntry>,
    ticker_state: DashMap<String, SourceState>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl ChainCache {
    pub fn new(cascade: Arc<FetchCascade>, schedule: RefreshSchedule) -> Self {
        Self {
            cascade,
            schedule,
            entries: DashMap::new(),
            ticker_state: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    pub fn schedule(&self) -> &RefreshSchedule {
        &self.schedule
    }

    /// Latest chain for `ticker`, refreshing through the cascade when stale
    /// or when `force` is set.
    pub async fn get(&self, ticker: &str, force: bool) -> Result<Arc<OptionsChain>, ChainError> {
        let ticker = normalize_ticker(ticker)?;
        self.get_at(&ticker, force, Utc::now()).await
    }

    pub(crate) async fn get_at(
        &self,
        ticker: &str,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<Arc<OptionsChain>, ChainError> {
        if !force {
            if let Some(chain) = self.fresh(ticker, now) {
                tracing::debug!("Cache hit for {}", ticker);
                return Ok(chain);
            }
        }

        let lock = self
            .inflight
            .entry(ticker.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if force {
            self.entries.remove(ticker);
            self.transition(ticker, SourceEvent::ForcedRefresh);
            self.cascade.reset(InstrumentClass::of(ticker));
        } else if let Some(chain) = self.fresh(ticker, now) {
            // Another request refreshed it while we waited
            return Ok(chain);
        }

        let chain = if self.ticker_state(ticker) == SourceState::SyntheticOnly {
            tracing::debug!("{} is synthetic-only, skipping providers", ticker);
            self.cascade.synthetic(ticker)
        } else {
            self.cascade.fetch(ticker, now).await?
        };

        let event = if chain.is_synthetic() {
            SourceEvent::FellBackToSynthetic
        } else {
            SourceEvent::FetchSucceeded
        };
        self.transition(ticker, event);

        tracing::info!(
            "Cached {} contracts for {} from {}",
            chain.len(),
            ticker,
            chain.source.label()
        );
        let chain = Arc::new(chain);
        self.entries.insert(
            ticker.to_string(),
            CacheEntry {
                chain: chain.clone(),
                cached_at: now,
            },
        );
        Ok(chain)
    }

    fn fresh(&self, ticker: &str, now: DateTime<Utc>) -> Option<Arc<OptionsChain>> {
        let entry = self.entries.get(ticker)?;
        if self.schedule.needs_refresh(Some(entry.cached_at), now) {
            None
        } else {
            Some(entry.chain.clone())
        }
    }

    fn transition(&self, ticker: &str, event: SourceEvent) {
        let mut state = self.ticker_state.entry(ticker.to_string()).or_default();
        *state = state.on(event);
    }

    #[cfg(test)]
    pub(crate) fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    pub fn ticker_state(&self, ticker: &str) -> SourceState {
        self.ticker_state.get(ticker).map(|s| *s).unwrap_or_default()
    }

    pub fn info(&self, ticker: &str) -> Option<CacheInfo> {
        let ticker = normalize_ticker(ticker).ok()?;
        self.info_at(&ticker, Utc::now())
    }

    pub(crate) fn info_at(&self, ticker: &str, now: DateTime<Utc>) -> Option<CacheInfo> {
        let entry = self.entries.get(ticker)?;
        Some(describe(ticker, &entry, now))
    }

    /// All cached entries, sorted by ticker.
    pub fn entries(&self) -> Vec<CacheInfo> {
        let now = Utc::now();
        let mut infos: Vec<CacheInfo> = self
            .entries
            .iter()
            .map(|e| describe(e.key(), e.value(), now))
            .collect();
        infos.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        infos
    }

    pub fn clear(&self, ticker: &str) {
        if let Ok(ticker) = normalize_ticker(ticker) {
            self.entries.remove(&ticker);
            self.ticker_state.remove(&ticker);
            self.inflight.remove(&ticker);
            tracing::info!("Cleared cache for {}", ticker);
        }
    }

    pub fn clear_all(&self) {
        let count = self.entries.len();
        self.entries.clear();
        self.ticker_state.clear();
        self.inflight.clear();
        tracing::info!("Cleared {} cached chains", count);
    }
}

fn describe(ticker: &str, entry: &CacheEntry, now: DateTime<Utc>) -> CacheInfo {
    let age_seconds = (now - entry.cached_at).num_seconds().max(0);
    CacheInfo {
        ticker: ticker.to_string(),
        cached_at: entry.cached_at,
        age_seconds,
        age: format_age(age_seconds),
        source: entry.chain.source.clone(),
        is_synthetic: entry.chain.is_synthetic(),
        contracts: entry.chain.len(),
    }
}

pub fn format_age(seconds: i64) -> String {
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;
    if seconds < 60 {
        "just now".to_string()
    } else if hours == 0 {
        format!("{}m ago", minutes)
    } else if days == 0 {
        format!("{}h {}m ago", hours, minutes % 60)
    } else {
        format!("{}d {}h ago", days, hours % 24)
    }
}
