use chain_core::{ChainError, ChainSource, DeltaData, MaxPainResult, OptionsChain, StrikeExposure};
use exposure_analytics::{
    aggregate_by_strike, max_pain_by_expiration, max_pain_for_expiration, summarize, ExposureSummary,
    HedgingExposure, MaxPainConfig,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ChainCache;

/// Per-contract and per-strike hedging figures for one ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaReport {
    pub ticker: String,
    pub company_name: Option<String>,
    pub spot_price: f64,
    pub source: ChainSource,
    pub is_synthetic: bool,
    /// Set when the report covers a single expiration
    pub expiration_days: Option<u32>,
    pub contracts: Vec<DeltaData>,
    pub strikes: Vec<StrikeExposure>,
    pub summary: ExposureSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationSelector {
    Nearest,
    Days(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxPainReport {
    pub ticker: String,
    pub spot_price: Option<f64>,
    pub is_synthetic: bool,
    pub result: MaxPainResult,
    /// Expirations the caller may pick from
    pub available_expirations: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GammaFlipReport {
    pub ticker: String,
    pub spot_price: f64,
    pub is_synthetic: bool,
    pub gamma_flip: Option<f64>,
    pub net_gamma_exposure: f64,
    /// Spot above the flip means dealers are long gamma
    pub spot_above_flip: Option<bool>,
}

/// Analytics over cached chains. Every request is bounded by `request_timeout`.
pub struct ExposureEngine {
    cache: Arc<ChainCache>,
    hedging: HedgingExposure,
    max_pain: MaxPainConfig,
    request_timeout: Duration,
}

impl ExposureEngine {
    pub fn new(
        cache: Arc<ChainCache>,
        hedging: HedgingExposure,
        max_pain: MaxPainConfig,
        request_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            hedging,
            max_pain,
            request_timeout,
        }
    }

    pub fn cache(&self) -> &ChainCache {
        &self.cache
    }

    async fn bounded<T>(&self, ticker: &str, fut: impl Future<Output = Result<T, ChainError>>) -> Result<T, ChainError> {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Timeout {
                ticker: ticker.to_string(),
                timeout: self.request_timeout,
            }),
        }
    }

    pub async fn chain(&self, ticker: &str, force_refresh: bool) -> Result<Arc<OptionsChain>, ChainError> {
        self.bounded(ticker, self.cache.get(ticker, force_refresh)).await
    }

    pub async fn deltas(&self, ticker: &str, expiration_days: Option<u32>) -> Result<DeltaReport, ChainError> {
        let chain = self.chain(ticker, false).await?;
        self.delta_report(&chain, expiration_days)
    }

    pub fn delta_report(&self, chain: &OptionsChain, expiration_days: Option<u32>) -> Result<DeltaReport, ChainError> {
        let spot = chain
            .spot()
            .ok_or_else(|| ChainError::MissingSpot(chain.ticker.clone()))?;
        if let Some(days) = expiration_days {
            if !chain.expirations().contains(&days) {
                return Err(ChainError::NoExpiration {
                    ticker: chain.ticker.clone(),
                    days,
                });
            }
        }

        let contracts = self.hedging.compute(chain, spot, expiration_days);
        let strikes = aggregate_by_strike(&contracts);
        let summary = summarize(&self.hedging.multipliers(chain), &strikes);

        Ok(DeltaReport {
            ticker: chain.ticker.clone(),
            company_name: chain.company_name.clone(),
            spot_price: spot,
            source: chain.source.clone(),
            is_synthetic: chain.is_synthetic(),
            expiration_days,
            contracts,
            strikes,
            summary,
        })
    }

    pub async fn max_pain(&self, ticker: &str, selector: ExpirationSelector) -> Result<MaxPainReport, ChainError> {
        let chain = self.chain(ticker, false).await?;
        self.max_pain_report(&chain, selector)
    }

    pub fn max_pain_report(&self, chain: &OptionsChain, selector: ExpirationSelector) -> Result<MaxPainReport, ChainError> {
        let available_expirations = chain.expirations();
        let result = match selector {
            ExpirationSelector::Days(days) => max_pain_for_expiration(chain, days, &self.max_pain),
            // Nearest within the horizon, else simply the nearest listed
            ExpirationSelector::Nearest => max_pain_by_expiration(chain, &self.max_pain)
                .into_iter()
                .next()
                .or_else(|| {
                    available_expirations
                        .first()
                        .and_then(|&days| max_pain_for_expiration(chain, days, &self.max_pain))
                }),
        };

        let result = result.ok_or_else(|| match selector {
            ExpirationSelector::Days(days) => ChainError::NoExpiration {
                ticker: chain.ticker.clone(),
                days,
            },
            ExpirationSelector::Nearest => ChainError::Exhausted {
                ticker: chain.ticker.clone(),
                strategy: "max pain: chain has no contracts".to_string(),
            },
        })?;

        Ok(MaxPainReport {
            ticker: chain.ticker.clone(),
            spot_price: chain.spot(),
            is_synthetic: chain.is_synthetic(),
            result,
            available_expirations,
        })
    }

    /// One result per expiration within the configured horizon.
    pub async fn max_pain_ladder(&self, ticker: &str) -> Result<Vec<MaxPainResult>, ChainError> {
        let chain = self.chain(ticker, false).await?;
        Ok(max_pain_by_expiration(&chain, &self.max_pain))
    }

    pub async fn gamma_flip(&self, ticker: &str) -> Result<GammaFlipReport, ChainError> {
        let chain = self.chain(ticker, false).await?;
        let report = self.delta_report(&chain, None)?;
        let gamma_flip = report.summary.gamma_flip;

        Ok(GammaFlipReport {
            ticker: report.ticker,
            spot_price: report.spot_price,
            is_synthetic: report.is_synthetic,
            gamma_flip,
            net_gamma_exposure: report.summary.net_gamma_exposure,
            spot_above_flip: gamma_flip.map(|flip| report.spot_price > flip),
        })
    }
}
