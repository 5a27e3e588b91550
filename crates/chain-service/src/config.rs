use anyhow::{bail, Context, Result};
use chain_core::{normalize_ticker, OptionsProvider};
use chain_providers::{BinanceClient, BybitClient, DeribitClient, OkxClient, PolygonClient, TradierClient};
use chrono::NaiveTime;
use exposure_analytics::{HedgingConfig, HedgingExposure, MaxPainConfig, PricingParams};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ChainCache;
use crate::cascade::FetchCascade;
use crate::engine::ExposureEngine;
use crate::schedule::RefreshSchedule;
use crate::synthetic::SyntheticGenerator;

pub const KNOWN_CRYPTO_PROVIDERS: &[&str] = &["deribit", "okx", "bybit", "binance"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // Equity providers (absent key = not configured)
    #[serde(skip_serializing)]
    pub polygon_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub tradier_api_key: Option<String>,
    pub polygon_rate_limit: usize,     // requests per minute

    // Crypto venues, queried in this order
    pub crypto_providers: Vec<String>,

    // Timeouts
    pub provider_timeout_secs: u64,    // 10
    pub request_timeout_secs: u64,     // 30

    // Analytics
    pub default_volatility: f64,       // 0.30
    pub risk_free_rate: f64,           // 0.05
    pub hedge_base_multiplier: f64,    // 0.6
    pub max_pain_min_strikes: usize,   // 8
    pub max_pain_max_spot_distance: f64, // 0.40

    // Cache
    pub cache_max_age_hours: i64,      // 8
    pub refresh_lead_minutes: i64,     // 30
    pub refresh_schedule_utc: Vec<NaiveTime>,

    pub popular_tickers: Vec<String>,
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .unwrap_or_else(|| default.to_string())
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}", name))
}

fn optional_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn list_var(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> Vec<String> {
    lookup(name)
        .unwrap_or_else(|| default.to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let crypto_providers: Vec<String> = list_var(&lookup, "CRYPTO_PROVIDERS", "deribit,okx,bybit,binance")
            .into_iter()
            .map(|p| p.to_ascii_lowercase())
            .collect();
        for p in &crypto_providers {
            if !KNOWN_CRYPTO_PROVIDERS.contains(&p.as_str()) {
                bail!(
                    "Unknown crypto provider {:?} in CRYPTO_PROVIDERS (expected one of {})",
                    p,
                    KNOWN_CRYPTO_PROVIDERS.join(", ")
                );
            }
        }

        let schedule_raw = lookup("REFRESH_SCHEDULE_UTC").unwrap_or_else(|| "13:30,16:30,20:00".to_string());
        let refresh_schedule_utc = RefreshSchedule::parse_checkpoints(&schedule_raw)
            .with_context(|| format!("Invalid value for REFRESH_SCHEDULE_UTC: {:?}", schedule_raw))?;

        let popular_tickers = list_var(
            &lookup,
            "POPULAR_TICKERS",
            "SPY,QQQ,IWM,AAPL,MSFT,NVDA,TSLA,AMZN,META,GOOGL,BTC,ETH",
        )
        .iter()
        .map(|t| normalize_ticker(t).with_context(|| format!("Invalid ticker in POPULAR_TICKERS: {:?}", t)))
        .collect::<Result<Vec<_>>>()?;

        let config = Self {
            polygon_api_key: optional_var(&lookup, "POLYGON_API_KEY"),
            tradier_api_key: optional_var(&lookup, "TRADIER_API_KEY"),
            polygon_rate_limit: parse_var(&lookup, "POLYGON_RATE_LIMIT", "5")?,
            crypto_providers,
            provider_timeout_secs: parse_var(&lookup, "PROVIDER_TIMEOUT_SECS", "10")?,
            request_timeout_secs: parse_var(&lookup, "REQUEST_TIMEOUT_SECS", "30")?,
            default_volatility: parse_var(&lookup, "DEFAULT_VOLATILITY", "0.30")?,
            risk_free_rate: parse_var(&lookup, "RISK_FREE_RATE", "0.05")?,
            hedge_base_multiplier: parse_var(&lookup, "HEDGE_BASE_MULTIPLIER", "0.6")?,
            max_pain_min_strikes: parse_var(&lookup, "MAX_PAIN_MIN_STRIKES", "8")?,
            max_pain_max_spot_distance: parse_var(&lookup, "MAX_PAIN_MAX_SPOT_DISTANCE", "0.40")?,
            cache_max_age_hours: parse_var(&lookup, "CACHE_MAX_AGE_HOURS", "8")?,
            refresh_lead_minutes: parse_var(&lookup, "REFRESH_LEAD_MINUTES", "30")?,
            refresh_schedule_utc,
            popular_tickers,
        };

        if config.default_volatility <= 0.0 {
            bail!("DEFAULT_VOLATILITY must be positive");
        }
        if !(0.0..=1.0).contains(&config.hedge_base_multiplier) {
            bail!("HEDGE_BASE_MULTIPLIER must be between 0 and 1");
        }

        Ok(config)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn hedging(&self) -> HedgingConfig {
        HedgingConfig {
            base_multiplier: self.hedge_base_multiplier,
            pricing: PricingParams {
                volatility: self.default_volatility,
                risk_free_rate: self.risk_free_rate,
            },
            ..HedgingConfig::default()
        }
    }

    pub fn max_pain(&self) -> MaxPainConfig {
        MaxPainConfig {
            min_strikes: self.max_pain_min_strikes,
            max_spot_distance: self.max_pain_max_spot_distance,
            ..MaxPainConfig::default()
        }
    }

    pub fn schedule(&self) -> RefreshSchedule {
        RefreshSchedule::new(
            self.refresh_schedule_utc.clone(),
            chrono::Duration::minutes(self.refresh_lead_minutes),
            chrono::Duration::hours(self.cache_max_age_hours),
        )
    }

    /// Configured providers: keyed equity providers first, then crypto venues
    /// in configured order.
    pub fn providers(&self) -> Vec<Arc<dyn OptionsProvider>> {
        let timeout = self.provider_timeout();
        let mut providers: Vec<Arc<dyn OptionsProvider>> = Vec::new();

        if let Some(key) = &self.polygon_api_key {
            providers.push(Arc::new(PolygonClient::new(key.clone(), self.polygon_rate_limit, timeout)));
        }
        if let Some(key) = &self.tradier_api_key {
            providers.push(Arc::new(TradierClient::new(key.clone(), timeout)));
        }
        for name in &self.crypto_providers {
            let provider: Arc<dyn OptionsProvider> = match name.as_str() {
                "deribit" => Arc::new(DeribitClient::new(timeout)),
                "okx" => Arc::new(OkxClient::new(timeout)),
                "bybit" => Arc::new(BybitClient::new(timeout)),
                "binance" => Arc::new(BinanceClient::new(timeout)),
                other => {
                    tracing::warn!("Skipping unknown crypto provider {}", other);
                    continue;
                }
            };
            providers.push(provider);
        }

        if self.polygon_api_key.is_none() && self.tradier_api_key.is_none() {
            tracing::warn!("No equity provider keys configured, equity tickers will be synthetic");
        }
        providers
    }

    pub fn build_cache(&self) -> Arc<ChainCache> {
        let cascade = FetchCascade::new(self.providers(), SyntheticGenerator::new(), self.provider_timeout());
        Arc::new(ChainCache::new(Arc::new(cascade), self.schedule()))
    }

    pub fn build_engine(&self) -> ExposureEngine {
        ExposureEngine::new(
            self.build_cache(),
            HedgingExposure::new(self.hedging()),
            self.max_pain(),
            self.request_timeout(),
        )
    }
}
