use async_trait::async_trait;
use chain_core::{
    standard_days_until, ChainSource, Contract, InstrumentClass, OptionType, OptionsChain, OptionsProvider,
    ProviderError,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::fields::{contract_count, positive};
use crate::http::HttpFetcher;

const BASE_URL: &str = "https://api.polygon.io";

/// Each options snapshot page holds at most 250 contracts
const PAGE_LIMIT: &str = "250";
const MAX_PAGES: usize = 20;

#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    http: HttpFetcher,
}

impl PolygonClient {
    /// `rate_limit` is requests per minute; free tier accounts should use 5.
    pub fn new(api_key: String, rate_limit: usize, timeout: Duration) -> Self {
        Self {
            api_key,
            http: HttpFetcher::new("polygon", timeout).with_rate_limit(rate_limit),
        }
    }

    /// Get snapshot for a ticker (last trade, today's bar, prev day, change)
    async fn get_snapshot(&self, symbol: &str) -> Result<SnapshotTicker, ProviderError> {
        let url = format!(
            "{}/v2/snapshot/locale/us/markets/stocks/tickers/{}",
            BASE_URL, symbol
        );
        let response: SnapshotResponse = self
            .http
            .get_json(self.http.client().get(&url).query(&[("apiKey", &self.api_key)]))
            .await?;
        response
            .ticker
            .ok_or_else(|| ProviderError::NotFound(format!("polygon: no snapshot for {}", symbol)))
    }

    /// Get the full options chain snapshot, following `next_url` cursors.
    async fn get_options_snapshot(&self, underlying: &str) -> Result<Vec<OptionsContractSnapshot>, ProviderError> {
        let url = format!("{}/v3/snapshot/options/{}", BASE_URL, underlying);
        let mut page: OptionsSnapshotResponse = self
            .http
            .get_json(
                self.http
                    .client()
                    .get(&url)
                    .query(&[("apiKey", self.api_key.as_str()), ("limit", PAGE_LIMIT)]),
            )
            .await?;

        let mut contracts = page.results.take().unwrap_or_default();
        let mut pages = 1;
        while let Some(next_url) = page.next_url.take() {
            if pages >= MAX_PAGES {
                tracing::warn!(
                    "Polygon options snapshot for {} truncated at {} pages ({} contracts)",
                    underlying,
                    MAX_PAGES,
                    contracts.len()
                );
                break;
            }
            // Cursor URLs do not carry the key
            page = self
                .http
                .get_json(self.http.client().get(&next_url).query(&[("apiKey", &self.api_key)]))
                .await?;
            contracts.extend(page.results.take().unwrap_or_default());
            pages += 1;
        }

        Ok(contracts)
    }

    async fn get_company_name(&self, symbol: &str) -> Result<Option<String>, ProviderError> {
        let url = format!("{}/v3/reference/tickers/{}", BASE_URL, symbol);
        let response: TickerDetailsResponse = self
            .http
            .get_json(self.http.client().get(&url).query(&[("apiKey", &self.api_key)]))
            .await?;
        Ok(response.results.and_then(|r| r.name))
    }
}

/// Normalize a Polygon options snapshot. Spot comes from the stock snapshot
/// (last trade, then today's close, then previous close) and falls back to the
/// underlying price embedded in the option rows.
pub(crate) fn build_chain(
    ticker: &str,
    snapshot: Option<&SnapshotTicker>,
    contracts: Vec<OptionsContractSnapshot>,
    now: DateTime<Utc>,
) -> Result<OptionsChain, ProviderError> {
    let spot = snapshot
        .and_then(|s| {
            positive(s.last_trade.as_ref().and_then(|t| t.p))
                .or_else(|| positive(s.day.as_ref().and_then(|d| d.c)))
                .or_else(|| positive(s.prev_day.as_ref().and_then(|d| d.c)))
        })
        .or_else(|| {
            contracts
                .iter()
                .find_map(|c| positive(c.underlying_asset.as_ref().and_then(|u| u.price)))
        })
        .unwrap_or(0.0);

    let mut chain = OptionsChain::new(ticker, spot, ChainSource::Provider("polygon".to_string()));
    if let Some(s) = snapshot {
        chain.change_24h = s.todays_change;
        chain.change_24h_percent = s.todays_change_perc;
    }

    let mut dropped = 0usize;
    for c in contracts {
        let Some(details) = c.details else {
            dropped += 1;
            continue;
        };
        let parsed = (|| {
            let option_type = OptionType::from_code(details.contract_type.as_deref()?)?;
            let strike = positive(details.strike_price)?;
            let expiry = NaiveDate::parse_from_str(details.expiration_date.as_deref()?, "%Y-%m-%d").ok()?;
            Some((option_type, strike, expiry))
        })();
        let Some((option_type, strike, expiry)) = parsed else {
            dropped += 1;
            continue;
        };
        let Some(days) = standard_days_until(expiry, now) else {
            continue;
        };

        chain.push(
            Contract::new(strike, contract_count(c.open_interest).unwrap_or(0), days, option_type)
                .with_volume(contract_count(c.day.and_then(|d| d.volume)))
                .with_implied_volatility(c.implied_volatility),
        );
    }

    if dropped > 0 {
        tracing::debug!("polygon: dropped {} malformed contracts for {}", dropped, ticker);
    }
    if chain.is_empty() {
        return Err(ProviderError::NotFound(format!(
            "polygon: no standard expirations for {}",
            ticker
        )));
    }

    chain.implied_volatility = chain.average_implied_volatility();
    Ok(chain)
}

#[async_trait]
impl OptionsProvider for PolygonClient {
    fn name(&self) -> &str {
        "polygon"
    }

    fn instrument_class(&self) -> InstrumentClass {
        InstrumentClass::Equity
    }

    async fn fetch(&self, ticker: &str, now: DateTime<Utc>) -> Result<OptionsChain, ProviderError> {
        let snapshot = match self.get_snapshot(ticker).await {
            Ok(s) => Some(s),
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                tracing::debug!("Polygon snapshot for {} unavailable: {}", ticker, e);
                None
            }
        };

        let contracts = self.get_options_snapshot(ticker).await?;
        if contracts.is_empty() {
            return Err(ProviderError::NotFound(format!("polygon: no options listed for {}", ticker)));
        }

        let mut chain = build_chain(ticker, snapshot.as_ref(), contracts, now)?;
        chain.company_name = self.get_company_name(ticker).await.ok().flatten();
        Ok(chain)
    }
}

// Options types
#[derive(Debug, Deserialize)]
struct OptionsSnapshotResponse {
    results: Option<Vec<OptionsContractSnapshot>>,
    #[serde(default)]
    next_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OptionsContractSnapshot {
    #[serde(default)]
    details: Option<OptionsDetails>,
    #[serde(default)]
    implied_volatility: Option<f64>,
    #[serde(default)]
    open_interest: Option<f64>,
    #[serde(default)]
    day: Option<OptionsDay>,
    #[serde(default)]
    underlying_asset: Option<UnderlyingAsset>,
}

#[derive(Debug, Clone, Deserialize)]
struct OptionsDetails {
    contract_type: Option<String>,
    strike_price: Option<f64>,
    expiration_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OptionsDay {
    volume: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct UnderlyingAsset {
    price: Option<f64>,
}

// Snapshot types
#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    ticker: Option<SnapshotTicker>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SnapshotTicker {
    day: Option<SnapshotDay>,
    #[serde(rename = "lastTrade")]
    last_trade: Option<SnapshotLastTrade>,
    #[serde(rename = "prevDay")]
    prev_day: Option<SnapshotDay>,
    #[serde(rename = "todaysChange")]
    todays_change: Option<f64>,
    #[serde(rename = "todaysChangePerc")]
    todays_change_perc: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct SnapshotDay {
    c: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct SnapshotLastTrade {
    p: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TickerDetailsResponse {
    results: Option<TickerDetails>,
}

#[derive(Debug, Deserialize)]
struct TickerDetails {
    name: Option<String>,
}
