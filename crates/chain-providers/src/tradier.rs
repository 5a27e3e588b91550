use async_trait::async_trait;
use chain_core::{
    standard_days_until, ChainSource, Contract, InstrumentClass, OptionType, OptionsChain, OptionsProvider,
    ProviderError,
};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::RequestBuilder;
use serde::Deserialize;
use std::time::Duration;

use crate::fields::{contract_count, lenient_f64, positive, OneOrMany};
use crate::http::HttpFetcher;

const BASE_URL: &str = "https://api.tradier.com/v1";

/// Only expirations this close are requested, one chain call each
const MAX_EXPIRATION_DAYS: u32 = 180;
const MAX_EXPIRATIONS: usize = 6;

#[derive(Clone)]
pub struct TradierClient {
    api_key: String,
    http: HttpFetcher,
}

impl TradierClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            api_key,
            http: HttpFetcher::new("tradier", timeout),
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .client()
            .get(format!("{}{}", BASE_URL, path))
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        let response: QuotesResponse = self
            .http
            .get_json(self.get("/markets/quotes").query(&[("symbols", symbol)]))
            .await?;
        response
            .quotes
            .and_then(|q| q.quote)
            .and_then(|q| q.into_vec().into_iter().next())
            .ok_or_else(|| ProviderError::NotFound(format!("tradier: unknown symbol {}", symbol)))
    }

    async fn get_expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>, ProviderError> {
        let response: ExpirationsResponse = self
            .http
            .get_json(self.get("/markets/options/expirations").query(&[("symbol", symbol)]))
            .await?;
        Ok(response
            .expirations
            .and_then(|e| e.date)
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .iter()
            .filter_map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .collect())
    }

    async fn get_chain(&self, symbol: &str, expiration: NaiveDate) -> Result<Vec<TradierOption>, ProviderError> {
        let expiration = expiration.format("%Y-%m-%d").to_string();
        let response: ChainResponse = self
            .http
            .get_json(self.get("/markets/options/chains").query(&[
                ("symbol", symbol),
                ("expiration", expiration.as_str()),
                ("greeks", "true"),
            ]))
            .await?;
        Ok(response
            .options
            .and_then(|o| o.option)
            .map(OneOrMany::into_vec)
            .unwrap_or_default())
    }
}

/// Standard expirations within the request window, nearest first.
pub(crate) fn select_expirations(mut dates: Vec<NaiveDate>, now: DateTime<Utc>) -> Vec<NaiveDate> {
    dates.sort_unstable();
    dates.dedup();
    dates
        .into_iter()
        .filter(|d| standard_days_until(*d, now).is_some_and(|days| days <= MAX_EXPIRATION_DAYS))
        .take(MAX_EXPIRATIONS)
        .collect()
}

pub(crate) fn build_chain(
    ticker: &str,
    quote: &Quote,
    options: Vec<TradierOption>,
    now: DateTime<Utc>,
) -> Result<OptionsChain, ProviderError> {
    let spot = positive(quote.last).or(positive(quote.prevclose)).unwrap_or(0.0);
    let mut chain = OptionsChain::new(ticker, spot, ChainSource::Provider("tradier".to_string()));
    chain.company_name = quote.description.clone();
    chain.change_24h = quote.change;
    chain.change_24h_percent = quote.change_percentage;

    for o in options {
        let Some(option_type) = o.option_type.as_deref().and_then(OptionType::from_code) else {
            continue;
        };
        let Some(strike) = positive(o.strike) else {
            continue;
        };
        let Some(days) = o
            .expiration_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .and_then(|d| standard_days_until(d, now))
        else {
            continue;
        };

        chain.push(
            Contract::new(strike, contract_count(o.open_interest).unwrap_or(0), days, option_type)
                .with_volume(contract_count(o.volume))
                .with_implied_volatility(o.greeks.and_then(|g| g.mid_iv)),
        );
    }

    if chain.is_empty() {
        return Err(ProviderError::NotFound(format!(
            "tradier: no standard expirations for {}",
            ticker
        )));
    }
    chain.implied_volatility = chain.average_implied_volatility();
    Ok(chain)
}

#[async_trait]
impl OptionsProvider for TradierClient {
    fn name(&self) -> &str {
        "tradier"
    }

    fn instrument_class(&self) -> InstrumentClass {
        InstrumentClass::Equity
    }

    async fn fetch(&self, ticker: &str, now: DateTime<Utc>) -> Result<OptionsChain, ProviderError> {
        let quote = self.get_quote(ticker).await?;
        let expirations = select_expirations(self.get_expirations(ticker).await?, now);
        if expirations.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "tradier: no standard expirations for {}",
                ticker
            )));
        }

        let mut options = Vec::new();
        for expiration in expirations {
            options.extend(self.get_chain(ticker, expiration).await?);
        }
        build_chain(ticker, &quote, options, now)
    }
}

// Response structures
#[derive(Debug, Deserialize)]
struct QuotesResponse {
    quotes: Option<QuoteList>,
}

#[derive(Debug, Deserialize)]
struct QuoteList {
    #[serde(default)]
    quote: Option<OneOrMany<Quote>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Quote {
    #[serde(default)]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    last: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    prevclose: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    change_percentage: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ExpirationsResponse {
    expirations: Option<ExpirationDates>,
}

#[derive(Debug, Deserialize)]
struct ExpirationDates {
    #[serde(default)]
    date: Option<OneOrMany<String>>,
}

#[derive(Debug, Deserialize)]
struct ChainResponse {
    options: Option<OptionList>,
}

#[derive(Debug, Deserialize)]
struct OptionList {
    #[serde(default)]
    option: Option<OneOrMany<TradierOption>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TradierOption {
    #[serde(default, deserialize_with = "lenient_f64")]
    strike: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    open_interest: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    volume: Option<f64>,
    #[serde(default)]
    option_type: Option<String>,
    #[serde(default)]
    expiration_date: Option<String>,
    #[serde(default)]
    greeks: Option<Greeks>,
}

#[derive(Debug, Clone, Deserialize)]
struct Greeks {
    #[serde(default, deserialize_with = "lenient_f64")]
    mid_iv: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const QUOTE: &str = r#"{"quotes": {"quote": {
        "symbol": "AAPL", "description": "Apple Inc", "last": 179.66, "change": -1.53,
        "change_percentage": -0.85, "prevclose": 181.19
    }}}"#;

    const UNMATCHED: &str = r#"{"quotes": {"unmatched_symbols": {"symbol": "ZZZZ"}}}"#;

    const CHAIN: &str = r#"{"options": {"option": [
        {"symbol": "AAPL240315C00180000", "strike": 180.0, "open_interest": 23110, "volume": 5120,
         "option_type": "call", "expiration_date": "2024-03-15", "greeks": {"delta": 0.48, "mid_iv": 0.231}},
        {"symbol": "AAPL240315P00175000", "strike": 175.0, "open_interest": 15400, "volume": 0,
         "option_type": "put", "expiration_date": "2024-03-15", "greeks": null},
        {"symbol": "AAPL240315X00170000", "strike": 170.0, "open_interest": 1,
         "option_type": "straddle", "expiration_date": "2024-03-15"}
    ]}}"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap()
    }

    fn quote() -> Quote {
        let response: QuotesResponse = serde_json::from_str(QUOTE).unwrap();
        response.quotes.unwrap().quote.unwrap().into_vec().remove(0)
    }

    #[test]
    fn test_build_chain() {
        let response: ChainResponse = serde_json::from_str(CHAIN).unwrap();
        let options = response.options.unwrap().option.unwrap().into_vec();
        let chain = build_chain("AAPL", &quote(), options, now()).unwrap();

        assert_eq!(chain.spot(), Some(179.66));
        assert_eq!(chain.company_name.as_deref(), Some("Apple Inc"));
        assert_eq!(chain.change_24h, Some(-1.53));
        assert_eq!(chain.calls.len(), 1);
        assert_eq!(chain.puts.len(), 1);
        assert_eq!(chain.calls[0].implied_volatility, Some(0.231));
        assert_eq!(chain.calls[0].expiration_days, 14);
        assert_eq!(chain.puts[0].implied_volatility, None);
    }

    #[test]
    fn test_unmatched_symbol_has_no_quote() {
        let response: QuotesResponse = serde_json::from_str(UNMATCHED).unwrap();
        assert!(response.quotes.unwrap().quote.is_none());
    }

    #[test]
    fn test_expirations_single_and_null() {
        let single: ExpirationsResponse =
            serde_json::from_str(r#"{"expirations": {"date": "2024-03-15"}}"#).unwrap();
        assert_eq!(single.expirations.unwrap().date.unwrap().into_vec().len(), 1);

        let none: ExpirationsResponse = serde_json::from_str(r#"{"expirations": null}"#).unwrap();
        assert!(none.expirations.is_none());
    }

    #[test]
    fn test_select_expirations() {
        let d = |m: u32, day: u32| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
        let dates = vec![d(3, 8), d(3, 15), d(3, 29), d(4, 19), d(3, 15), d(12, 20)];
        assert_eq!(select_expirations(dates, now()), vec![d(3, 15), d(3, 29), d(4, 19)]);
    }
}
