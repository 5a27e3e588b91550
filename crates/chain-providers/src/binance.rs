use async_trait::async_trait;
use chain_core::{standard_days_until, InstrumentClass, OptionsChain, OptionsProvider, ProviderError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::fields::{lenient_f64, positive};
use crate::http::HttpFetcher;
use crate::instrument::{assemble_chain, parse_instrument_name, InstrumentRow};

const BASE_URL: &str = "https://eapi.binance.com/eapi/v1";

const SUPPORTED: &[&str] = &["BTC", "ETH", "BNB", "SOL", "XRP", "DOGE"];

/// Binance European options API. Open interest is served per expiration,
/// so one request is made for each standardized expiry found in the tickers.
#[derive(Clone)]
pub struct BinanceClient {
    http: HttpFetcher,
}

impl BinanceClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: HttpFetcher::new("binance", timeout),
        }
    }

    async fn tickers(&self) -> Result<Vec<OptionTicker>, ProviderError> {
        let url = format!("{}/ticker", BASE_URL);
        self.http.get_json(self.http.client().get(&url)).await
    }

    async fn open_interest(&self, base: &str, expiry: NaiveDate) -> Result<Vec<OpenInterest>, ProviderError> {
        let url = format!("{}/openInterest", BASE_URL);
        let expiration = expiry.format("%y%m%d").to_string();
        self.http
            .get_json(
                self.http
                    .client()
                    .get(&url)
                    .query(&[("underlyingAsset", base), ("expiration", expiration.as_str())]),
            )
            .await
    }

    async fn marks(&self) -> Result<Vec<MarkPrice>, ProviderError> {
        let url = format!("{}/mark", BASE_URL);
        self.http.get_json(self.http.client().get(&url)).await
    }

    async fn index_price(&self, base: &str) -> Result<Option<f64>, ProviderError> {
        let url = format!("{}/index", BASE_URL);
        let underlying = format!("{}USDT", base);
        let index: IndexPrice = self
            .http
            .get_json(self.http.client().get(&url).query(&[("underlying", underlying.as_str())]))
            .await?;
        Ok(positive(index.index_price))
    }
}

/// Standardized expirations listed for `base`, ascending.
pub(crate) fn standard_expiries(base: &str, tickers: &[OptionTicker], now: DateTime<Utc>) -> Vec<NaiveDate> {
    tickers
        .iter()
        .filter_map(|t| parse_instrument_name(&t.symbol))
        .filter(|p| p.base == base && standard_days_until(p.expiry, now).is_some())
        .map(|p| p.expiry)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Merge the per-expiry open interest responses. Partial coverage is
/// accepted, but a chain where every request failed would carry zero open
/// interest on every contract, so that is reported as a transport error.
pub(crate) fn combine_open_interest(
    base: &str,
    responses: Vec<(NaiveDate, Result<Vec<OpenInterest>, ProviderError>)>,
) -> Result<Vec<OpenInterest>, ProviderError> {
    let requested = responses.len();
    let mut rows = Vec::new();
    let mut failed = 0;
    let mut last_error = None;
    for (expiry, result) in responses {
        match result {
            Ok(batch) => rows.extend(batch),
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                tracing::debug!("binance open interest {} {} failed: {}", base, expiry, e);
                failed += 1;
                last_error = Some(e);
            }
        }
    }

    if requested > 0 && failed == requested {
        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        return Err(ProviderError::Transport(format!(
            "binance: open interest unavailable for {} ({} expirations failed, last: {})",
            base, failed, reason
        )));
    }
    Ok(rows)
}

pub(crate) fn build_chain(
    base: &str,
    spot: f64,
    tickers: Vec<OptionTicker>,
    open_interest: Vec<OpenInterest>,
    marks: Vec<MarkPrice>,
    now: DateTime<Utc>,
) -> Result<OptionsChain, ProviderError> {
    let oi_by_symbol: HashMap<String, f64> = open_interest
        .into_iter()
        .filter_map(|o| o.sum_open_interest.map(|v| (o.symbol, v)))
        .collect();
    let iv_by_symbol: HashMap<String, f64> = marks
        .into_iter()
        .filter_map(|m| m.mark_iv.map(|v| (m.symbol, v)))
        .collect();

    // The exercise price field is the underlying's settlement reference
    let spot = positive(Some(spot))
        .or_else(|| {
            tickers
                .iter()
                .filter(|t| t.symbol.split('-').next() == Some(base))
                .find_map(|t| positive(t.exercise_price))
        })
        .unwrap_or(0.0);

    let rows = tickers.into_iter().map(|t| InstrumentRow {
        open_interest: oi_by_symbol.get(&t.symbol).copied(),
        implied_volatility: iv_by_symbol.get(&t.symbol).copied(),
        volume: t.volume,
        name: t.symbol,
    });
    assemble_chain("binance", base, spot, rows, now)
}

#[async_trait]
impl OptionsProvider for BinanceClient {
    fn name(&self) -> &str {
        "binance"
    }

    fn instrument_class(&self) -> InstrumentClass {
        InstrumentClass::Crypto
    }

    fn supports(&self, ticker: &str) -> bool {
        SUPPORTED.contains(&ticker)
    }

    async fn fetch(&self, ticker: &str, now: DateTime<Utc>) -> Result<OptionsChain, ProviderError> {
        let tickers = self.tickers().await?;
        let expiries = standard_expiries(ticker, &tickers, now);
        if expiries.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "binance: no standard expirations for {}",
                ticker
            )));
        }

        let mut responses = Vec::with_capacity(expiries.len());
        for expiry in expiries {
            let result = self.open_interest(ticker, expiry).await;
            let rejected = matches!(&result, Err(e) if e.is_auth());
            responses.push((expiry, result));
            if rejected {
                break;
            }
        }
        let open_interest = combine_open_interest(ticker, responses)?;

        let marks = self.marks().await.unwrap_or_else(|e| {
            tracing::debug!("binance mark prices unavailable: {}", e);
            Vec::new()
        });
        let spot = self.index_price(ticker).await.ok().flatten().unwrap_or(0.0);

        build_chain(ticker, spot, tickers, open_interest, marks, now)
    }
}

// Response structures
#[derive(Debug, Deserialize)]
pub(crate) struct OptionTicker {
    symbol: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    volume: Option<f64>,
    #[serde(rename = "exercisePrice", default, deserialize_with = "lenient_f64")]
    exercise_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenInterest {
    symbol: String,
    #[serde(rename = "sumOpenInterest", default, deserialize_with = "lenient_f64")]
    sum_open_interest: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MarkPrice {
    symbol: String,
    #[serde(rename = "markIV", default, deserialize_with = "lenient_f64")]
    mark_iv: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct IndexPrice {
    #[serde(rename = "indexPrice", default, deserialize_with = "lenient_f64")]
    index_price: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TICKERS: &str = r#"[
        {"symbol": "BTC-240315-60000-C", "lastPrice": "2500", "volume": "14.6", "exercisePrice": "61987.3"},
        {"symbol": "BTC-240315-60000-P", "lastPrice": "900", "volume": "3", "exercisePrice": "61987.3"},
        {"symbol": "BTC-240329-65000-C", "lastPrice": "1500", "volume": "0", "exercisePrice": "61987.3"},
        {"symbol": "BTC-240308-60000-C", "lastPrice": "2100", "volume": "99", "exercisePrice": "61987.3"},
        {"symbol": "ETH-240315-3500-C", "lastPrice": "80", "volume": "5", "exercisePrice": "3400.1"}
    ]"#;

    const OPEN_INTEREST: &str = r#"[
        {"symbol": "BTC-240315-60000-C", "sumOpenInterest": "210.50", "sumOpenInterestUsd": "13000000", "timestamp": "1709280000000"},
        {"symbol": "BTC-240315-60000-P", "sumOpenInterest": "75.00", "sumOpenInterestUsd": "4600000", "timestamp": "1709280000000"}
    ]"#;

    const MARKS: &str = r#"[
        {"symbol": "BTC-240315-60000-C", "markPrice": "2510", "markIV": "0.5921"}
    ]"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_standard_expiries() {
        let tickers: Vec<OptionTicker> = serde_json::from_str(TICKERS).unwrap();
        let expiries = standard_expiries("BTC", &tickers, now());
        assert_eq!(
            expiries,
            vec![
                NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 29).unwrap()
            ]
        );
    }

    #[test]
    fn test_build_chain() {
        let chain = build_chain(
            "BTC",
            62010.0,
            serde_json::from_str(TICKERS).unwrap(),
            serde_json::from_str(OPEN_INTEREST).unwrap(),
            serde_json::from_str(MARKS).unwrap(),
            now(),
        )
        .unwrap();

        assert_eq!(chain.spot(), Some(62010.0));
        assert_eq!(chain.calls.len(), 2);
        assert_eq!(chain.puts.len(), 1);
        assert_eq!(chain.calls[0].open_interest, 211);
        assert_eq!(chain.calls[0].volume, Some(15));
        assert_eq!(chain.calls[0].implied_volatility, Some(0.5921));
        // Listed but no open interest reported
        assert_eq!(chain.calls[1].open_interest, 0);
    }

    #[test]
    fn test_open_interest_failures() {
        let mar15 = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let mar29 = NaiveDate::from_ymd_opt(2024, 3, 29).unwrap();
        let down = || -> Result<Vec<OpenInterest>, ProviderError> {
            Err(ProviderError::Transport("binance HTTP 503: unavailable".into()))
        };

        // One expiry missing still yields a chain
        let rows = combine_open_interest(
            "BTC",
            vec![(mar15, Ok(serde_json::from_str(OPEN_INTEREST).unwrap())), (mar29, down())],
        )
        .unwrap();
        assert_eq!(rows.len(), 2);

        // Every expiry failing must not pass for a chain with zero open interest
        let err = combine_open_interest("BTC", vec![(mar15, down()), (mar29, down())]).unwrap_err();
        assert!(matches!(err, ProviderError::Transport(ref m) if m.contains("open interest unavailable")));
        assert!(!err.is_auth());

        let err = combine_open_interest(
            "BTC",
            vec![(mar15, down()), (mar29, Err(ProviderError::Auth("binance HTTP 401".into())))],
        )
        .unwrap_err();
        assert!(err.is_auth());

        // Successful but empty responses are real zeros
        let rows = combine_open_interest("BTC", vec![(mar15, Ok(Vec::new()))]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_spot_falls_back_to_exercise_price() {
        let chain = build_chain(
            "BTC",
            0.0,
            serde_json::from_str(TICKERS).unwrap(),
            Vec::new(),
            Vec::new(),
            now(),
        )
        .unwrap();
        assert_eq!(chain.spot(), Some(61987.3));
    }
}
