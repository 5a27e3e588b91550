use async_trait::async_trait;
use chain_core::{InstrumentClass, OptionsChain, OptionsProvider, ProviderError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::fields::{lenient_f64, positive};
use crate::http::HttpFetcher;
use crate::instrument::{assemble_chain, InstrumentRow};

const BASE_URL: &str = "https://www.okx.com/api/v5";

const SUPPORTED: &[&str] = &["BTC", "ETH", "SOL"];

/// OKX public API. Open interest is required; IV and volume are best effort.
#[derive(Clone)]
pub struct OkxClient {
    http: HttpFetcher,
}

impl OkxClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: HttpFetcher::new("okx", timeout),
        }
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<T>, ProviderError> {
        let url = format!("{}{}", BASE_URL, path);
        let response: OkxResponse<T> = self
            .http
            .get_json(self.http.client().get(&url).query(query))
            .await?;
        response.into_data()
    }

    async fn spot_price(&self, base: &str) -> Option<f64> {
        let index_id = format!("{}-USD", base);
        let index: Result<Vec<IndexTicker>, _> =
            self.get_data("/market/index-tickers", &[("instId", index_id.as_str())]).await;
        if let Some(px) = index.ok().and_then(|rows| rows.into_iter().find_map(|r| positive(r.idx_px))) {
            return Some(px);
        }

        let spot_id = format!("{}-USDT", base);
        let ticker: Result<Vec<MarketTicker>, _> =
            self.get_data("/market/ticker", &[("instId", spot_id.as_str())]).await;
        ticker.ok().and_then(|rows| rows.into_iter().find_map(|r| positive(r.last)))
    }
}

/// Join open interest, option summary and ticker rows on `instId`.
pub(crate) fn build_chain(
    base: &str,
    spot: f64,
    open_interest: Vec<OpenInterest>,
    summaries: Vec<OptionSummary>,
    tickers: Vec<MarketTicker>,
    now: DateTime<Utc>,
) -> Result<OptionsChain, ProviderError> {
    let iv_by_id: HashMap<String, f64> = summaries
        .into_iter()
        .filter_map(|s| s.mark_vol.map(|v| (s.inst_id, v)))
        .collect();
    let volume_by_id: HashMap<String, f64> = tickers
        .into_iter()
        .filter_map(|t| t.vol_24h.map(|v| (t.inst_id, v)))
        .collect();

    // `oi` counts OKX contracts, not coins; rows without `oiCcy` cannot be
    // put on the same scale as the other venues
    let mut unsized_rows = 0usize;
    let rows: Vec<InstrumentRow> = open_interest
        .into_iter()
        .filter_map(|row| {
            let Some(oi_ccy) = row.oi_ccy else {
                unsized_rows += 1;
                return None;
            };
            Some(InstrumentRow {
                open_interest: Some(oi_ccy),
                volume: volume_by_id.get(&row.inst_id).copied(),
                implied_volatility: iv_by_id.get(&row.inst_id).copied(),
                name: row.inst_id,
            })
        })
        .collect();
    if unsized_rows > 0 {
        tracing::debug!("okx: dropped {} {} rows without coin open interest", unsized_rows, base);
    }
    assemble_chain("okx", base, spot, rows, now)
}

#[async_trait]
impl OptionsProvider for OkxClient {
    fn name(&self) -> &str {
        "okx"
    }

    fn instrument_class(&self) -> InstrumentClass {
        InstrumentClass::Crypto
    }

    fn supports(&self, ticker: &str) -> bool {
        SUPPORTED.contains(&ticker)
    }

    async fn fetch(&self, ticker: &str, now: DateTime<Utc>) -> Result<OptionsChain, ProviderError> {
        let family = format!("{}-USD", ticker);
        let open_interest: Vec<OpenInterest> = self
            .get_data(
                "/public/open-interest",
                &[("instType", "OPTION"), ("instFamily", family.as_str())],
            )
            .await?;

        let summaries: Vec<OptionSummary> = self
            .get_data("/public/opt-summary", &[("instFamily", family.as_str())])
            .await
            .unwrap_or_else(|e| {
                tracing::debug!("okx opt-summary unavailable for {}: {}", ticker, e);
                Vec::new()
            });
        let tickers: Vec<MarketTicker> = self
            .get_data(
                "/market/tickers",
                &[("instType", "OPTION"), ("instFamily", family.as_str())],
            )
            .await
            .unwrap_or_else(|e| {
                tracing::debug!("okx option tickers unavailable for {}: {}", ticker, e);
                Vec::new()
            });
        let spot = self.spot_price(ticker).await.unwrap_or(0.0);

        build_chain(ticker, spot, open_interest, summaries, tickers, now)
    }
}

// Response structures
#[derive(Debug, Deserialize)]
struct OkxResponse<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

impl<T> OkxResponse<T> {
    fn into_data(self) -> Result<Vec<T>, ProviderError> {
        if self.code == "0" {
            return Ok(self.data);
        }
        let msg = format!("okx {}: {}", self.code, self.msg);
        Err(match self.code.parse::<u32>() {
            Ok(50111..=50114) => ProviderError::Auth(msg),
            Ok(51001) => ProviderError::NotFound(msg),
            _ => ProviderError::Transport(msg),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenInterest {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "oiCcy", default, deserialize_with = "lenient_f64")]
    oi_ccy: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OptionSummary {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "markVol", default, deserialize_with = "lenient_f64")]
    mark_vol: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MarketTicker {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    last: Option<f64>,
    #[serde(rename = "vol24h", default, deserialize_with = "lenient_f64")]
    vol_24h: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct IndexTicker {
    #[serde(rename = "idxPx", default, deserialize_with = "lenient_f64")]
    idx_px: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const OPEN_INTEREST: &str = r#"{"code": "0", "msg": "", "data": [
        {"instId": "BTC-USD-240315-60000-C", "instType": "OPTION", "oi": "1200", "oiCcy": "12", "ts": "1709280000000"},
        {"instId": "BTC-USD-240315-60000-P", "instType": "OPTION", "oi": "800", "oiCcy": "", "ts": "1709280000000"},
        {"instId": "BTC-USD-240315-55000-P", "instType": "OPTION", "oi": "900", "oiCcy": "9", "ts": "1709280000000"},
        {"instId": "BTC-USD-240308-60000-C", "instType": "OPTION", "oi": "5000", "oiCcy": "50", "ts": "1709280000000"}
    ]}"#;

    const OPT_SUMMARY: &str = r#"{"code": "0", "msg": "", "data": [
        {"instId": "BTC-USD-240315-60000-C", "markVol": "0.5512", "delta": "0.55"},
        {"instId": "BTC-USD-240315-55000-P", "markVol": "", "delta": "-0.25"}
    ]}"#;

    const TICKERS: &str = r#"{"code": "0", "msg": "", "data": [
        {"instId": "BTC-USD-240315-60000-C", "last": "0.041", "vol24h": "35"}
    ]}"#;

    fn data<T: DeserializeOwned>(json: &str) -> Vec<T> {
        serde_json::from_str::<OkxResponse<T>>(json).unwrap().into_data().unwrap()
    }

    #[test]
    fn test_build_chain_joins_on_instrument() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let chain = build_chain(
            "BTC",
            62000.0,
            data(OPEN_INTEREST),
            data(OPT_SUMMARY),
            data(TICKERS),
            now,
        )
        .unwrap();

        assert_eq!(chain.calls.len(), 1);
        assert_eq!(chain.puts.len(), 1);
        let call = &chain.calls[0];
        assert_eq!(call.open_interest, 12);
        assert_eq!(call.volume, Some(35));
        assert_eq!(call.implied_volatility, Some(0.5512));
        assert_eq!(call.expiration_days, 14);

        // The 60000 put has no coin open interest and is dropped
        let put = &chain.puts[0];
        assert_eq!(put.strike, 55000.0);
        assert_eq!(put.open_interest, 9);
        assert_eq!(put.implied_volatility, None);
    }

    #[test]
    fn test_contract_count_never_used_as_coin_open_interest() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let open_interest = data(
            r#"{"code": "0", "data": [
                {"instId": "BTC-USD-240315-60000-C", "oi": "1200", "oiCcy": "12"},
                {"instId": "BTC-USD-240315-60000-P", "oi": "800"}
            ]}"#,
        );
        let chain = build_chain("BTC", 62000.0, open_interest, Vec::new(), Vec::new(), now).unwrap();
        assert_eq!(chain.len(), 1);
        assert!(chain.contracts().all(|c| c.open_interest <= 12));

        let only_counts = data(r#"{"code": "0", "data": [{"instId": "BTC-USD-240315-60000-P", "oi": "800", "oiCcy": ""}]}"#);
        let err = build_chain("BTC", 62000.0, only_counts, Vec::new(), Vec::new(), now).unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[test]
    fn test_error_codes() {
        let auth: OkxResponse<OpenInterest> =
            serde_json::from_str(r#"{"code": "50113", "msg": "Invalid Sign", "data": []}"#).unwrap();
        assert!(auth.into_data().unwrap_err().is_auth());

        let missing: OkxResponse<OpenInterest> =
            serde_json::from_str(r#"{"code": "51001", "msg": "Instrument ID does not exist"}"#).unwrap();
        assert!(matches!(missing.into_data(), Err(ProviderError::NotFound(_))));

        let other: OkxResponse<OpenInterest> =
            serde_json::from_str(r#"{"code": "50011", "msg": "Too Many Requests", "data": []}"#).unwrap();
        assert!(matches!(other.into_data(), Err(ProviderError::Transport(_))));
    }
}
