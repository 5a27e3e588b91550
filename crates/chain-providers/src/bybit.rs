use async_trait::async_trait;
use chain_core::{InstrumentClass, OptionsChain, OptionsProvider, ProviderError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::fields::{lenient_f64, positive};
use crate::http::HttpFetcher;
use crate::instrument::{assemble_chain, InstrumentRow};

const BASE_URL: &str = "https://api.bybit.com/v5";

const SUPPORTED: &[&str] = &["BTC", "ETH", "SOL"];

/// Bybit v5 market API
#[derive(Clone)]
pub struct BybitClient {
    http: HttpFetcher,
}

impl BybitClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: HttpFetcher::new("bybit", timeout),
        }
    }

    async fn tickers(&self, query: &[(&str, &str)]) -> Result<Vec<Ticker>, ProviderError> {
        let url = format!("{}/market/tickers", BASE_URL);
        let response: BybitResponse = self
            .http
            .get_json(self.http.client().get(&url).query(query))
            .await?;
        response.into_list()
    }
}

/// Spot from the spot market's last price, then the option rows' index and
/// underlying prices.
pub(crate) fn resolve_spot(spot_ticker: Option<&Ticker>, options: &[Ticker]) -> f64 {
    spot_ticker
        .and_then(|t| positive(t.last_price))
        .or_else(|| options.iter().find_map(|t| positive(t.index_price)))
        .or_else(|| options.iter().find_map(|t| positive(t.underlying_price)))
        .unwrap_or(0.0)
}

pub(crate) fn build_chain(
    base: &str,
    spot: f64,
    options: Vec<Ticker>,
    now: DateTime<Utc>,
) -> Result<OptionsChain, ProviderError> {
    let rows = options.into_iter().map(|t| InstrumentRow {
        name: t.symbol,
        open_interest: t.open_interest,
        volume: t.volume_24h,
        implied_volatility: t.mark_iv,
    });
    assemble_chain("bybit", base, spot, rows, now)
}

#[async_trait]
impl OptionsProvider for BybitClient {
    fn name(&self) -> &str {
        "bybit"
    }

    fn instrument_class(&self) -> InstrumentClass {
        InstrumentClass::Crypto
    }

    fn supports(&self, ticker: &str) -> bool {
        SUPPORTED.contains(&ticker)
    }

    async fn fetch(&self, ticker: &str, now: DateTime<Utc>) -> Result<OptionsChain, ProviderError> {
        let options = self
            .tickers(&[("category", "option"), ("baseCoin", ticker)])
            .await?;

        let spot_symbol = format!("{}USDT", ticker);
        let spot_rows = self
            .tickers(&[("category", "spot"), ("symbol", spot_symbol.as_str())])
            .await
            .unwrap_or_else(|e| {
                tracing::debug!("bybit spot ticker unavailable for {}: {}", ticker, e);
                Vec::new()
            });

        let spot = resolve_spot(spot_rows.first(), &options);
        build_chain(ticker, spot, options, now)
    }
}

// Response structures
#[derive(Debug, Deserialize)]
struct BybitResponse {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    #[serde(default)]
    result: Option<TickerList>,
}

impl BybitResponse {
    fn into_list(self) -> Result<Vec<Ticker>, ProviderError> {
        if self.ret_code != 0 {
            let msg = format!("bybit {}: {}", self.ret_code, self.ret_msg);
            return Err(match self.ret_code {
                10003 | 10004 | 10005 => ProviderError::Auth(msg),
                10001 => ProviderError::NotFound(msg),
                _ => ProviderError::Transport(msg),
            });
        }
        Ok(self.result.map(|r| r.list).unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct TickerList {
    #[serde(default)]
    list: Vec<Ticker>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Ticker {
    symbol: String,
    #[serde(rename = "openInterest", default, deserialize_with = "lenient_f64")]
    open_interest: Option<f64>,
    #[serde(rename = "volume24h", default, deserialize_with = "lenient_f64")]
    volume_24h: Option<f64>,
    #[serde(rename = "markIv", default, deserialize_with = "lenient_f64")]
    mark_iv: Option<f64>,
    #[serde(rename = "lastPrice", default, deserialize_with = "lenient_f64")]
    last_price: Option<f64>,
    #[serde(rename = "indexPrice", default, deserialize_with = "lenient_f64")]
    index_price: Option<f64>,
    #[serde(rename = "underlyingPrice", default, deserialize_with = "lenient_f64")]
    underlying_price: Option<f64>,
}
