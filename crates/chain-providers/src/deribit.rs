use async_trait::async_trait;
use chain_core::{InstrumentClass, OptionsChain, OptionsProvider, ProviderError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::fields::{lenient_f64, positive};
use crate::http::HttpFetcher;
use crate::instrument::{assemble_chain, InstrumentRow};

const BASE_URL: &str = "https://www.deribit.com/api/v2/public";

/// BTC and ETH settle in coin; the rest are listed as USDC linear options.
const SUPPORTED: &[&str] = &["BTC", "ETH", "SOL", "XRP", "BNB"];

/// Deribit public API (no key required).
#[derive(Clone)]
pub struct DeribitClient {
    http: HttpFetcher,
}

impl DeribitClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: HttpFetcher::new("deribit", timeout),
        }
    }

    fn currency(base: &str) -> &str {
        match base {
            "BTC" | "ETH" => base,
            _ => "USDC",
        }
    }

    fn index_name(base: &str) -> String {
        match base {
            "BTC" | "ETH" => format!("{}_usd", base.to_ascii_lowercase()),
            _ => format!("{}_usdc", base.to_ascii_lowercase()),
        }
    }

    async fn book_summaries(&self, base: &str) -> Result<Vec<BookSummary>, ProviderError> {
        let url = format!("{}/get_book_summary_by_currency", BASE_URL);
        let response: DeribitResponse<Vec<BookSummary>> = self
            .http
            .get_json(
                self.http
                    .client()
                    .get(&url)
                    .query(&[("currency", Self::currency(base)), ("kind", "option")]),
            )
            .await?;
        response.into_result()
    }

    async fn index_price(&self, base: &str) -> Result<Option<f64>, ProviderError> {
        let url = format!("{}/get_index_price", BASE_URL);
        let response: DeribitResponse<IndexPrice> = self
            .http
            .get_json(
                self.http
                    .client()
                    .get(&url)
                    .query(&[("index_name", Self::index_name(base))]),
            )
            .await?;
        Ok(positive(response.into_result()?.index_price))
    }
}

/// Normalize a book summary into a chain. Spot comes from the index price,
/// falling back to the underlying price embedded in the option rows.
pub(crate) fn build_chain(
    base: &str,
    summaries: Vec<BookSummary>,
    index_price: Option<f64>,
    now: DateTime<Utc>,
) -> Result<OptionsChain, ProviderError> {
    let spot = positive(index_price)
        .or_else(|| summaries.iter().find_map(|s| positive(s.underlying_price)))
        .unwrap_or(0.0);

    let rows = summaries.into_iter().map(|s| InstrumentRow {
        name: s.instrument_name,
        open_interest: s.open_interest,
        volume: s.volume,
        // mark_iv is quoted in percent
        implied_volatility: s.mark_iv.map(|iv| iv / 100.0),
    });
    assemble_chain("deribit", base, spot, rows, now)
}

#[async_trait]
impl OptionsProvider for DeribitClient {
    fn name(&self) -> &str {
        "deribit"
    }

    fn instrument_class(&self) -> InstrumentClass {
        InstrumentClass::Crypto
    }

    fn supports(&self, ticker: &str) -> bool {
        SUPPORTED.contains(&ticker)
    }

    async fn fetch(&self, ticker: &str, now: DateTime<Utc>) -> Result<OptionsChain, ProviderError> {
        let summaries = self.book_summaries(ticker).await?;
        let index_price = match self.index_price(ticker).await {
            Ok(price) => price,
            Err(e) => {
                tracing::debug!("deribit index price unavailable for {}: {}", ticker, e);
                None
            }
        };
        build_chain(ticker, summaries, index_price, now)
    }
}

// Response structures
#[derive(Debug, Deserialize)]
struct DeribitResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<DeribitError>,
}

#[derive(Debug, Deserialize)]
struct DeribitError {
    code: i64,
    #[serde(default)]
    message: String,
}

impl<T> DeribitResponse<T> {
    fn into_result(self) -> Result<T, ProviderError> {
        if let Some(err) = self.error {
            let msg = format!("deribit {}: {}", err.code, err.message);
            // 13004 invalid_credentials, 13009 unauthorized, 13021 forbidden
            return Err(match err.code {
                13004 | 13009 | 13021 => ProviderError::Auth(msg),
                _ => ProviderError::Transport(msg),
            });
        }
        self.result
            .ok_or_else(|| ProviderError::Malformed("deribit: missing result".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BookSummary {
    instrument_name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    open_interest: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    mark_iv: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    underlying_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct IndexPrice {
    #[serde(default, deserialize_with = "lenient_f64")]
    index_price: Option<f64>,
}
