use serde::{Deserialize, Serialize};

use crate::cache::ChainCache;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RefreshStatus {
    /// Real data, with the provider label
    Live(String),
    Synthetic,
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerRefresh {
    pub ticker: String,
    pub status: RefreshStatus,
    pub contracts: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshReport {
    pub results: Vec<TickerRefresh>,
}

impl RefreshReport {
    pub fn live(&self) -> usize {
        self.count(|s| matches!(s, RefreshStatus::Live(_)))
    }

    pub fn synthetic(&self) -> usize {
        self.count(|s| matches!(s, RefreshStatus::Synthetic))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, RefreshStatus::Failed(_)))
    }

    pub fn all_failed(&self) -> bool {
        !self.results.is_empty() && self.failed() == self.results.len()
    }

    fn count(&self, pred: impl Fn(&RefreshStatus) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.status)).count()
    }
}

/// Force a refresh of each ticker so user requests hit a warm cache.
pub async fn refresh_popular(cache: &ChainCache, tickers: &[String]) -> RefreshReport {
    let mut report = RefreshReport::default();

    for ticker in tickers {
        let (status, contracts) = match cache.get(ticker, true).await {
            Ok(chain) if chain.is_synthetic() => (RefreshStatus::Synthetic, chain.len()),
            Ok(chain) => (RefreshStatus::Live(chain.source.label()), chain.len()),
            Err(e) => {
                tracing::warn!("Refresh failed for {}: {}", ticker, e);
                (RefreshStatus::Failed(e.to_string()), 0)
            }
        };
        report.results.push(TickerRefresh {
            ticker: ticker.clone(),
            status,
            contracts,
        });
    }

    tracing::info!(
        "Refreshed {} tickers: {} live, {} synthetic, {} failed",
        report.results.len(),
        report.live(),
        report.synthetic(),
        report.failed()
    );
    report
}
