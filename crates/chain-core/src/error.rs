use std::time::Duration;
use thiserror::Error;

/// Failure of a single provider fetch. The cascade branches on the variant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("No data: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::Auth(_))
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(provider: &str, status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        match status {
            401 | 403 => ProviderError::Auth(format!("{} HTTP {}: {}", provider, status, snippet)),
            404 => ProviderError::NotFound(format!("{} HTTP 404: {}", provider, snippet)),
            _ => ProviderError::Transport(format!("{} HTTP {}: {}", provider, status, snippet)),
        }
    }
}

/// Error surfaced to callers of the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("Invalid ticker: {0:?}")]
    InvalidTicker(String),

    #[error("No options data for {ticker}: {strategy}")]
    Exhausted { ticker: String, strategy: String },

    #[error("Spot price unknown for {0}")]
    MissingSpot(String),

    #[error("No contracts expiring in {days} days for {ticker}")]
    NoExpiration { ticker: String, days: u32 },

    #[error("Request for {ticker} timed out after {timeout:?}")]
    Timeout { ticker: String, timeout: Duration },
}
