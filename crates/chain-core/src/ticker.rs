use serde::{Deserialize, Serialize};

use crate::ChainError;

/// Base currencies routed to the crypto multi-provider path.
pub const CRYPTO_BASES: &[&str] = &["BTC", "ETH", "SOL", "XRP", "BNB", "DOGE"];

const MAX_TICKER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentClass {
    Equity,
    Crypto,
}

impl InstrumentClass {
    /// Classify a normalized ticker.
    pub fn of(ticker: &str) -> Self {
        if CRYPTO_BASES.contains(&ticker) {
            InstrumentClass::Crypto
        } else {
            InstrumentClass::Equity
        }
    }
}

/// Trim, upper-case and strip index prefixes (`^SPX`, `$SPX`).
///
/// Rejects empty tickers, tickers longer than 12 characters, and anything
/// outside `[A-Z0-9.-]`.
pub fn normalize_ticker(raw: &str) -> Result<String, ChainError> {
    let trimmed = raw.trim();
    let stripped = trimmed.trim_start_matches(|c: char| c == '^' || c == '$');
    let ticker = stripped.to_ascii_uppercase();

    if ticker.is_empty() || ticker.len() > MAX_TICKER_LEN {
        return Err(ChainError::InvalidTicker(raw.to_string()));
    }
    if !ticker
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return Err(ChainError::InvalidTicker(raw.to_string()));
    }
    Ok(ticker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ticker() {
        assert_eq!(normalize_ticker(" spy ").unwrap(), "SPY");
        assert_eq!(normalize_ticker("^spx").unwrap(), "SPX");
        assert_eq!(normalize_ticker("$btc").unwrap(), "BTC");
        assert_eq!(normalize_ticker("BRK.B").unwrap(), "BRK.B");
    }

    #[test]
    fn test_normalize_ticker_rejects_garbage() {
        assert!(normalize_ticker("").is_err());
        assert!(normalize_ticker("   ").is_err());
        assert!(normalize_ticker("SP Y").is_err());
        assert!(normalize_ticker("AAPL;DROP").is_err());
        assert!(normalize_ticker("ABCDEFGHIJKLM").is_err());
    }

    #[test]
    fn test_classification() {
        assert_eq!(InstrumentClass::of("BTC"), InstrumentClass::Crypto);
        assert_eq!(InstrumentClass::of("ETH"), InstrumentClass::Crypto);
        assert_eq!(InstrumentClass::of("SPY"), InstrumentClass::Equity);
        assert_eq!(InstrumentClass::of("COIN"), InstrumentClass::Equity);
    }
}
