use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{InstrumentClass, OptionsChain, ProviderError};

/// One external options data source.
///
/// Implementations translate the vendor payload into [`OptionsChain`] at their
/// boundary and keep only standardized expirations. `now` anchors the
/// days-to-expiration computation.
#[async_trait]
pub trait OptionsProvider: Send + Sync {
    /// Provider name for logging and chain attribution
    fn name(&self) -> &str;

    fn instrument_class(&self) -> InstrumentClass;

    /// Whether this provider lists options on `ticker` (already normalized).
    fn supports(&self, _ticker: &str) -> bool {
        true
    }

    async fn fetch(&self, ticker: &str, now: DateTime<Utc>) -> Result<OptionsChain, ProviderError>;
}
