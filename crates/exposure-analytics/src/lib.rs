//! Dealer positioning analytics over a normalized options chain
//!
//! Black-Scholes delta/gamma per contract, hedging-share and gamma-exposure
//! aggregation by strike, max pain per expiration, and the gamma flip price.
//! Everything here is pure computation with no I/O.

pub mod exposure;
pub mod gamma_flip;
pub mod levels;
pub mod max_pain;
pub mod pricing;

pub use exposure::{aggregate_by_strike, HedgingConfig, HedgingExposure, Multipliers, QuantityBasis};
pub use gamma_flip::{find_gamma_flip, gamma_flip_from_points};
pub use levels::{summarize, ExposureSummary};
pub use max_pain::{max_pain_by_expiration, max_pain_for_expiration, MaxPainConfig};
pub use pricing::{Greeks, PricingParams};
