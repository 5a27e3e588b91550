//! Options chain adapters
//!
//! Each client implements [`chain_core::OptionsProvider`] and translates one
//! vendor's payload into the shared chain schema, keeping only standardized
//! monthly/quarterly expirations.
//!
//! - Equity: Polygon, Tradier (API key required)
//! - Crypto: Deribit, OKX, Bybit, Binance (public endpoints)

mod fields;
mod http;
pub mod instrument;

pub mod binance;
pub mod bybit;
pub mod deribit;
pub mod okx;
pub mod polygon;
pub mod tradier;

pub use binance::BinanceClient;
pub use bybit::BybitClient;
pub use deribit::DeribitClient;
pub use http::HttpFetcher;
pub use okx::OkxClient;
pub use polygon::PolygonClient;
pub use tradier::TradierClient;
