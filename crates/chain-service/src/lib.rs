//! Options chain service: provider cascade, crypto merge, synthetic fallback,
//! chain cache with a fixed refresh schedule, and the exposure engine facade.

pub mod cache;
pub mod cascade;
pub mod config;
pub mod engine;
pub mod merge;
pub mod refresh;
pub mod schedule;
pub mod state;
pub mod synthetic;

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod cache_tests;

pub use cache::{CacheInfo, ChainCache};
pub use cascade::FetchCascade;
pub use config::EngineConfig;
pub use engine::{DeltaReport, ExpirationSelector, ExposureEngine, GammaFlipReport, MaxPainReport};
pub use merge::merge_chains;
pub use refresh::{refresh_popular, RefreshReport, RefreshStatus, TickerRefresh};
pub use schedule::RefreshSchedule;
pub use state::{SourceEvent, SourceState};
pub use synthetic::SyntheticGenerator;
