use chain_core::{ChainError, ChainSource, InstrumentClass, ProviderError};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ChainCache;
use crate::refresh::{refresh_popular, RefreshStatus};
use crate::schedule::RefreshSchedule;
use crate::state::SourceState;
use crate::test_support::{calls, cascade_of, Behavior, StubProvider};

const TIMEOUT: Duration = Duration::from_secs(2);

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 19, hour, minute, 0).unwrap()
}

fn cache_of(providers: Vec<StubProvider>) -> ChainCache {
    ChainCache::new(Arc::new(cascade_of(providers, TIMEOUT)), RefreshSchedule::default())
}

fn live() -> Behavior {
    Behavior::Chain {
        spot: 500.0,
        open_interest: 100,
    }
}

#[tokio::test]
async fn test_fresh_entry_is_served_from_cache() {
    let provider = StubProvider::equity("polygon", live());
    let counter = provider.counter();
    let cache = cache_of(vec![provider]);

    let first = cache.get_at("SPY", false, at(10, 0)).await.unwrap();
    let second = cache.get_at("SPY", false, at(11, 0)).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls(&counter), 1);
    assert_eq!(cache.ticker_state("SPY"), SourceState::Healthy);
}

#[tokio::test]
async fn test_entry_refreshes_once_window_opens() {
    let provider = StubProvider::equity("polygon", live());
    let counter = provider.counter();
    let cache = cache_of(vec![provider]);

    cache.get_at("SPY", false, at(10, 0)).await.unwrap();
    // 13:30 checkpoint with a 30 minute lead
    cache.get_at("SPY", false, at(13, 5)).await.unwrap();
    assert_eq!(calls(&counter), 2);

    // Refreshed inside the window, so no repeat
    cache.get_at("SPY", false, at(13, 20)).await.unwrap();
    assert_eq!(calls(&counter), 2);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_fetch() {
    let provider = StubProvider::equity("polygon", live()).with_delay(Duration::from_millis(100));
    let counter = provider.counter();
    let cache = cache_of(vec![provider]);

    let now = at(10, 0);
    let (a, b) = tokio::join!(cache.get_at("SPY", false, now), cache.get_at("SPY", false, now));
    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(calls(&counter), 1);
}

#[tokio::test]
async fn test_synthetic_only_ticker_skips_providers() {
    let provider = StubProvider::equity(
        "polygon",
        Behavior::Fail(ProviderError::NotFound("no options".into())),
    );
    let counter = provider.counter();
    let cache = cache_of(vec![provider]);

    let chain = cache.get_at("ACME", false, at(10, 0)).await.unwrap();
    assert!(chain.is_synthetic());
    assert_eq!(cache.ticker_state("ACME"), SourceState::SyntheticOnly);

    // Stale, but regenerated without asking providers
    let chain = cache.get_at("ACME", false, at(14, 0)).await.unwrap();
    assert!(chain.is_synthetic());
    assert_eq!(calls(&counter), 1);
}

#[tokio::test]
async fn test_forced_refresh_retries_providers() {
    let provider = StubProvider::equity(
        "polygon",
        Behavior::Fail(ProviderError::Auth("HTTP 401".into())),
    );
    let counter = provider.counter();
    let cascade = Arc::new(cascade_of(vec![provider], TIMEOUT));
    let cache = ChainCache::new(cascade.clone(), RefreshSchedule::default());

    cache.get_at("SPY", false, at(10, 0)).await.unwrap();
    assert_eq!(cascade.class_state(InstrumentClass::Equity), SourceState::AuthFailed);
    cache.get_at("QQQ", false, at(10, 0)).await.unwrap();
    assert_eq!(calls(&counter), 1);

    cache.get_at("SPY", true, at(10, 5)).await.unwrap();
    assert_eq!(calls(&counter), 2);
}

#[tokio::test]
async fn test_info_and_entries() {
    let cache = cache_of(vec![
        StubProvider::equity("polygon", live()),
        StubProvider::crypto("deribit", Behavior::Chain { spot: 60000.0, open_interest: 10 }),
    ]);

    cache.get_at("SPY", false, at(10, 0)).await.unwrap();
    cache.get_at("BTC", false, at(10, 0)).await.unwrap();

    let info = cache.info_at("SPY", at(12, 5)).unwrap();
    assert_eq!(info.age_seconds, 2 * 3600 + 5 * 60);
    assert_eq!(info.age, "2h 5m ago");
    assert_eq!(info.source, ChainSource::Provider("polygon".into()));
    assert!(!info.is_synthetic);
    assert_eq!(info.contracts, 18);
    assert!(cache.info_at("AAPL", at(12, 5)).is_none());

    let tickers: Vec<String> = cache.entries().into_iter().map(|i| i.ticker).collect();
    assert_eq!(tickers, vec!["BTC", "SPY"]);

    cache.clear("btc");
    assert!(cache.info("BTC").is_none());
    cache.clear_all();
    assert!(cache.entries().is_empty());
    assert_eq!(cache.ticker_state("SPY"), SourceState::Unknown);
}

#[tokio::test]
async fn test_clear_releases_refresh_locks() {
    let cache = cache_of(vec![StubProvider::equity("polygon", live())]);
    for ticker in ["SPY", "QQQ", "IWM"] {
        cache.get_at(ticker, false, at(10, 0)).await.unwrap();
    }
    assert_eq!(cache.inflight_len(), 3);

    cache.clear("spy");
    assert_eq!(cache.inflight_len(), 2);
    cache.clear_all();
    assert_eq!(cache.inflight_len(), 0);

    // Still usable after clearing
    cache.get_at("SPY", false, at(10, 5)).await.unwrap();
    assert_eq!(cache.inflight_len(), 1);
}

#[tokio::test]
async fn test_get_rejects_invalid_ticker() {
    let cache = cache_of(Vec::new());
    let err = cache.get("not a ticker!", false).await.unwrap_err();
    assert!(matches!(err, ChainError::InvalidTicker(_)));
}

#[tokio::test]
async fn test_refresh_popular_report() {
    let cache = cache_of(vec![StubProvider::equity("polygon", live())]);
    let tickers = vec!["SPY".to_string(), "ETH".to_string(), "???".to_string()];

    let report = refresh_popular(&cache, &tickers).await;
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.results[0].status, RefreshStatus::Live("polygon".into()));
    assert_eq!(report.results[0].contracts, 18);
    assert_eq!(report.results[1].status, RefreshStatus::Synthetic);
    assert!(matches!(report.results[2].status, RefreshStatus::Failed(_)));
    assert_eq!((report.live(), report.synthetic(), report.failed()), (1, 1, 1));
    assert!(!report.all_failed());

    let json = serde_json::to_value(&report.results[0]).unwrap();
    assert_eq!(json["status"]["status"], "live");
    assert_eq!(json["status"]["detail"], "polygon");

    let report = refresh_popular(&cache, &["".to_string()]).await;
    assert!(report.all_failed());
}
