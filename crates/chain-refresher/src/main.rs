//! chain-refresher: force-refresh the popular tickers so user requests hit a
//! warm cache. Meant to be run by an external scheduler shortly before each
//! refresh checkpoint.
//!
//! Usage:
//!   cargo run -p chain-refresher                       # POPULAR_TICKERS
//!   cargo run -p chain-refresher -- --tickers SPY BTC
//!   cargo run -p chain-refresher -- --json             # report as JSON on stdout

use chain_service::{refresh_popular, EngineConfig, RefreshStatus};

fn init_logging() {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "chain_refresher=info,chain_service=info,chain_providers=warn".into()
        })
    };
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let json_output = args.iter().any(|a| a == "--json");

    let config = EngineConfig::from_env()?;
    let tickers: Vec<String> = match args.iter().position(|a| a == "--tickers") {
        Some(idx) => args[idx + 1..]
            .iter()
            .take_while(|a| !a.starts_with("--"))
            .cloned()
            .collect(),
        None => config.popular_tickers.clone(),
    };
    if tickers.is_empty() {
        eprintln!("Usage:");
        eprintln!("  chain-refresher                      Refresh POPULAR_TICKERS");
        eprintln!("  chain-refresher --tickers SPY BTC    Refresh specific tickers");
        eprintln!("");
        eprintln!("Options:");
        eprintln!("  --json             Print the refresh report as JSON");
        std::process::exit(2);
    }

    tracing::info!("chain-refresher: {} tickers", tickers.len());
    let cache = config.build_cache();
    let report = refresh_popular(&cache, &tickers).await;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for r in &report.results {
            let status = match &r.status {
                RefreshStatus::Live(source) => format!("live ({})", source),
                RefreshStatus::Synthetic => "synthetic".to_string(),
                RefreshStatus::Failed(reason) => format!("FAILED: {}", reason),
            };
            println!("{:<8} {:>6} contracts  {}", r.ticker, r.contracts, status);
        }
        println!(
            "{} live, {} synthetic, {} failed",
            report.live(),
            report.synthetic(),
            report.failed()
        );
    }

    if report.all_failed() {
        anyhow::bail!("every ticker failed to refresh");
    }
    Ok(())
}
