//! Exchange option symbol parsing.
//!
//! Crypto venues encode the contract in the instrument name:
//!
//! - Deribit `BTC-29DEC23-40000-C`, linear `XRP_USDC-29MAR24-0d625-C`
//! - Bybit `BTC-29DEC23-40000-C-USDT`
//! - OKX `BTC-USD-231229-40000-C`
//! - Binance `BTC-231229-40000-C`

use chain_core::{
    parse_expiry_code, standard_days_until, ChainSource, Contract, OptionType, OptionsChain, ProviderError,
};
use chrono::{DateTime, NaiveDate, Utc};

use crate::fields::contract_count;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInstrument {
    pub base: String,
    pub expiry: NaiveDate,
    pub strike: f64,
    pub option_type: OptionType,
}

/// `None` for anything that is not `<base>[...]-<expiry>-<strike>-<C|P>[...]`.
pub fn parse_instrument_name(name: &str) -> Option<ParsedInstrument> {
    let parts: Vec<&str> = name.trim().split('-').collect();
    if parts.len() < 4 {
        return None;
    }

    let base = parts[0].split('_').next().unwrap_or_default().to_ascii_uppercase();
    if base.is_empty() {
        return None;
    }

    let (idx, expiry) = parts
        .iter()
        .enumerate()
        .skip(1)
        .find_map(|(i, p)| parse_expiry_code(p).map(|d| (i, d)))?;

    // Deribit writes decimal strikes with a 'd' separator
    let strike: f64 = parts.get(idx + 1)?.replace('d', ".").parse().ok()?;
    if !strike.is_finite() || strike <= 0.0 {
        return None;
    }
    let option_type = OptionType::from_code(parts.get(idx + 2)?)?;

    Some(ParsedInstrument {
        base,
        expiry,
        strike,
        option_type,
    })
}

/// One venue row keyed by instrument name, before normalization.
#[derive(Debug, Clone, Default)]
pub(crate) struct InstrumentRow {
    pub name: String,
    pub open_interest: Option<f64>,
    pub volume: Option<f64>,
    /// Annualized, as a fraction
    pub implied_volatility: Option<f64>,
}

/// Build a chain for `base` from named rows: unparseable names are dropped,
/// other bases skipped, and only standardized expirations kept.
pub(crate) fn assemble_chain(
    provider: &str,
    base: &str,
    spot: f64,
    rows: impl IntoIterator<Item = InstrumentRow>,
    now: DateTime<Utc>,
) -> Result<OptionsChain, ProviderError> {
    let mut chain = OptionsChain::new(base, spot, ChainSource::Provider(provider.to_string()));
    let mut dropped = 0usize;

    for row in rows {
        let Some(parsed) = parse_instrument_name(&row.name) else {
            dropped += 1;
            continue;
        };
        if parsed.base != base {
            continue;
        }
        let Some(days) = standard_days_until(parsed.expiry, now) else {
            continue;
        };
        let open_interest = contract_count(row.open_interest).unwrap_or(0);
        chain.push(
            Contract::new(parsed.strike, open_interest, days, parsed.option_type)
                .with_volume(contract_count(row.volume))
                .with_implied_volatility(row.implied_volatility),
        );
    }

    if dropped > 0 {
        tracing::debug!("{}: dropped {} unparseable instruments for {}", provider, dropped, base);
    }
    if chain.is_empty() {
        return Err(ProviderError::NotFound(format!(
            "{}: no standard expirations for {}",
            provider, base
        )));
    }

    chain.implied_volatility = chain.average_implied_volatility();
    Ok(chain)
}
