//! Standardized expiration calendar
//!
//! Only monthly (third-Friday window) and quarterly (last-Friday window of a
//! quarter-end month) expirations are kept by every provider adapter.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};

fn is_quarter_end_month(month: u32) -> bool {
    matches!(month, 3 | 6 | 9 | 12)
}

/// Friday on day 15-21, or on day 22-28 outside quarter-end months.
pub fn is_monthly_expiration(date: NaiveDate) -> bool {
    if date.weekday() != Weekday::Fri {
        return false;
    }
    let day = date.day();
    (15..=21).contains(&day) || ((22..=28).contains(&day) && !is_quarter_end_month(date.month()))
}

/// Friday on day 25-31 of March, June, September or December.
pub fn is_quarterly_expiration(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Fri
        && is_quarter_end_month(date.month())
        && (25..=31).contains(&date.day())
}

pub fn is_standard_expiration(date: NaiveDate) -> bool {
    is_monthly_expiration(date) || is_quarterly_expiration(date)
}

/// Whole days from `now` to `expiry`, `None` once the date has passed.
pub fn days_until(expiry: NaiveDate, now: DateTime<Utc>) -> Option<u32> {
    let days = (expiry - now.date_naive()).num_days();
    u32::try_from(days).ok()
}

/// Days to a standardized expiration, `None` if the date is non-standard or past.
pub fn standard_days_until(expiry: NaiveDate, now: DateTime<Utc>) -> Option<u32> {
    if is_standard_expiration(expiry) {
        days_until(expiry, now)
    } else {
        None
    }
}

fn month_from_abbrev(abbrev: &str) -> Option<u32> {
    let month = match abbrev {
        "JAN" => 1,
        "FEB" => 2,
        "MAR" => 3,
        "APR" => 4,
        "MAY" => 5,
        "JUN" => 6,
        "JUL" => 7,
        "AUG" => 8,
        "SEP" => 9,
        "OCT" => 10,
        "NOV" => 11,
        "DEC" => 12,
        _ => return None,
    };
    Some(month)
}

/// Parse the expiry codes exchanges embed in instrument names.
///
/// Accepts `29DEC23` / `5JAN24` (day, month abbreviation, two-digit year),
/// `231229` (YYMMDD) and ISO `2023-12-29`.
pub fn parse_expiry_code(code: &str) -> Option<NaiveDate> {
    let code = code.trim();

    if code.len() == 10 && code.as_bytes().get(4) == Some(&b'-') {
        return NaiveDate::parse_from_str(code, "%Y-%m-%d").ok();
    }

    if code.len() == 6 && code.chars().all(|c| c.is_ascii_digit()) {
        let yy: i32 = code[0..2].parse().ok()?;
        let mm: u32 = code[2..4].parse().ok()?;
        let dd: u32 = code[4..6].parse().ok()?;
        return NaiveDate::from_ymd_opt(2000 + yy, mm, dd);
    }

    if code.len() == 6 || code.len() == 7 {
        let day_len = code.len() - 5;
        let day: u32 = code.get(0..day_len)?.parse().ok()?;
        let month = month_from_abbrev(code.get(day_len..day_len + 3)?)?;
        let yy: i32 = code.get(day_len + 3..)?.parse().ok()?;
        return NaiveDate::from_ymd_opt(2000 + yy, month, day);
    }

    None
}
