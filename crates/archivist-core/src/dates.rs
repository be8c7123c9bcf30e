//! Best-effort date normalization to ISO-8601.
//!
//! Numeric dates are read month-first (`10/7/2009` is 7 October 2009)
//! unless the first number cannot be a month. Partial dates stay partial:
//! `2024-03` and `2024` are already in archive form.

use chrono::{Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[T ].*)?$").unwrap());
static YMD_SLASHED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[/.](\d{1,2})[/.](\d{1,2})$").unwrap());
static YEAR_MONTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})[-/](\d{1,2})$").unwrap());
static YEAR_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})$").unwrap());
static NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[/.-](\d{1,2})[/.-](\d{4}|\d{2})$").unwrap());
static MONTH_DAY_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([a-z]+)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})$").unwrap()
});
static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d{1,2})(?:st|nd|rd|th)?\s+(?:of\s+)?([a-z]+)\.?,?\s+(\d{4})$").unwrap()
});
static MONTH_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^([a-z]+)\.?,?\s+(\d{4})$").unwrap());
static WEEKDAY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?,?\s+").unwrap()
});

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Normalize `raw` to `YYYY-MM-DD` (or `YYYY-MM` / `YYYY` for partial dates).
///
/// Returns `None` when the string is not recognised as a date; callers keep
/// the original value in that case.
pub fn normalize_date(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let s = WEEKDAY_PREFIX.replace(s, "");
    let s = s.as_ref();

    if let Some(c) = ISO_DATE.captures(s).or_else(|| YMD_SLASHED.captures(s)) {
        return ymd(num(&c[1])?, num(&c[2])?, num(&c[3])?);
    }
    if let Some(c) = YEAR_MONTH.captures(s) {
        let (year, month) = (num(&c[1])?, num(&c[2])?);
        return (1..=12)
            .contains(&month)
            .then(|| format!("{year:04}-{month:02}"));
    }
    if YEAR_ONLY.is_match(s) {
        return Some(s.to_string());
    }
    if let Some(c) = NUMERIC.captures(s) {
        let (mut month, mut day) = (num(&c[1])?, num(&c[2])?);
        if month > 12 && day <= 12 {
            std::mem::swap(&mut month, &mut day);
        }
        return ymd(expand_year(&c[3])?, month, day);
    }
    if let Some(c) = MONTH_DAY_YEAR.captures(s) {
        return ymd(num(&c[3])?, month_number(&c[1])?, num(&c[2])?);
    }
    if let Some(c) = DAY_MONTH_YEAR.captures(s) {
        return ymd(num(&c[3])?, month_number(&c[2])?, num(&c[1])?);
    }
    if let Some(c) = MONTH_YEAR.captures(s) {
        return Some(format!("{:04}-{:02}", num(&c[2])?, month_number(&c[1])?));
    }
    None
}

fn num(s: &str) -> Option<u32> {
    s.parse().ok()
}

fn ymd(year: u32, month: u32, day: u32) -> Option<String> {
    let date = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Two-digit years land within 50 years of the current year.
fn expand_year(s: &str) -> Option<u32> {
    let year = num(s)?;
    if s.len() == 4 {
        return Some(year);
    }
    let current = u32::try_from(Utc::now().year()).ok()?;
    let century = current / 100 * 100;
    let candidate = century + year;
    Some(if candidate > current + 49 {
        candidate - 100
    } else {
        candidate
    })
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    if lower.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| m.starts_with(&lower))
        .and_then(|i| u32::try_from(i + 1).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_dates_are_month_first() {
        assert_eq!(normalize_date("10/7/2009").as_deref(), Some("2009-10-07"));
        assert_eq!(normalize_date("2/5/2009").as_deref(), Some("2009-02-05"));
    }

    #[test]
    fn impossible_month_falls_back_to_day_first() {
        assert_eq!(normalize_date("25/12/2020").as_deref(), Some("2020-12-25"));
    }

    #[test]
    fn two_digit_years_expand() {
        assert_eq!(normalize_date("10/7/09").as_deref(), Some("2009-10-07"));
    }

    #[test]
    fn long_form_dates() {
        assert_eq!(
            normalize_date("January 28, 2009").as_deref(),
            Some("2009-01-28")
        );
        assert_eq!(
            normalize_date("22nd January 2010").as_deref(),
            Some("2010-01-22")
        );
        assert_eq!(normalize_date("3 Feb 2009").as_deref(), Some("2009-02-03"));
        assert_eq!(
            normalize_date("Monday, 15 March 2024").as_deref(),
            Some("2024-03-15")
        );
        assert_eq!(normalize_date("Sept. 1 2021").as_deref(), Some("2021-09-01"));
    }

    #[test]
    fn iso_dates_are_zero_padded() {
        assert_eq!(normalize_date("2024-3-5").as_deref(), Some("2024-03-05"));
        assert_eq!(
            normalize_date("2024-03-15T10:00:00Z").as_deref(),
            Some("2024-03-15")
        );
        assert_eq!(normalize_date("2024/03/15").as_deref(), Some("2024-03-15"));
    }

    #[test]
    fn partial_dates_stay_partial() {
        assert_eq!(normalize_date("2024-03").as_deref(), Some("2024-03"));
        assert_eq!(normalize_date("2024").as_deref(), Some("2024"));
        assert_eq!(normalize_date("May 2014").as_deref(), Some("2014-05"));
    }

    #[test]
    fn unparsable_strings_are_rejected() {
        assert_eq!(normalize_date("not a date"), None);
        assert_eq!(normalize_date("2024-13-01"), None);
        assert_eq!(normalize_date("31/31/2020"), None);
        assert_eq!(normalize_date(""), None);
        assert_eq!(normalize_date("Ma 2014"), None);
    }
}
