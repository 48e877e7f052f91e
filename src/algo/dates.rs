use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(20\d{2}|19\d{2})").expect("year pattern is valid"));

static FOUR_DIGIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}").expect("four-digit pattern is valid"));

/// Earliest year a parsed date may carry.
const MIN_YEAR: i32 = 1900;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

// US month-first before day-first: "03/04/2023" reads as March 4.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d/%m/%Y",
    "%d-%b-%Y",
    "%d-%B-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
];

// chrono's %y puts 00-68 in the 2000s and 69-99 in the 1900s.
const SHORT_YEAR_FORMATS: &[&str] = &[
    "%m/%d/%y",
    "%m-%d-%y",
    "%d/%m/%y",
    "%d-%b-%y",
    "%d-%B-%y",
    "%d %b %y",
    "%d %B %y",
    "%b %d, %y",
    "%B %d, %y",
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%y %H:%M",
];

/// Lenient date parsing over the mixed formats found in agency exports.
/// Anything unrecognized is `None`, never an error. Dates before 1900 are
/// treated as unrecognized.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    parse_any(raw.trim()).filter(|d| d.year() >= MIN_YEAR)
}

fn parse_any(s: &str) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }

    // %Y also accepts one or two digits, so "01/10/24" would land in year 24.
    // Four-digit formats only run when the text has a four-digit run.
    if !FOUR_DIGIT_RE.is_match(s) {
        return SHORT_YEAR_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    // Compact 20230415 and bare years
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        let y: i32 = s[..4].parse().ok()?;
        let m: u32 = s[4..6].parse().ok()?;
        let d: u32 = s[6..].parse().ok()?;
        return NaiveDate::from_ymd_opt(y, m, d);
    }
    if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
        let y: i32 = s.parse().ok()?;
        return NaiveDate::from_ymd_opt(y, 1, 1);
    }
    None
}

/// First 19xx/20xx run in the text.
pub fn extract_year(raw: &str) -> Option<i32> {
    YEAR_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Whole days from `from` to `to` (negative when `to` is earlier).
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}
