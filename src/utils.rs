use chrono::{Month, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;

pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

fn year_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\s*FY\s*(\d{4}|\d{2})\s*(_?\d*)$").expect("year header pattern is valid")
    })
}

/// Renders a number without a trailing `.0` for whole values.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Case-insensitive match on a full or three-letter month name.
pub fn is_month_label(text: &str) -> bool {
    text.trim().parse::<Month>().is_ok()
}

pub fn starts_with_month_abbreviation(text: &str) -> bool {
    MONTH_ABBREVIATIONS.iter().any(|m| text.starts_with(m))
}

/// Finds the first space-delimited month name in a month-row label and
/// returns its three-letter abbreviation (`"Fcst March"` -> `"Mar"`).
pub fn extract_month_label(text: &str) -> Option<&'static str> {
    text.split(' ').find_map(|token| {
        MONTH_NAMES
            .iter()
            .position(|name| *name == token)
            .or_else(|| MONTH_ABBREVIATIONS.iter().position(|abbr| *abbr == token))
            .map(|idx| MONTH_ABBREVIATIONS[idx])
    })
}

/// Normalizes a year column header to its two-digit member form, keeping a
/// uniqueness suffix: `"FY 2023"` -> `"FY23_1"`, `"FY2024_3"` -> `"FY24_3"`.
pub fn normalize_year_header(header: &str) -> Option<String> {
    let caps = year_header_regex().captures(header)?;
    let digits = caps.get(1)?.as_str();
    let year = &digits[digits.len() - 2..];
    let suffix = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    if suffix.is_empty() {
        Some(format!("FY{}_1", year))
    } else {
        Some(format!("FY{}{}", year, suffix))
    }
}

/// Drops a `_suffix` from a header (`"FY23_Jan"` -> `"FY23"`).
pub fn strip_header_suffix(header: &str) -> &str {
    header.split('_').next().unwrap_or(header)
}

/// Year label a period header names: the header without its `_suffix`, or
/// the whole header when nothing precedes the underscore.
pub fn year_label(header: &str) -> &str {
    let label = strip_header_suffix(header).trim();
    if label.is_empty() {
        header.trim()
    } else {
        label
    }
}

pub fn run_timestamp(run_at: &NaiveDateTime) -> String {
    run_at.format("%Y-%m-%d-%H%M").to_string()
}
