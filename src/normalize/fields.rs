use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use serde_json::{Map, Value};

use crate::raw::RawRecord;

pub const VALID_STATES: [&str; 27] = [
    "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB", "PR",
    "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SP", "SE", "TO",
];

/// Raw keys copied into `metadata` when present.
pub const METADATA_FIELDS: [&str; 7] = [
    "raw_category",
    "condition",
    "brand",
    "model",
    "year",
    "quantity",
    "unit_price",
];

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})(?:[T ](\d{2}):(\d{2}):(\d{2})(?:\.\d{1,9})?(?:Z|[+-]\d{2}(?::?\d{2})?)?)?$",
    )
    .unwrap()
});

fn as_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Non-negative amount rounded to cents.
pub fn parse_value(value: Option<&Value>) -> Option<f64> {
    let n = as_f64(value?)?;
    if n < 0.0 {
        return None;
    }
    let rounded = (n * 100.0).round() / 100.0;
    rounded.is_finite().then_some(rounded)
}

pub fn parse_opt_int(value: Option<&Value>) -> Option<i64> {
    as_i64(value?)
}

pub fn parse_int(value: Option<&Value>, default: i64) -> i64 {
    parse_opt_int(value).unwrap_or(default)
}

/// Past auctions report 0 days left, never a negative count.
pub fn parse_days_remaining(value: Option<&Value>) -> Option<i64> {
    parse_opt_int(value).map(|d| d.max(0))
}

/// Two-letter UF code, or `None` for anything outside the 27 valid ones.
pub fn classify_state(state: Option<&str>) -> Option<&'static str> {
    let wanted = state?.trim().to_uppercase();
    VALID_STATES.iter().copied().find(|uf| *uf == wanted)
}

/// Validating pass-through for `YYYY-MM-DD[(T| )HH:MM:SS[.fff][offset]]`.
///
/// The trimmed input comes back unchanged when it is well formed and names a
/// real calendar date and clock time; nothing is converted between zones.
pub fn parse_date(date: Option<&str>) -> Option<String> {
    let date = date?.trim();
    let caps = DATE_RE.captures(date)?;

    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)?;

    if let (Some(h), Some(m), Some(s)) = (caps.get(4), caps.get(5), caps.get(6)) {
        NaiveTime::from_hms_opt(
            h.as_str().parse().ok()?,
            m.as_str().parse().ok()?,
            s.as_str().parse().ok()?,
        )?;
    }

    Some(date.to_string())
}

/// Existing `metadata` object plus the allowlisted extras. Anything else is dropped.
pub fn build_metadata(raw: &RawRecord) -> Map<String, Value> {
    let mut metadata = raw.object("metadata").cloned().unwrap_or_default();
    for field in METADATA_FIELDS {
        if let Some(value) = raw.get(field) {
            metadata.insert(field.to_string(), value.clone());
        }
    }
    metadata
}
