//! Cell-level operations shared by the executors.
//!
//! Cells are `serde_json::Value`s. These helpers decide when a cell counts as
//! missing, render cells as lookup keys, coerce quantities and normalize dates.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Output date format (`DD/MM/YYYY`).
pub const OUTPUT_DATE_FORMAT: &str = "%d/%m/%Y";

/// Tried in order; ISO forms win, then month-first before day-first.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%m/%d/%y",
    "%d/%m/%y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M",
];

/// Excel serial day numbers accepted as dates (1900-01-01 to 9999-12-31).
const EXCEL_SERIAL_RANGE: std::ops::RangeInclusive<f64> = 1.0..=2_958_465.0;

static ORDINAL_SUFFIX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").ok());

/// A cell is missing when it is null or holds only whitespace.
pub fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Text form of a cell, `None` when missing.
///
/// Integral numbers render without a fractional part so that `12345.0`
/// matches the code `"12345"`.
pub fn cell_text(value: &Value) -> Option<String> {
    if is_missing(value) {
        return None;
    }
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
                        format!("{}", f as i64)
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Coerce a cell to a finite number. Anything else is `None`.
pub fn to_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Quantity as an integer, truncating toward zero. Non-numeric, non-finite
/// quantities and those truncating to zero or less are rejected.
pub fn to_quantity(value: &Value) -> Option<i64> {
    to_number(value)
        .map(|number| number.trunc() as i64)
        .filter(|quantity| *quantity > 0)
}

/// Parse a date out of free-form text or an Excel serial number.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => n.as_f64().and_then(excel_serial_to_date),
        Value::String(s) => parse_date_text(s),
        _ => None,
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let normalized = match ORDINAL_SUFFIX.as_ref() {
        Some(re) => re.replace_all(text, "$1").into_owned(),
        None => text.to_string(),
    };
    let normalized = normalized.as_str();

    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(normalized, fmt) {
            return Some(parsed.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(normalized, fmt) {
            return Some(parsed);
        }
    }
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(normalized) {
        return Some(parsed.date_naive());
    }
    if normalized.len() == 8 && normalized.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(normalized, "%Y%m%d").ok();
    }

    normalized.parse::<f64>().ok().and_then(excel_serial_to_date)
}

/// Excel's 1900 date system, including its phantom 1900-02-29.
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !EXCEL_SERIAL_RANGE.contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Render a cell as `DD/MM/YYYY`; unparseable or missing cells become null.
pub fn format_date(value: &Value) -> Value {
    parse_date(value)
        .map(|date| Value::String(date.format(OUTPUT_DATE_FORMAT).to_string()))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_cells() {
        assert!(is_missing(&Value::Null));
        assert!(is_missing(&json!("   ")));
        assert!(is_missing(&json!("")));
        assert!(!is_missing(&json!("0")));
        assert!(!is_missing(&json!(0)));
    }

    #[test]
    fn test_cell_text_drops_integral_fraction() {
        assert_eq!(cell_text(&json!(12345.0)), Some("12345".to_string()));
        assert_eq!(cell_text(&json!(12345)), Some("12345".to_string()));
        assert_eq!(cell_text(&json!(1.5)), Some("1.5".to_string()));
        assert_eq!(cell_text(&json!(" X1 ")), Some("X1".to_string()));
        assert_eq!(cell_text(&Value::Null), None);
    }

    #[test]
    fn test_to_quantity() {
        assert_eq!(to_quantity(&json!(3)), Some(3));
        assert_eq!(to_quantity(&json!("2.9")), Some(2));
        assert_eq!(to_quantity(&json!(" 7 ")), Some(7));
        assert_eq!(to_quantity(&json!(0)), None);
        assert_eq!(to_quantity(&json!("0.5")), None);
        assert_eq!(to_quantity(&json!(0.9)), None);
        assert_eq!(to_quantity(&json!(1.5)), Some(1));
        assert_eq!(to_quantity(&json!(-1)), None);
        assert_eq!(to_quantity(&json!("abc")), None);
        assert_eq!(to_quantity(&json!("NaN")), None);
        assert_eq!(to_quantity(&json!("inf")), None);
        assert_eq!(to_quantity(&Value::Null), None);
    }

    #[test]
    fn test_format_date_formats() {
        assert_eq!(format_date(&json!("2024-03-15")), json!("15/03/2024"));
        assert_eq!(format_date(&json!("2024-03-15 08:30:00")), json!("15/03/2024"));
        assert_eq!(format_date(&json!("03/15/2024")), json!("15/03/2024"));
        assert_eq!(format_date(&json!("15/03/2024")), json!("15/03/2024"));
        assert_eq!(format_date(&json!("15th March 2024")), json!("15/03/2024"));
        assert_eq!(format_date(&json!("20240315")), json!("15/03/2024"));
    }

    #[test]
    fn test_month_first_wins_when_ambiguous() {
        assert_eq!(format_date(&json!("02/03/2024")), json!("03/02/2024"));
    }

    #[test]
    fn test_excel_serial() {
        assert_eq!(format_date(&json!(45366)), json!("15/03/2024"));
        assert_eq!(format_date(&json!("45366")), json!("15/03/2024"));
    }

    #[test]
    fn test_unparseable_date_is_null() {
        assert_eq!(format_date(&json!("not a date")), Value::Null);
        assert_eq!(format_date(&Value::Null), Value::Null);
        assert_eq!(format_date(&json!("  ")), Value::Null);
    }
}
