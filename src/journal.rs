//! Reading the raw bonus journal kept in the CMS user field.
//!
//! The field holds a JSON array of entries shaped like
//!
//! ```json
//! {"RecordType": "Receipt", "Period": "2024-03-01T10:00:00", "Накопление": 150,
//!  "WRITE_OFF_DATE": 1717189200, "WRITE_OFF_DAYS": 90}
//! ```
//!
//! A missing or broken field value means an empty journal. Broken entries are
//! reported one by one and never abort the rest of the journal.

use jiff::tz::TimeZone;
use jiff::{Timestamp, civil};
use serde::Deserialize;
use serde_json::Value;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::Amount;
use crate::model::{BonusRecord, RecordType};

/// Civil layouts accepted for `Period` besides ISO 8601.
const PERIOD_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

/// Errors that can occur when parsing journal entries
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("entry {index}: malformed entry: {source}")]
    Malformed {
        index: usize,
        source: serde_json::Error,
    },

    #[error("entry {index}: unrecognized record type '{record_type}'")]
    UnrecognizedType { index: usize, record_type: String },

    #[error("entry {index}: missing {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("entry {index}: invalid amount {value}")]
    InvalidAmount { index: usize, value: String },

    #[error("entry {index}: negative amount {amount}")]
    NegativeAmount { index: usize, amount: Amount },

    #[error("entry {index}: unparseable period '{value}'")]
    InvalidPeriod { index: usize, value: String },

    #[error("entry {index}: invalid write-off date {value}")]
    InvalidWriteOffDate { index: usize, value: String },
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "RecordType")]
    record_type: Option<String>,
    #[serde(rename = "Period")]
    period: Option<String>,
    #[serde(rename = "Накопление")]
    amount: Option<Value>,
    #[serde(rename = "WRITE_OFF_DATE")]
    write_off_date: Option<Value>,
    #[serde(rename = "WRITE_OFF_DAYS")]
    write_off_days: Option<Value>,
}

/// Read the raw journal text from a file
pub fn read_journal_file(path: impl AsRef<Path>) -> io::Result<String> {
    std::fs::read_to_string(path)
}

/// Parse journal entries in stored order. Civil periods are read in `tz`.
pub fn parse_journal(
    raw: &str,
    tz: &TimeZone,
) -> impl Iterator<Item = Result<BonusRecord, JournalError>> {
    let tz = tz.clone();
    decode_entries(raw)
        .into_iter()
        .enumerate()
        .map(move |(index, entry)| parse_entry(index, entry, &tz))
}

/// Parse a journal, dropping entries that cannot be used.
pub fn load_records(raw: &str, tz: &TimeZone) -> Vec<BonusRecord> {
    parse_journal(raw, tz)
        .filter_map(|result| result.inspect_err(log_skipped).ok())
        .collect()
}

/// Log a dropped entry. Unknown record kinds are expected and only show up at debug level.
pub fn log_skipped(err: &JournalError) {
    match err {
        JournalError::UnrecognizedType { .. } => debug!("{err}"),
        _ => warn!("{err}"),
    }
}

/// Parse a `Period` value: RFC 3339 with an offset, or civil time in `tz`.
pub fn parse_period(value: &str, tz: &TimeZone) -> Option<Timestamp> {
    let value = value.trim();
    if let Ok(timestamp) = value.parse::<Timestamp>() {
        return Some(timestamp);
    }

    let datetime = value
        .parse::<civil::DateTime>()
        .ok()
        .or_else(|| {
            PERIOD_FORMATS
                .iter()
                .find_map(|format| civil::DateTime::strptime(format, value).ok())
        })
        .or_else(|| {
            value
                .parse::<civil::Date>()
                .or_else(|_| civil::Date::strptime("%d.%m.%Y", value))
                .ok()
                .map(|date| date.to_datetime(civil::Time::midnight()))
        })?;

    datetime.to_zoned(tz.clone()).ok().map(|zoned| zoned.timestamp())
}

fn decode_entries(raw: &str) -> Vec<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) => entries,
        Ok(Value::Null) => Vec::new(),
        Ok(_) => {
            warn!("bonus journal is not a json array, treating as empty");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, "bonus journal is not valid json, treating as empty");
            Vec::new()
        }
    }
}

fn parse_entry(index: usize, entry: Value, tz: &TimeZone) -> Result<BonusRecord, JournalError> {
    let entry: RawEntry =
        serde_json::from_value(entry).map_err(|source| JournalError::Malformed { index, source })?;

    let record_type = entry.record_type.ok_or(JournalError::MissingField {
        index,
        field: "RecordType",
    })?;
    let record_type =
        RecordType::from_wire(&record_type).ok_or(JournalError::UnrecognizedType {
            index,
            record_type,
        })?;

    let period = entry.period.ok_or(JournalError::MissingField {
        index,
        field: "Period",
    })?;
    let period = parse_period(&period, tz).ok_or(JournalError::InvalidPeriod {
        index,
        value: period,
    })?;

    let amount = parse_amount(index, entry.amount)?;

    let record = match record_type {
        RecordType::Receipt => {
            let expiry = parse_write_off_date(index, entry.write_off_date)?;
            let mut record = BonusRecord::receipt(period, amount, expiry);
            if let Some(days) = parse_write_off_days(index, entry.write_off_days) {
                record = record.with_valid_days(days);
            }
            record
        }
        RecordType::Expense => BonusRecord::expense(period, amount),
    };
    Ok(record)
}

fn parse_amount(index: usize, value: Option<Value>) -> Result<Amount, JournalError> {
    let value = value
        .filter(|value| !value.is_null())
        .ok_or(JournalError::MissingField {
            index,
            field: "Накопление",
        })?;

    let amount = match &value {
        Value::Number(number) => number.to_string().parse::<Amount>().ok(),
        // decimal comma is common in hand-edited journals
        Value::String(text) => text.replace(',', ".").parse::<Amount>().ok(),
        _ => None,
    }
    .ok_or_else(|| JournalError::InvalidAmount {
        index,
        value: value.to_string(),
    })?;

    if amount.is_negative() {
        return Err(JournalError::NegativeAmount { index, amount });
    }
    Ok(amount)
}

/// `null`, `false`, `0`, `""` and `"0"` all mean the receipt never expires.
fn parse_write_off_date(
    index: usize,
    value: Option<Value>,
) -> Result<Option<Timestamp>, JournalError> {
    let Some(value) = value else {
        return Ok(None);
    };

    let seconds = match &value {
        Value::Null | Value::Bool(false) => return Ok(None),
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|seconds| seconds.fract() == 0.0)
                .map(|seconds| seconds as i64)
        }),
        Value::String(text) if text.trim().is_empty() => return Ok(None),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };

    let invalid = || JournalError::InvalidWriteOffDate {
        index,
        value: value.to_string(),
    };
    match seconds.ok_or_else(invalid)? {
        0 => Ok(None),
        seconds => Timestamp::from_second(seconds)
            .map(Some)
            .map_err(|_| invalid()),
    }
}

/// Informational only, so a value that makes no sense is dropped rather than
/// rejecting the receipt.
fn parse_write_off_days(index: usize, value: Option<Value>) -> Option<u32> {
    let days = match value? {
        Value::Null => return None,
        Value::Number(number) => number.as_u64().and_then(|days| u32::try_from(days).ok()),
        Value::String(text) if text.trim().is_empty() => return None,
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    };
    if days.is_none() {
        debug!(index, "ignoring unusable WRITE_OFF_DAYS");
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn ts(second: i64) -> Timestamp {
        Timestamp::from_second(second).unwrap()
    }

    fn parse(raw: &str) -> Vec<Result<BonusRecord, JournalError>> {
        parse_journal(raw, &TimeZone::UTC).collect()
    }

    // 2024-03-01T10:00:00Z
    const MARCH_1_10AM: i64 = 1_709_287_200;

    #[test]
    fn read_receipt() {
        let raw = r#"[{"RecordType":"Receipt","Period":"2024-03-01T10:00:00",
            "Накопление":150.5,"WRITE_OFF_DATE":1717189200,"WRITE_OFF_DAYS":90}]"#;
        let results = parse(raw);
        assert_eq!(results.len(), 1);

        let record = results.into_iter().next().unwrap().unwrap();
        assert_eq!(record.record_type, RecordType::Receipt);
        assert_eq!(record.period, ts(MARCH_1_10AM));
        assert_eq!(record.amount, Amount::from_scaled(1_505_000));
        assert_eq!(record.expiry, Some(ts(1_717_189_200)));
        assert_eq!(record.valid_days, Some(90));
    }

    #[test]
    fn read_expense_ignores_write_off_fields() {
        let raw = r#"[{"RecordType":"Expense","Period":"2024-03-01T10:00:00",
            "Накопление":"20","WRITE_OFF_DATE":1717189200,"WRITE_OFF_DAYS":90}]"#;
        let record = parse(raw).into_iter().next().unwrap().unwrap();
        assert_eq!(record.record_type, RecordType::Expense);
        assert_eq!(record.amount, Amount::from_scaled(200_000));
        assert_eq!(record.expiry, None);
        assert_eq!(record.valid_days, None);
    }

    #[test]
    fn keeps_stored_order() {
        let raw = r#"[
            {"RecordType":"Receipt","Period":"2024-03-02T00:00:00","Накопление":1},
            {"RecordType":"Receipt","Period":"2024-03-01T00:00:00","Накопление":2}
        ]"#;
        let records = load_records(raw, &TimeZone::UTC);
        assert_eq!(records[0].amount, Amount::from_scaled(10_000));
        assert_eq!(records[1].amount, Amount::from_scaled(20_000));
    }

    #[test]
    fn empty_or_broken_journal_is_empty() {
        for raw in ["", "   ", "null", "not json", "{\"a\":1}", "[]", "42"] {
            assert!(parse(raw).is_empty(), "{raw:?} should be empty");
        }
    }

    #[test]
    fn unknown_type_is_reported_and_dropped() {
        let raw = r#"[{"RecordType":"Refund","Period":"2024-03-01","Накопление":5},
                      {"RecordType":"Receipt","Period":"2024-03-01","Накопление":5}]"#;
        let results = parse(raw);
        assert!(matches!(
            &results[0],
            Err(JournalError::UnrecognizedType { index: 0, record_type }) if record_type == "Refund"
        ));
        assert_eq!(load_records(raw, &TimeZone::UTC).len(), 1);
    }

    #[test]
    fn missing_fields() {
        let raw = r#"[{"Period":"2024-03-01","Накопление":5},
                      {"RecordType":"Receipt","Накопление":5},
                      {"RecordType":"Receipt","Period":"2024-03-01"},
                      {"RecordType":"Receipt","Period":"2024-03-01","Накопление":null}]"#;
        let results = parse(raw);
        assert!(matches!(
            results[0],
            Err(JournalError::MissingField { index: 0, field: "RecordType" })
        ));
        assert!(matches!(
            results[1],
            Err(JournalError::MissingField { index: 1, field: "Period" })
        ));
        assert!(matches!(
            results[2],
            Err(JournalError::MissingField { index: 2, field: "Накопление" })
        ));
        assert!(matches!(
            results[3],
            Err(JournalError::MissingField { index: 3, field: "Накопление" })
        ));
    }

    #[test]
    fn malformed_entries() {
        let raw = r#"[7, {"RecordType":5,"Period":"2024-03-01","Накопление":1}]"#;
        let results = parse(raw);
        assert!(matches!(results[0], Err(JournalError::Malformed { index: 0, .. })));
        assert!(matches!(results[1], Err(JournalError::Malformed { index: 1, .. })));
    }

    #[test]
    fn bad_values() {
        let raw = r#"[{"RecordType":"Receipt","Period":"yesterday","Накопление":1},
                      {"RecordType":"Receipt","Period":"2024-03-01","Накопление":"lots"},
                      {"RecordType":"Receipt","Period":"2024-03-01","Накопление":-3},
                      {"RecordType":"Receipt","Period":"2024-03-01","Накопление":1,"WRITE_OFF_DATE":"soon"}]"#;
        let results = parse(raw);
        assert!(matches!(results[0], Err(JournalError::InvalidPeriod { index: 0, .. })));
        assert!(matches!(results[1], Err(JournalError::InvalidAmount { index: 1, .. })));
        assert!(matches!(results[2], Err(JournalError::NegativeAmount { index: 2, .. })));
        assert!(matches!(
            results[3],
            Err(JournalError::InvalidWriteOffDate { index: 3, .. })
        ));
    }

    #[test]
    fn out_of_range_amounts_are_invalid() {
        let raw = r#"[{"RecordType":"Receipt","Period":"2024-03-01","Накопление":1e20},
                      {"RecordType":"Receipt","Period":"2024-03-01","Накопление":900000000000000},
                      {"RecordType":"Expense","Period":"2024-03-01","Накопление":"1e12"},
                      {"RecordType":"Receipt","Period":"2024-03-01","Накопление":1000000000}]"#;
        let results = parse(raw);
        assert!(matches!(results[0], Err(JournalError::InvalidAmount { index: 0, .. })));
        assert!(matches!(results[1], Err(JournalError::InvalidAmount { index: 1, .. })));
        assert!(matches!(results[2], Err(JournalError::InvalidAmount { index: 2, .. })));
        assert_eq!(results[3].as_ref().unwrap().amount, Amount::MAX_INPUT);
    }

    #[test]
    fn empty_write_off_values_mean_no_expiry() {
        let raw = r#"[{"RecordType":"Receipt","Period":"2024-03-01","Накопление":1,"WRITE_OFF_DATE":0},
                      {"RecordType":"Receipt","Period":"2024-03-01","Накопление":1,"WRITE_OFF_DATE":""},
                      {"RecordType":"Receipt","Period":"2024-03-01","Накопление":1,"WRITE_OFF_DATE":"0"},
                      {"RecordType":"Receipt","Period":"2024-03-01","Накопление":1,"WRITE_OFF_DATE":null}]"#;
        let records = load_records(raw, &TimeZone::UTC);
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|record| record.expiry.is_none()));
    }

    #[test]
    fn write_off_date_as_string() {
        let raw = r#"[{"RecordType":"Receipt","Period":"2024-03-01","Накопление":1,
                       "WRITE_OFF_DATE":"1717189200","WRITE_OFF_DAYS":"30"}]"#;
        let record = load_records(raw, &TimeZone::UTC).remove(0);
        assert_eq!(record.expiry, Some(ts(1_717_189_200)));
        assert_eq!(record.valid_days, Some(30));
    }

    #[test]
    fn unusable_valid_days_does_not_drop_receipt() {
        let raw = r#"[{"RecordType":"Receipt","Period":"2024-03-01","Накопление":1,"WRITE_OFF_DAYS":"ninety"}]"#;
        let records = load_records(raw, &TimeZone::UTC);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].valid_days, None);
    }

    #[test]
    fn amounts_keep_decimal_precision() {
        let raw = r#"[{"RecordType":"Receipt","Period":"2024-03-01","Накопление":0.1},
                      {"RecordType":"Receipt","Period":"2024-03-01","Накопление":"0,2"}]"#;
        let records = load_records(raw, &TimeZone::UTC);
        assert_eq!(records[0].amount, Amount::from_scaled(1_000));
        assert_eq!(records[1].amount, Amount::from_scaled(2_000));
    }

    #[test]
    fn period_formats() {
        let utc = TimeZone::UTC;
        let expected = ts(MARCH_1_10AM);
        assert_eq!(parse_period("2024-03-01T10:00:00", &utc), Some(expected));
        assert_eq!(parse_period("2024-03-01 10:00:00", &utc), Some(expected));
        assert_eq!(parse_period("01.03.2024 10:00:00", &utc), Some(expected));
        assert_eq!(parse_period("2024-03-01T10:00:00Z", &utc), Some(expected));
        assert_eq!(parse_period("2024-03-01T13:00:00+03:00", &utc), Some(expected));
        assert_eq!(parse_period("2024-03-01", &utc), Some(ts(MARCH_1_10AM - 36_000)));
        assert_eq!(parse_period("01.03.2024", &utc), Some(ts(MARCH_1_10AM - 36_000)));
        assert_eq!(parse_period("", &utc), None);
        assert_eq!(parse_period("2024-13-01", &utc), None);
    }

    #[test]
    fn civil_periods_use_time_zone() {
        let moscow = TimeZone::fixed(jiff::tz::offset(3));
        assert_eq!(
            parse_period("2024-03-01T13:00:00", &moscow),
            Some(ts(MARCH_1_10AM))
        );
        // explicit offsets win over the zone
        assert_eq!(
            parse_period("2024-03-01T10:00:00Z", &moscow),
            Some(ts(MARCH_1_10AM))
        );
    }

    #[test]
    fn read_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(r#"[{"RecordType":"Receipt","Period":"2024-03-01","Накопление":3}]"#.as_bytes())
            .unwrap();

        let raw = read_journal_file(file.path()).unwrap();
        let records = load_records(&raw, &TimeZone::UTC);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, Amount::from_scaled(30_000));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(read_journal_file("/nonexistent/journal.json").is_err());
    }
}
