use error_stack::{Report, bail};
use serde_json::{Map, Value};

use crate::error::NormalizeError;
use crate::model::Candle;
use crate::payload::RowKind;

/// Timestamps below this value are epoch seconds; at or above, milliseconds.
pub const SECONDS_THRESHOLD: f64 = 10_000_000_000.0;

/// Minimum length of a positional row: timestamp plus OHLC.
const MIN_POSITIONAL_LEN: usize = 5;

const TIMESTAMP_KEYS: &[&str] = &["t", "time", "ts", "timestamp", "T"];
const OPEN_KEYS: &[&str] = &["o", "open"];
const HIGH_KEYS: &[&str] = &["h", "high"];
const LOW_KEYS: &[&str] = &["l", "low"];
const CLOSE_KEYS: &[&str] = &["c", "close"];
const VOLUME_KEYS: &[&str] = &["v", "vol", "volume", "amount"];
const TURNOVER_KEYS: &[&str] = &["turnover", "turnoverVol", "quoteVolume", "amount24h"];

/// Parse one raw row into a `Candle`.
pub fn parse_row(row: &Value, kind: RowKind) -> Result<Candle, Report<NormalizeError>> {
    match (kind, row) {
        (RowKind::Positional, Value::Array(fields)) => parse_positional(fields),
        (RowKind::Named, Value::Object(fields)) => parse_named(fields),
        (RowKind::Positional, _) => bail!(malformed_row("expected a list row")),
        (RowKind::Named, _) => bail!(malformed_row("expected an object row")),
    }
}

fn parse_positional(fields: &[Value]) -> Result<Candle, Report<NormalizeError>> {
    if fields.len() < MIN_POSITIONAL_LEN {
        bail!(malformed_row(&format!(
            "positional row has {} fields, need at least {MIN_POSITIONAL_LEN}",
            fields.len()
        )));
    }
    Ok(Candle {
        timestamp: timestamp_field(Some(&fields[0]), "timestamp")?,
        open: required_field(Some(&fields[1]), "open")?,
        high: required_field(Some(&fields[2]), "high")?,
        low: required_field(Some(&fields[3]), "low")?,
        close: required_field(Some(&fields[4]), "close")?,
        volume: optional_field(fields.get(5)).unwrap_or(0.0),
        turnover: optional_field(fields.get(6)),
    })
}

fn parse_named(fields: &Map<String, Value>) -> Result<Candle, Report<NormalizeError>> {
    Ok(Candle {
        timestamp: timestamp_field(lookup(fields, TIMESTAMP_KEYS), "timestamp")?,
        open: required_field(lookup(fields, OPEN_KEYS), "open")?,
        high: required_field(lookup(fields, HIGH_KEYS), "high")?,
        low: required_field(lookup(fields, LOW_KEYS), "low")?,
        close: required_field(lookup(fields, CLOSE_KEYS), "close")?,
        volume: optional_field(lookup(fields, VOLUME_KEYS)).unwrap_or(0.0),
        turnover: optional_field(lookup(fields, TURNOVER_KEYS)),
    })
}

/// Find the first synonym present with a non-null value.
///
/// An exact key match beats a case-insensitive one, so `t` and `T` stay
/// distinct when both are present.
pub fn lookup<'a>(fields: &'a Map<String, Value>, synonyms: &[&str]) -> Option<&'a Value> {
    synonyms.iter().find_map(|synonym| {
        fields
            .get(*synonym)
            .filter(|value| !value.is_null())
            .or_else(|| {
                fields
                    .iter()
                    .find(|(key, value)| key.eq_ignore_ascii_case(synonym) && !value.is_null())
                    .map(|(_, value)| value)
            })
    })
}

/// Coerce a JSON number or numeric string into a finite `f64`.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Coerce a timestamp and reconcile its unit to epoch milliseconds.
pub fn coerce_timestamp_ms(value: &Value) -> Option<i64> {
    if let Some(raw) = value.as_i64() {
        return Some(if (raw as f64) < SECONDS_THRESHOLD {
            raw.checked_mul(1000)?
        } else {
            raw
        });
    }
    let raw = coerce_f64(value)?;
    let millis = if raw < SECONDS_THRESHOLD {
        raw * 1000.0
    } else {
        raw
    };
    let millis = millis.round();
    (millis.abs() < i64::MAX as f64).then_some(millis as i64)
}

fn timestamp_field(value: Option<&Value>, name: &str) -> Result<i64, Report<NormalizeError>> {
    let value = value.ok_or_else(|| Report::new(malformed_row(&format!("missing {name}"))))?;
    coerce_timestamp_ms(value).ok_or_else(|| {
        Report::new(malformed_row(&format!("{name} is not a finite number")))
            .attach(format!("value: {value}"))
    })
}

fn required_field(value: Option<&Value>, name: &str) -> Result<f64, Report<NormalizeError>> {
    let value = value.ok_or_else(|| Report::new(malformed_row(&format!("missing {name}"))))?;
    coerce_f64(value).ok_or_else(|| {
        Report::new(malformed_row(&format!("{name} is not a finite number")))
            .attach(format!("value: {value}"))
    })
}

fn optional_field(value: Option<&Value>) -> Option<f64> {
    value.and_then(coerce_f64)
}

fn malformed_row(reason: &str) -> NormalizeError {
    NormalizeError::MalformedRow {
        reason: reason.to_owned(),
    }
}
