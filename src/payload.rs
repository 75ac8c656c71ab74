pub mod literal;
pub mod row;

use error_stack::Report;
use serde_json::{Map, Value};

use crate::error::NormalizeError;

/// Column names every column-oriented payload must carry.
const REQUIRED_COLUMNS: [&str; 5] = ["time", "open", "high", "low", "close"];
const VOLUME_COLUMNS: [&str; 2] = ["vol", "volume"];

/// A raw payload classified by shape, holding its extracted rows.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// Positional rows: `[timestamp, open, high, low, close, volume?, turnover?]`.
    ArrayOfArrays(Vec<Value>),
    /// Named rows with a variable key set (`t`/`time`/`ts`, `o`/`open`, ...).
    ArrayOfObjects(Vec<Value>),
    /// One array per field, already transposed into named rows.
    ColumnOriented(Vec<Value>),
    /// The payload arrived as a string and needed a second decode pass.
    EncodedString(Box<RawPayload>),
}

/// How the rows of a payload are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Positional,
    Named,
}

impl RawPayload {
    pub fn row_kind(&self) -> RowKind {
        match self {
            Self::ArrayOfArrays(_) => RowKind::Positional,
            Self::ArrayOfObjects(_) | Self::ColumnOriented(_) => RowKind::Named,
            Self::EncodedString(inner) => inner.row_kind(),
        }
    }

    pub fn rows(&self) -> &[Value] {
        match self {
            Self::ArrayOfArrays(rows) | Self::ArrayOfObjects(rows) | Self::ColumnOriented(rows) => {
                rows
            }
            Self::EncodedString(inner) => inner.rows(),
        }
    }

    /// Short name of the variant, for logs.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::ArrayOfArrays(_) => "array_of_arrays",
            Self::ArrayOfObjects(_) => "array_of_objects",
            Self::ColumnOriented(_) => "column_oriented",
            Self::EncodedString(_) => "encoded_string",
        }
    }
}

/// Classify a decoded payload into one of the known shapes.
///
/// `pair` only feeds error messages.
pub fn detect(value: Value, pair: &str) -> Result<RawPayload, Report<NormalizeError>> {
    match value {
        Value::String(text) => {
            let decoded = decode_text(&text)
                .ok_or_else(|| malformed(pair, "string payload is neither JSON nor a literal"))?;
            Ok(RawPayload::EncodedString(Box::new(detect(decoded, pair)?)))
        }
        Value::Object(mut map) => match map.remove("data") {
            Some(data) => detect_envelope_data(data, pair),
            None => match transpose_columns(&map, pair)? {
                Some(rows) => Ok(RawPayload::ColumnOriented(rows)),
                None => Err(malformed(pair, "object has neither a data field nor candle columns")),
            },
        },
        Value::Array(rows) => detect_rows(rows, pair),
        _ => Err(malformed(pair, "payload is not a list, object or string")),
    }
}

fn detect_envelope_data(data: Value, pair: &str) -> Result<RawPayload, Report<NormalizeError>> {
    match data {
        Value::Object(map) => match transpose_columns(&map, pair)? {
            Some(rows) => Ok(RawPayload::ColumnOriented(rows)),
            None if map.contains_key("data") => detect(Value::Object(map), pair),
            None => Ok(RawPayload::ArrayOfObjects(vec![Value::Object(map)])),
        },
        Value::Null => Err(malformed(pair, "envelope data is null")),
        other => detect(other, pair),
    }
}

fn detect_rows(rows: Vec<Value>, pair: &str) -> Result<RawPayload, Report<NormalizeError>> {
    match rows.first() {
        Some(Value::Array(_)) => Ok(RawPayload::ArrayOfArrays(rows)),
        Some(Value::Object(_)) => Ok(RawPayload::ArrayOfObjects(rows)),
        Some(_) => Err(malformed(pair, "first row is neither a list nor an object")),
        None => Err(malformed(pair, "payload holds no rows")),
    }
}

/// Second decode pass: strict JSON first, then the permissive literal form.
pub fn decode_text(text: &str) -> Option<Value> {
    serde_json::from_str(text)
        .ok()
        .or_else(|| literal::decode(text))
}

/// Transpose a column-oriented object into named rows.
///
/// Returns `Ok(None)` when `map` is not column-shaped at all, and an error when
/// it is but the candle columns disagree in length.
fn transpose_columns(
    map: &Map<String, Value>,
    pair: &str,
) -> Result<Option<Vec<Value>>, Report<NormalizeError>> {
    let has_required = REQUIRED_COLUMNS
        .iter()
        .all(|name| map.get(*name).is_some_and(Value::is_array));
    let has_volume = VOLUME_COLUMNS
        .iter()
        .any(|name| map.get(*name).is_some_and(Value::is_array));
    if !has_required || !has_volume {
        return Ok(None);
    }

    let columns: Vec<(&String, &Vec<Value>)> = map
        .iter()
        .filter_map(|(name, value)| value.as_array().map(|column| (name, column)))
        .collect();

    let candle_lengths: Vec<usize> = columns
        .iter()
        .filter(|(name, _)| {
            REQUIRED_COLUMNS.contains(&name.as_str()) || VOLUME_COLUMNS.contains(&name.as_str())
        })
        .map(|(_, column)| column.len())
        .collect();
    let len = candle_lengths[0];
    if candle_lengths.iter().any(|&l| l != len) {
        return Err(malformed(pair, "candle columns differ in length")
            .attach(format!("column lengths: {candle_lengths:?}")));
    }

    let rows = (0..len)
        .map(|i| {
            let row: Map<String, Value> = columns
                .iter()
                .filter(|(_, column)| column.len() == len)
                .map(|(name, column)| ((*name).clone(), column[i].clone()))
                .collect();
            Value::Object(row)
        })
        .collect();
    Ok(Some(rows))
}

fn malformed(pair: &str, reason: &str) -> Report<NormalizeError> {
    Report::new(NormalizeError::MalformedPayload {
        pair: pair.to_owned(),
        reason: reason.to_owned(),
        skipped: 0,
    })
}
