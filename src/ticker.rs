use error_stack::{Report, bail};
use serde_json::{Map, Value};

use crate::error::NormalizeError;
use crate::model::Ticker;
use crate::payload;
use crate::payload::row::{coerce_f64, coerce_timestamp_ms, lookup};

const PRICE_KEYS: &[&str] = &["lastPrice", "last_price", "last", "price"];
const BID_KEYS: &[&str] = &["bid1", "bestBid", "bidPrice"];
const ASK_KEYS: &[&str] = &["ask1", "bestAsk", "askPrice"];
const VOLUME_24H_KEYS: &[&str] = &[
    "volume24",
    "vol24",
    "turnover24h",
    "turnoverOf24h",
    "quoteVolume24h",
];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "ts", "time"];

/// Normalize a ticker payload for `symbol`.
///
/// Accepts the bare ticker object, a `{success, code, data}` envelope whose
/// `data` is an object or a list (first item used), with any level possibly
/// encoded as a string.
pub fn normalize_ticker(raw: Value, symbol: &str) -> Result<Ticker, Report<NormalizeError>> {
    let pair = format!("{symbol}/ticker");
    let fields = ticker_fields(raw, &pair)?;

    let Some(price) = lookup(&fields, PRICE_KEYS).and_then(coerce_f64) else {
        bail!(NormalizeError::MalformedPayload {
            pair,
            reason: "ticker has no usable last price".into(),
            skipped: 0,
        });
    };

    Ok(Ticker {
        symbol: symbol.to_owned(),
        price,
        bid: lookup(&fields, BID_KEYS).and_then(coerce_f64),
        ask: lookup(&fields, ASK_KEYS).and_then(coerce_f64),
        volume_24h: lookup(&fields, VOLUME_24H_KEYS).and_then(coerce_f64),
        timestamp: lookup(&fields, TIMESTAMP_KEYS).and_then(coerce_timestamp_ms),
    })
}

fn ticker_fields(raw: Value, pair: &str) -> Result<Map<String, Value>, Report<NormalizeError>> {
    match raw {
        Value::Object(mut map) => match map.remove("data") {
            Some(data) => ticker_fields(data, pair),
            None => Ok(map),
        },
        Value::Array(items) => match items.into_iter().next() {
            Some(first) => ticker_fields(first, pair),
            None => Err(malformed(pair, "ticker list is empty")),
        },
        Value::String(text) => match payload::decode_text(&text) {
            Some(decoded) => ticker_fields(decoded, pair),
            None => Err(malformed(pair, "ticker string is neither JSON nor a literal")),
        },
        _ => Err(malformed(pair, "ticker payload is not an object")),
    }
}

fn malformed(pair: &str, reason: &str) -> Report<NormalizeError> {
    Report::new(NormalizeError::MalformedPayload {
        pair: pair.to_owned(),
        reason: reason.to_owned(),
        skipped: 0,
    })
}
