use error_stack::{Report, bail};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::NormalizeError;
use crate::model::Candle;
use crate::payload::{self, row};

/// Candles recovered from one payload, in input order.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub candles: Vec<Candle>,
    /// Rows that failed to parse and were dropped.
    pub skipped: usize,
}

/// Turn a raw payload into an unsorted candle list.
///
/// Rows that fail to parse are logged and skipped. The whole payload fails only
/// when its shape is unknown or no row survives. `cancel` is checked between
/// rows; a cancelled run returns no candles at all.
pub fn normalize(
    raw: Value,
    pair: &str,
    cancel: &CancellationToken,
) -> Result<Normalized, Report<NormalizeError>> {
    let payload = payload::detect(raw, pair)?;
    let kind = payload.row_kind();
    let rows = payload.rows();

    debug!(
        pair,
        variant = payload.variant_name(),
        rows = rows.len(),
        "payload shape detected"
    );

    let mut candles = Vec::with_capacity(rows.len());
    let mut skipped = 0;

    for (index, raw_row) in rows.iter().enumerate() {
        if cancel.is_cancelled() {
            bail!(NormalizeError::Cancelled {
                pair: pair.to_owned(),
            });
        }
        match row::parse_row(raw_row, kind) {
            Ok(candle) => candles.push(candle),
            Err(e) => {
                skipped += 1;
                warn!(pair, row = index, error = %e, "skipping malformed row");
            }
        }
    }

    if candles.is_empty() {
        bail!(NormalizeError::MalformedPayload {
            pair: pair.to_owned(),
            reason: "no valid rows after normalization".into(),
            skipped,
        });
    }

    Ok(Normalized { candles, skipped })
}
