use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use error_stack::Report;
use serde::{Serialize, Serializer};

use crate::bias::BiasResult;
use crate::error::NormalizeError;
use crate::indicator::IndicatorSet;
use crate::model::{Candle, Ticker, TimeFrame};

/// Outputs for one symbol × timeframe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub latest_candle: Candle,
    pub previous_close: Option<f64>,
    pub indicators: IndicatorSet,
    pub bias: Option<BiasResult>,
}

impl SnapshotEntry {
    /// Build an entry from a canonical series; `None` when the series is empty.
    pub fn from_series(
        symbol: &str,
        timeframe: TimeFrame,
        series: &[Candle],
        indicators: IndicatorSet,
        bias: Option<BiasResult>,
    ) -> Option<Self> {
        let (latest, older) = series.split_last()?;
        Some(Self {
            symbol: symbol.to_owned(),
            timeframe,
            latest_candle: latest.clone(),
            previous_close: older.last().map(|c| c.close),
            indicators,
            bias,
        })
    }
}

/// The record handed to the writer/renderer.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    #[serde(serialize_with = "serialize_utc_seconds")]
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<SnapshotEntry>,
    pub skipped_rows: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tickers: Vec<Ticker>,
}

impl Snapshot {
    /// True when something was attempted and nothing succeeded.
    pub fn is_total_failure(&self) -> bool {
        self.entries.is_empty() && self.tickers.is_empty() && !self.failures.is_empty()
    }
}

fn serialize_utc_seconds<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Collects per-pair results into a `Snapshot`.
///
/// Entries keep the order in which they are added; callers add them in the
/// configured pair order so output does not depend on fetch completion order.
pub struct SnapshotAssembler {
    generated_at: DateTime<Utc>,
    entries: Vec<SnapshotEntry>,
    skipped_rows: BTreeMap<String, usize>,
    failures: BTreeMap<String, String>,
    tickers: Vec<Ticker>,
}

impl SnapshotAssembler {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            entries: Vec::new(),
            skipped_rows: BTreeMap::new(),
            failures: BTreeMap::new(),
            tickers: Vec::new(),
        }
    }

    pub fn add_entry(&mut self, key: String, entry: SnapshotEntry, skipped: usize) {
        self.record_skipped(&key, skipped);
        self.entries.push(entry);
    }

    /// Record a pair that produced no entry.
    pub fn add_failure(&mut self, key: String, report: &Report<NormalizeError>) {
        if let NormalizeError::MalformedPayload { skipped, .. } = report.current_context() {
            self.record_skipped(&key, *skipped);
        }
        self.failures.insert(key, report.current_context().to_string());
    }

    /// Record a pair whose payload never reached the normalizer.
    pub fn add_fetch_failure(&mut self, key: String, reason: String) {
        self.failures.insert(key, reason);
    }

    pub fn add_ticker(&mut self, ticker: Ticker) {
        self.tickers.push(ticker);
    }

    fn record_skipped(&mut self, key: &str, skipped: usize) {
        if skipped > 0 {
            self.skipped_rows.insert(key.to_owned(), skipped);
        }
    }

    pub fn finish(self) -> Snapshot {
        Snapshot {
            generated_at: self.generated_at,
            entries: self.entries,
            skipped_rows: self.skipped_rows,
            failures: self.failures,
            tickers: self.tickers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bias::{BiasState, Confidence};
    use chrono::TimeZone;
    use serde_json::json;

    fn candle(timestamp: i64, close: f64) -> Candle {
        Candle {
            timestamp,
            open: close,
            high: close,
            low: close,
            close,
            volume: 2.0,
            turnover: None,
        }
    }

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn entry_carries_latest_and_previous_close() {
        let series = [candle(1, 10.0), candle(2, 11.0)];
        let entry =
            SnapshotEntry::from_series("BTC_USDT", TimeFrame::Min1, &series, IndicatorSet::default(), None)
                .unwrap();
        assert_eq!(entry.latest_candle.close, 11.0);
        assert_eq!(entry.previous_close, Some(10.0));
    }

    #[test]
    fn empty_series_has_no_entry() {
        assert!(
            SnapshotEntry::from_series("BTC_USDT", TimeFrame::Min1, &[], IndicatorSet::default(), None)
                .is_none()
        );
    }

    #[test]
    fn record_shape() {
        let mut assembler = SnapshotAssembler::new(generated_at());
        let bias = BiasResult {
            state: BiasState::Bullish,
            confidence: Confidence::Strong,
        };
        let entry = SnapshotEntry::from_series(
            "BTC_USDT",
            TimeFrame::Min15,
            &[candle(1_700_000_000_000, 105.0)],
            IndicatorSet::default(),
            Some(bias),
        )
        .unwrap();
        assembler.add_entry("BTC_USDT/15m".into(), entry, 2);
        assembler.add_failure(
            "ETH_USDT/15m".into(),
            &Report::new(NormalizeError::MalformedPayload {
                pair: "ETH_USDT/15m".into(),
                reason: "no valid rows after normalization".into(),
                skipped: 5,
            }),
        );

        let snapshot = assembler.finish();
        assert!(!snapshot.is_total_failure());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["generated_at"], "2024-01-02T03:04:05Z");
        assert_eq!(json["entries"][0]["symbol"], "BTC_USDT");
        assert_eq!(json["entries"][0]["timeframe"], "15m");
        assert_eq!(
            json["entries"][0]["latest_candle"],
            json!({
                "timestamp": 1_700_000_000_000_i64,
                "open": 105.0,
                "high": 105.0,
                "low": 105.0,
                "close": 105.0,
                "volume": 2.0,
                "turnover": null
            })
        );
        assert_eq!(
            json["entries"][0]["bias"],
            json!({"state": "bullish", "confidence": "strong"})
        );
        assert!(json["entries"][0]["indicators"]["ema20"].is_null());
        assert_eq!(
            json["skipped_rows"],
            json!({"BTC_USDT/15m": 2, "ETH_USDT/15m": 5})
        );
        assert!(json["failures"]["ETH_USDT/15m"].is_string());
        assert!(json.get("tickers").is_none());
    }

    #[test]
    fn all_pairs_failing_is_total_failure() {
        let mut assembler = SnapshotAssembler::new(generated_at());
        assembler.add_fetch_failure("BTC_USDT/1m".into(), "request failed".into());
        assert!(assembler.finish().is_total_failure());
    }

    #[test]
    fn nothing_attempted_is_not_a_failure() {
        assert!(!SnapshotAssembler::new(generated_at()).finish().is_total_failure());
    }
}
