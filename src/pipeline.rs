use std::sync::Arc;

use chrono::Utc;
use error_stack::Report;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bias;
use crate::config::AppConfig;
use crate::error::NormalizeError;
use crate::indicator::{IndicatorSet, close_prices};
use crate::model::{Ticker, TimeFrame, pair_key};
use crate::normalize::normalize;
use crate::series::{keep_newest, sort_dedup};
use crate::snapshot::{Snapshot, SnapshotAssembler, SnapshotEntry};
use crate::source::PayloadSource;
use crate::ticker::normalize_ticker;

/// One (symbol, timeframe) unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleJob {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub limit: usize,
}

impl CandleJob {
    pub fn key(&self) -> String {
        pair_key(&self.symbol, self.timeframe)
    }
}

/// Result of one successful pair pipeline.
#[derive(Debug, Clone)]
pub struct PairOutput {
    pub entry: SnapshotEntry,
    pub skipped: usize,
}

enum PairOutcome {
    Entry(PairOutput),
    Failed(Report<NormalizeError>),
    FetchFailed(String),
}

/// Expand the configured pairs into candle jobs, in configuration order.
pub fn plan(config: &AppConfig) -> Vec<CandleJob> {
    config
        .pairs
        .iter()
        .flat_map(|pair| {
            pair.timeframes.iter().filter_map(|tf| {
                TimeFrame::from_str(tf).map(|timeframe| CandleJob {
                    symbol: pair.symbol.clone(),
                    timeframe,
                    limit: pair.limit,
                })
            })
        })
        .collect()
}

/// Normalize one raw payload and compute its snapshot entry.
///
/// Bias is only classified when `job.timeframe == bias_timeframe`.
pub fn process_pair(
    raw: Value,
    job: &CandleJob,
    bias_timeframe: TimeFrame,
    cancel: &CancellationToken,
) -> Result<PairOutput, Report<NormalizeError>> {
    let key = job.key();
    let normalized = normalize(raw, &key, cancel)?;
    let series = keep_newest(sort_dedup(normalized.candles), job.limit);

    let indicators = IndicatorSet::compute(&close_prices(&series));
    let bias = series
        .last()
        .filter(|_| job.timeframe == bias_timeframe)
        .map(|latest| bias::classify(latest.close, &indicators));

    let entry = SnapshotEntry::from_series(&job.symbol, job.timeframe, &series, indicators, bias)
        .ok_or_else(|| {
            Report::new(NormalizeError::MalformedPayload {
                pair: key.clone(),
                reason: "canonical series is empty".into(),
                skipped: normalized.skipped,
            })
        })?;

    info!(
        pair = %key,
        candles = series.len(),
        skipped = normalized.skipped,
        "pair processed"
    );

    Ok(PairOutput {
        entry,
        skipped: normalized.skipped,
    })
}

/// Fetch and process every configured pair concurrently, then assemble the
/// snapshot in configuration order.
pub async fn build_snapshot(
    source: Arc<dyn PayloadSource>,
    config: &AppConfig,
    cancel: CancellationToken,
) -> Snapshot {
    let bias_timeframe = config.bias_timeframe();

    let mut pair_handles: Vec<(String, JoinHandle<PairOutcome>)> = Vec::new();
    for job in plan(config) {
        let source = Arc::clone(&source);
        let cancel = cancel.clone();
        let key = job.key();
        let handle = tokio::spawn(async move {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PairOutcome::FetchFailed("cancelled before fetch completed".into()),
                fetched = source.fetch_candles(&job.symbol, job.timeframe, job.limit) => fetched,
            };
            match fetched {
                Ok(raw) => match process_pair(raw, &job, bias_timeframe, &cancel) {
                    Ok(output) => PairOutcome::Entry(output),
                    Err(report) => PairOutcome::Failed(report),
                },
                Err(report) => {
                    warn!(pair = %job.key(), error = ?report, "candle fetch failed");
                    PairOutcome::FetchFailed(report.current_context().to_string())
                }
            }
        });
        pair_handles.push((key, handle));
    }

    let mut ticker_handles: Vec<(String, JoinHandle<Result<Ticker, String>>)> = Vec::new();
    for pair in config.pairs.iter().filter(|p| p.ticker) {
        let source = Arc::clone(&source);
        let cancel = cancel.clone();
        let symbol = pair.symbol.clone();
        let key = format!("{symbol}/ticker");
        let handle = tokio::spawn(async move {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err("cancelled before fetch completed".to_owned()),
                fetched = source.fetch_ticker(&symbol) => fetched,
            };
            let raw = fetched.map_err(|report| report.current_context().to_string())?;
            normalize_ticker(raw, &symbol).map_err(|report| report.current_context().to_string())
        });
        ticker_handles.push((key, handle));
    }

    let mut assembler = SnapshotAssembler::new(Utc::now());

    for (key, handle) in pair_handles {
        match handle.await {
            Ok(PairOutcome::Entry(output)) => assembler.add_entry(key, output.entry, output.skipped),
            Ok(PairOutcome::Failed(report)) => {
                warn!(pair = %key, error = ?report, "pair failed");
                assembler.add_failure(key, &report);
            }
            Ok(PairOutcome::FetchFailed(reason)) => assembler.add_fetch_failure(key, reason),
            Err(e) => {
                warn!(pair = %key, error = %e, "pair task failed");
                assembler.add_fetch_failure(key, e.to_string());
            }
        }
    }

    for (key, handle) in ticker_handles {
        match handle.await {
            Ok(Ok(ticker)) => assembler.add_ticker(ticker),
            Ok(Err(reason)) => {
                warn!(pair = %key, reason = %reason, "ticker failed");
                assembler.add_fetch_failure(key, reason);
            }
            Err(e) => assembler.add_fetch_failure(key, e.to_string()),
        }
    }

    assembler.finish()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use futures::future::BoxFuture;
    use serde_json::json;

    use super::*;
    use crate::bias::{BiasState, Confidence};
    use crate::config;
    use crate::error::SourceError;

    /// In-memory source; the per-key delay lets tests finish fetches out of order.
    struct StaticSource {
        candles: HashMap<String, (Value, u64)>,
        tickers: HashMap<String, Value>,
    }

    impl PayloadSource for StaticSource {
        fn name(&self) -> &str {
            "static"
        }

        fn fetch_candles(
            &self,
            symbol: &str,
            timeframe: TimeFrame,
            _limit: usize,
        ) -> BoxFuture<'_, Result<Value, Report<SourceError>>> {
            let found = self.candles.get(&pair_key(symbol, timeframe)).cloned();
            Box::pin(async move {
                let (value, delay_ms) = found.ok_or_else(|| {
                    Report::new(SourceError::Read {
                        source_name: "static".into(),
                    })
                })?;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(value)
            })
        }

        fn fetch_ticker(&self, symbol: &str) -> BoxFuture<'_, Result<Value, Report<SourceError>>> {
            let found = self.tickers.get(symbol).cloned();
            Box::pin(async move {
                found.ok_or_else(|| {
                    Report::new(SourceError::Read {
                        source_name: "static".into(),
                    })
                })
            })
        }
    }

    fn rising_rows(count: i64) -> Value {
        Value::Array(
            (0..count)
                .map(|i| json!([1_700_000_000 + i * 900, 100 + i, 101 + i, 99 + i, 100 + i, 5]))
                .collect(),
        )
    }

    fn job(timeframe: TimeFrame) -> CandleJob {
        CandleJob {
            symbol: "BTC_USDT".into(),
            timeframe,
            limit: 300,
        }
    }

    #[test]
    fn plan_follows_config_order() {
        let config = config::parse(
            r#"
[general]

[[pairs]]
symbol = "SOL_USDT"
timeframes = ["15m", "1m"]

[[pairs]]
symbol = "BTC_USDT"
timeframes = ["1h"]
limit = 50
"#,
        )
        .unwrap();
        let keys: Vec<String> = plan(&config).iter().map(CandleJob::key).collect();
        assert_eq!(keys, vec!["SOL_USDT/15m", "SOL_USDT/1m", "BTC_USDT/1h"]);
        assert_eq!(plan(&config)[2].limit, 50);
    }

    #[test]
    fn bias_only_on_bias_timeframe() {
        let raw = rising_rows(250);
        let cancel = CancellationToken::new();

        let at_bias = process_pair(raw.clone(), &job(TimeFrame::Min15), TimeFrame::Min15, &cancel).unwrap();
        let bias = at_bias.entry.bias.unwrap();
        assert_eq!(bias.state, BiasState::Bullish);
        assert_eq!(bias.confidence, Confidence::Strong);
        assert!(at_bias.entry.indicators.ema200.is_some());

        let elsewhere = process_pair(raw, &job(TimeFrame::Min1), TimeFrame::Min15, &cancel).unwrap();
        assert!(elsewhere.entry.bias.is_none());
    }

    #[test]
    fn limit_keeps_newest_candles() {
        let mut limited = job(TimeFrame::Min15);
        limited.limit = 50;
        let output =
            process_pair(rising_rows(250), &limited, TimeFrame::Min15, &CancellationToken::new())
                .unwrap();
        assert_eq!(output.entry.latest_candle.close, 349.0);
        assert_eq!(output.entry.previous_close, Some(348.0));
        assert!(output.entry.indicators.ema50.is_some());
        assert_eq!(output.entry.indicators.ema200, None);
        // missing EMA200 makes the bias neutral
        assert_eq!(output.entry.bias.unwrap().state, BiasState::Neutral);
    }

    #[tokio::test]
    async fn partial_failures_do_not_block_other_pairs() {
        let config = config::parse(
            r#"
[general]

[[pairs]]
symbol = "BTC_USDT"
timeframes = ["1m", "15m"]
ticker = true

[[pairs]]
symbol = "ETH_USDT"
timeframes = ["15m"]
"#,
        )
        .unwrap();

        let mut candles = HashMap::new();
        // the first job finishes last
        candles.insert("BTC_USDT/1m".to_owned(), (rising_rows(30), 50));
        let mut rows = rising_rows(10);
        if let Value::Array(items) = &mut rows {
            items.push(json!(["bad", 1, 2, 3, 4]));
            items.push(json!([1]));
        }
        candles.insert("BTC_USDT/15m".to_owned(), (rows, 0));
        candles.insert("ETH_USDT/15m".to_owned(), (json!({"code": 500}), 0));

        let mut tickers = HashMap::new();
        tickers.insert(
            "BTC_USDT".to_owned(),
            json!({"success": true, "data": [{"lastPrice": 64000.0}]}),
        );

        let source: Arc<dyn PayloadSource> = Arc::new(StaticSource { candles, tickers });
        let snapshot = build_snapshot(source, &config, CancellationToken::new()).await;

        let keys: Vec<String> = snapshot
            .entries
            .iter()
            .map(|e| pair_key(&e.symbol, e.timeframe))
            .collect();
        assert_eq!(keys, vec!["BTC_USDT/1m", "BTC_USDT/15m"]);
        assert_eq!(snapshot.skipped_rows.get("BTC_USDT/15m"), Some(&2));
        assert!(snapshot.failures.contains_key("ETH_USDT/15m"));
        assert_eq!(snapshot.tickers.len(), 1);
        assert_eq!(snapshot.tickers[0].price, 64000.0);
        assert!(!snapshot.is_total_failure());
    }

    #[tokio::test]
    async fn every_pair_failing_is_total_failure() {
        let config = config::parse("[general]\n[[pairs]]\nsymbol = \"BTC_USDT\"\n").unwrap();
        let source: Arc<dyn PayloadSource> = Arc::new(StaticSource {
            candles: HashMap::new(),
            tickers: HashMap::new(),
        });
        let snapshot = build_snapshot(source, &config, CancellationToken::new()).await;
        assert!(snapshot.entries.is_empty());
        assert_eq!(snapshot.failures.len(), 2);
        assert!(snapshot.is_total_failure());
    }

    #[tokio::test]
    async fn cancelled_run_reports_failures() {
        let config = config::parse("[general]\n[[pairs]]\nsymbol = \"BTC_USDT\"\n").unwrap();
        let mut candles = HashMap::new();
        candles.insert("BTC_USDT/1m".to_owned(), (rising_rows(30), 0));
        candles.insert("BTC_USDT/15m".to_owned(), (rising_rows(30), 0));
        let source: Arc<dyn PayloadSource> = Arc::new(StaticSource {
            candles,
            tickers: HashMap::new(),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let snapshot = build_snapshot(source, &config, cancel).await;
        assert!(snapshot.entries.is_empty());
        assert!(snapshot.is_total_failure());
    }

    /// Ticker source that never answers.
    struct StalledTickerSource;

    impl PayloadSource for StalledTickerSource {
        fn name(&self) -> &str {
            "stalled"
        }

        fn fetch_candles(
            &self,
            _symbol: &str,
            _timeframe: TimeFrame,
            _limit: usize,
        ) -> BoxFuture<'_, Result<Value, Report<SourceError>>> {
            Box::pin(futures::future::pending::<Result<Value, Report<SourceError>>>())
        }

        fn fetch_ticker(&self, _symbol: &str) -> BoxFuture<'_, Result<Value, Report<SourceError>>> {
            Box::pin(futures::future::pending::<Result<Value, Report<SourceError>>>())
        }
    }

    #[tokio::test]
    async fn cancellation_stops_stalled_ticker_fetch() {
        let config = config::parse(
            "[general]\n[[pairs]]\nsymbol = \"BTC_USDT\"\ntimeframes = [\"15m\"]\nticker = true\n",
        )
        .unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            build_snapshot(Arc::new(StalledTickerSource), &config, cancel),
        )
        .await
        .expect("snapshot should finish once cancelled");

        assert!(snapshot.tickers.is_empty());
        assert!(snapshot.failures.contains_key("BTC_USDT/ticker"));
        assert!(snapshot.failures.contains_key("BTC_USDT/15m"));
        assert!(snapshot.is_total_failure());
    }
}
