use std::path::{Path, PathBuf};

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::error::SourceError;
use crate::model::TimeFrame;
use crate::source::{PayloadSource, decode_body};

/// Reads payloads saved by an external fetcher.
///
/// Layout: `<dir>/<symbol>_<timeframe>.json` for klines and
/// `<dir>/<symbol>_ticker.json` for tickers.
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn candles_path(&self, symbol: &str, timeframe: TimeFrame) -> PathBuf {
        self.dir.join(format!("{symbol}_{timeframe}.json"))
    }

    fn ticker_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}_ticker.json"))
    }
}

async fn read_payload(path: &Path) -> Result<Value, Report<SourceError>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .change_context(SourceError::Read {
            source_name: "file".into(),
        })
        .attach_with(|| format!("path: {}", path.display()))?;
    debug!(path = %path.display(), bytes = text.len(), "payload file read");
    Ok(decode_body(text))
}

impl PayloadSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        _limit: usize,
    ) -> BoxFuture<'_, Result<Value, Report<SourceError>>> {
        let path = self.candles_path(symbol, timeframe);
        Box::pin(async move { read_payload(&path).await })
    }

    fn fetch_ticker(&self, symbol: &str) -> BoxFuture<'_, Result<Value, Report<SourceError>>> {
        let path = self.ticker_path(symbol);
        Box::pin(async move { read_payload(&path).await })
    }
}
