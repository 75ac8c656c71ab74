pub mod file;
pub mod mexc;

use error_stack::Report;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::SourceError;
use crate::model::TimeFrame;

/// Supplier of raw, undecoded-shape payloads.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn PayloadSource`).
pub trait PayloadSource: Send + Sync {
    /// Name used in logs and error contexts.
    fn name(&self) -> &str;

    /// Raw kline payload for one symbol and timeframe.
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<Value, Report<SourceError>>>;

    /// Raw ticker payload for one symbol.
    fn fetch_ticker(&self, symbol: &str) -> BoxFuture<'_, Result<Value, Report<SourceError>>>;
}

/// Decode response text, keeping undecodable text as a JSON string so the
/// payload detector can try its literal pass on it.
pub fn decode_body(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}
