use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde_json::Value;
use tracing::info;

use crate::error::SourceError;
use crate::model::TimeFrame;
use crate::source::{PayloadSource, decode_body};

/// MEXC contract REST API. Performs one request per call; no retries.
pub struct MexcSource {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl MexcSource {
    pub fn new(
        base_url: &str,
        requests_per_second: u32,
        timeout: Duration,
    ) -> Result<Self, Report<SourceError>> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("candle-snapshot/0.1")
            .build()
            .change_context(SourceError::Client {
                source_name: "mexc".into(),
            })?;
        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1_u32));
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        })
    }

    async fn get(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, Report<SourceError>> {
        // Wait for rate limiter before making the request
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .change_context(SourceError::Request {
                source_name: "mexc".into(),
            })
            .attach_with(|| format!("url: {url}"))?;

        if !response.status().is_success() {
            return Err(Report::new(SourceError::Request {
                source_name: "mexc".into(),
            })
            .attach(format!("HTTP status: {}", response.status())));
        }

        let text = response.text().await.change_context(SourceError::Read {
            source_name: "mexc".into(),
        })?;
        Ok(decode_body(text))
    }
}

impl PayloadSource for MexcSource {
    fn name(&self) -> &str {
        "mexc"
    }

    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<Value, Report<SourceError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let url = format!("{}/api/v1/contract/kline/{}", self.base_url, symbol);
            let limit = limit.to_string();
            let params = [
                ("interval", timeframe.mexc_interval()),
                ("limit", limit.as_str()),
            ];
            let payload = self.get(&url, &params).await?;
            info!(symbol = %symbol, timeframe = %timeframe, "mexc kline payload received");
            Ok(payload)
        })
    }

    fn fetch_ticker(&self, symbol: &str) -> BoxFuture<'_, Result<Value, Report<SourceError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let url = format!("{}/api/v1/contract/ticker", self.base_url);
            let payload = self.get(&url, &[("symbol", symbol.as_str())]).await?;
            info!(symbol = %symbol, "mexc ticker payload received");
            Ok(payload)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let source =
            MexcSource::new("https://contract.mexc.com/", 5, Duration::from_secs(5)).unwrap();
        assert_eq!(source.base_url, "https://contract.mexc.com");
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_candles() {
        let source =
            MexcSource::new("https://contract.mexc.com", 5, Duration::from_secs(15)).unwrap();
        let payload = source
            .fetch_candles("BTC_USDT", TimeFrame::Min15, 10)
            .await
            .unwrap();
        let normalized = crate::normalize::normalize(
            payload,
            "BTC_USDT/15m",
            &tokio_util::sync::CancellationToken::new(),
        )
        .unwrap();
        assert!(!normalized.candles.is_empty());
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_ticker() {
        let source =
            MexcSource::new("https://contract.mexc.com", 5, Duration::from_secs(15)).unwrap();
        let payload = source.fetch_ticker("BTC_USDT").await.unwrap();
        let ticker = crate::ticker::normalize_ticker(payload, "BTC_USDT").unwrap();
        assert!(ticker.price > 0.0);
    }
}
