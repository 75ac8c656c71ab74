pub mod ma;
pub mod rsi;

use error_stack::Report;
use nonzero_ext::nonzero;
use serde::Serialize;
use tracing::debug;

use crate::error::IndicatorError;
use crate::indicator::ma::Ema;
use crate::indicator::rsi::Rsi;
use crate::model::Candle;

/// A technical analysis indicator that operates on closing prices.
///
/// Prices must be in ascending chronological order (oldest first).
pub trait Indicator: Send {
    /// Unique name of this indicator (e.g., "rsi", "ema").
    fn name(&self) -> &str;

    /// Minimum number of prices required to produce at least one output value.
    fn required_candles(&self) -> usize;

    /// Calculate indicator values from prices.
    ///
    /// Returns one value per output point. The number of values may be less
    /// than the number of input prices depending on the indicator's lookback.
    fn calculate(&self, prices: &[f64]) -> Result<Vec<f64>, Report<IndicatorError>>;

    /// Most recent value, or `None` when there is not enough data.
    fn latest(&self, prices: &[f64]) -> Option<f64> {
        match self.calculate(prices) {
            Ok(values) => values.last().copied(),
            Err(e) => {
                debug!(indicator = self.name(), error = %e, "indicator unavailable");
                None
            }
        }
    }
}

/// Latest trend indicator values for one series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IndicatorSet {
    pub ema20: Option<f64>,
    pub ema50: Option<f64>,
    pub ema200: Option<f64>,
    pub rsi14: Option<f64>,
}

impl IndicatorSet {
    /// Compute EMA(20/50/200) and RSI(14) from a canonical close series.
    pub fn compute(closes: &[f64]) -> Self {
        Self {
            ema20: Ema::new(nonzero!(20_usize)).latest(closes),
            ema50: Ema::new(nonzero!(50_usize)).latest(closes),
            ema200: Ema::new(nonzero!(200_usize)).latest(closes),
            rsi14: Rsi::new(nonzero!(14_usize)).latest(closes),
        }
    }
}

/// Extract close prices from a slice of candles.
pub fn close_prices(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}
