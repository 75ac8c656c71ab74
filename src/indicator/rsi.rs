use std::num::NonZeroUsize;

use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::Indicator;

/// RSI (Relative Strength Index) using Wilder's smoothing method.
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: NonZeroUsize) -> Self {
        Self {
            period: period.get(),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn required_candles(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, prices: &[f64]) -> Result<Vec<f64>, Report<IndicatorError>> {
        if prices.len() < self.required_candles() {
            bail!(IndicatorError::InsufficientData {
                required: self.required_candles(),
                available: prices.len(),
            });
        }

        let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

        // Seed using simple average of first `period` gains/losses
        let mut avg_gain: f64 = deltas[..self.period]
            .iter()
            .map(|&d| d.max(0.0))
            .sum::<f64>()
            / self.period as f64;
        let mut avg_loss: f64 = deltas[..self.period]
            .iter()
            .map(|&d| (-d).max(0.0))
            .sum::<f64>()
            / self.period as f64;

        let first_rsi = rsi_value(avg_gain, avg_loss);
        let mut results = vec![first_rsi];

        for &delta in &deltas[self.period..] {
            let gain = delta.max(0.0);
            let loss = (-delta).max(0.0);
            avg_gain = (avg_gain * (self.period - 1) as f64 + gain) / self.period as f64;
            avg_loss = (avg_loss * (self.period - 1) as f64 + loss) / self.period as f64;
            results.push(rsi_value(avg_gain, avg_loss));
        }

        Ok(results)
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
