use std::num::NonZeroUsize;

use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::Indicator;

/// Exponential Moving Average.
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: NonZeroUsize) -> Self {
        Self {
            period: period.get(),
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        "ema"
    }

    fn required_candles(&self) -> usize {
        self.period
    }

    fn calculate(&self, prices: &[f64]) -> Result<Vec<f64>, Report<IndicatorError>> {
        if prices.len() < self.period {
            bail!(IndicatorError::InsufficientData {
                required: self.period,
                available: prices.len(),
            });
        }

        let k = 2.0 / (self.period as f64 + 1.0);
        // Seed with SMA of first `period` values
        let seed: f64 = prices[..self.period].iter().sum::<f64>() / self.period as f64;
        let mut ema = seed;
        let mut results = vec![ema];

        for &price in &prices[self.period..] {
            ema = price * k + ema * (1.0 - k);
            results.push(ema);
        }

        Ok(results)
    }
}
