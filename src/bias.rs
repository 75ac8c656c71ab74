use serde::Serialize;

use crate::indicator::IndicatorSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BiasState {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Weak,
    Moderate,
    Strong,
}

/// Directional bias of one series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BiasResult {
    pub state: BiasState,
    pub confidence: Confidence,
}

impl BiasResult {
    const NEUTRAL: Self = Self {
        state: BiasState::Neutral,
        confidence: Confidence::Weak,
    };
}

/// Score needed for a directional bias to count as strong.
const STRONG_SCORE: u8 = 3;
const RSI_BULLISH: f64 = 55.0;
const RSI_BEARISH: f64 = 45.0;

/// Classify the trend from the last close and the series' indicator set.
///
/// Any missing indicator yields neutral/weak.
pub fn classify(close: f64, indicators: &IndicatorSet) -> BiasResult {
    let (Some(ema20), Some(ema50), Some(ema200), Some(rsi)) = (
        indicators.ema20,
        indicators.ema50,
        indicators.ema200,
        indicators.rsi14,
    ) else {
        return BiasResult::NEUTRAL;
    };

    let mut score = 0_u8;
    let state = if close > ema50 && ema20 > ema50 {
        score += 2;
        if ema50 > ema200 {
            score += 1;
        }
        if rsi > RSI_BULLISH {
            score += 1;
        }
        BiasState::Bullish
    } else if close < ema50 && ema20 < ema50 {
        score += 2;
        if ema50 < ema200 {
            score += 1;
        }
        if rsi < RSI_BEARISH {
            score += 1;
        }
        BiasState::Bearish
    } else {
        return BiasResult::NEUTRAL;
    };

    let confidence = if score >= STRONG_SCORE {
        Confidence::Strong
    } else {
        Confidence::Moderate
    };

    BiasResult { state, confidence }
}
