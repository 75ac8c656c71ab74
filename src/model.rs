use std::fmt;

use serde::{Deserialize, Serialize};

/// Candle timeframe supported by the application.
///
/// String representations match the config file format (e.g. `"1m"`, `"15m"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeFrame {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
}

impl TimeFrame {
    /// Parse a config-format string into a `TimeFrame`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::Min1),
            "5m" => Some(Self::Min5),
            "15m" => Some(Self::Min15),
            "30m" => Some(Self::Min30),
            "1h" => Some(Self::Hour1),
            "4h" => Some(Self::Hour4),
            "1d" => Some(Self::Day1),
            _ => None,
        }
    }

    /// Return the config-format string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min1 => "1m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Min30 => "30m",
            Self::Hour1 => "1h",
            Self::Hour4 => "4h",
            Self::Day1 => "1d",
        }
    }

    /// Return the MEXC contract kline interval name for this timeframe.
    pub fn mexc_interval(self) -> &'static str {
        match self {
            Self::Min1 => "Min1",
            Self::Min5 => "Min5",
            Self::Min15 => "Min15",
            Self::Min30 => "Min30",
            Self::Hour1 => "Min60",
            Self::Hour4 => "Hour4",
            Self::Day1 => "Day1",
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One OHLCV observation with its timestamp in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Quote-currency volume; `None` when upstream omits it.
    pub turnover: Option<f64>,
}

/// Latest quote for a contract, normalized from a ticker payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ticker {
    pub symbol: String,
    pub price: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub volume_24h: Option<f64>,
    pub timestamp: Option<i64>,
}

/// `"<symbol>/<timeframe>"` key used in logs and snapshot maps.
pub fn pair_key(symbol: &str, timeframe: TimeFrame) -> String {
    format!("{symbol}/{timeframe}")
}
