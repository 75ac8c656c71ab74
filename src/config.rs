use std::collections::HashSet;
use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::TimeFrame;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_bias_timeframe() -> String {
    "15m".into()
}

fn default_source_kind() -> String {
    "file".into()
}

fn default_payload_dir() -> String {
    "./payloads".into()
}

fn default_base_url() -> String {
    "https://contract.mexc.com".into()
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_timeframes() -> Vec<String> {
    vec!["1m".into(), "15m".into()]
}

fn default_limit() -> usize {
    300
}

const DEFAULT_SYMBOLS: &[&str] = &["BTC_USDT", "ETH_USDT", "SOL_USDT"];

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub pairs: Vec<PairConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Timeframe whose series gets a bias classification.
    #[serde(default = "default_bias_timeframe")]
    pub bias_timeframe: String,
}

#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    /// Accepted values: `"file"` | `"mexc"`
    #[serde(default = "default_source_kind")]
    pub kind: String,
    #[serde(default = "default_payload_dir")]
    pub dir: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            dir: default_payload_dir(),
            base_url: default_base_url(),
            requests_per_second: default_requests_per_second(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairConfig {
    pub symbol: String,
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<String>,
    /// Newest candles kept in the canonical series.
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub ticker: bool,
}

impl AppConfig {
    /// The validated bias timeframe.
    pub fn bias_timeframe(&self) -> TimeFrame {
        TimeFrame::from_str(&self.general.bias_timeframe).unwrap_or(TimeFrame::Min15)
    }
}

/// Pairs used when the config file lists none.
pub fn default_pairs() -> Vec<PairConfig> {
    DEFAULT_SYMBOLS
        .iter()
        .map(|symbol| PairConfig {
            symbol: (*symbol).to_owned(),
            timeframes: default_timeframes(),
            limit: default_limit(),
            ticker: false,
        })
        .collect()
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    parse(&content)
}

/// Parse and validate config text, filling in the default pair list.
pub fn parse(content: &str) -> Result<AppConfig, Report<ConfigError>> {
    let mut config: AppConfig = toml::from_str(content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    if config.pairs.is_empty() {
        config.pairs = default_pairs();
    }

    validate(&config)?;

    Ok(config)
}

const VALID_LOG_FORMATS: &[&str] = &["text", "json"];
const VALID_SOURCE_KINDS: &[&str] = &["file", "mexc"];

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(config)?;
    validate_source(config)?;
    validate_pairs(config)?;
    Ok(())
}

fn validate_general(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_LOG_FORMATS.contains(&config.general.log_format.as_str()) {
        return Err(Report::new(ConfigError::Validation {
            field: format!(
                "general.log_format \"{}\" is not valid",
                config.general.log_format
            ),
        }));
    }
    if TimeFrame::from_str(&config.general.bias_timeframe).is_none() {
        return Err(Report::new(ConfigError::Validation {
            field: format!(
                "general.bias_timeframe: unknown timeframe \"{}\"",
                config.general.bias_timeframe
            ),
        }));
    }
    Ok(())
}

fn validate_source(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let source = &config.source;
    if !VALID_SOURCE_KINDS.contains(&source.kind.as_str()) {
        return Err(Report::new(ConfigError::Validation {
            field: format!("source.kind \"{}\" is not valid", source.kind),
        }));
    }
    if source.requests_per_second == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "source.requests_per_second must be > 0".into(),
        }));
    }
    Ok(())
}

fn validate_pairs(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let mut seen = HashSet::new();
    for pair in &config.pairs {
        if pair.symbol.trim().is_empty() {
            return Err(Report::new(ConfigError::Validation {
                field: "pairs[].symbol must not be empty".into(),
            }));
        }
        if !seen.insert(pair.symbol.as_str()) {
            return Err(Report::new(ConfigError::Validation {
                field: format!("pairs: duplicate symbol \"{}\"", pair.symbol),
            }));
        }
        if pair.limit == 0 {
            return Err(Report::new(ConfigError::Validation {
                field: format!("pairs[symbol={}].limit must be > 0", pair.symbol),
            }));
        }
        for tf in &pair.timeframes {
            if TimeFrame::from_str(tf).is_none() {
                return Err(Report::new(ConfigError::Validation {
                    field: format!(
                        "pairs[symbol={}].timeframes: unknown timeframe \"{}\"",
                        pair.symbol, tf
                    ),
                }));
            }
        }
    }
    Ok(())
}
