use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum SourceError {
    #[display("failed to build client for {source_name}")]
    Client { source_name: String },
    #[display("request to {source_name} failed")]
    Request { source_name: String },
    #[display("failed to read payload from {source_name}")]
    Read { source_name: String },
}

#[derive(Debug, Display, Error)]
pub enum NormalizeError {
    /// The payload matched no known shape, or no row survived parsing.
    #[display("malformed payload for {pair}: {reason}")]
    MalformedPayload {
        pair: String,
        reason: String,
        skipped: usize,
    },
    #[display("malformed row: {reason}")]
    MalformedRow { reason: String },
    #[display("normalization of {pair} cancelled")]
    Cancelled { pair: String },
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("insufficient data: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },
}
