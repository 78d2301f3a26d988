use thiserror::Error;

/// Rejections of a relay command. The display strings are the exact `error`
/// values sent back to HTTP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Missing ch or state")]
    MissingParams,
    #[error("ch must be 1-4")]
    ChannelOutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("sensor read failed: {0}")]
    ReadFailed(String),
    #[error("sensor returned invalid data")]
    InvalidData,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid runtime config: {0}")]
    Parse(#[from] serde_json::Error),
}
