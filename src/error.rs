use thiserror::Error;

/// Errors surfaced by the sink. Anything not listed here is an invariant
/// violation and aborts the cycle.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("unsupported item size {size} on channel {channel}")]
    UnsupportedItemSize { channel: usize, size: usize },

    #[error("expected {expected} input channels, got {got}")]
    ChannelCountMismatch { expected: usize, got: usize },

    #[error("channel {channel} buffer too short: need {needed} bytes, have {len}")]
    BufferTooShort { channel: usize, needed: usize, len: usize },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("worker pool is not running")]
    PoolNotRunning,

    #[error("worker pool already running")]
    AlreadyRunning,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SinkError>;
