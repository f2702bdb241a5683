use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SinkError};
use crate::sink::dispatch::CongestionPolicy;
use crate::sink::live_index::SearchStrategyKind;

/// Item width of a complex int16 sample (I/Q pair of i16).
pub const COMPLEX_I16_SIZE: usize = 4;
/// Item width of a complex float32 sample (I/Q pair of f32).
pub const COMPLEX_F32_SIZE: usize = 8;

const SAMPLES_PER_KILOSAMPLE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Bytes per sample on this channel.
    pub item_size: usize,
}

impl ChannelSpec {
    pub fn complex_i16() -> Self {
        Self { item_size: COMPLEX_I16_SIZE }
    }

    pub fn complex_f32() -> Self {
        Self { item_size: COMPLEX_F32_SIZE }
    }
}

/// Construction-time configuration of an [`EventSink`](crate::sink::EventSink).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub channels: Vec<ChannelSpec>,
    pub n_threads: usize,
    /// Retained history, in units of 1024 samples.
    pub history_kilosamples: usize,
    pub search: SearchStrategyKind,
    pub congestion: CongestionPolicy,
    pub dispatch_capacity: usize,
    pub completion_capacity: usize,
    pub block_retry_ms: u64,
    /// Tag key that marks the end of a finite stream.
    pub end_of_stream_key: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            channels: vec![ChannelSpec::complex_f32()],
            n_threads: 4,
            history_kilosamples: 1,
            search: SearchStrategyKind::Forward,
            congestion: CongestionPolicy::Block,
            dispatch_capacity: 100,
            completion_capacity: 100,
            block_retry_ms: 1,
            end_of_stream_key: "file_end".to_string(),
        }
    }
}

impl SinkConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: SinkConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Retained history depth in samples.
    pub fn history(&self) -> u64 {
        (self.history_kilosamples * SAMPLES_PER_KILOSAMPLE) as u64
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(SinkError::InvalidConfig("at least one channel is required".into()));
        }
        if self.n_threads == 0 {
            return Err(SinkError::InvalidConfig("n_threads must be > 0".into()));
        }
        if self.history_kilosamples == 0 {
            return Err(SinkError::InvalidConfig("history_kilosamples must be > 0".into()));
        }
        if self.dispatch_capacity == 0 || self.completion_capacity == 0 {
            return Err(SinkError::InvalidConfig("queue capacities must be > 0".into()));
        }
        for (channel, spec) in self.channels.iter().enumerate() {
            match spec.item_size {
                COMPLEX_I16_SIZE | COMPLEX_F32_SIZE => {}
                size => return Err(SinkError::UnsupportedItemSize { channel, size }),
            }
        }
        Ok(())
    }
}
