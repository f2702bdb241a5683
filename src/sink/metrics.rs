use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use serde::Serialize;

use crate::event::SampleTime;

pub const ROLLING_WINDOW_SIZE: usize = 50;

/// Mean over the last N pushed samples. Single reader, no locking.
pub struct RollingMean {
    samples: HeapRb<f64>,
}

impl std::fmt::Debug for RollingMean {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollingMean")
            .field("len", &self.samples.occupied_len())
            .field("mean", &self.mean())
            .finish()
    }
}

impl RollingMean {
    pub fn new(window: usize) -> Self {
        Self { samples: HeapRb::new(window) }
    }

    /// Push a sample, evicting the oldest once full, and return the new mean.
    pub fn push(&mut self, value: f64) -> f64 {
        self.samples.push_overwrite(value);
        self.mean()
    }

    pub fn mean(&self) -> f64 {
        let len = self.samples.occupied_len();
        if len == 0 {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / len as f64
    }

    pub fn len(&self) -> usize {
        self.samples.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for RollingMean {
    fn default() -> Self {
        Self::new(ROLLING_WINDOW_SIZE)
    }
}

/// 100 * part / whole, or 0 when `whole` is 0.
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Read-only monitoring snapshot. Nothing here feeds back into scheduling.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SinkStats {
    pub events_ready_running: u64,
    pub events_discarded: u64,
    pub events_handled_immediately: u64,
    pub events_received_too_late: u64,
    pub events_added: u64,
    pub events_removed: u64,
    pub buffer_window_size: u64,
    pub event_time: SampleTime,
    pub running_handlers: u64,
    pub pending_queue_len: u64,
    pub avg_run_ratio: f64,
    pub avg_thread_utilization: f64,
}
