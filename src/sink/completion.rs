use crossbeam_queue::ArrayQueue;
use std::time::Duration;
use tracing::debug;

use super::live_index::LiveEventIndex;
use crate::event::SampleTime;

const FULL_BACKOFF: Duration = Duration::from_micros(200);

/// Bounded queue of completed anchor times, workers -> producer.
#[derive(Debug)]
pub struct CompletionQueue {
    done: ArrayQueue<SampleTime>,
}

impl CompletionQueue {
    pub fn new(capacity: usize) -> Self {
        Self { done: ArrayQueue::new(capacity) }
    }

    /// Worker side. Waits for room rather than lose a completion, since a lost
    /// one would pin the live index forever.
    pub fn report(&self, time: SampleTime) {
        let mut pending = time;
        while let Err(rejected) = self.done.push(pending) {
            pending = rejected;
            std::thread::sleep(FULL_BACKOFF);
        }
    }

    /// Producer side. Non-blocking; retires one index entry per completion.
    pub fn drain_into(&self, index: &mut LiveEventIndex) -> usize {
        let mut drained = 0;
        while let Some(time) = self.done.pop() {
            if !index.remove_one(time) {
                debug!(time, "completion for a time not in the live index");
            }
            drained += 1;
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }
}
