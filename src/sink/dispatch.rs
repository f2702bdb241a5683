use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, SinkError};
use crate::event::{Event, EventId, SampleTime};

/// Producer behavior when the dispatch queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CongestionPolicy {
    /// Sleep and retry until a slot frees up. Never loses an event.
    #[default]
    Block,
    /// Give the event up immediately.
    Drop,
}

#[derive(Debug)]
pub enum PushError {
    Full(Event),
    Closed(Event),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Enqueued { anchor: SampleTime },
    Dropped { id: EventId, anchor: SampleTime },
}

/// Producer half of the bounded hand-off to the worker pool.
///
/// The channel doubles as the wake signal: a push releases one worker blocked
/// in `recv`. Ownership of the event moves with it; once enqueued the producer
/// cannot reach it again.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: Sender<Event>,
}

impl DispatchQueue {
    pub fn bounded(capacity: usize) -> (Self, Receiver<Event>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }

    pub fn try_push(&self, event: Event) -> std::result::Result<(), PushError> {
        self.tx.try_send(event).map_err(|err| match err {
            TrySendError::Full(event) => PushError::Full(event),
            TrySendError::Disconnected(event) => PushError::Closed(event),
        })
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Push `event` under `policy`. `on_wait` runs between Block retries so the
/// caller can keep draining completions while it waits for space.
pub fn dispatch_with_policy(
    queue: &DispatchQueue,
    event: Event,
    policy: CongestionPolicy,
    retry: Duration,
    mut on_wait: impl FnMut(),
) -> Result<DispatchOutcome> {
    let anchor = event.anchor();
    let mut pending = event;

    loop {
        match queue.try_push(pending) {
            Ok(()) => return Ok(DispatchOutcome::Enqueued { anchor }),
            Err(PushError::Closed(_)) => return Err(SinkError::PoolNotRunning),
            Err(PushError::Full(event)) => match policy {
                CongestionPolicy::Drop => {
                    return Ok(DispatchOutcome::Dropped { id: event.id(), anchor });
                }
                CongestionPolicy::Block => {
                    on_wait();
                    std::thread::sleep(retry);
                    pending = event;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_gives_up_when_full() {
        let (queue, _rx) = DispatchQueue::bounded(1);
        queue.try_push(Event::new(1, 1)).unwrap();
        let outcome = dispatch_with_policy(
            &queue,
            Event::new(2, 1),
            CongestionPolicy::Drop,
            Duration::from_millis(1),
            || {},
        )
        .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Dropped { anchor: 2, .. }));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn block_retries_until_space() {
        let (queue, rx) = DispatchQueue::bounded(1);
        queue.try_push(Event::new(1, 1)).unwrap();
        let mut waits = 0;
        let outcome = dispatch_with_policy(
            &queue,
            Event::new(2, 1),
            CongestionPolicy::Block,
            Duration::from_millis(1),
            || {
                waits += 1;
                if waits == 3 {
                    rx.try_recv().unwrap();
                }
            },
        )
        .unwrap();
        assert_eq!(outcome, DispatchOutcome::Enqueued { anchor: 2 });
        assert_eq!(waits, 3);
        assert_eq!(rx.try_recv().unwrap().anchor(), 2);
    }

    #[test]
    fn closed_queue_is_an_error() {
        let (queue, rx) = DispatchQueue::bounded(1);
        drop(rx);
        let err = dispatch_with_policy(
            &queue,
            Event::new(1, 1),
            CongestionPolicy::Block,
            Duration::from_millis(1),
            || {},
        )
        .unwrap_err();
        assert!(matches!(err, SinkError::PoolNotRunning));
    }
}
