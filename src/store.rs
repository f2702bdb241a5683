use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::event::{Event, SampleTime};

/// Counters maintained by the store itself; the sink only reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounters {
    pub discarded: u64,
    pub handled_immediately: u64,
    pub received_too_late: u64,
    pub added: u64,
    pub removed: u64,
    /// Anchor of the most recently yielded event.
    pub event_time: SampleTime,
}

/// Time-ordered store of registered events not yet ready for dispatch.
pub trait ReadyEventStore: Send + Sync {
    /// Next event whose full span lies inside `[min_time, max_time)`, if any.
    fn fetch_next_ready(&self, min_time: SampleTime, max_time: SampleTime) -> Option<Event>;
    fn next_pending_time(&self) -> Option<SampleTime>;
    fn is_empty(&self) -> bool;
    fn len(&self) -> usize;
    fn counters(&self) -> StoreCounters;
}

/// What to do with an event that starts before the oldest retained sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarlyBehavior {
    #[default]
    Discard,
    Asap,
}

#[derive(Debug, Default)]
struct StoreInner {
    // (anchor, arrival) keeps FIFO order among equal anchors
    pending: BTreeMap<(SampleTime, u64), Event>,
    arrivals: u64,
    last_min: SampleTime,
    counters: StoreCounters,
}

/// In-memory implementation of the ready-event store.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    early: EarlyBehavior,
    inner: Mutex<StoreInner>,
}

impl MemoryEventStore {
    pub fn new(early: EarlyBehavior) -> Self {
        Self { early, inner: Mutex::new(StoreInner::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add(&self, event: Event) {
        let mut inner = self.lock();
        if event.anchor() < inner.last_min {
            inner.counters.received_too_late += 1;
        }
        inner.counters.added += 1;
        let arrival = inner.arrivals;
        inner.arrivals += 1;
        inner.pending.insert((event.anchor(), arrival), event);
    }
}

impl ReadyEventStore for MemoryEventStore {
    fn fetch_next_ready(&self, min_time: SampleTime, max_time: SampleTime) -> Option<Event> {
        let mut inner = self.lock();
        inner.last_min = inner.last_min.max(min_time);

        loop {
            let (&key, head) = inner.pending.first_key_value()?;

            if head.anchor() < min_time {
                // An early event that cannot fit would pin the window forever.
                if self.early == EarlyBehavior::Discard || head.end() > max_time {
                    inner.pending.remove(&key);
                    inner.counters.discarded += 1;
                    inner.counters.removed += 1;
                    continue;
                }
                inner.counters.handled_immediately += 1;
            } else if head.end() > max_time {
                return None;
            }

            let event = inner.pending.remove(&key)?;
            inner.counters.removed += 1;
            inner.counters.event_time = event.anchor();
            return Some(event);
        }
    }

    fn next_pending_time(&self) -> Option<SampleTime> {
        self.lock().pending.first_key_value().map(|(&(anchor, _), _)| anchor)
    }

    fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    fn len(&self) -> usize {
        self.lock().pending.len()
    }

    fn counters(&self) -> StoreCounters {
        self.lock().counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_in_anchor_order_only_when_span_fits() {
        let store = MemoryEventStore::new(EarlyBehavior::Discard);
        store.add(Event::new(300, 50));
        store.add(Event::new(100, 50));

        assert_eq!(store.next_pending_time(), Some(100));
        assert!(store.fetch_next_ready(0, 149).is_none());

        let first = store.fetch_next_ready(0, 150).unwrap();
        assert_eq!(first.anchor(), 100);
        assert!(store.fetch_next_ready(0, 150).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn discard_drops_events_behind_the_window() {
        let store = MemoryEventStore::new(EarlyBehavior::Discard);
        store.add(Event::new(10, 5));
        store.add(Event::new(60, 5));

        let ev = store.fetch_next_ready(50, 100).unwrap();
        assert_eq!(ev.anchor(), 60);
        let counters = store.counters();
        assert_eq!(counters.discarded, 1);
        assert_eq!(counters.removed, 2);
    }

    #[test]
    fn asap_yields_early_events() {
        let store = MemoryEventStore::new(EarlyBehavior::Asap);
        store.add(Event::new(10, 5));
        let ev = store.fetch_next_ready(50, 100).unwrap();
        assert_eq!(ev.anchor(), 10);
        assert_eq!(store.counters().handled_immediately, 1);
    }

    #[test]
    fn asap_discards_early_events_that_cannot_fit() {
        let store = MemoryEventStore::new(EarlyBehavior::Asap);
        store.add(Event::new(10, 500));
        assert!(store.fetch_next_ready(50, 100).is_none());
        assert!(store.is_empty());
        assert_eq!(store.counters().discarded, 1);
    }

    #[test]
    fn late_arrivals_are_counted() {
        let store = MemoryEventStore::new(EarlyBehavior::Discard);
        assert!(store.fetch_next_ready(500, 600).is_none());
        store.add(Event::new(400, 10));
        assert_eq!(store.counters().received_too_late, 1);
        assert_eq!(store.counters().added, 1);
    }
}
