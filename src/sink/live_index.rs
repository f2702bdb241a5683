use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::event::SampleTime;

/// Picks where a new anchor time goes in an ascending slice.
pub trait SearchStrategy: Debug + Send + Sync {
    fn insertion_index(&self, times: &[SampleTime], time: SampleTime) -> usize;
}

/// Scan from the front; lands before any equal entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardSearch;

impl SearchStrategy for ForwardSearch {
    fn insertion_index(&self, times: &[SampleTime], time: SampleTime) -> usize {
        times.iter().position(|&t| t >= time).unwrap_or(times.len())
    }
}

/// Scan from the back; lands after any equal entries.
/// Cheapest when events arrive mostly in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseSearch;

impl SearchStrategy for ReverseSearch {
    fn insertion_index(&self, times: &[SampleTime], time: SampleTime) -> usize {
        times.iter().rposition(|&t| t <= time).map_or(0, |idx| idx + 1)
    }
}

/// Bisection; same placement as [`ForwardSearch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BinarySearch;

impl SearchStrategy for BinarySearch {
    fn insertion_index(&self, times: &[SampleTime], time: SampleTime) -> usize {
        times.partition_point(|&t| t < time)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategyKind {
    #[default]
    Forward,
    Reverse,
    Binary,
}

impl SearchStrategyKind {
    pub fn strategy(self) -> Box<dyn SearchStrategy> {
        match self {
            SearchStrategyKind::Forward => Box::new(ForwardSearch),
            SearchStrategyKind::Reverse => Box::new(ReverseSearch),
            SearchStrategyKind::Binary => Box::new(BinarySearch),
        }
    }
}

/// Ascending anchor times of events dispatched but not yet completed.
///
/// Only the producer touches this; workers report completions through the
/// completion queue instead.
#[derive(Debug)]
pub struct LiveEventIndex {
    times: Vec<SampleTime>,
    search: Box<dyn SearchStrategy>,
}

impl LiveEventIndex {
    pub fn new(kind: SearchStrategyKind) -> Self {
        Self::with_strategy(kind.strategy())
    }

    pub fn with_strategy(search: Box<dyn SearchStrategy>) -> Self {
        Self { times: Vec::new(), search }
    }

    pub fn insert(&mut self, time: SampleTime) {
        let idx = self.search.insertion_index(&self.times, time);
        self.times.insert(idx, time);
    }

    /// Removes the first entry equal to `time`. Returns false if none matched.
    pub fn remove_one(&mut self, time: SampleTime) -> bool {
        match self.times.iter().position(|&t| t == time) {
            Some(idx) => {
                self.times.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn earliest(&self) -> Option<SampleTime> {
        self.times.first().copied()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn as_slice(&self) -> &[SampleTime] {
        &self.times
    }
}
