use crate::event::SampleTime;

/// Half-open range `[min_time, max_time)` of addressable sample times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub min_time: SampleTime,
    pub max_time: SampleTime,
}

impl Interval {
    pub fn width(&self) -> u64 {
        self.max_time - self.min_time
    }
}

/// Tracks the stream head and derives the addressable interval from it.
#[derive(Debug, Clone)]
pub struct WindowController {
    head: SampleTime,
    history: u64,
}

impl WindowController {
    pub fn new(history: u64) -> Self {
        Self { head: 0, history }
    }

    pub fn head(&self) -> SampleTime {
        self.head
    }

    pub fn history(&self) -> u64 {
        self.history
    }

    /// Interval covering retained history plus `available` new samples.
    pub fn interval(&self, available: usize) -> Interval {
        let min_time = if self.history > self.head {
            0
        } else {
            self.head - self.history + 1
        };
        Interval { min_time, max_time: self.head + available as u64 }
    }

    /// Retained history behind the head; saturates at the history depth.
    pub fn retained_width(&self) -> u64 {
        self.head.min(self.history)
    }

    /// Position of `anchor` in a channel buffer, in items.
    /// Negative when the anchor has already been evicted.
    pub fn buffer_offset(&self, anchor: SampleTime) -> i64 {
        anchor as i64 - self.head as i64 + self.history as i64 - 1
    }

    /// Items a caller must supply per channel for a cycle of `available` samples.
    pub fn buffer_items(&self, available: usize) -> usize {
        self.history as usize - 1 + available
    }

    pub fn advance(&mut self, consumed: usize) {
        self.head += consumed as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_examples() {
        let mut wc = WindowController::new(1024);
        wc.advance(500);
        assert_eq!(wc.interval(100), Interval { min_time: 0, max_time: 600 });

        let mut wc = WindowController::new(1024);
        wc.advance(2000);
        assert_eq!(wc.interval(100), Interval { min_time: 977, max_time: 2100 });
    }

    #[test]
    fn min_never_exceeds_max() {
        for history in [1u64, 2, 16, 1024] {
            let mut wc = WindowController::new(history);
            for step in [0usize, 1, 3, 7, 100, 1500] {
                wc.advance(step);
                for available in [0usize, 1, 64] {
                    let iv = wc.interval(available);
                    assert!(iv.min_time <= iv.max_time);
                }
                if wc.head() >= history {
                    assert_eq!(wc.retained_width(), history);
                }
            }
        }
    }

    #[test]
    fn retained_width_grows_from_zero() {
        let mut wc = WindowController::new(8);
        assert_eq!(wc.retained_width(), 0);
        wc.advance(3);
        assert_eq!(wc.retained_width(), 3);
        wc.advance(30);
        assert_eq!(wc.retained_width(), 8);
    }

    #[test]
    fn offset_of_oldest_retained_sample_is_zero() {
        let mut wc = WindowController::new(1024);
        wc.advance(2000);
        let iv = wc.interval(100);
        assert_eq!(wc.buffer_offset(iv.min_time), 0);
        assert_eq!(wc.buffer_offset(iv.min_time - 1), -1);
        assert_eq!(wc.buffer_items(100) as u64, iv.width());
    }
}
