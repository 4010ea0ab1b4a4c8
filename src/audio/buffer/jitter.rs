//! Bounded FIFO of assembled frames absorbing decode latency.
//!
//! Pushing at capacity evicts the oldest frame, so a decoder that outruns
//! playback bounds memory instead of growing latency without limit.

use std::collections::VecDeque;

use crate::{audio::frame::Frame, configs::BufferConfig};

pub struct JitterBuffer {
    frames: VecDeque<Frame>,
    capacity: usize,
    dropped: u64,
    underruns: u64,
}

impl JitterBuffer {
    /// Create a buffer holding at most `capacity` frames (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
            underruns: 0,
        }
    }

    /// Appends `frame`, returning the evicted oldest frame when already full.
    pub fn push(&mut self, frame: Frame) -> Option<Frame> {
        let evicted = if self.frames.len() >= self.capacity {
            self.dropped += 1;
            self.frames.pop_front()
        } else {
            None
        };
        self.frames.push_back(frame);
        evicted
    }

    pub fn pop_front(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames evicted by overflow since the last `clear`.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    pub fn record_underrun(&mut self) -> u64 {
        self.underruns += 1;
        self.underruns
    }

    /// Empties the queue and resets the counters.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.dropped = 0;
        self.underruns = 0;
    }
}

/// Coarse buffer level relative to the configured watermarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferHealth {
    Starved,
    /// Below `low_frames`; corrective pacing applies.
    Low,
    /// Between `low_frames` and `target_frames`.
    Degraded,
    Healthy,
}

impl BufferHealth {
    pub fn classify(len: usize, config: &BufferConfig) -> Self {
        if len == 0 {
            Self::Starved
        } else if len < config.low_frames {
            Self::Low
        } else if len < config.target_frames {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame(tag: i16) -> Frame {
        Frame::from_samples(vec![tag; 4])
    }

    #[test]
    fn fifo_order() {
        let mut buffer = JitterBuffer::new(8);
        for tag in 0..3 {
            assert!(buffer.push(frame(tag)).is_none());
        }
        assert_eq!(buffer.pop_front(), Some(frame(0)));
        assert_eq!(buffer.pop_front(), Some(frame(1)));
        assert_eq!(buffer.pop_front(), Some(frame(2)));
        assert_eq!(buffer.pop_front(), None);
    }

    #[test]
    fn overflow_evicts_exactly_the_oldest() {
        let mut buffer = JitterBuffer::new(3);
        for tag in 0..3 {
            buffer.push(frame(tag));
        }

        assert_eq!(buffer.push(frame(3)), Some(frame(0)));
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.dropped(), 1);

        let remaining: Vec<Frame> = std::iter::from_fn(|| buffer.pop_front()).collect();
        assert_eq!(remaining, vec![frame(1), frame(2), frame(3)]);
    }

    #[test]
    fn clear_resets_counters() {
        let mut buffer = JitterBuffer::new(1);
        buffer.push(frame(0));
        buffer.push(frame(1));
        buffer.record_underrun();
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.dropped(), 0);
        assert_eq!(buffer.underruns(), 0);
    }

    #[test]
    fn health_follows_watermarks() {
        let config = BufferConfig {
            low_frames: 10,
            target_frames: 20,
            ..BufferConfig::default()
        };
        assert_eq!(BufferHealth::classify(0, &config), BufferHealth::Starved);
        assert_eq!(BufferHealth::classify(9, &config), BufferHealth::Low);
        assert_eq!(BufferHealth::classify(10, &config), BufferHealth::Degraded);
        assert_eq!(BufferHealth::classify(20, &config), BufferHealth::Healthy);
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(capacity in 1usize..32, ops in proptest::collection::vec(any::<bool>(), 0..200)) {
            let mut buffer = JitterBuffer::new(capacity);
            let mut next = 0i16;
            for push in ops {
                if push {
                    buffer.push(frame(next));
                    next = next.wrapping_add(1);
                } else {
                    buffer.pop_front();
                }
                prop_assert!(buffer.len() <= capacity);
            }
        }
    }
}
