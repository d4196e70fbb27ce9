//! Bounded recording buffer for `f32` audio samples.
//!
//! The listener taps every captured sample into a [`RingBuffer`].  While the
//! user is silent only a short *pre-roll* is kept (see
//! [`retain_last`](RingBuffer::retain_last)) so that the first syllable of an
//! utterance is not clipped; once speech starts the buffer grows up to its
//! capacity, after which the oldest samples are dropped.
//!
//! # Example
//!
//! ```rust
//! use voice_chat::audio::RingBuffer;
//!
//! let mut buf = RingBuffer::new(4);
//! buf.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]); // 5 items → capacity 4 → oldest dropped
//! assert_eq!(buf.drain(), vec![2.0, 3.0, 4.0, 5.0]);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity FIFO that overwrites its oldest items when full.
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Copy> RingBuffer<T> {
    /// Create a new ring buffer with the given `capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `data`, discarding the oldest items beyond `capacity`.
    pub fn push_slice(&mut self, data: &[T]) {
        let data = if data.len() > self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };
        let overflow = (self.items.len() + data.len()).saturating_sub(self.capacity);
        self.items.drain(..overflow);
        self.items.extend(data.iter().copied());
    }

    /// Drop everything except the newest `keep` items.
    pub fn retain_last(&mut self, keep: usize) {
        let excess = self.items.len().saturating_sub(keep);
        self.items.drain(..excess);
    }

    /// Drain all stored items in chronological order, leaving the buffer
    /// empty.
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    /// Copy the stored items in chronological order without consuming them.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    /// Stored duration in seconds, assuming `sample_rate` Hz mono.
    pub fn duration_secs(&self, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.items.len() as f32 / sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// SharedRecorder
// ---------------------------------------------------------------------------

/// Recording buffer shared between the listener task (writer) and the turn
/// controller (which cuts the utterance out of it).
pub type SharedRecorder = Arc<Mutex<RingBuffer<f32>>>;

/// Build a [`SharedRecorder`] large enough for `max_secs` of audio.
pub fn new_recorder(sample_rate: u32, max_secs: f32) -> SharedRecorder {
    let capacity = (sample_rate as f32 * max_secs.max(0.0)) as usize;
    Arc::new(Mutex::new(RingBuffer::new(capacity.max(1))))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_drain_within_capacity() {
        let mut buf = RingBuffer::new(8);
        buf.push_slice(&[1.0_f32, 2.0, 3.0]);
        assert_eq!(buf.len(), 3);
        assert!(!buf.is_full());

        assert_eq!(buf.drain(), vec![1.0, 2.0, 3.0]);
        assert!(buf.is_empty());
    }

    #[test]
    fn overflow_keeps_newest_across_calls() {
        let mut buf = RingBuffer::new(3);
        buf.push_slice(&[1.0_f32, 2.0, 3.0]);
        buf.push_slice(&[4.0, 5.0]);

        assert!(buf.is_full());
        assert_eq!(buf.drain(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn oversized_push_keeps_tail() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(buf.drain(), vec![5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn retain_last_trims_to_pre_roll() {
        let mut buf = RingBuffer::new(16);
        buf.push_slice(&[1.0_f32, 2.0, 3.0, 4.0, 5.0]);
        buf.retain_last(2);
        assert_eq!(buf.snapshot(), vec![4.0, 5.0]);

        // Keeping more than is stored is a no-op.
        buf.retain_last(10);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn snapshot_does_not_consume() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1.0_f32, 2.0]);
        assert_eq!(buf.snapshot(), vec![1.0, 2.0]);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn clear_then_reuse() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1.0_f32, 2.0, 3.0, 4.0, 5.0]);
        buf.clear();
        assert!(buf.is_empty());

        buf.push_slice(&[9.0_f32]);
        assert_eq!(buf.drain(), vec![9.0]);
    }

    #[test]
    fn duration_secs_calculation() {
        let mut buf = RingBuffer::new(16_000);
        buf.push_slice(&vec![0.0_f32; 8_000]);
        assert!((buf.duration_secs(16_000) - 0.5).abs() < 1e-6);
        assert_eq!(buf.duration_secs(0), 0.0);
    }

    #[test]
    fn recorder_capacity_follows_duration() {
        let rec = new_recorder(16_000, 2.0);
        assert_eq!(rec.lock().unwrap().capacity(), 32_000);

        let tiny = new_recorder(16_000, 0.0);
        assert_eq!(tiny.lock().unwrap().capacity(), 1);
    }

    #[test]
    #[should_panic(expected = "RingBuffer capacity must be > 0")]
    fn zero_capacity_panics() {
        let _buf: RingBuffer<f32> = RingBuffer::new(0);
    }
}
