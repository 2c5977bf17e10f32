//! A fixed-capacity circular store of audio frames.
//!
//! The ring is sample-granular (the controller pops arbitrary sample counts)
//! but its overflow policy is frame-granular: writing into a full ring
//! evicts the oldest whole frame per overflowing frame and counts it, so a
//! fast producer degrades the stream instead of blocking it.

use tracing::debug;

use crate::audio::AudioSample;

pub struct AudioRingBuffer<Sample> {
    store: Box<[Sample]>,
    frame_samples: usize,
    read_pos: usize,
    filled: usize,
    overflow_count: u64,
}

impl<Sample: AudioSample> AudioRingBuffer<Sample> {
    pub fn new(frame_samples: usize, frame_capacity: usize) -> Self {
        assert!(frame_samples > 0, "frames must hold at least one sample");
        assert!(frame_capacity > 0, "ring must hold at least one frame");
        Self {
            store: vec![Sample::silence(); frame_samples * frame_capacity].into_boxed_slice(),
            frame_samples,
            read_pos: 0,
            filled: 0,
            overflow_count: 0,
        }
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    pub fn frame_capacity(&self) -> usize {
        self.store.len() / self.frame_samples
    }

    pub fn samples_available(&self) -> usize {
        self.filled
    }

    pub fn frames_available(&self) -> usize {
        self.filled / self.frame_samples
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    pub fn reset_overflow_count(&mut self) {
        self.overflow_count = 0;
    }

    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.filled = 0;
    }

    /// Append interleaved samples, evicting the oldest frame whenever the
    /// ring is full. Never blocks; always writes everything handed to it.
    pub fn write_samples(&mut self, data: &[Sample]) -> usize {
        for &sample in data {
            self.push_sample(sample);
        }
        data.len()
    }

    /// Append `count` silent samples under the same overflow policy.
    pub fn write_silent_samples(&mut self, count: usize) -> usize {
        for _ in 0..count {
            self.push_sample(Sample::silence());
        }
        count
    }

    /// Read up to `max_samples` from the front of the ring.
    ///
    /// With `all_or_nothing` set, returns an empty vector unless the full
    /// request can be satisfied.
    pub fn read_samples(&mut self, max_samples: usize, all_or_nothing: bool) -> Vec<Sample> {
        if all_or_nothing && self.filled < max_samples {
            return Vec::new();
        }
        let count = max_samples.min(self.filled);
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.store[self.read_pos]);
            self.read_pos = (self.read_pos + 1) % self.store.len();
        }
        self.filled -= count;
        out
    }

    /// Discard up to `count` samples from the front of the ring, returning
    /// how many were discarded. The controller uses this to shed old frames
    /// when standing latency builds up.
    pub fn skip_oldest_samples(&mut self, count: usize) -> usize {
        let count = count.min(self.filled);
        self.read_pos = (self.read_pos + count) % self.store.len();
        self.filled -= count;
        count
    }

    fn push_sample(&mut self, sample: Sample) {
        if self.filled == self.store.len() {
            self.drop_oldest_frame();
        }
        let write_pos = (self.read_pos + self.filled) % self.store.len();
        self.store[write_pos] = sample;
        self.filled += 1;
    }

    fn drop_oldest_frame(&mut self) {
        let count = self.frame_samples.min(self.filled);
        self.read_pos = (self.read_pos + count) % self.store.len();
        self.filled -= count;
        self.overflow_count += 1;
        debug!(overflows = self.overflow_count, "ring full, evicted oldest frame");
    }
}
