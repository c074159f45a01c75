//! Lock-free scratch buffer shared by the capture and render callbacks
//!
//! Single writer (capture), single reader (render). Samples are stored as
//! `f32` bit patterns in relaxed atomics; the write count is published with
//! release ordering after each copy. A reader may see data from the current
//! capture cycle or the previous one, never a blocked callback.
//!
//! When a capture cycle writes fewer samples than the buffer holds, the tail
//! keeps the previous cycle's data. Hardware callback sizes are not
//! guaranteed to match, so this is expected; readers only trust indices
//! below [`SharedFrameBuffer::written`].

use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Fixed-capacity interleaved sample buffer
pub struct SharedFrameBuffer {
    samples: Box<[AtomicU32]>,
    written: CachePadded<AtomicUsize>,
}

impl SharedFrameBuffer {
    /// Create a zeroed buffer holding `capacity` samples
    pub fn new(capacity: usize) -> Self {
        let samples: Vec<AtomicU32> = (0..capacity)
            .map(|_| AtomicU32::new(0.0f32.to_bits()))
            .collect();

        Self {
            samples: samples.into_boxed_slice(),
            written: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Capacity in samples
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Copy one capture cycle in (producer side).
    ///
    /// Copies `min(data.len(), capacity)` samples and returns how many were
    /// copied. Never blocks or allocates.
    #[inline]
    pub fn write(&self, data: &[f32]) -> usize {
        let count = data.len().min(self.samples.len());
        for (slot, sample) in self.samples[..count].iter().zip(data) {
            slot.store(sample.to_bits(), Ordering::Relaxed);
        }
        self.written.store(count, Ordering::Release);
        count
    }

    /// Samples supplied by the most recent capture cycle
    pub fn written(&self) -> usize {
        self.written.load(Ordering::Acquire)
    }

    /// Begin one render cycle (consumer side).
    ///
    /// The write count is sampled once so the whole cycle sees a single
    /// consistent boundary.
    #[inline]
    pub fn read_cycle(&self) -> ReadCycle<'_> {
        ReadCycle {
            samples: &self.samples,
            available: self.written(),
        }
    }

    /// Raw stored value at `index`, ignoring the write count
    pub fn stored(&self, index: usize) -> Option<f32> {
        self.samples
            .get(index)
            .map(|slot| f32::from_bits(slot.load(Ordering::Relaxed)))
    }
}

/// Consumer view of one render cycle
pub struct ReadCycle<'a> {
    samples: &'a [AtomicU32],
    available: usize,
}

impl ReadCycle<'_> {
    /// Number of samples readable this cycle
    pub fn available(&self) -> usize {
        self.available
    }

    /// Captured sample at `index`, or `None` past what capture supplied
    #[inline]
    pub fn get(&self, index: usize) -> Option<f32> {
        if index < self.available {
            Some(f32::from_bits(self.samples[index].load(Ordering::Relaxed)))
        } else {
            None
        }
    }
}

/// Thread-safe handle to a shared frame buffer
pub type SharedBuffer = Arc<SharedFrameBuffer>;

/// Create a new shared frame buffer
pub fn create_shared_buffer(capacity: usize) -> SharedBuffer {
    Arc::new(SharedFrameBuffer::new(capacity))
}

/// Samples needed to hold the larger of one capture or one render callback
pub fn required_capacity(max_frames: usize, input_channels: u16, output_channels: u16) -> usize {
    max_frames * input_channels.max(output_channels).max(1) as usize
}
