//! Clock replacement policy.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clock (second-chance) replacement over frame indices.
///
/// Tracks the set of frames holding pages and a reference bit per frame.
/// Eviction sweeps the clock hand over tracked frames, clearing reference
/// bits until it finds a frame whose bit is clear and that the caller's
/// predicate accepts (the buffer manager passes "pin count is zero").
pub struct ClockReplacer {
    num_frames: usize,
    /// Reference bits, written lock-free on access.
    reference_bits: Vec<AtomicBool>,
    inner: Mutex<ClockInner>,
}

struct ClockInner {
    /// Frames currently holding a page.
    tracked: HashSet<usize>,
    /// Clock hand position.
    hand: usize,
}

impl ClockReplacer {
    /// Creates a replacer for `num_frames` frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            reference_bits: (0..num_frames).map(|_| AtomicBool::new(false)).collect(),
            inner: Mutex::new(ClockInner {
                tracked: HashSet::new(),
                hand: 0,
            }),
        }
    }

    /// Starts tracking a frame that received a page.
    pub fn track(&self, frame: usize) {
        if frame < self.num_frames {
            self.reference_bits[frame].store(true, Ordering::Relaxed);
            self.inner.lock().tracked.insert(frame);
        }
    }

    /// Records an access to a tracked frame (gives it a second chance).
    #[inline]
    pub fn record_access(&self, frame: usize) {
        if frame < self.num_frames {
            self.reference_bits[frame].store(true, Ordering::Relaxed);
        }
    }

    /// Stops tracking a frame (page discarded).
    pub fn remove(&self, frame: usize) {
        if frame < self.num_frames {
            self.inner.lock().tracked.remove(&frame);
            self.reference_bits[frame].store(false, Ordering::Relaxed);
        }
    }

    /// Returns the number of tracked frames.
    pub fn len(&self) -> usize {
        self.inner.lock().tracked.len()
    }

    /// Returns true if no frames are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Selects a victim among tracked frames accepted by `is_evictable`.
    ///
    /// The victim is removed from tracking. Returns None if no tracked
    /// frame is accepted.
    pub fn evict<F>(&self, is_evictable: F) -> Option<usize>
    where
        F: Fn(usize) -> bool,
    {
        let mut inner = self.inner.lock();
        if inner.tracked.is_empty() {
            return None;
        }

        // At most two full rotations: the first clears reference bits, the
        // second must then find any evictable frame.
        for _ in 0..(2 * self.num_frames) {
            let hand = inner.hand;
            inner.hand = (hand + 1) % self.num_frames;

            if !inner.tracked.contains(&hand) || !is_evictable(hand) {
                continue;
            }
            if self.reference_bits[hand].load(Ordering::Relaxed) {
                self.reference_bits[hand].store(false, Ordering::Relaxed);
                continue;
            }
            inner.tracked.remove(&hand);
            return Some(hand);
        }

        None
    }
}
