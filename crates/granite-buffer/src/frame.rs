//! Buffer frames.
//!
//! A frame is deliberately dumb: it holds one page's bytes and a single
//! packed bookkeeping word (dirty flag and pin count). Which page a frame
//! holds is the manager's frame table's business, and eviction policy
//! state lives in the replacer, so neither is duplicated here.

use granite_common::PAGE_SIZE;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

/// Dirty flag in the state word; the remaining bits are the pin count.
const DIRTY: u32 = 1 << 31;
const PIN_MASK: u32 = DIRTY - 1;

/// A pool slot holding one page.
///
/// A page with a nonzero pin count stays resident; the dirty flag records
/// that its bytes diverge from the store and must be written back. The
/// state word uses Relaxed ordering throughout: the pool serves a single
/// cooperative caller and the data lock is what publishes page bytes.
pub struct BufferFrame {
    /// Dirty flag plus pin count, packed.
    state: AtomicU32,
    /// Page bytes.
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl BufferFrame {
    /// Creates an empty, clean, unpinned frame.
    pub fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    /// Adds one pin.
    #[inline]
    pub fn pin(&self) {
        self.state.fetch_add(1, Ordering::Relaxed);
    }

    /// Removes one pin, returning the remaining count.
    ///
    /// A frame with no pins is left untouched and reports zero; the
    /// decrement only happens when a pin exists to remove.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let prev = self.state.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |state| {
            if state & PIN_MASK == 0 {
                None
            } else {
                Some(state - 1)
            }
        });
        match prev {
            Ok(state) => (state & PIN_MASK) - 1,
            Err(_) => 0,
        }
    }

    /// Returns the current pin count.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.state.load(Ordering::Relaxed) & PIN_MASK
    }

    /// Returns true if this frame is pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Returns true if this frame holds unwritten changes.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.state.load(Ordering::Relaxed) & DIRTY != 0
    }

    /// Records that the page bytes changed.
    #[inline]
    pub fn mark_dirty(&self) {
        self.state.fetch_or(DIRTY, Ordering::Relaxed);
    }

    /// Clears the dirty flag after a write-back.
    #[inline]
    pub fn clear_dirty(&self) {
        self.state.fetch_and(!DIRTY, Ordering::Relaxed);
    }

    /// Reads the page bytes.
    #[inline]
    pub fn read_data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Writes the page bytes.
    #[inline]
    pub fn write_data(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Returns the frame to its empty state: no pins, clean, zeroed bytes.
    #[inline]
    pub fn clear(&self) {
        self.state.store(0, Ordering::Relaxed);
        self.data.write().fill(0);
    }
}

impl Default for BufferFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BufferFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferFrame")
            .field("pin_count", &self.pin_count())
            .field("is_dirty", &self.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_frame_is_idle() {
        let frame = BufferFrame::new();
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_pinned());
        assert!(!frame.is_dirty());
        assert_eq!(frame.read_data()[0], 0);
    }

    #[test]
    fn test_pins_nest() {
        let frame = BufferFrame::new();
        frame.pin();
        frame.pin();
        frame.pin();
        assert_eq!(frame.pin_count(), 3);

        assert_eq!(frame.unpin(), 2);
        assert_eq!(frame.unpin(), 1);
        assert_eq!(frame.unpin(), 0);
        assert!(!frame.is_pinned());
    }

    #[test]
    fn test_unpin_without_pin_is_refused() {
        let frame = BufferFrame::new();
        assert_eq!(frame.unpin(), 0);
        assert_eq!(frame.pin_count(), 0);

        // The refusal must not disturb the dirty flag sharing the word
        frame.mark_dirty();
        assert_eq!(frame.unpin(), 0);
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_dirty_flag_is_independent_of_pins() {
        let frame = BufferFrame::new();
        frame.pin();
        frame.mark_dirty();
        assert!(frame.is_dirty());
        assert_eq!(frame.pin_count(), 1);

        frame.unpin();
        assert!(frame.is_dirty());

        frame.clear_dirty();
        assert!(!frame.is_dirty());
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_data_round_trip() {
        let frame = BufferFrame::new();
        {
            let mut data = frame.write_data();
            data[0] = 0xAB;
            data[PAGE_SIZE - 1] = 0xCD;
        }
        let data = frame.read_data();
        assert_eq!(data[0], 0xAB);
        assert_eq!(data[PAGE_SIZE - 1], 0xCD);
    }

    #[test]
    fn test_clear_resets_everything() {
        let frame = BufferFrame::new();
        frame.pin();
        frame.mark_dirty();
        frame.write_data()[7] = 0xFF;

        frame.clear();

        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
        assert_eq!(frame.read_data()[7], 0);
    }
}
