//! Record identity and the slotted record-page layout.

use granite_common::{GraniteError, Result, PAGE_SIZE};
use serde::{Deserialize, Serialize};

/// Locator of a record within a relation.
///
/// Opaque to the index: record ids are stored verbatim in leaves and
/// compared for equality only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    /// Page of the relation holding the record.
    pub page_no: u32,
    /// Slot within that page.
    pub slot: u16,
}

impl RecordId {
    /// Sentinel marking an empty leaf slot.
    pub const INVALID: RecordId = RecordId {
        page_no: u32::MAX,
        slot: u16::MAX,
    };

    /// Creates a new record id.
    pub fn new(page_no: u32, slot: u16) -> Self {
        Self { page_no, slot }
    }

    /// Returns true unless this is the INVALID sentinel.
    pub fn is_valid(&self) -> bool {
        self.page_no != u32::MAX
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_no, self.slot)
    }
}

/// Slotted record-page accessors, operating directly on page slices.
///
/// Layout:
/// ```text
/// +------------------------+ 0
/// | record_count: u16      |
/// | free_end: u16          |
/// +------------------------+ 4 (SLOT_ARRAY_START)
/// | slot array             |
/// | [offset:2, len:2] * n  |  <- grows forward
/// +------------------------+
/// |       free space       |
/// +------------------------+ free_end
/// | record bytes           |  <- grow backward from PAGE_SIZE
/// +------------------------+ PAGE_SIZE
/// ```
pub struct RecordPage;

impl RecordPage {
    const SLOT_ARRAY_START: usize = 4;
    const SLOT_SIZE: usize = 4;

    /// Largest payload a single page can hold.
    pub const MAX_RECORD_SIZE: usize = PAGE_SIZE - Self::SLOT_ARRAY_START - Self::SLOT_SIZE;

    /// Returns the number of records on the page.
    pub fn record_count(data: &[u8]) -> u16 {
        u16::from_le_bytes([data[0], data[1]])
    }

    /// Inserts a record, returning its slot number.
    ///
    /// Fails with `PageFull` when the payload plus its slot does not fit.
    pub fn insert(data: &mut [u8], payload: &[u8]) -> Result<u16> {
        if payload.len() > Self::MAX_RECORD_SIZE {
            return Err(GraniteError::RecordTooLarge {
                size: payload.len(),
                max: Self::MAX_RECORD_SIZE,
            });
        }

        let count = Self::record_count(data) as usize;
        let free_end = Self::free_end(data);

        let slot_array_end = Self::SLOT_ARRAY_START + count * Self::SLOT_SIZE;
        let free_space = free_end.saturating_sub(slot_array_end);
        if free_space < payload.len() + Self::SLOT_SIZE {
            return Err(GraniteError::PageFull);
        }

        let record_offset = free_end - payload.len();
        data[record_offset..free_end].copy_from_slice(payload);

        let slot_offset = slot_array_end;
        data[slot_offset..slot_offset + 2]
            .copy_from_slice(&(record_offset as u16).to_le_bytes());
        data[slot_offset + 2..slot_offset + 4]
            .copy_from_slice(&(payload.len() as u16).to_le_bytes());

        data[0..2].copy_from_slice(&((count + 1) as u16).to_le_bytes());
        data[2..4].copy_from_slice(&(record_offset as u16).to_le_bytes());

        Ok(count as u16)
    }

    /// Returns the record in `slot`, or None past the last slot.
    pub fn get(data: &[u8], slot: u16) -> Option<&[u8]> {
        if slot >= Self::record_count(data) {
            return None;
        }
        let slot_offset = Self::SLOT_ARRAY_START + slot as usize * Self::SLOT_SIZE;
        let offset =
            u16::from_le_bytes([data[slot_offset], data[slot_offset + 1]]) as usize;
        let len =
            u16::from_le_bytes([data[slot_offset + 2], data[slot_offset + 3]]) as usize;
        Some(&data[offset..offset + len])
    }

    /// Free-end offset, normalizing the zeroed state of a fresh page.
    fn free_end(data: &[u8]) -> usize {
        let raw = u16::from_le_bytes([data[2], data[3]]) as usize;
        if raw == 0 || raw > PAGE_SIZE {
            PAGE_SIZE
        } else {
            raw
        }
    }
}
