//! Page identity for granite page stores.

use serde::{Deserialize, Serialize};

/// Page size in bytes (16 KB).
pub const PAGE_SIZE: usize = 16 * 1024;

/// Sentinel page number marking an empty slot or the end of a chain.
pub const INVALID_PAGE_NO: u32 = u32::MAX;

/// Identity of a page across all open page stores, packed into one word.
///
/// The page number occupies the high half and the store id the low half,
/// so ids of one store compare in page order. Page numbers are 0-indexed;
/// page 0 of an index file is its metadata page. Serializes as the bare
/// packed integer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(u64);

impl PageId {
    /// Creates the id of page `page_no` within store `store_id`.
    pub fn new(store_id: u32, page_no: u32) -> Self {
        Self(((page_no as u64) << 32) | store_id as u64)
    }

    /// Returns the owning store.
    pub fn store_id(self) -> u32 {
        self.0 as u32
    }

    /// Returns the page number within the store.
    pub fn page_no(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns true unless the page number is the INVALID sentinel.
    pub fn is_valid(self) -> bool {
        self.page_no() != INVALID_PAGE_NO
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}/p{}", self.store_id(), self.page_no())
    }
}

impl std::fmt::Debug for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageId")
            .field("store_id", &self.store_id())
            .field("page_no", &self.page_no())
            .finish()
    }
}
