//! Range scans over the leaf level.

use crate::record::RecordId;
use granite_common::{GraniteError, Result, INVALID_PAGE_NO};

use super::index::BTreeIndex;
use super::layout::LeafNode;

/// Range comparator.
///
/// A scan's low bound uses `Gt` or `Gte`, its high bound `Lt` or `Lte`;
/// any other pairing is rejected with `BadOpcodes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOp {
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Lte,
}

impl ScanOp {
    /// Tests `value` against `bound`.
    fn matches(self, value: i32, bound: i32) -> bool {
        match self {
            ScanOp::Gt => value > bound,
            ScanOp::Gte => value >= bound,
            ScanOp::Lt => value < bound,
            ScanOp::Lte => value <= bound,
        }
    }
}

/// State of a live scan.
///
/// While a scan is live, `page_no` is the single pinned leaf and
/// `next_entry` indexes the next candidate slot in it; `None` means the
/// leaf chain is exhausted.
pub(super) struct ScanState {
    pub low: i32,
    pub low_op: ScanOp,
    pub high: i32,
    pub high_op: ScanOp,
    pub page_no: u32,
    pub next_entry: Option<usize>,
}

impl BTreeIndex {
    /// Positions a scan on the first entry satisfying the low bound.
    ///
    /// Fails with `BadOpcodes` for a comparator outside the allowed set,
    /// `BadScanrange` when `low > high`, and `NoSuchKeyFound` when the
    /// leaf the low bound descends to holds no satisfying entry. A scan
    /// already executing is ended first.
    pub fn start_scan(
        &mut self,
        low: i32,
        low_op: ScanOp,
        high: i32,
        high_op: ScanOp,
    ) -> Result<()> {
        if !matches!(low_op, ScanOp::Gt | ScanOp::Gte)
            || !matches!(high_op, ScanOp::Lt | ScanOp::Lte)
        {
            return Err(GraniteError::BadOpcodes);
        }
        if low > high {
            return Err(GraniteError::BadScanrange { low, high });
        }
        if self.scan.is_some() {
            let _ = self.end_scan();
        }

        let leaf_no = self.find_leaf(low)?;
        let bufmgr = self.bufmgr.clone();

        let found = (|| -> Result<Option<usize>> {
            let frame = bufmgr.pinned_frame(&*self.file, leaf_no)?;
            let data = frame.read_data();
            for slot in 0..self.leaf_cap {
                if !LeafNode::rid_in_slice(&data[..], self.leaf_cap, slot).is_valid() {
                    break;
                }
                let key = LeafNode::key_in_slice(&data[..], self.leaf_cap, slot);
                if low_op.matches(key, low) {
                    return Ok(Some(slot));
                }
            }
            Ok(None)
        })();

        match found {
            Ok(Some(slot)) => {
                self.scan = Some(ScanState {
                    low,
                    low_op,
                    high,
                    high_op,
                    page_no: leaf_no,
                    next_entry: Some(slot),
                });
                Ok(())
            }
            Ok(None) => {
                bufmgr.unpin_page(&*self.file, leaf_no, false)?;
                Err(GraniteError::NoSuchKeyFound)
            }
            Err(e) => {
                let _ = bufmgr.unpin_page(&*self.file, leaf_no, false);
                Err(e)
            }
        }
    }

    /// Yields the record id of the next entry within the range.
    ///
    /// Fails with `ScanNotInitialized` without a live scan and with
    /// `IndexScanCompleted` past the last entry satisfying the high
    /// bound. The scan stays live either way; `end_scan` releases it.
    pub fn scan_next(&mut self) -> Result<RecordId> {
        let bufmgr = self.bufmgr.clone();
        let file = self.file.clone();
        let leaf_cap = self.leaf_cap;

        let state = self.scan.as_mut().ok_or(GraniteError::ScanNotInitialized)?;
        let slot = state.next_entry.ok_or(GraniteError::IndexScanCompleted)?;

        let frame = bufmgr.pinned_frame(&*file, state.page_no)?;
        let data = frame.read_data();

        let rid = LeafNode::rid_in_slice(&data[..], leaf_cap, slot);
        if !rid.is_valid() {
            return Err(GraniteError::IndexScanCompleted);
        }
        let key = LeafNode::key_in_slice(&data[..], leaf_cap, slot);
        debug_assert!(state.low_op.matches(key, state.low));
        if !state.high_op.matches(key, state.high) {
            return Err(GraniteError::IndexScanCompleted);
        }

        // Advance: same leaf if the next slot is live, else hop to the
        // right sibling, pinning it before the current leaf is released
        let next_slot = slot + 1;
        if next_slot < leaf_cap && LeafNode::rid_in_slice(&data[..], leaf_cap, next_slot).is_valid()
        {
            state.next_entry = Some(next_slot);
        } else {
            let sibling = LeafNode::right_sib_in_slice(&data[..]);
            drop(data);
            if sibling != INVALID_PAGE_NO {
                bufmgr.read_page(&file, sibling)?;
                bufmgr.unpin_page(&*file, state.page_no, false)?;
                state.page_no = sibling;
                state.next_entry = Some(0);
            } else {
                state.next_entry = None;
            }
        }

        Ok(rid)
    }

    /// Terminates the current scan, releasing its pinned leaf.
    ///
    /// Fails with `ScanNotInitialized` when no scan is live.
    pub fn end_scan(&mut self) -> Result<()> {
        let state = self.scan.take().ok_or(GraniteError::ScanNotInitialized)?;
        self.bufmgr.unpin_page(&*self.file, state.page_no, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_op_low_bounds() {
        assert!(ScanOp::Gt.matches(5, 4));
        assert!(!ScanOp::Gt.matches(4, 4));
        assert!(ScanOp::Gte.matches(4, 4));
        assert!(!ScanOp::Gte.matches(3, 4));
    }

    #[test]
    fn test_scan_op_high_bounds() {
        assert!(ScanOp::Lt.matches(3, 4));
        assert!(!ScanOp::Lt.matches(4, 4));
        assert!(ScanOp::Lte.matches(4, 4));
        assert!(!ScanOp::Lte.matches(5, 4));
    }
}
