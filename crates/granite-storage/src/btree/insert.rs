//! Insertion with bottom-up split propagation.

use crate::record::RecordId;
use granite_common::Result;
use tracing::trace;

use super::index::BTreeIndex;
use super::layout::{LeafNode, NonLeafNode};
use super::navigate::child_slot;
use super::RootFlushPolicy;

/// A split's contribution to its parent: the key to separate on and the
/// page holding everything at or above it.
pub(super) struct Promotion {
    pub mid_key: i32,
    pub right_page_no: u32,
}

impl BTreeIndex {
    /// Inserts one `(key, rid)` pair.
    ///
    /// Duplicates are permitted. A promotion surfacing from the root makes
    /// a new root over the old one, growing the tree by one level.
    pub fn insert_entry(&mut self, key: i32, rid: RecordId) -> Result<()> {
        let promo = self.insert_into_nonleaf(self.root_page_no, key, rid)?;
        let Some(promo) = promo else {
            return Ok(());
        };

        let bufmgr = self.bufmgr.clone();
        let (new_root_no, frame) = bufmgr.alloc_page(&self.file)?;
        {
            let root = NonLeafNode {
                leaf_children: false,
                keys: vec![promo.mid_key],
                children: vec![self.root_page_no, promo.right_page_no],
            };
            let mut data = frame.write_data();
            root.write_to(&mut data[..], self.nonleaf_cap);
        }
        bufmgr.unpin_page(&*self.file, new_root_no, true)?;

        trace!(
            index = %self.index_name,
            old_root = self.root_page_no,
            new_root = new_root_no,
            "root split"
        );
        self.root_page_no = new_root_no;
        if self.root_flush == RootFlushPolicy::OnRootChange {
            self.write_root_to_meta()?;
        }
        Ok(())
    }

    /// Inserts below a non-leaf node, surfacing a promotion when this node
    /// itself had to split.
    fn insert_into_nonleaf(&self, page_no: u32, key: i32, rid: RecordId) -> Result<Option<Promotion>> {
        let bufmgr = self.bufmgr.clone();
        let frame = bufmgr.read_page(&self.file, page_no)?;
        let mut node = {
            let data = frame.read_data();
            NonLeafNode::read_from(&data[..], self.nonleaf_cap)
        };

        let slot = child_slot(&node, key);
        let child = match node.children.get(slot).copied() {
            Some(child) => child,
            None => {
                let _ = bufmgr.unpin_page(&*self.file, page_no, false);
                return Err(granite_common::GraniteError::Internal(format!(
                    "non-leaf page {page_no} has no child at slot {slot}"
                )));
            }
        };

        let below = if node.leaf_children {
            self.insert_into_leaf(child, key, rid)
        } else {
            self.insert_into_nonleaf(child, key, rid)
        };
        let promo = match below {
            Ok(promo) => promo,
            Err(e) => {
                let _ = bufmgr.unpin_page(&*self.file, page_no, false);
                return Err(e);
            }
        };

        let Some(promo) = promo else {
            bufmgr.unpin_page(&*self.file, page_no, false)?;
            return Ok(None);
        };

        // Place the promoted separator and the new right child
        node.keys.insert(slot, promo.mid_key);
        node.children.insert(slot + 1, promo.right_page_no);

        if node.children.len() <= self.nonleaf_cap + 1 {
            {
                let mut data = frame.write_data();
                node.write_to(&mut data[..], self.nonleaf_cap);
            }
            bufmgr.unpin_page(&*self.file, page_no, true)?;
            return Ok(None);
        }

        // Overflow: split, pushing the separator up and out of both halves
        let (right_no, right_frame) = match bufmgr.alloc_page(&self.file) {
            Ok(v) => v,
            Err(e) => {
                let _ = bufmgr.unpin_page(&*self.file, page_no, false);
                return Err(e);
            }
        };

        let left_children = node.children.len() / 2;
        let separator = node.keys[left_children - 1];
        let right = NonLeafNode {
            leaf_children: node.leaf_children,
            keys: node.keys[left_children..].to_vec(),
            children: node.children[left_children..].to_vec(),
        };
        node.keys.truncate(left_children - 1);
        node.children.truncate(left_children);

        {
            let mut data = right_frame.write_data();
            right.write_to(&mut data[..], self.nonleaf_cap);
        }
        {
            let mut data = frame.write_data();
            node.write_to(&mut data[..], self.nonleaf_cap);
        }
        let unpinned = bufmgr.unpin_page(&*self.file, page_no, true);
        bufmgr.unpin_page(&*self.file, right_no, true)?;
        unpinned?;

        Ok(Some(Promotion {
            mid_key: separator,
            right_page_no: right_no,
        }))
    }

    /// Inserts into a leaf, surfacing a promotion when the leaf had to
    /// split.
    fn insert_into_leaf(&self, page_no: u32, key: i32, rid: RecordId) -> Result<Option<Promotion>> {
        let bufmgr = self.bufmgr.clone();
        let frame = bufmgr.read_page(&self.file, page_no)?;
        let mut leaf = {
            let data = frame.read_data();
            LeafNode::read_from(&data[..], self.leaf_cap)
        };

        // First slot whose key is strictly greater: equal keys keep
        // insertion order
        let pos = leaf
            .entries
            .iter()
            .position(|&(k, _)| k > key)
            .unwrap_or(leaf.entries.len());
        leaf.entries.insert(pos, (key, rid));

        if leaf.entries.len() <= self.leaf_cap {
            {
                let mut data = frame.write_data();
                leaf.write_to(&mut data[..], self.leaf_cap);
            }
            bufmgr.unpin_page(&*self.file, page_no, true)?;
            return Ok(None);
        }

        // Overflow: the first floor((L+1)/2) entries stay, the rest move
        // to a new right sibling; its first key is copied up
        let (right_no, right_frame) = match bufmgr.alloc_page(&self.file) {
            Ok(v) => v,
            Err(e) => {
                let _ = bufmgr.unpin_page(&*self.file, page_no, false);
                return Err(e);
            }
        };

        let split_at = leaf.entries.len() / 2;
        let right = LeafNode {
            right_sib: leaf.right_sib,
            entries: leaf.entries.split_off(split_at),
        };
        leaf.right_sib = right_no;
        let mid_key = right.entries[0].0;

        {
            let mut data = right_frame.write_data();
            right.write_to(&mut data[..], self.leaf_cap);
        }
        {
            let mut data = frame.write_data();
            leaf.write_to(&mut data[..], self.leaf_cap);
        }
        let unpinned = bufmgr.unpin_page(&*self.file, page_no, true);
        bufmgr.unpin_page(&*self.file, right_no, true)?;
        unpinned?;

        Ok(Some(Promotion {
            mid_key,
            right_page_no: right_no,
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::btree::layout::{LeafNode, NonLeafNode};
    use crate::btree::{AttrType, BTreeIndex, IndexConfig, RootFlushPolicy, ScanOp};
    use crate::record::RecordId;
    use crate::relation::Relation;
    use granite_buffer::{BufferConfig, BufferManager};
    use granite_common::INVALID_PAGE_NO;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn empty_index(leaf_cap: u16, nonleaf_cap: u16) -> (TempDir, BTreeIndex) {
        let dir = tempdir().unwrap();
        let bufmgr = Arc::new(BufferManager::new(BufferConfig { num_frames: 64 }));
        let relation = Relation::create(dir.path(), "probe", bufmgr).unwrap();
        let config = IndexConfig {
            leaf_capacity: leaf_cap,
            nonleaf_capacity: nonleaf_cap,
            root_flush: RootFlushPolicy::OnClose,
        };
        let index = BTreeIndex::open_or_create(&relation, 0, AttrType::Int32, config).unwrap();
        (dir, index)
    }

    fn read_leaf(index: &BTreeIndex, page_no: u32) -> LeafNode {
        let frame = index.bufmgr.read_page(&index.file, page_no).unwrap();
        let leaf = {
            let data = frame.read_data();
            LeafNode::read_from(&data[..], index.leaf_cap)
        };
        index
            .bufmgr
            .unpin_page(&*index.file, page_no, false)
            .unwrap();
        leaf
    }

    fn read_nonleaf(index: &BTreeIndex, page_no: u32) -> NonLeafNode {
        let frame = index.bufmgr.read_page(&index.file, page_no).unwrap();
        let node = {
            let data = frame.read_data();
            NonLeafNode::read_from(&data[..], index.nonleaf_cap)
        };
        index
            .bufmgr
            .unpin_page(&*index.file, page_no, false)
            .unwrap();
        node
    }

    /// Checks a subtree's separator bounds over unique keys and returns
    /// its key range and leftmost leaf.
    fn check_subtree(index: &BTreeIndex, page_no: u32) -> (i32, i32, u32) {
        let node = read_nonleaf(index, page_no);
        assert!(!node.children.is_empty());
        assert!(node.keys.windows(2).all(|w| w[0] < w[1]));

        let mut leftmost_leaf = INVALID_PAGE_NO;
        let mut min = i32::MAX;
        let mut max = i32::MIN;
        for (i, &child) in node.children.iter().enumerate() {
            let (child_min, child_max, child_leftmost) = if node.leaf_children {
                let leaf = read_leaf(index, child);
                assert!(!leaf.entries.is_empty(), "leaf {child} drained");
                assert!(leaf.entries.windows(2).all(|w| w[0].0 <= w[1].0));
                (leaf.entries[0].0, leaf.entries[leaf.entries.len() - 1].0, child)
            } else {
                check_subtree(index, child)
            };

            // max(subtree(child i)) < keys[i] <= min(subtree(child i+1))
            if i < node.keys.len() {
                assert!(child_max < node.keys[i]);
            }
            if i > 0 {
                assert!(node.keys[i - 1] <= child_min);
            }

            if i == 0 {
                leftmost_leaf = child_leftmost;
            }
            min = min.min(child_min);
            max = max.max(child_max);
        }
        (min, max, leftmost_leaf)
    }

    /// Walks the sibling chain, returning every key in link order.
    fn chain_keys(index: &BTreeIndex, mut leaf_no: u32) -> Vec<i32> {
        let mut keys = Vec::new();
        while leaf_no != INVALID_PAGE_NO {
            let leaf = read_leaf(index, leaf_no);
            keys.extend(leaf.entries.iter().map(|&(k, _)| k));
            leaf_no = leaf.right_sib;
        }
        keys
    }

    #[test]
    fn test_tree_invariants_after_shuffled_inserts() {
        let (_dir, mut index) = empty_index(4, 4);

        // Deterministic shuffle of 0..500
        let mut keys: Vec<i32> = (0..500).collect();
        let mut state = 0x2545_F491u64;
        for i in (1..keys.len()).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let j = (state >> 33) as usize % (i + 1);
            keys.swap(i, j);
        }
        for &key in &keys {
            index.insert_entry(key, RecordId::new(key as u32, 0)).unwrap();
        }

        let (min, max, leftmost) = check_subtree(&index, index.root_page_no);
        assert_eq!((min, max), (0, 499));

        // The sibling chain covers every key in ascending order
        let chained = chain_keys(&index, leftmost);
        assert_eq!(chained, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn test_leaf_split_copies_mid_key_up() {
        let (_dir, mut index) = empty_index(4, 4);
        for key in 1..=5 {
            index.insert_entry(key, RecordId::new(key as u32, 0)).unwrap();
        }

        // One leaf split: the separator must still be present in the
        // right leaf (copy-up)
        let root = read_nonleaf(&index, index.root_page_no);
        assert!(root.leaf_children);
        assert_eq!(root.keys.len(), 1);
        let right = read_leaf(&index, root.children[1]);
        assert_eq!(right.entries[0].0, root.keys[0]);
    }

    #[test]
    fn test_nonleaf_split_removes_separator() {
        let (_dir, mut index) = empty_index(2, 2);
        for key in 1..=40 {
            index.insert_entry(key, RecordId::new(key as u32, 0)).unwrap();
        }
        assert!(index.height().unwrap() >= 4);

        // Interior separators are never duplicated below (push-up): over
        // unique keys the bounds check enforces exactly that
        check_subtree(&index, index.root_page_no);

        // Scans still see every key once
        index.start_scan(1, ScanOp::Gte, 40, ScanOp::Lte).unwrap();
        let mut count = 0;
        while index.scan_next().is_ok() {
            count += 1;
        }
        index.end_scan().unwrap();
        assert_eq!(count, 40);
    }
}
