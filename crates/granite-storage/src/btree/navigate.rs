//! Descent from the root to the leaf responsible for a key.

use granite_common::{GraniteError, Result};

use super::index::BTreeIndex;
use super::layout::NonLeafNode;

/// Child slot a key descends into.
///
/// The smallest i such that either i is past the last separator or
/// `keys[i] > key`; a key equal to a separator descends into the right
/// child. Shared by insertion and scan start.
pub(crate) fn child_slot(node: &NonLeafNode, key: i32) -> usize {
    let mut i = 0;
    while i < node.keys.len() && node.keys[i] <= key {
        i += 1;
    }
    i
}

impl BTreeIndex {
    /// Descends from the root to the leaf responsible for `key`.
    ///
    /// Returns the leaf's page number with the leaf left pinned; every
    /// non-leaf page visited is pinned before its parent is released and
    /// unpinned once its child is pinned.
    pub(crate) fn find_leaf(&self, key: i32) -> Result<u32> {
        let bufmgr = self.bufmgr.clone();
        let file = self.file.clone();

        let mut page_no = self.root_page_no;
        bufmgr.read_page(&file, page_no)?;

        loop {
            let step = (|| -> Result<(u32, bool)> {
                let frame = bufmgr.pinned_frame(&*file, page_no)?;
                let data = frame.read_data();
                let node = NonLeafNode::read_from(&data[..], self.nonleaf_cap);
                let slot = child_slot(&node, key);
                let child = node.children.get(slot).copied().ok_or_else(|| {
                    GraniteError::Internal(format!(
                        "non-leaf page {page_no} has no child at slot {slot}"
                    ))
                })?;
                Ok((child, node.leaf_children))
            })();

            let (child, leaf_children) = match step {
                Ok(v) => v,
                Err(e) => {
                    let _ = bufmgr.unpin_page(&*file, page_no, false);
                    return Err(e);
                }
            };

            // Pin the child before releasing the parent
            if let Err(e) = bufmgr.read_page(&file, child) {
                let _ = bufmgr.unpin_page(&*file, page_no, false);
                return Err(e);
            }
            bufmgr.unpin_page(&*file, page_no, false)?;

            if leaf_children {
                return Ok(child);
            }
            page_no = child;
        }
    }
}
