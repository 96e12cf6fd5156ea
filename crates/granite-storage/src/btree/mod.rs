//! Disk-resident B+-tree secondary index over an integer attribute.
//!
//! One index lives in one paged file. Page 0 is the metadata page; every
//! other page is a leaf or non-leaf node, reached from the root recorded in
//! the metadata or through a leaf's right-sibling link. The root is always
//! a non-leaf node, even when the tree holds a single leaf.
//!
//! Non-leaf node layout (capacity N keys, N + 1 children):
//! ```text
//! +----------------------+ 0
//! | leaf_children: u16   |
//! | reserved             |
//! +----------------------+ 8
//! | key_0 .. key_{N-1}   |   i32, strictly increasing over the live prefix
//! +----------------------+ 8 + 4N
//! | child_0 .. child_N   |   u32 page numbers, INVALID marks unused slots
//! +----------------------+
//! ```
//!
//! Leaf node layout (capacity L entries):
//! ```text
//! +----------------------+ 0
//! | right_sibling: u32   |   next leaf in key order, INVALID at the end
//! | reserved             |
//! +----------------------+ 8
//! | key_0 .. key_{L-1}   |   i32, non-decreasing over the live prefix
//! +----------------------+ 8 + 4L
//! | rid_0 .. rid_{L-1}   |   (page_no: u32, slot: u16), INVALID marks
//! +----------------------+   unused slots
//! ```
//!
//! Keys equal to a non-leaf separator descend into the right child, so
//! duplicates of a separator are always found in the right subtree. Leaf
//! splits copy their middle key up (it stays present in the right leaf);
//! non-leaf splits push their separator up (it is removed from both
//! halves).

mod index;
mod insert;
pub mod layout;
mod navigate;
mod scan;

use granite_common::{GraniteError, Result};
use serde::{Deserialize, Serialize};

pub use index::BTreeIndex;
pub use layout::{MAX_LEAF_CAPACITY, MAX_NONLEAF_CAPACITY, MAX_RELATION_NAME};
pub use scan::ScanOp;

/// Type of the indexed attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AttrType {
    /// Native-endian 32-bit signed integer.
    Int32 = 0,
}

/// When the metadata page's root page number is rewritten after the root
/// moves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootFlushPolicy {
    /// Inside every root split.
    OnRootChange,
    /// Once, during teardown, before the file flush.
    #[default]
    OnClose,
}

/// Configuration for an index.
///
/// Capacities default to the largest values a page can hold and are
/// persisted in the metadata page at creation; reopening adopts the stored
/// values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Entries per leaf node.
    pub leaf_capacity: u16,
    /// Keys per non-leaf node (holding one more child than keys).
    pub nonleaf_capacity: u16,
    /// Root write-back policy.
    pub root_flush: RootFlushPolicy,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            leaf_capacity: MAX_LEAF_CAPACITY as u16,
            nonleaf_capacity: MAX_NONLEAF_CAPACITY as u16,
            root_flush: RootFlushPolicy::default(),
        }
    }
}

impl IndexConfig {
    /// Checks the capacities against the page-derived bounds.
    pub fn validate(&self) -> Result<()> {
        if self.leaf_capacity < 2 || self.leaf_capacity as usize > MAX_LEAF_CAPACITY {
            return Err(GraniteError::Config(format!(
                "leaf capacity {} outside 2..={}",
                self.leaf_capacity, MAX_LEAF_CAPACITY
            )));
        }
        if self.nonleaf_capacity < 2 || self.nonleaf_capacity as usize > MAX_NONLEAF_CAPACITY {
            return Err(GraniteError::Config(format!(
                "non-leaf capacity {} outside 2..={}",
                self.nonleaf_capacity, MAX_NONLEAF_CAPACITY
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        IndexConfig::default().validate().unwrap();
    }

    #[test]
    fn test_config_rejects_tiny_capacities() {
        let config = IndexConfig {
            leaf_capacity: 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GraniteError::Config(_))
        ));

        let config = IndexConfig {
            nonleaf_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = IndexConfig {
            leaf_capacity: 8,
            nonleaf_capacity: 4,
            root_flush: RootFlushPolicy::OnRootChange,
        };
        let json = serde_json::to_string(&config).unwrap();
        let recovered: IndexConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(recovered.leaf_capacity, 8);
        assert_eq!(recovered.nonleaf_capacity, 4);
        assert_eq!(recovered.root_flush, RootFlushPolicy::OnRootChange);
    }

    #[test]
    fn test_root_flush_default() {
        assert_eq!(RootFlushPolicy::default(), RootFlushPolicy::OnClose);
    }
}
