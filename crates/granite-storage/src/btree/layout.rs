//! On-page layouts for the metadata page and the tree nodes.
//!
//! Nodes are decoded into owned structs holding only the live prefix,
//! mutated, and encoded back whole; the scan path additionally reads
//! single slots straight from a pinned page slice. All multi-byte fields
//! are little-endian.

use crate::record::RecordId;
use granite_common::{GraniteError, Result, INVALID_PAGE_NO, PAGE_SIZE};

use super::AttrType;

/// Bytes per key.
pub const KEY_SIZE: usize = 4;
/// Bytes per record id slot (page_no + slot + padding).
pub const RID_SIZE: usize = 8;
/// Bytes per child page number.
pub const CHILD_SIZE: usize = 4;
/// Header bytes of a leaf node.
pub const LEAF_HEADER_SIZE: usize = 8;
/// Header bytes of a non-leaf node.
pub const NONLEAF_HEADER_SIZE: usize = 8;

/// Largest number of entries a leaf page can hold.
pub const MAX_LEAF_CAPACITY: usize = (PAGE_SIZE - LEAF_HEADER_SIZE) / (KEY_SIZE + RID_SIZE);

/// Largest number of keys a non-leaf page can hold (one more child).
pub const MAX_NONLEAF_CAPACITY: usize =
    (PAGE_SIZE - NONLEAF_HEADER_SIZE - CHILD_SIZE) / (KEY_SIZE + CHILD_SIZE);

/// Longest relation name the metadata page stores.
pub const MAX_RELATION_NAME: usize = 64;

/// Tag at the start of every metadata page.
const META_MAGIC: u32 = 0x4742_4958;

/// Contents of the metadata page (page 0 of an index file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    /// Name of the indexed relation.
    pub relation_name: String,
    /// Byte offset of the indexed attribute within a record.
    pub attr_byte_offset: u32,
    /// Type of the indexed attribute.
    pub attr_type: AttrType,
    /// Entries per leaf node.
    pub leaf_capacity: u16,
    /// Keys per non-leaf node.
    pub nonleaf_capacity: u16,
    /// Page number of the root node (always a non-leaf).
    pub root_page_no: u32,
}

impl IndexMeta {
    const ROOT_OFFSET: usize = 14;

    /// Serializes the metadata into a page slice.
    pub fn write_to(&self, data: &mut [u8]) {
        debug_assert!(self.relation_name.len() <= MAX_RELATION_NAME);
        data[0..4].copy_from_slice(&META_MAGIC.to_le_bytes());
        data[4..8].copy_from_slice(&self.attr_byte_offset.to_le_bytes());
        data[8] = self.attr_type as u8;
        data[9] = 0;
        data[10..12].copy_from_slice(&self.leaf_capacity.to_le_bytes());
        data[12..14].copy_from_slice(&self.nonleaf_capacity.to_le_bytes());
        data[14..18].copy_from_slice(&self.root_page_no.to_le_bytes());
        let name = self.relation_name.as_bytes();
        data[18..20].copy_from_slice(&(name.len() as u16).to_le_bytes());
        data[20..20 + name.len()].copy_from_slice(name);
    }

    /// Deserializes the metadata from a page slice.
    ///
    /// Fails with `BadIndexInfo` when the page does not carry index
    /// metadata.
    pub fn read_from(data: &[u8]) -> Result<Self> {
        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if magic != META_MAGIC {
            return Err(GraniteError::BadIndexInfo(
                "file does not carry index metadata".to_string(),
            ));
        }

        let attr_type = match data[8] {
            0 => AttrType::Int32,
            other => {
                return Err(GraniteError::BadIndexInfo(format!(
                    "unknown attribute type tag {other}"
                )))
            }
        };

        let name_len = u16::from_le_bytes([data[18], data[19]]) as usize;
        if name_len > MAX_RELATION_NAME {
            return Err(GraniteError::BadIndexInfo(format!(
                "relation name length {name_len} exceeds {MAX_RELATION_NAME}"
            )));
        }
        let relation_name = std::str::from_utf8(&data[20..20 + name_len])
            .map_err(|_| {
                GraniteError::BadIndexInfo("relation name is not valid UTF-8".to_string())
            })?
            .to_string();

        Ok(Self {
            relation_name,
            attr_byte_offset: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            attr_type,
            leaf_capacity: u16::from_le_bytes([data[10], data[11]]),
            nonleaf_capacity: u16::from_le_bytes([data[12], data[13]]),
            root_page_no: u32::from_le_bytes([data[14], data[15], data[16], data[17]]),
        })
    }

    /// Rewrites only the root page number within a metadata page slice.
    pub fn write_root_in_slice(data: &mut [u8], root_page_no: u32) {
        data[Self::ROOT_OFFSET..Self::ROOT_OFFSET + 4]
            .copy_from_slice(&root_page_no.to_le_bytes());
    }
}

/// A leaf node decoded to its live prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    /// Next leaf in key order, INVALID_PAGE_NO at the chain end.
    pub right_sib: u32,
    /// Live `(key, rid)` entries, keys non-decreasing.
    pub entries: Vec<(i32, RecordId)>,
}

impl LeafNode {
    /// An empty leaf with no right sibling.
    pub fn empty() -> Self {
        Self {
            right_sib: INVALID_PAGE_NO,
            entries: Vec::new(),
        }
    }

    /// Decodes the live prefix of a leaf page.
    pub fn read_from(data: &[u8], capacity: usize) -> Self {
        let right_sib = Self::right_sib_in_slice(data);
        let mut entries = Vec::new();
        for slot in 0..capacity {
            let rid = Self::rid_in_slice(data, capacity, slot);
            if !rid.is_valid() {
                break;
            }
            entries.push((Self::key_in_slice(data, capacity, slot), rid));
        }
        Self { right_sib, entries }
    }

    /// Encodes the node into a page slice, padding unused record-id slots
    /// with the INVALID sentinel.
    pub fn write_to(&self, data: &mut [u8], capacity: usize) {
        debug_assert!(self.entries.len() <= capacity);
        data[0..4].copy_from_slice(&self.right_sib.to_le_bytes());
        data[4..LEAF_HEADER_SIZE].fill(0);
        for slot in 0..capacity {
            match self.entries.get(slot) {
                Some(&(key, rid)) => {
                    write_key(data, LEAF_HEADER_SIZE, slot, key);
                    write_rid(data, rid_offset(capacity, slot), rid);
                }
                None => write_rid(data, rid_offset(capacity, slot), RecordId::INVALID),
            }
        }
    }

    /// Reads the key in `slot` straight from a page slice.
    pub fn key_in_slice(data: &[u8], _capacity: usize, slot: usize) -> i32 {
        let off = LEAF_HEADER_SIZE + slot * KEY_SIZE;
        i32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
    }

    /// Reads the record id in `slot` straight from a page slice.
    pub fn rid_in_slice(data: &[u8], capacity: usize, slot: usize) -> RecordId {
        let off = rid_offset(capacity, slot);
        RecordId {
            page_no: u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]]),
            slot: u16::from_le_bytes([data[off + 4], data[off + 5]]),
        }
    }

    /// Reads the right-sibling page number straight from a page slice.
    pub fn right_sib_in_slice(data: &[u8]) -> u32 {
        u32::from_le_bytes([data[0], data[1], data[2], data[3]])
    }
}

/// A non-leaf node decoded to its live prefix.
///
/// `children.len() == keys.len() + 1` except in the freshly created root,
/// which starts with a single child and no keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonLeafNode {
    /// True when the children are leaves.
    pub leaf_children: bool,
    /// Separator keys, strictly increasing.
    pub keys: Vec<i32>,
    /// Live child page numbers.
    pub children: Vec<u32>,
}

impl NonLeafNode {
    /// Decodes the live prefix of a non-leaf page.
    pub fn read_from(data: &[u8], capacity: usize) -> Self {
        let leaf_children = u16::from_le_bytes([data[0], data[1]]) != 0;

        let mut children = Vec::new();
        for slot in 0..=capacity {
            let child = child_in_slice(data, capacity, slot);
            if child == INVALID_PAGE_NO {
                break;
            }
            children.push(child);
        }

        let key_count = children.len().saturating_sub(1);
        let keys = (0..key_count)
            .map(|slot| {
                let off = NONLEAF_HEADER_SIZE + slot * KEY_SIZE;
                i32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
            })
            .collect();

        Self {
            leaf_children,
            keys,
            children,
        }
    }

    /// Encodes the node into a page slice, padding unused child slots with
    /// the INVALID sentinel.
    pub fn write_to(&self, data: &mut [u8], capacity: usize) {
        debug_assert!(self.children.len() <= capacity + 1);
        debug_assert!(self.keys.len() + 1 == self.children.len() || self.children.len() <= 1);
        data[0..2].copy_from_slice(&(self.leaf_children as u16).to_le_bytes());
        data[2..NONLEAF_HEADER_SIZE].fill(0);
        for slot in 0..capacity {
            let key = self.keys.get(slot).copied().unwrap_or(0);
            write_key(data, NONLEAF_HEADER_SIZE, slot, key);
        }
        let children_base = NONLEAF_HEADER_SIZE + capacity * KEY_SIZE;
        for slot in 0..=capacity {
            let child = self.children.get(slot).copied().unwrap_or(INVALID_PAGE_NO);
            let off = children_base + slot * CHILD_SIZE;
            data[off..off + CHILD_SIZE].copy_from_slice(&child.to_le_bytes());
        }
    }
}

fn rid_offset(capacity: usize, slot: usize) -> usize {
    LEAF_HEADER_SIZE + capacity * KEY_SIZE + slot * RID_SIZE
}

fn write_key(data: &mut [u8], base: usize, slot: usize, key: i32) {
    let off = base + slot * KEY_SIZE;
    data[off..off + KEY_SIZE].copy_from_slice(&key.to_le_bytes());
}

fn write_rid(data: &mut [u8], off: usize, rid: RecordId) {
    data[off..off + 4].copy_from_slice(&rid.page_no.to_le_bytes());
    data[off + 4..off + 6].copy_from_slice(&rid.slot.to_le_bytes());
    data[off + 6..off + 8].fill(0);
}

fn child_in_slice(data: &[u8], capacity: usize, slot: usize) -> u32 {
    let off = NONLEAF_HEADER_SIZE + capacity * KEY_SIZE + slot * CHILD_SIZE;
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}
