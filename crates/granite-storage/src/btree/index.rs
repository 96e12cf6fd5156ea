//! The index handle and its lifecycle.

use crate::file::PagedFile;
use crate::relation::Relation;
use granite_buffer::BufferManager;
use granite_common::{GraniteError, Result};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::layout::{IndexMeta, LeafNode, NonLeafNode};
use super::scan::ScanState;
use super::{AttrType, IndexConfig, RootFlushPolicy};

/// A disk-resident B+-tree index over one integer attribute of a relation.
///
/// The handle exclusively owns the index file for its lifetime; pages are
/// borrowed from the buffer manager under explicit pin/unpin. Teardown
/// ends any live scan, optionally writes the root page number back to the
/// metadata page, and flushes the file; it never fails.
pub struct BTreeIndex {
    pub(super) file: Arc<PagedFile>,
    pub(super) bufmgr: Arc<BufferManager>,
    pub(super) index_name: String,
    pub(super) header_page_no: u32,
    pub(super) root_page_no: u32,
    pub(super) attr_byte_offset: u32,
    pub(super) attr_type: AttrType,
    pub(super) leaf_cap: usize,
    pub(super) nonleaf_cap: usize,
    pub(super) root_flush: RootFlushPolicy,
    pub(super) scan: Option<ScanState>,
}

impl BTreeIndex {
    /// Opens the index of `relation` at `attr_byte_offset`, creating and
    /// populating it from the relation when it does not exist yet.
    ///
    /// The index file is named `"{relation}.{attr_byte_offset}"` and lives
    /// next to the relation. On reopen the metadata page must match the
    /// supplied parameters, else `BadIndexInfo`; the stored capacities are
    /// adopted. On create the tree starts as a non-leaf root over one
    /// empty leaf and every record of the relation is inserted.
    pub fn open_or_create(
        relation: &Relation,
        attr_byte_offset: usize,
        attr_type: AttrType,
        config: IndexConfig,
    ) -> Result<Self> {
        config.validate()?;
        let index_name = format!("{}.{}", relation.name(), attr_byte_offset);
        let path = relation.directory().join(&index_name);
        let bufmgr = relation.buffer_manager().clone();
        let attr_byte_offset = u32::try_from(attr_byte_offset)
            .map_err(|_| GraniteError::Config("attribute offset out of range".to_string()))?;

        match PagedFile::open(&path) {
            Ok(file) => Self::open_existing(
                file,
                bufmgr,
                index_name,
                relation.name(),
                attr_byte_offset,
                attr_type,
                config,
            ),
            Err(GraniteError::FileNotFound(_)) => Self::create(
                &path,
                bufmgr,
                index_name,
                relation,
                attr_byte_offset,
                attr_type,
                config,
            ),
            Err(e) => Err(e),
        }
    }

    fn open_existing(
        file: Arc<PagedFile>,
        bufmgr: Arc<BufferManager>,
        index_name: String,
        relation_name: &str,
        attr_byte_offset: u32,
        attr_type: AttrType,
        config: IndexConfig,
    ) -> Result<Self> {
        let header_page_no = file.first_page_no();
        let frame = bufmgr.read_page(&file, header_page_no)?;
        let meta = {
            let data = frame.read_data();
            IndexMeta::read_from(&data[..])
        };
        let meta = match meta {
            Ok(meta) => meta,
            Err(e) => {
                let _ = bufmgr.unpin_page(&*file, header_page_no, false);
                return Err(e);
            }
        };

        let mismatch = if meta.attr_type != attr_type {
            Some("attribute type differs".to_string())
        } else if meta.attr_byte_offset != attr_byte_offset {
            Some(format!(
                "attribute offset {} != {}",
                meta.attr_byte_offset, attr_byte_offset
            ))
        } else if meta.relation_name != relation_name {
            Some(format!(
                "relation {:?} != {:?}",
                meta.relation_name, relation_name
            ))
        } else {
            None
        };
        if let Some(reason) = mismatch {
            let _ = bufmgr.unpin_page(&*file, header_page_no, false);
            return Err(GraniteError::BadIndexInfo(reason));
        }

        bufmgr.unpin_page(&*file, header_page_no, false)?;
        debug!(
            index = %index_name,
            root = meta.root_page_no,
            "opened existing index"
        );

        Ok(Self {
            file,
            bufmgr,
            index_name,
            header_page_no,
            root_page_no: meta.root_page_no,
            attr_byte_offset,
            attr_type,
            leaf_cap: meta.leaf_capacity as usize,
            nonleaf_cap: meta.nonleaf_capacity as usize,
            root_flush: config.root_flush,
            scan: None,
        })
    }

    fn create(
        path: &std::path::Path,
        bufmgr: Arc<BufferManager>,
        index_name: String,
        relation: &Relation,
        attr_byte_offset: u32,
        attr_type: AttrType,
        config: IndexConfig,
    ) -> Result<Self> {
        if relation.name().len() > super::MAX_RELATION_NAME {
            return Err(GraniteError::Config(format!(
                "relation name longer than {} bytes",
                super::MAX_RELATION_NAME
            )));
        }

        let file = PagedFile::create(path)?;
        let leaf_cap = config.leaf_capacity as usize;
        let nonleaf_cap = config.nonleaf_capacity as usize;

        // Metadata page, one empty leaf, and the root above it
        let (header_page_no, meta_frame) = bufmgr.alloc_page(&file)?;
        let (leaf_page_no, leaf_frame) = match bufmgr.alloc_page(&file) {
            Ok(v) => v,
            Err(e) => {
                let _ = bufmgr.unpin_page(&*file, header_page_no, false);
                return Err(e);
            }
        };
        let (root_page_no, root_frame) = match bufmgr.alloc_page(&file) {
            Ok(v) => v,
            Err(e) => {
                let _ = bufmgr.unpin_page(&*file, header_page_no, false);
                let _ = bufmgr.unpin_page(&*file, leaf_page_no, false);
                return Err(e);
            }
        };

        {
            let mut data = leaf_frame.write_data();
            LeafNode::empty().write_to(&mut data[..], leaf_cap);
        }
        {
            let root = NonLeafNode {
                leaf_children: true,
                keys: Vec::new(),
                children: vec![leaf_page_no],
            };
            let mut data = root_frame.write_data();
            root.write_to(&mut data[..], nonleaf_cap);
        }
        {
            let meta = IndexMeta {
                relation_name: relation.name().to_string(),
                attr_byte_offset,
                attr_type,
                leaf_capacity: config.leaf_capacity,
                nonleaf_capacity: config.nonleaf_capacity,
                root_page_no,
            };
            let mut data = meta_frame.write_data();
            meta.write_to(&mut data[..]);
        }

        bufmgr.unpin_page(&*file, leaf_page_no, true)?;
        bufmgr.unpin_page(&*file, root_page_no, true)?;
        bufmgr.unpin_page(&*file, header_page_no, true)?;

        let mut index = Self {
            file,
            bufmgr,
            index_name,
            header_page_no,
            root_page_no,
            attr_byte_offset,
            attr_type,
            leaf_cap,
            nonleaf_cap,
            root_flush: config.root_flush,
            scan: None,
        };
        index.build_from(relation)?;
        Ok(index)
    }

    /// Streams the relation once, inserting every record.
    fn build_from(&mut self, relation: &Relation) -> Result<()> {
        let offset = self.attr_byte_offset as usize;
        let mut entries = 0u64;
        let mut scan = relation.scan();
        loop {
            match scan.scan_next() {
                Ok((rid, record)) => {
                    let bytes = record.get(offset..offset + 4).ok_or_else(|| {
                        GraniteError::Internal(format!(
                            "record {rid} too short for attribute at offset {offset}"
                        ))
                    })?;
                    let key = i32::from_ne_bytes(
                        bytes.try_into().map_err(|_| {
                            GraniteError::Internal("attribute read out of bounds".to_string())
                        })?,
                    );
                    self.insert_entry(key, rid)?;
                    entries += 1;
                }
                Err(GraniteError::EndOfFile) => break,
                Err(e) => return Err(e),
            }
        }
        debug!(index = %self.index_name, entries, "built index from relation");
        Ok(())
    }

    /// Returns the index name, `"{relation}.{attr_byte_offset}"`.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Returns the page number of the current root.
    pub fn root_page_no(&self) -> u32 {
        self.root_page_no
    }

    /// Returns the number of node levels, counting the leaf level.
    ///
    /// A freshly created index has height 2: the root and one leaf.
    pub fn height(&self) -> Result<u32> {
        let mut levels = 1;
        let mut page_no = self.root_page_no;
        loop {
            let frame = self.bufmgr.read_page(&self.file, page_no)?;
            let node = {
                let data = frame.read_data();
                NonLeafNode::read_from(&data[..], self.nonleaf_cap)
            };
            self.bufmgr.unpin_page(&*self.file, page_no, false)?;

            levels += 1;
            if node.leaf_children {
                return Ok(levels);
            }
            page_no = node.children.first().copied().ok_or_else(|| {
                GraniteError::Internal(format!("non-leaf page {page_no} has no children"))
            })?;
        }
    }

    /// Rewrites the metadata page's root page number.
    pub(super) fn write_root_to_meta(&self) -> Result<()> {
        let frame = self.bufmgr.read_page(&self.file, self.header_page_no)?;
        {
            let mut data = frame.write_data();
            IndexMeta::write_root_in_slice(&mut data[..], self.root_page_no);
        }
        self.bufmgr.unpin_page(&*self.file, self.header_page_no, true)
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        if self.scan.is_some() {
            let _ = self.end_scan();
        }
        if self.root_flush == RootFlushPolicy::OnClose {
            if let Err(e) = self.write_root_to_meta() {
                warn!(index = %self.index_name, error = %e, "root write-back failed");
            }
        }
        trace!(index = %self.index_name, "flushing index file");
        if let Err(e) = self.bufmgr.flush_file(&*self.file) {
            warn!(index = %self.index_name, error = %e, "index flush failed");
        }
    }
}

impl std::fmt::Debug for BTreeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BTreeIndex")
            .field("index_name", &self.index_name)
            .field("root_page_no", &self.root_page_no)
            .field("leaf_cap", &self.leaf_cap)
            .field("nonleaf_cap", &self.nonleaf_cap)
            .field("scan_executing", &self.scan.is_some())
            .finish()
    }
}
