//! Base relation storage: append-only record files with sequential scans.

use crate::file::PagedFile;
use crate::record::{RecordId, RecordPage};
use bytes::Bytes;
use granite_buffer::{BufferManager, PageStore};
use granite_common::{GraniteError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A named relation of records.
///
/// Records are appended into slotted pages and identified by
/// `(page_no, slot)`. The relation is the data source an index is built
/// over: the index streams it once at creation time through
/// [`RelationScan`], and shares its buffer manager.
pub struct Relation {
    name: String,
    dir: PathBuf,
    file: Arc<PagedFile>,
    bufmgr: Arc<BufferManager>,
}

impl Relation {
    /// Creates a new empty relation named `name` in `dir`.
    pub fn create(dir: impl AsRef<Path>, name: &str, bufmgr: Arc<BufferManager>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let file = PagedFile::create(dir.join(name))?;
        debug!(relation = name, "created relation");
        Ok(Self {
            name: name.to_string(),
            dir,
            file,
            bufmgr,
        })
    }

    /// Opens an existing relation. Fails with `FileNotFound` if absent.
    pub fn open(dir: impl AsRef<Path>, name: &str, bufmgr: Arc<BufferManager>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let file = PagedFile::open(dir.join(name))?;
        debug!(relation = name, pages = file.page_count(), "opened relation");
        Ok(Self {
            name: name.to_string(),
            dir,
            file,
            bufmgr,
        })
    }

    /// Returns the relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the directory holding the relation and its index files.
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Returns the buffer manager this relation goes through.
    pub fn buffer_manager(&self) -> &Arc<BufferManager> {
        &self.bufmgr
    }

    /// Appends a record, returning its id.
    pub fn insert_record(&self, payload: &[u8]) -> Result<RecordId> {
        let page_count = self.file.page_count();
        if page_count > 0 {
            let last = page_count - 1;
            let frame = self.bufmgr.read_page(&self.file, last)?;
            let inserted = {
                let mut data = frame.write_data();
                RecordPage::insert(&mut data[..], payload)
            };
            match inserted {
                Ok(slot) => {
                    self.bufmgr.unpin_page(&*self.file, last, true)?;
                    return Ok(RecordId::new(last, slot));
                }
                Err(GraniteError::PageFull) => {
                    self.bufmgr.unpin_page(&*self.file, last, false)?;
                }
                Err(e) => {
                    let _ = self.bufmgr.unpin_page(&*self.file, last, false);
                    return Err(e);
                }
            }
        }

        let (page_no, frame) = self.bufmgr.alloc_page(&self.file)?;
        let inserted = {
            let mut data = frame.write_data();
            RecordPage::insert(&mut data[..], payload)
        };
        match inserted {
            Ok(slot) => {
                self.bufmgr.unpin_page(&*self.file, page_no, true)?;
                Ok(RecordId::new(page_no, slot))
            }
            Err(e) => {
                let _ = self.bufmgr.unpin_page(&*self.file, page_no, false);
                Err(e)
            }
        }
    }

    /// Starts a sequential scan from the first record.
    pub fn scan(&self) -> RelationScan<'_> {
        RelationScan {
            relation: self,
            page_no: 0,
            slot: 0,
            pinned: None,
        }
    }

    /// Writes the relation's dirty pages back and syncs the file.
    pub fn flush(&self) -> Result<()> {
        self.bufmgr.flush_file(&*self.file)
    }
}

impl std::fmt::Debug for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("pages", &self.file.page_count())
            .finish()
    }
}

/// Sequential scan over a relation.
///
/// Yields `(record id, record bytes)` in storage order and fails with
/// `EndOfFile` past the last record. Exactly the page being read is kept
/// pinned; dropping a live scan releases the pin.
pub struct RelationScan<'a> {
    relation: &'a Relation,
    page_no: u32,
    slot: u16,
    pinned: Option<u32>,
}

impl RelationScan<'_> {
    /// Yields the next record.
    pub fn scan_next(&mut self) -> Result<(RecordId, Bytes)> {
        let relation = self.relation;
        loop {
            if self.pinned.is_none() {
                if self.page_no >= relation.file.page_count() {
                    return Err(GraniteError::EndOfFile);
                }
                relation.bufmgr.read_page(&relation.file, self.page_no)?;
                self.pinned = Some(self.page_no);
            }

            let frame = relation.bufmgr.pinned_frame(&*relation.file, self.page_no)?;
            let data = frame.read_data();
            if let Some(record) = RecordPage::get(&data[..], self.slot) {
                let rid = RecordId::new(self.page_no, self.slot);
                let payload = Bytes::copy_from_slice(record);
                drop(data);
                self.slot += 1;
                return Ok((rid, payload));
            }
            drop(data);

            // Page exhausted; move to the next one
            relation.bufmgr.unpin_page(&*relation.file, self.page_no, false)?;
            self.pinned = None;
            self.page_no += 1;
            self.slot = 0;
        }
    }
}

impl Drop for RelationScan<'_> {
    fn drop(&mut self) {
        if let Some(page_no) = self.pinned.take() {
            let _ = self
                .relation
                .bufmgr
                .unpin_page(&*self.relation.file, page_no, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use granite_buffer::BufferConfig;
    use tempfile::tempdir;

    fn test_bufmgr() -> Arc<BufferManager> {
        Arc::new(BufferManager::new(BufferConfig { num_frames: 16 }))
    }

    #[test]
    fn test_open_missing_relation() {
        let dir = tempdir().unwrap();
        let result = Relation::open(dir.path(), "absent", test_bufmgr());
        assert!(matches!(result, Err(GraniteError::FileNotFound(_))));
    }

    #[test]
    fn test_insert_and_scan() {
        let dir = tempdir().unwrap();
        let relation = Relation::create(dir.path(), "people", test_bufmgr()).unwrap();

        let r0 = relation.insert_record(b"alice").unwrap();
        let r1 = relation.insert_record(b"bob").unwrap();
        assert_eq!(r0, RecordId::new(0, 0));
        assert_eq!(r1, RecordId::new(0, 1));

        let mut scan = relation.scan();
        let (rid, payload) = scan.scan_next().unwrap();
        assert_eq!((rid, &payload[..]), (r0, &b"alice"[..]));
        let (rid, payload) = scan.scan_next().unwrap();
        assert_eq!((rid, &payload[..]), (r1, &b"bob"[..]));
        assert!(matches!(scan.scan_next(), Err(GraniteError::EndOfFile)));
        // Repeated calls keep signalling the end
        assert!(matches!(scan.scan_next(), Err(GraniteError::EndOfFile)));
    }

    #[test]
    fn test_scan_empty_relation() {
        let dir = tempdir().unwrap();
        let relation = Relation::create(dir.path(), "empty", test_bufmgr()).unwrap();
        let mut scan = relation.scan();
        assert!(matches!(scan.scan_next(), Err(GraniteError::EndOfFile)));
    }

    #[test]
    fn test_scan_spans_pages() {
        let dir = tempdir().unwrap();
        let relation = Relation::create(dir.path(), "big", test_bufmgr()).unwrap();

        // Large payloads force several pages
        let payload = vec![0x5Au8; 5000];
        let mut rids = Vec::new();
        for _ in 0..10 {
            rids.push(relation.insert_record(&payload).unwrap());
        }
        assert!(rids.iter().any(|r| r.page_no > 0));

        let mut scan = relation.scan();
        let mut seen = Vec::new();
        loop {
            match scan.scan_next() {
                Ok((rid, bytes)) => {
                    assert_eq!(bytes.len(), 5000);
                    seen.push(rid);
                }
                Err(GraniteError::EndOfFile) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(seen, rids);
    }

    #[test]
    fn test_scan_keeps_one_page_pinned() {
        let dir = tempdir().unwrap();
        let bufmgr = test_bufmgr();
        let relation = Relation::create(dir.path(), "pins", bufmgr.clone()).unwrap();
        relation.insert_record(b"x").unwrap();
        relation.insert_record(b"y").unwrap();
        assert_eq!(bufmgr.pinned_page_count(), 0);

        let mut scan = relation.scan();
        scan.scan_next().unwrap();
        assert_eq!(bufmgr.pinned_page_count(), 1);
        drop(scan);
        assert_eq!(bufmgr.pinned_page_count(), 0);
    }

    #[test]
    fn test_flush_and_reopen() {
        let dir = tempdir().unwrap();
        let bufmgr = test_bufmgr();

        {
            let relation = Relation::create(dir.path(), "persist", bufmgr.clone()).unwrap();
            relation.insert_record(b"durable").unwrap();
            relation.flush().unwrap();
        }

        let relation = Relation::open(dir.path(), "persist", bufmgr).unwrap();
        let mut scan = relation.scan();
        let (_, payload) = scan.scan_next().unwrap();
        assert_eq!(&payload[..], b"durable");
    }
}
