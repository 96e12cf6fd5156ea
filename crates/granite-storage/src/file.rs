//! On-disk paged files.

use granite_buffer::PageStore;
use granite_common::{GraniteError, Result, PAGE_SIZE};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Source of process-unique store ids.
static NEXT_STORE_ID: AtomicU32 = AtomicU32::new(0);

/// A named on-disk file composed of `PAGE_SIZE` pages.
///
/// Page numbers are 0-indexed; the first page number is 0. All page I/O
/// normally goes through the buffer manager, which consumes this type via
/// the `PageStore` trait.
pub struct PagedFile {
    store_id: u32,
    path: PathBuf,
    inner: Mutex<FileInner>,
}

struct FileInner {
    file: File,
    num_pages: u32,
}

impl PagedFile {
    /// Opens an existing paged file.
    ///
    /// Fails with `FileNotFound` if no file exists at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GraniteError::FileNotFound(path.display().to_string()));
        }

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let num_pages = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;

        Ok(Arc::new(Self {
            store_id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            path: path.to_path_buf(),
            inner: Mutex::new(FileInner { file, num_pages }),
        }))
    }

    /// Creates a new empty paged file. Fails if the file already exists.
    pub fn create(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Arc::new(Self {
            store_id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            path: path.to_path_buf(),
            inner: Mutex::new(FileInner { file, num_pages: 0 }),
        }))
    }

    /// Returns the path of this file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of the first page (the metadata page of an
    /// index file).
    pub fn first_page_no(&self) -> u32 {
        0
    }
}

impl PageStore for PagedFile {
    fn store_id(&self) -> u32 {
        self.store_id
    }

    fn read_page(&self, page_no: u32, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let mut inner = self.inner.lock();
        if page_no >= inner.num_pages {
            return Err(GraniteError::PageNotFound { page_no });
        }

        let offset = (page_no as u64) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.read_exact(buf)?;
        Ok(())
    }

    fn write_page(&self, page_no: u32, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut inner = self.inner.lock();
        let offset = (page_no as u64) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(data)?;

        if page_no >= inner.num_pages {
            inner.num_pages = page_no + 1;
        }
        Ok(())
    }

    fn allocate_page(&self) -> Result<u32> {
        let mut inner = self.inner.lock();
        let page_no = inner.num_pages;

        let offset = (page_no as u64) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(&[0u8; PAGE_SIZE])?;
        inner.num_pages = page_no + 1;
        Ok(page_no)
    }

    fn page_count(&self) -> u32 {
        self.inner.lock().num_pages
    }

    fn sync(&self) -> Result<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }
}

impl std::fmt::Debug for PagedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedFile")
            .field("store_id", &self.store_id)
            .field("path", &self.path)
            .field("num_pages", &self.page_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_missing_file() {
        let dir = tempdir().unwrap();
        let result = PagedFile::open(dir.path().join("absent"));
        assert!(matches!(result, Err(GraniteError::FileNotFound(_))));
    }

    #[test]
    fn test_create_then_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages");

        {
            let file = PagedFile::create(&path).unwrap();
            assert_eq!(file.page_count(), 0);
            assert_eq!(file.first_page_no(), 0);
        }

        let file = PagedFile::open(&path).unwrap();
        assert_eq!(file.page_count(), 0);
    }

    #[test]
    fn test_create_existing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages");
        PagedFile::create(&path).unwrap();
        assert!(PagedFile::create(&path).is_err());
    }

    #[test]
    fn test_allocate_write_read() {
        let dir = tempdir().unwrap();
        let file = PagedFile::create(dir.path().join("pages")).unwrap();

        let p0 = file.allocate_page().unwrap();
        let p1 = file.allocate_page().unwrap();
        assert_eq!((p0, p1), (0, 1));
        assert_eq!(file.page_count(), 2);

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[PAGE_SIZE - 1] = 0xEF;
        file.write_page(p1, &data).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        file.read_page(p1, &mut buf).unwrap();
        assert_eq!(buf[0], 0xAB);
        assert_eq!(buf[PAGE_SIZE - 1], 0xEF);

        // Allocated but never written pages read back zeroed
        file.read_page(p0, &mut buf).unwrap();
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn test_read_beyond_end() {
        let dir = tempdir().unwrap();
        let file = PagedFile::create(dir.path().join("pages")).unwrap();
        file.allocate_page().unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        let result = file.read_page(9, &mut buf);
        assert!(matches!(
            result,
            Err(GraniteError::PageNotFound { page_no: 9 })
        ));
    }

    #[test]
    fn test_persistence_across_handles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages");
        let page_no;

        {
            let file = PagedFile::create(&path).unwrap();
            page_no = file.allocate_page().unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[7] = 0x99;
            file.write_page(page_no, &data).unwrap();
            file.sync().unwrap();
        }

        let file = PagedFile::open(&path).unwrap();
        assert_eq!(file.page_count(), 1);
        let mut buf = [0u8; PAGE_SIZE];
        file.read_page(page_no, &mut buf).unwrap();
        assert_eq!(buf[7], 0x99);
    }

    #[test]
    fn test_store_ids_unique() {
        let dir = tempdir().unwrap();
        let a = PagedFile::create(dir.path().join("a")).unwrap();
        let b = PagedFile::create(dir.path().join("b")).unwrap();
        assert_ne!(a.store_id(), b.store_id());
    }
}
