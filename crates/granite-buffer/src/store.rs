//! Page store contract consumed by the buffer manager.

use granite_common::{Result, PAGE_SIZE};
use parking_lot::Mutex;

/// A source and sink of fixed-size pages.
///
/// The buffer manager reads pages from a store on cache miss, writes dirty
/// pages back on eviction and flush, and extends the store when a new page
/// is allocated. On-disk files and in-memory stores both implement this.
pub trait PageStore: Send + Sync {
    /// Process-unique identifier of this store.
    fn store_id(&self) -> u32;

    /// Reads the page `page_no` into `buf`.
    fn read_page(&self, page_no: u32, buf: &mut [u8; PAGE_SIZE]) -> Result<()>;

    /// Writes `data` to the page `page_no`.
    fn write_page(&self, page_no: u32, data: &[u8; PAGE_SIZE]) -> Result<()>;

    /// Appends a zeroed page and returns its page number.
    fn allocate_page(&self) -> Result<u32>;

    /// Returns the number of pages in the store.
    fn page_count(&self) -> u32;

    /// Durably flushes the store's backing medium.
    fn sync(&self) -> Result<()>;
}

/// In-memory page store.
///
/// Pages are kept in a Vec; page numbers map directly to indices. Used by
/// buffer manager tests and for ephemeral indexes that never touch disk.
pub struct MemPageStore {
    store_id: u32,
    pages: Mutex<Vec<Box<[u8; PAGE_SIZE]>>>,
}

impl MemPageStore {
    /// Creates a new empty store with the given id.
    pub fn new(store_id: u32) -> Self {
        Self {
            store_id,
            pages: Mutex::new(Vec::new()),
        }
    }
}

impl PageStore for MemPageStore {
    fn store_id(&self) -> u32 {
        self.store_id
    }

    fn read_page(&self, page_no: u32, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let pages = self.pages.lock();
        let page = pages
            .get(page_no as usize)
            .ok_or(granite_common::GraniteError::PageNotFound { page_no })?;
        buf.copy_from_slice(&**page);
        Ok(())
    }

    fn write_page(&self, page_no: u32, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut pages = self.pages.lock();
        let page = pages
            .get_mut(page_no as usize)
            .ok_or(granite_common::GraniteError::PageNotFound { page_no })?;
        page.copy_from_slice(data);
        Ok(())
    }

    fn allocate_page(&self) -> Result<u32> {
        let mut pages = self.pages.lock();
        let page_no = pages.len() as u32;
        pages.push(Box::new([0u8; PAGE_SIZE]));
        Ok(page_no)
    }

    fn page_count(&self) -> u32 {
        self.pages.lock().len() as u32
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_store_allocate_sequential() {
        let store = MemPageStore::new(0);
        assert_eq!(store.page_count(), 0);
        assert_eq!(store.allocate_page().unwrap(), 0);
        assert_eq!(store.allocate_page().unwrap(), 1);
        assert_eq!(store.page_count(), 2);
    }

    #[test]
    fn test_mem_store_write_read() {
        let store = MemPageStore::new(0);
        let page_no = store.allocate_page().unwrap();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[PAGE_SIZE - 1] = 0xCD;
        store.write_page(page_no, &data).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        store.read_page(page_no, &mut buf).unwrap();
        assert_eq!(buf[0], 0xAB);
        assert_eq!(buf[PAGE_SIZE - 1], 0xCD);
    }

    #[test]
    fn test_mem_store_read_missing_page() {
        let store = MemPageStore::new(0);
        let mut buf = [0u8; PAGE_SIZE];
        assert!(store.read_page(99, &mut buf).is_err());
    }
}
