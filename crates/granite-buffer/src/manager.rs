//! Buffer manager.

use crate::frame::BufferFrame;
use crate::replacer::ClockReplacer;
use crate::store::PageStore;
use granite_common::page::PageId;
use granite_common::{GraniteError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Configuration for the buffer manager.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

/// Residency bookkeeping, kept consistent under one lock: the page-to-frame
/// map, its inverse, and the frames holding no page.
struct FrameTable {
    by_page: HashMap<PageId, usize>,
    by_frame: Vec<Option<PageId>>,
    free: Vec<usize>,
}

/// Buffer manager.
///
/// Mediates all page access for the stores registered with it:
/// - `read_page` pins a page, loading it from its store on miss
/// - `alloc_page` extends a store and pins the new zeroed page
/// - `unpin_page` releases one pin, recording whether the bytes changed
/// - `flush_file` writes a store's dirty pages back and discards its frames
///
/// Frames are recycled with clock replacement; only unpinned frames are
/// eviction candidates, and dirty victims are written back to their store
/// before the frame is reused.
pub struct BufferManager {
    config: BufferConfig,
    frames: Vec<BufferFrame>,
    table: Mutex<FrameTable>,
    replacer: ClockReplacer,
    /// Stores seen by this manager, for eviction write-back.
    stores: Mutex<HashMap<u32, Weak<dyn PageStore>>>,
}

impl BufferManager {
    /// Creates a buffer manager with the given configuration.
    pub fn new(config: BufferConfig) -> Self {
        let num_frames = config.num_frames;

        Self {
            frames: (0..num_frames).map(|_| BufferFrame::new()).collect(),
            table: Mutex::new(FrameTable {
                by_page: HashMap::new(),
                by_frame: vec![None; num_frames],
                free: (0..num_frames).collect(),
            }),
            replacer: ClockReplacer::new(num_frames),
            stores: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Returns the number of frames in the pool.
    pub fn frame_count(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.table.lock().free.len()
    }

    /// Returns the number of pages currently pinned.
    ///
    /// While an index scan is live this is exactly 1; at rest it is 0.
    pub fn pinned_page_count(&self) -> usize {
        self.frames.iter().filter(|f| f.is_pinned()).count()
    }

    /// Reads a page, pinning it.
    ///
    /// On a pool miss the page is loaded from `store`; the caller must
    /// balance this call with `unpin_page`.
    pub fn read_page<S: PageStore + 'static>(
        &self,
        store: &Arc<S>,
        page_no: u32,
    ) -> Result<&BufferFrame> {
        let page_id = PageId::new(store.store_id(), page_no);

        {
            let table = self.table.lock();
            if let Some(&idx) = table.by_page.get(&page_id) {
                let frame = &self.frames[idx];
                frame.pin();
                self.replacer.record_access(idx);
                return Ok(frame);
            }
        }

        if page_no >= store.page_count() {
            return Err(GraniteError::PageNotFound { page_no });
        }

        let mut table = self.table.lock();
        let idx = self.allocate_frame(&mut table)?;
        let frame = &self.frames[idx];
        frame.clear();

        {
            let mut data = frame.write_data();
            if let Err(e) = store.read_page(page_no, &mut data) {
                drop(data);
                table.free.push(idx);
                return Err(e);
            }
        }

        table.by_page.insert(page_id, idx);
        table.by_frame[idx] = Some(page_id);
        drop(table);

        frame.pin();
        self.replacer.track(idx);
        self.register_store(store);
        Ok(frame)
    }

    /// Allocates a new page in `store`, pinned and zeroed.
    pub fn alloc_page<S: PageStore + 'static>(
        &self,
        store: &Arc<S>,
    ) -> Result<(u32, &BufferFrame)> {
        let page_no = store.allocate_page()?;
        let page_id = PageId::new(store.store_id(), page_no);

        let mut table = self.table.lock();
        let idx = self.allocate_frame(&mut table)?;
        let frame = &self.frames[idx];
        frame.clear();
        table.by_page.insert(page_id, idx);
        table.by_frame[idx] = Some(page_id);
        drop(table);

        frame.pin();
        self.replacer.track(idx);
        self.register_store(store);
        Ok((page_no, frame))
    }

    /// Releases one pin on a page.
    ///
    /// `dirty = true` marks the page as needing write-back; `false` leaves
    /// an existing dirty mark in place. Fails with `PageNotPinned` if the
    /// page holds no pin.
    pub fn unpin_page(&self, store: &dyn PageStore, page_no: u32, dirty: bool) -> Result<()> {
        let frame = self.resident_frame(store, page_no)?;
        if !frame.is_pinned() {
            return Err(GraniteError::PageNotPinned { page_no });
        }
        if dirty {
            frame.mark_dirty();
        }
        frame.unpin();
        Ok(())
    }

    /// Returns the frame of an already-pinned page without adding a pin.
    ///
    /// Used by callers that hold a pin across several operations, such as
    /// the index scan holding its current leaf. Fails with `PageNotPinned`
    /// if the page is resident but holds no pin.
    pub fn pinned_frame(&self, store: &dyn PageStore, page_no: u32) -> Result<&BufferFrame> {
        let frame = self.resident_frame(store, page_no)?;
        if !frame.is_pinned() {
            return Err(GraniteError::PageNotPinned { page_no });
        }
        Ok(frame)
    }

    /// Writes all of a store's dirty pages back and discards its frames.
    ///
    /// Fails with `PagePinned` if any of the store's pages still holds a
    /// pin; nothing is written or discarded in that case.
    pub fn flush_file(&self, store: &dyn PageStore) -> Result<()> {
        let store_id = store.store_id();
        let mut table = self.table.lock();

        let owned: Vec<(PageId, usize)> = table
            .by_page
            .iter()
            .filter(|(pid, _)| pid.store_id() == store_id)
            .map(|(pid, idx)| (*pid, *idx))
            .collect();

        for (page_id, idx) in &owned {
            if self.frames[*idx].is_pinned() {
                return Err(GraniteError::PagePinned {
                    page_no: page_id.page_no(),
                });
            }
        }

        for (page_id, idx) in owned {
            let frame = &self.frames[idx];
            if frame.is_dirty() {
                let data = frame.read_data();
                store.write_page(page_id.page_no(), &data)?;
            }
            table.by_page.remove(&page_id);
            table.by_frame[idx] = None;
            self.replacer.remove(idx);
            frame.clear();
            table.free.push(idx);
        }
        drop(table);

        store.sync()
    }

    /// Returns statistics about the pool.
    pub fn stats(&self) -> BufferStats {
        let table = self.table.lock();
        let mut pinned_frames = 0;
        let mut dirty_frames = 0;

        for (idx, owner) in table.by_frame.iter().enumerate() {
            if owner.is_none() {
                continue;
            }
            let frame = &self.frames[idx];
            if frame.is_pinned() {
                pinned_frames += 1;
            }
            if frame.is_dirty() {
                dirty_frames += 1;
            }
        }

        BufferStats {
            total_frames: self.config.num_frames,
            free_frames: table.free.len(),
            used_frames: table.by_page.len(),
            pinned_frames,
            dirty_frames,
        }
    }

    fn resident_frame(&self, store: &dyn PageStore, page_no: u32) -> Result<&BufferFrame> {
        let page_id = PageId::new(store.store_id(), page_no);
        let idx = self
            .table
            .lock()
            .by_page
            .get(&page_id)
            .copied()
            .ok_or(GraniteError::PageNotFound { page_no })?;
        Ok(&self.frames[idx])
    }

    fn register_store<S: PageStore + 'static>(&self, store: &Arc<S>) {
        let mut stores = self.stores.lock();
        stores
            .entry(store.store_id())
            .or_insert_with(|| Arc::downgrade(&(store.clone() as Arc<dyn PageStore>)));
    }

    /// Picks a frame for a new page: free list first, then clock eviction.
    ///
    /// A dirty victim is written back to its store before the frame is
    /// handed out. The returned frame is not reset.
    fn allocate_frame(&self, table: &mut FrameTable) -> Result<usize> {
        if let Some(idx) = table.free.pop() {
            return Ok(idx);
        }

        let victim = self
            .replacer
            .evict(|idx| self.frames[idx].pin_count() == 0)
            .ok_or(GraniteError::BufferPoolFull)?;

        if let Some(page_id) = table.by_frame[victim] {
            let frame = &self.frames[victim];
            if frame.is_dirty() {
                if let Err(e) = self.write_back(page_id, frame) {
                    // Victim stays resident; put it back under tracking.
                    self.replacer.track(victim);
                    return Err(e);
                }
            }
            table.by_page.remove(&page_id);
            table.by_frame[victim] = None;
        }

        Ok(victim)
    }

    fn write_back(&self, page_id: PageId, frame: &BufferFrame) -> Result<()> {
        let store = self
            .stores
            .lock()
            .get(&page_id.store_id())
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                GraniteError::Internal(format!(
                    "store {} no longer open, cannot write back page {}",
                    page_id.store_id(),
                    page_id.page_no()
                ))
            })?;
        let data = frame.read_data();
        store.write_page(page_id.page_no(), &data)?;
        drop(data);
        frame.clear_dirty();
        Ok(())
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Frames not holding a page.
    pub free_frames: usize,
    /// Frames holding a page.
    pub used_frames: usize,
    /// Frames with at least one pin.
    pub pinned_frames: usize,
    /// Frames with unwritten changes.
    pub dirty_frames: usize,
}
