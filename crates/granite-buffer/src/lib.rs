//! Buffer management for granite.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size frame pool with explicit pin/unpin accounting
//! - Clock eviction with write-back of dirty victims
//! - Dirty page tracking and per-store flush
//!
//! Pages live in stores (see [`PageStore`]); the buffer manager mediates
//! every read, allocation, and write-back. Callers pin a page to hold it
//! resident, mutate its bytes through the frame, and release the pin with
//! the dirty flag set iff they changed the page.

mod frame;
mod manager;
mod replacer;
mod store;

pub use frame::BufferFrame;
pub use manager::{BufferConfig, BufferManager, BufferStats};
pub use replacer::ClockReplacer;
pub use store::{MemPageStore, PageStore};
