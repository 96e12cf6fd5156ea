//! Storage layer for granite.
//!
//! This crate provides:
//! - `PagedFile`: an on-disk file of fixed-size pages
//! - `Relation` and `RelationScan`: append-and-scan record storage for the
//!   base relation an index is built over
//! - `btree`: the disk-resident B+-tree secondary index itself

pub mod btree;
mod file;
mod record;
mod relation;

pub use btree::{AttrType, BTreeIndex, IndexConfig, RootFlushPolicy, ScanOp};
pub use file::PagedFile;
pub use record::RecordId;
pub use relation::{Relation, RelationScan};
