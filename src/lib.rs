//! vectormem: the write buffer manager for a vector store.
//!
//! Sits between an insert/delete API and durable storage: every vector
//! write lands first in a per-table in-memory buffer (the `MemTable`),
//! backed by a soft global memory ceiling that applies admission
//! back-pressure. `MemManager` owns two collections — the mutable buffer
//! directory and the immutable flush queue — and enforces a strict
//! acquire-promote-release-serialize lock discipline between them so a
//! flush never holds both at once.
//!
//! WAL replay, recovery, and query execution over flushed segments are out
//! of scope here; this crate only produces the segments and threads
//! through the WAL LSN a caller supplies to a flush.

pub mod catalog;
pub mod config;
pub mod error;
pub mod mem_manager;
pub mod memtable;
pub mod types;
pub mod vector_source;

pub use catalog::{MetadataCatalog, PathCatalog, WalLsn};
pub use config::MemManagerOptions;
pub use error::{Result, StorageError};
pub use mem_manager::MemManager;
pub use memtable::MemTable;
pub use types::{TableId, VectorBatch, VectorId};
pub use vector_source::VectorSource;
