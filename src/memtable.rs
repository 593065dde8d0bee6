//! MemTable: per-table mutable write buffer.
//!
//! A per-table vector buffer keyed by [`VectorId`], with a separate
//! tombstone set since deletes are recorded distinctly from live appends
//! rather than overwriting a slot in place.

use crate::catalog::{MetadataCatalog, WalLsn};
use crate::error::{Result, StorageError};
use crate::types::{TableId, VectorId};
use crate::vector_source::VectorSource;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// A vector id with this value can never be assigned or deleted; reserved
/// as a sentinel for callers and as the one deliberately-fallible delete
/// path this buffer exposes.
pub const RESERVED_VECTOR_ID: VectorId = VectorId::MAX;

/// Rough per-entry bookkeeping overhead (key + map node), in bytes.
const RECORD_OVERHEAD_BYTES: usize = 24;
/// Rough per-tombstone bookkeeping overhead, in bytes.
const TOMBSTONE_OVERHEAD_BYTES: usize = 16;

/// A single live entry in a [`MemTable`]: the raw vector plus an optional
/// attached payload length. This crate does not interpret vector contents
/// (no distance/search logic) or payload bytes — `payload_len` exists only
/// so footprint accounting has somewhere to charge a caller-attached
/// payload once one exists; nothing in this crate populates it yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorRecord {
    vector: Vec<f32>,
    payload_len: Option<usize>,
}

impl VectorRecord {
    fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            payload_len: None,
        }
    }

    fn footprint_bytes(&self) -> usize {
        self.vector.len() * std::mem::size_of::<f32>()
            + self.payload_len.unwrap_or(0)
            + RECORD_OVERHEAD_BYTES
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Segment {
    table_id: String,
    wal_lsn: WalLsn,
    records: Vec<(VectorId, VectorRecord)>,
    tombstones: Vec<VectorId>,
}

/// A per-table mutable write buffer.
///
/// Thread-safe against concurrent `Delete`/`GetCurrentMem`/`Empty` on the
/// same instance via an internal `parking_lot::RwLock`; the `MemManager`
/// does not serialize these calls beyond its own mutable-lock discipline.
pub struct MemTable {
    table_id: TableId,
    catalog: Arc<dyn MetadataCatalog>,
    data: RwLock<BTreeMap<VectorId, VectorRecord>>,
    tombstones: RwLock<BTreeSet<VectorId>>,
    current_memory_bytes: AtomicUsize,
    /// Shared with every MemTable instance this table ever gets, so ids
    /// stay unique across the `Mutable -> Immutable -> Serialized -> new
    /// Mutable` lifecycle rather than restarting at zero each time a fresh
    /// instance replaces a serialized one.
    next_id: Arc<AtomicU64>,
    touched: AtomicBool,
    serialized: AtomicBool,
}

impl MemTable {
    /// `next_id` is the per-table id counter, owned by the caller
    /// (`MemManager`) and shared across every buffer instance for this
    /// table so ids never repeat within a table's lifetime.
    pub fn new(table_id: TableId, catalog: Arc<dyn MetadataCatalog>, next_id: Arc<AtomicU64>) -> Self {
        Self {
            table_id,
            catalog,
            data: RwLock::new(BTreeMap::new()),
            tombstones: RwLock::new(BTreeSet::new()),
            current_memory_bytes: AtomicUsize::new(0),
            next_id,
            touched: AtomicBool::new(false),
            serialized: AtomicBool::new(false),
        }
    }

    /// Append every vector in `source`. If `source` holds no preassigned
    /// ids, fresh ones are allocated here and recorded back into `source`
    /// so the caller can read them via `source.assigned_ids()`.
    pub fn add(&self, source: &mut VectorSource<'_>) -> Result<()> {
        if source.vectors().is_empty() {
            return Ok(());
        }

        let mut data = self.data.write();
        let mut tombstones = self.tombstones.write();
        for vector in source.vectors() {
            let id = if source.has_preassigned_ids() {
                let id = source.next_preassigned_id();
                // A caller-supplied id still has to stay out of the way of
                // future auto-assignment on this table, or a later
                // `without_ids` insert could hand out this same id again.
                // `fetch_max` is racy-safe but not collision-safe against a
                // concurrent auto-assign landing on `id` itself; that case
                // is a caller bug (supplying an id the counter is already
                // about to hand out) rather than something this counter can
                // detect after the fact.
                self.next_id.fetch_max(id.saturating_add(1), Ordering::Relaxed);
                id
            } else {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                source.record_assigned_id(id);
                id
            };

            let record = VectorRecord::new(vector.clone());
            self.current_memory_bytes
                .fetch_add(record.footprint_bytes(), Ordering::Relaxed);
            data.insert(id, record);
            tombstones.remove(&id);
        }
        drop(data);
        drop(tombstones);

        self.touched.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Record a tombstone for `id`. Idempotent: deleting an unknown or
    /// already-deleted id is not an error. [`RESERVED_VECTOR_ID`] is the
    /// one id this buffer refuses to delete.
    pub fn delete(&self, id: VectorId) -> Result<()> {
        if id == RESERVED_VECTOR_ID {
            return Err(StorageError::InvalidArgument(
                "vector id u64::MAX is reserved and cannot be deleted".into(),
            ));
        }

        let mut tombstones = self.tombstones.write();
        if tombstones.insert(id) {
            self.current_memory_bytes
                .fetch_add(TOMBSTONE_OVERHEAD_BYTES, Ordering::Relaxed);
        }
        drop(tombstones);

        self.touched.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Current footprint in bytes. Monotone non-decreasing between
    /// `Serialize` calls: overwriting or tombstoning an id never reclaims
    /// the bytes already accounted for.
    pub fn current_memory_bytes(&self) -> usize {
        self.current_memory_bytes.load(Ordering::Relaxed)
    }

    /// True iff no append and no delete has been applied since
    /// construction.
    pub fn empty(&self) -> bool {
        !self.touched.load(Ordering::Relaxed)
    }

    pub fn table_id(&self) -> &TableId {
        &self.table_id
    }

    #[cfg(test)]
    pub(crate) fn is_deleted(&self, id: VectorId) -> bool {
        self.tombstones.read().contains(&id)
    }

    /// Materialize all appended and tombstoned records to durable storage
    /// keyed by `wal_lsn`. Exactly one call per buffer lifetime; a second
    /// call returns an error rather than silently re-writing.
    pub fn serialize(&self, wal_lsn: WalLsn) -> Result<()> {
        if self.serialized.swap(true, Ordering::AcqRel) {
            return Err(StorageError::InvalidData(format!(
                "memtable for table {} already serialized",
                self.table_id
            )));
        }

        let records: Vec<(VectorId, VectorRecord)> = self
            .data
            .read()
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect();
        let tombstones: Vec<VectorId> = self.tombstones.read().iter().copied().collect();

        let segment = Segment {
            table_id: self.table_id.as_str().to_string(),
            wal_lsn,
            records,
            tombstones,
        };
        let bytes = bincode::serialize(&segment)?;

        let path = self.catalog.segment_path(&self.table_id, wal_lsn);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;

        log::debug!(
            "serialized table {} at lsn {} to {:?} ({} records, {} tombstones)",
            self.table_id,
            wal_lsn,
            path,
            segment.records.len(),
            segment.tombstones.len()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PathCatalog;
    use crate::types::VectorBatch;
    use tempfile::tempdir;

    fn catalog(dir: &std::path::Path) -> Arc<dyn MetadataCatalog> {
        Arc::new(PathCatalog::new(dir))
    }

    #[test]
    fn add_assigns_ids_and_tracks_memory() {
        let dir = tempdir().unwrap();
        let table = MemTable::new(TableId::new("t").unwrap(), catalog(dir.path()), Arc::new(AtomicU64::new(0)));
        assert!(table.empty());

        let batch = VectorBatch::without_ids(vec![vec![0.0, 1.0], vec![2.0, 3.0], vec![4.0, 5.0]]);
        let mut source = VectorSource::new(&batch).unwrap();
        table.add(&mut source).unwrap();

        assert!(!table.empty());
        assert_eq!(source.assigned_ids().len(), 3);
        assert!(table.current_memory_bytes() > 0);
    }

    #[test]
    fn delete_is_idempotent_for_unknown_id() {
        let dir = tempdir().unwrap();
        let table = MemTable::new(TableId::new("t").unwrap(), catalog(dir.path()), Arc::new(AtomicU64::new(0)));
        table.delete(42).unwrap();
        table.delete(42).unwrap();
        assert!(!table.empty());
    }

    #[test]
    fn delete_rejects_reserved_id() {
        let dir = tempdir().unwrap();
        let table = MemTable::new(TableId::new("t").unwrap(), catalog(dir.path()), Arc::new(AtomicU64::new(0)));
        assert!(table.delete(RESERVED_VECTOR_ID).is_err());
    }

    #[test]
    fn memory_never_shrinks_after_delete() {
        let dir = tempdir().unwrap();
        let table = MemTable::new(TableId::new("t").unwrap(), catalog(dir.path()), Arc::new(AtomicU64::new(0)));
        let batch = VectorBatch::without_ids(vec![vec![0.0; 8]]);
        let mut source = VectorSource::new(&batch).unwrap();
        table.add(&mut source).unwrap();
        let before = table.current_memory_bytes();

        let id = source.assigned_ids()[0];
        table.delete(id).unwrap();
        assert!(table.current_memory_bytes() >= before);
    }

    #[test]
    fn auto_assignment_skips_past_a_preassigned_id() {
        let dir = tempdir().unwrap();
        let counter = Arc::new(AtomicU64::new(0));
        let table = MemTable::new(TableId::new("t").unwrap(), catalog(dir.path()), counter);

        let preassigned = VectorBatch::with_ids(vec![vec![0.0, 1.0]], vec![0]);
        let mut source = VectorSource::new(&preassigned).unwrap();
        table.add(&mut source).unwrap();

        let auto = VectorBatch::without_ids(vec![vec![2.0, 3.0]]);
        let mut source = VectorSource::new(&auto).unwrap();
        table.add(&mut source).unwrap();

        assert_ne!(
            source.assigned_ids()[0],
            0,
            "auto-assignment must not reuse a caller-supplied id"
        );
        assert_eq!(table.data.read().len(), 2, "both records must survive");
    }

    #[test]
    fn serialize_twice_errors() {
        let dir = tempdir().unwrap();
        let table = MemTable::new(TableId::new("t").unwrap(), catalog(dir.path()), Arc::new(AtomicU64::new(0)));
        table.serialize(1).unwrap();
        assert!(table.serialize(2).is_err());
    }

    #[test]
    fn serialize_writes_a_segment_file() {
        let dir = tempdir().unwrap();
        let table = MemTable::new(TableId::new("t").unwrap(), catalog(dir.path()), Arc::new(AtomicU64::new(0)));
        let batch = VectorBatch::without_ids(vec![vec![1.0, 2.0]]);
        let mut source = VectorSource::new(&batch).unwrap();
        table.add(&mut source).unwrap();
        table.serialize(7).unwrap();

        let path = dir.path().join("t-7.seg");
        assert!(path.exists());
    }
}
