//! MemManager: the mutable-buffer directory, the immutable-buffer queue,
//! the memory-budget gate, and the flush state machine.
//!
//! Two independent `parking_lot::Mutex`es guard the two collections
//! (`M_mut` and `M_immu`). The fixed lock order is `M_mut` before
//! `M_immu`; every path that needs both acquires `M_mut`, does a pure data
//! move, releases it, then acquires `M_immu` — promote under `M_mut`,
//! release, then serialize under `M_immu`, so a flush never holds both at
//! once.

use crate::catalog::{MetadataCatalog, WalLsn};
use crate::config::MemManagerOptions;
use crate::error::{Result, StorageError};
use crate::memtable::MemTable;
use crate::types::{TableId, VectorBatch, VectorId};
use crate::vector_source::VectorSource;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::thread;

/// The write buffer manager for a set of logical tables.
pub struct MemManager {
    catalog: Arc<dyn MetadataCatalog>,
    options: MemManagerOptions,
    /// `M_mut`: the mutable-buffer directory (MemIdMap).
    mutable: Mutex<AHashMap<TableId, Arc<MemTable>>>,
    /// `M_immu`: the immutable-buffer queue (MemList), oldest first.
    immutable: Mutex<Vec<Arc<MemTable>>>,
    /// Per-table id counters, outliving any single `MemTable` instance so
    /// a fresh buffer created after a `Serialize` never reassigns an id
    /// already handed out by its predecessor.
    id_counters: Mutex<AHashMap<TableId, Arc<AtomicU64>>>,
}

impl MemManager {
    pub fn new(options: MemManagerOptions, catalog: Arc<dyn MetadataCatalog>) -> Self {
        Self {
            catalog,
            options,
            mutable: Mutex::new(AHashMap::new()),
            immutable: Mutex::new(Vec::new()),
            id_counters: Mutex::new(AHashMap::new()),
        }
    }

    /// Append `batch` to `table_id`'s mutable buffer. If the caller
    /// supplied no ids, the ids assigned during this call are written back
    /// into `batch.id_array` before returning.
    pub fn insert_vectors(&self, table_id: &TableId, batch: &mut VectorBatch) -> Result<()> {
        // Back-pressure gate: advisory, unlocked sample, bounded sleeps.
        // A modest overshoot is tolerable — this does not
        // itself trigger a flush, only stalls admission until some other
        // party (an external background flusher) drains the queue.
        while self.current_mem() > self.options.insert_buffer_size {
            thread::sleep(self.options.backoff);
        }

        let needs_id_assignment = batch.needs_id_assignment();

        let mut mutable = self.mutable.lock();
        let table = self.get_or_create(&mut mutable, table_id);

        let mut source = VectorSource::new(batch)?;
        table.add(&mut source)?;
        let new_ids = if needs_id_assignment {
            Some(source.assigned_ids().to_vec())
        } else {
            None
        };
        drop(source);
        drop(mutable);

        if let Some(ids) = new_ids {
            batch.id_array = ids;
        }
        Ok(())
    }

    /// Delete a single vector id. No back-pressure gate applies to deletes.
    pub fn delete_vector(&self, table_id: &TableId, id: VectorId) -> Result<()> {
        let mut mutable = self.mutable.lock();
        let table = self.get_or_create(&mut mutable, table_id);
        table.delete(id)
    }

    /// Delete a batch of ids, one at a time. Stops at the first failure
    /// without rolling back ids already applied.
    pub fn delete_vectors(&self, table_id: &TableId, ids: &[VectorId]) -> Result<()> {
        let mut mutable = self.mutable.lock();
        let table = self.get_or_create(&mut mutable, table_id);
        for &id in ids {
            table.delete(id)?;
        }
        Ok(())
    }

    /// Promote `table_id`'s buffer to the immutable queue, then serialize
    /// the **entire current queue** (not just the buffer just promoted) in
    /// queue order, then clear it.
    ///
    /// This drains the whole queue rather than only the newly-promoted
    /// buffer — see DESIGN.md for why this batching is kept. Callers that
    /// need to flush exactly one table and nothing else should use
    /// [`Self::flush_one_only`].
    pub fn flush(&self, table_id: &TableId, wal_lsn: WalLsn) -> Result<()> {
        let _ = self.promote_one(table_id)?;
        self.serialize_queue(wal_lsn);
        Ok(())
    }

    /// Promote and serialize exactly `table_id`, leaving the rest of the
    /// immutable queue untouched. For callers (e.g. a table being dropped) that need
    /// stricter per-table isolation than `flush` provides.
    pub fn flush_one_only(&self, table_id: &TableId, wal_lsn: WalLsn) -> Result<()> {
        let promoted = self.promote_one(table_id)?;

        let mut immutable = self.immutable.lock();
        // Match by the exact instance `promote_one` just pushed, not by
        // table name: a concurrent promotion of a second buffer for the
        // same `table_id` (e.g. a racing `flush`/`flush_all`) could already
        // have landed in the queue by the time this re-locks `M_immu`, and
        // matching by name alone could pick up that other buffer and
        // serialize it under this call's `wal_lsn` instead.
        let Some(pos) = immutable.iter().position(|t| Arc::ptr_eq(t, &promoted)) else {
            // Already drained by a concurrent flush; nothing left to do.
            return Ok(());
        };
        let table = immutable.remove(pos);
        drop(immutable);

        if let Err(e) = table.serialize(wal_lsn) {
            log::warn!("failed to serialize table {}: {}", table_id, e);
            return Err(e);
        }
        Ok(())
    }

    /// Promote every non-empty mutable buffer to the immutable queue (empty
    /// ones stay mutable), then serialize the whole queue, collecting the
    /// table ids that were in it.
    pub fn flush_all(&self, wal_lsn: WalLsn) -> Result<Vec<TableId>> {
        self.promote_all();

        let mut immutable = self.immutable.lock();
        let mut flushed = Vec::with_capacity(immutable.len());
        for table in immutable.iter() {
            if let Err(e) = table.serialize(wal_lsn) {
                log::warn!("failed to serialize table {}: {}", table.table_id(), e);
            }
            flushed.push(table.table_id().clone());
        }
        immutable.clear();
        Ok(flushed)
    }

    /// Forcibly discard all buffered state for `table_id`, mutable and
    /// queued-immutable alike, including its id counter. Cannot fail once
    /// locks are held.
    pub fn erase_mem_vector(&self, table_id: &TableId) -> Result<()> {
        self.mutable.lock().remove(table_id);
        self.immutable.lock().retain(|t| t.table_id() != table_id);
        self.id_counters.lock().remove(table_id);
        Ok(())
    }

    /// Sum of `current_memory_bytes` over the mutable directory only.
    pub fn current_mutable_mem(&self) -> usize {
        self.mutable
            .lock()
            .values()
            .map(|t| t.current_memory_bytes())
            .sum()
    }

    /// Sum of `current_memory_bytes` over the immutable queue only.
    pub fn current_immutable_mem(&self) -> usize {
        self.immutable
            .lock()
            .iter()
            .map(|t| t.current_memory_bytes())
            .sum()
    }

    /// `current_mutable_mem() + current_immutable_mem()`. Each lock is
    /// taken sequentially, not both at once — read-only, so the aggregate
    /// is not atomic across the two collections.
    pub fn current_mem(&self) -> usize {
        self.current_mutable_mem() + self.current_immutable_mem()
    }

    /// True if `table_id` currently has a mutable buffer. Does not consult
    /// the immutable queue: a table with only queued-but-unserialized data
    /// is not "present" for routing purposes.
    pub fn table_exists(&self, table_id: &TableId) -> bool {
        self.mutable.lock().contains_key(table_id)
    }

    /// Number of buffers currently waiting in the immutable queue.
    pub fn immutable_queue_len(&self) -> usize {
        self.immutable.lock().len()
    }

    /// Must be called with
    /// `M_mut` held by the caller.
    fn get_or_create(
        &self,
        mutable: &mut AHashMap<TableId, Arc<MemTable>>,
        table_id: &TableId,
    ) -> Arc<MemTable> {
        let counter = self
            .id_counters
            .lock()
            .entry(table_id.clone())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone();

        mutable
            .entry(table_id.clone())
            .or_insert_with(|| Arc::new(MemTable::new(table_id.clone(), self.catalog.clone(), counter)))
            .clone()
    }

    /// `ToImmutable(table_id)`: remove `table_id` from the directory, push
    /// it onto the queue, and return the exact instance pushed so a caller
    /// that needs to find it again later (e.g. [`Self::flush_one_only`])
    /// can match by identity rather than by table name, which could
    /// otherwise pick up a different buffer for the same table pushed by a
    /// concurrent promotion. Touches only `M_mut`; never touches `M_immu` —
    /// this separation is what keeps the lock ordering enforceable.
    fn promote_one(&self, table_id: &TableId) -> Result<Arc<MemTable>> {
        let mut mutable = self.mutable.lock();
        let table = mutable
            .remove(table_id)
            .ok_or_else(|| StorageError::NotFound(table_id.to_string()))?;
        drop(mutable);

        self.immutable.lock().push(table.clone());
        Ok(table)
    }

    /// `ToImmutable()`: partition the directory, moving every non-empty
    /// buffer to the queue. Touches only `M_mut`.
    fn promote_all(&self) {
        let mut mutable = self.mutable.lock();
        let mut to_promote = Vec::new();
        mutable.retain(|_, table| {
            if table.empty() {
                true
            } else {
                to_promote.push(table.clone());
                false
            }
        });
        drop(mutable);

        if !to_promote.is_empty() {
            self.immutable.lock().extend(to_promote);
        }
    }

    /// Serialize every buffer currently in the queue, in queue order, then
    /// clear it. Held `M_immu` for the whole sweep — this is the long,
    /// possibly-I/O-bound blocking point in the whole manager. Per-buffer
    /// serialization failures are logged and do not abort the sweep; the
    /// queue is drained regardless.
    fn serialize_queue(&self, wal_lsn: WalLsn) {
        let mut immutable = self.immutable.lock();
        for table in immutable.iter() {
            if let Err(e) = table.serialize(wal_lsn) {
                log::warn!("failed to serialize table {}: {}", table.table_id(), e);
            }
        }
        immutable.clear();
    }
}
