//! VectorSource: the thin adapter between an incoming [`VectorBatch`] and a
//! [`crate::memtable::MemTable`].
//!
//! Single-use: constructed over one batch, streamed into exactly one
//! `MemTable::add` call, then discarded. It does not itself decide whether
//! ids need assigning — `MemTable::add` drives that, since only the
//! MemTable knows which ids are already in use for its table.

use crate::error::{Result, StorageError};
use crate::types::{VectorBatch, VectorId};

pub struct VectorSource<'a> {
    vectors: &'a [Vec<f32>],
    preassigned: Option<&'a [VectorId]>,
    cursor: usize,
    assigned_ids: Vec<VectorId>,
}

impl<'a> VectorSource<'a> {
    /// Wrap `batch`. Errors if a non-empty id array doesn't match the
    /// vector count.
    pub fn new(batch: &'a VectorBatch) -> Result<Self> {
        if !batch.id_array.is_empty() && batch.id_array.len() != batch.vectors.len() {
            return Err(StorageError::InvalidArgument(format!(
                "id_array length {} does not match vector count {}",
                batch.id_array.len(),
                batch.vectors.len()
            )));
        }

        let preassigned = if batch.id_array.is_empty() {
            None
        } else {
            Some(batch.id_array.as_slice())
        };

        Ok(Self {
            vectors: &batch.vectors,
            preassigned,
            cursor: 0,
            assigned_ids: Vec::new(),
        })
    }

    pub fn vectors(&self) -> &'a [Vec<f32>] {
        self.vectors
    }

    pub fn has_preassigned_ids(&self) -> bool {
        self.preassigned.is_some()
    }

    /// Called by `MemTable::add`, once per vector, in order.
    pub(crate) fn next_preassigned_id(&mut self) -> VectorId {
        let ids = self
            .preassigned
            .expect("next_preassigned_id called without preassigned ids");
        let id = ids[self.cursor];
        self.cursor += 1;
        id
    }

    /// Called by `MemTable::add` when it allocates a fresh id.
    pub(crate) fn record_assigned_id(&mut self, id: VectorId) {
        self.assigned_ids.push(id);
    }

    /// The ids actually used for this batch, whether caller-supplied or
    /// freshly allocated by `MemTable::add`. Only meaningful after `add`
    /// has run to completion.
    pub fn assigned_ids(&self) -> &[VectorId] {
        match self.preassigned {
            Some(ids) => ids,
            None => &self.assigned_ids,
        }
    }
}
