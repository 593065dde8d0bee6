//! Table/vector identifiers and the vector batch wire shape.

use crate::error::{Result, StorageError};
use std::fmt;

/// A logical table namespace. Opaque, non-empty, compared byte-wise (the
/// derived `Ord`/`Eq` on `String` already compare by byte content).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(String);

impl TableId {
    /// Construct a `TableId`, rejecting the empty string.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(StorageError::InvalidArgument(
                "table id must not be empty".into(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 64-bit vector identifier, unique within a table.
pub type VectorId = u64;

/// An ordered batch of vectors plus an optional parallel id array.
///
/// If `id_array` is empty on input, [`crate::vector_source::VectorSource`]
/// assigns fresh ids and writes them back here before the insert call
/// returns. An empty batch (`vectors.is_empty()`) is legal and a no-op.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorBatch {
    pub vectors: Vec<Vec<f32>>,
    pub id_array: Vec<VectorId>,
}

impl VectorBatch {
    /// A batch with caller-assigned ids. `vectors` and `ids` must be the
    /// same length; mismatched lengths are a caller bug, not a runtime
    /// error detected here — [`crate::vector_source::VectorSource`]
    /// validates this at construction time.
    pub fn with_ids(vectors: Vec<Vec<f32>>, ids: Vec<VectorId>) -> Self {
        Self {
            vectors,
            id_array: ids,
        }
    }

    /// A batch with no ids; the manager will assign them.
    pub fn without_ids(vectors: Vec<Vec<f32>>) -> Self {
        Self {
            vectors,
            id_array: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// True if the caller supplied no ids and expects them assigned.
    pub fn needs_id_assignment(&self) -> bool {
        self.id_array.is_empty() && !self.vectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_table_id() {
        assert!(TableId::new("").is_err());
    }

    #[test]
    fn accepts_nonempty_table_id() {
        let id = TableId::new("orders").unwrap();
        assert_eq!(id.as_str(), "orders");
    }

    #[test]
    fn table_ids_compare_byte_wise() {
        let a = TableId::new("a").unwrap();
        let b = TableId::new("b").unwrap();
        assert!(a < b);
    }

    #[test]
    fn empty_batch_is_legal() {
        let batch = VectorBatch::without_ids(Vec::new());
        assert!(batch.is_empty());
        assert!(!batch.needs_id_assignment());
    }

    #[test]
    fn batch_without_ids_needs_assignment() {
        let batch = VectorBatch::without_ids(vec![vec![0.0, 1.0]]);
        assert!(batch.needs_id_assignment());
    }
}
