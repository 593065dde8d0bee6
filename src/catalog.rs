//! Metadata catalog contract
//!
//! Stands in for the "metadata catalog" external collaborator — the thing
//! that, in a full engine, maps a table id to its schema and storage
//! paths. This crate only needs the storage-path half of that contract:
//! given a table id and a WAL LSN, where does the flushed segment go?

use crate::types::TableId;
use std::path::{Path, PathBuf};

/// WAL log sequence number. This crate never generates one — it only
/// threads through the value the caller supplies to `Flush`/`Serialize` so
/// that a separate recovery module can correlate flushed segments with WAL
/// positions.
pub type WalLsn = u64;

/// Read-only (from the manager's viewpoint) mapping from table id to
/// on-disk segment path. Implementations must be safe to call concurrently
/// from multiple `Serialize` calls: the metadata catalog is shared and
/// read-only.
pub trait MetadataCatalog: Send + Sync {
    /// Path a serialized segment for `table_id` at `wal_lsn` should be
    /// written to.
    fn segment_path(&self, table_id: &TableId, wal_lsn: WalLsn) -> PathBuf;
}

/// Default catalog: segments are named `{table_id}-{wal_lsn}.seg` under a
/// fixed data directory.
#[derive(Debug, Clone)]
pub struct PathCatalog {
    data_dir: PathBuf,
}

impl PathCatalog {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl MetadataCatalog for PathCatalog {
    fn segment_path(&self, table_id: &TableId, wal_lsn: WalLsn) -> PathBuf {
        self.data_dir
            .join(format!("{}-{}.seg", table_id.as_str(), wal_lsn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_segments_by_table_and_lsn() {
        let catalog = PathCatalog::new("/tmp/vectormem");
        let table = TableId::new("orders").unwrap();
        let path = catalog.segment_path(&table, 7);
        assert_eq!(path, PathBuf::from("/tmp/vectormem/orders-7.seg"));
    }
}
