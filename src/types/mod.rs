//! Core data types shared by [`crate::memtable`], [`crate::vector_source`],
//! and [`crate::mem_manager`].

mod ids;

pub use ids::{TableId, VectorBatch, VectorId};
