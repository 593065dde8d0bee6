//! Write buffer manager configuration
//!
//! A single knob governs admission back-pressure: `insert_buffer_size`, the
//! soft global memory ceiling in bytes. The poll interval for the
//! back-pressure gate is also configurable so tests don't have to pay the
//! full ~1ms sleep used in production.

use crate::error::{Result, StorageError};
use std::time::Duration;

/// Options for a [`crate::mem_manager::MemManager`].
#[derive(Debug, Clone)]
pub struct MemManagerOptions {
    /// Soft memory ceiling in bytes. Strictly positive.
    pub insert_buffer_size: usize,

    /// How long `InsertVectors` sleeps between re-samples of the global
    /// memory footprint while the ceiling is exceeded. Production default
    /// is 1ms; tests may shorten this.
    pub backoff: Duration,
}

impl MemManagerOptions {
    /// Construct options, validating that `insert_buffer_size` is non-zero.
    pub fn new(insert_buffer_size: usize) -> Result<Self> {
        if insert_buffer_size == 0 {
            return Err(StorageError::InvalidData(
                "insert_buffer_size must be strictly positive".into(),
            ));
        }
        Ok(Self {
            insert_buffer_size,
            backoff: Duration::from_millis(1),
        })
    }

    /// Same as [`Self::new`] but with a custom back-pressure poll interval,
    /// for tests that want the gate to spin faster than the 1ms default.
    pub fn with_backoff(insert_buffer_size: usize, backoff: Duration) -> Result<Self> {
        let mut opts = Self::new(insert_buffer_size)?;
        opts.backoff = backoff;
        Ok(opts)
    }
}

impl Default for MemManagerOptions {
    fn default() -> Self {
        Self {
            insert_buffer_size: 64 * 1024 * 1024, // 64MB
            backoff: Duration::from_millis(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_ceiling() {
        assert!(MemManagerOptions::new(0).is_err());
    }

    #[test]
    fn accepts_positive_ceiling() {
        let opts = MemManagerOptions::new(1024).unwrap();
        assert_eq!(opts.insert_buffer_size, 1024);
        assert_eq!(opts.backoff, Duration::from_millis(1));
    }
}
