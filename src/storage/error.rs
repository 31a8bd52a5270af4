use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::domain::LedgerIntegrityError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Ledger file {} is corrupt: {reason}", path.display())]
    CorruptState { path: PathBuf, reason: String },

    #[error("Timed out after {waited:?} waiting for the ledger lease")]
    LockTimeout { waited: Duration },

    #[error("Ledger changed concurrently: expected version {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    #[error("Ledger lease expired or was taken over before the commit completed")]
    LeaseLost,

    #[error("Ledger storage at {} is unreachable: {source}", path.display())]
    StorageUnreachable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Commit rejected: {0}")]
    Rejected(#[from] LedgerIntegrityError),

    #[error("Failed to encode ledger: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StorageError {
    pub(crate) fn unreachable(path: &Path, source: io::Error) -> Self {
        StorageError::StorageUnreachable {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        StorageError::CorruptState {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Transient failures caused by another writer; safe to retry from a fresh load.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            StorageError::LockTimeout { .. }
                | StorageError::VersionConflict { .. }
                | StorageError::LeaseLost
        )
    }
}
