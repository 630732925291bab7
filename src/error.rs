use std::path::PathBuf;

use thiserror::Error;

use crate::storage::StorageError;

/// Every failure a command can report. None of them leave the engine unusable.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("lap too short to log: {seconds:.1}s (minimum is 1s)")]
    InvalidDuration { seconds: f64 },
    #[error("nothing to undo: the ledger is empty")]
    EmptyLedger,
    #[error("no entry with id {id}")]
    NotFound { id: usize },
    #[error("tag already exists: {0}")]
    DuplicateTag(String),
    #[error("tag is not in the known set: {0}")]
    UnknownTag(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("failed to read {}: {source}", path.display())]
    PersistenceRead {
        path: PathBuf,
        #[source]
        source: StorageError,
    },
    #[error("failed to write {}: {source}", path.display())]
    PersistenceWrite {
        path: PathBuf,
        #[source]
        source: StorageError,
    },
}
