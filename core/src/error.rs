use crate::DocId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// A required directory is missing at startup.
    #[error("required directory {0:?} does not exist")]
    Config(PathBuf),

    /// Merge was invoked for a zone that produced no partial index files.
    #[error("no partial index files to merge for zone {0}")]
    EmptyBuild(String),

    /// A doc in a tiered zone has no posting in the full-body index,
    /// meaning the full-body merge was skipped or ran out of order.
    #[error("doc {0} has no posting in the reference index")]
    MissingReferenceDoc(DocId),

    /// On-disk index data disagrees with the in-memory lookup tables.
    #[error("corrupt index data: {0}")]
    IndexCorrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
