use chronicle_shared::CodecError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A row could not be parsed back into a record.
    #[error("Row {row} of {file}: {source}")]
    Row {
        file: String,
        row: usize,
        #[source]
        source: CodecError,
    },

    /// Archive names are restricted to `[A-Za-z0-9_-]`.
    #[error("Invalid archive name: {0:?}")]
    InvalidName(String),

    #[error("Archive not found: {0}")]
    NotFound(String),

    /// A failed batch is waiting for operator resolution.
    #[error("A failed batch from `{source_name}` is outstanding; resume or discard it first")]
    FailedBatchOutstanding { source_name: String },

    /// The failed batch belongs to another archive.
    #[error("The outstanding failed batch belongs to `{actual}`, not `{requested}`")]
    FailedBatchMismatch { requested: String, actual: String },

    #[error("No failed batch is outstanding")]
    NoFailedBatch,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
