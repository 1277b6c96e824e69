use chronicle_net::NetError;
use chronicle_shared::Snowflake;
use chronicle_store::StoreError;
use thiserror::Error;

/// Errors that stop an export before anything is written.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel {0} is not a forum")]
    NotAForum(Snowflake),
}

/// Errors that stop an import before its first record.
///
/// Failures after the run has started are reported through
/// [`ReplayOutcome::Failed`](crate::ReplayOutcome::Failed) with a checkpoint.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
