//! # chronicle-store
//!
//! File-backed storage for Chronicle archives.
//!
//! A [`RecordStore`] owns one archive directory. Record sequences are kept as
//! header-less CSV files (one row per event, oldest first); replay progress
//! is checkpointed next to them as `<name>_in_progress.csv`, and a run that
//! fails for good leaves a single `badexit.csv` behind that blocks new
//! imports until an operator adopts or discards it.

pub mod atlas;
pub mod checkpoints;
pub mod records;
pub mod store;

mod error;

pub use checkpoints::{FailedBatchInfo, FailedBatchLocation};
pub use error::{Result, StoreError};
pub use store::{ImportSource, RecordStore};
