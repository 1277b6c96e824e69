//! Failed-batch checkpoint.
//!
//! When a replay hits an unrecoverable error the unprocessed records
//! (including the failing one) are written to `badexit.csv`, with a JSON
//! sidecar describing where they came from. While that file exists no new
//! import may start. The operator either adopts the batch, which turns it
//! into the archive's in-progress checkpoint, or discards it.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use chronicle_shared::{EventRecord, Snowflake};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{Result, StoreError};
use crate::store::{read_records, remove_if_exists, write_records, RecordStore};

const FAILED_BATCH_NAME: &str = "badexit";

/// Sidecar written next to the failed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedBatchInfo {
    /// Archive name the records were read from.
    pub source: String,
    pub channel_id: Snowflake,
    #[serde(default)]
    pub thread_id: Option<Snowflake>,
    /// Offset of the failing record in the sequence the run started with.
    pub failed_at: usize,
    pub remaining: usize,
    pub error: String,
    pub recorded_at: DateTime<Utc>,
}

/// Where a failed run left its remaining records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailedBatchLocation {
    FailedBatch(PathBuf),
    /// The failed-batch slot was already taken by another run, so the
    /// records went to the archive's in-progress checkpoint instead.
    InProgress(PathBuf),
}

impl RecordStore {
    fn failed_batch_path(&self) -> PathBuf {
        self.dir().join(format!("{FAILED_BATCH_NAME}.csv"))
    }

    fn sidecar_path(&self) -> PathBuf {
        self.dir().join(format!("{FAILED_BATCH_NAME}.json"))
    }

    pub fn has_failed_batch(&self) -> bool {
        self.failed_batch_path().exists()
    }

    /// Precondition gate for new imports.
    pub fn ensure_no_failed_batch(&self) -> Result<()> {
        if !self.has_failed_batch() {
            return Ok(());
        }
        let source_name = self
            .read_failed_batch_info()?
            .map(|info| info.source)
            .unwrap_or_else(|| "unknown".into());
        Err(StoreError::FailedBatchOutstanding { source_name })
    }

    /// Persist the unprocessed records of a failed run.
    pub fn write_failed_batch(
        &self,
        records: &[EventRecord],
        info: &FailedBatchInfo,
    ) -> Result<FailedBatchLocation> {
        if self.has_failed_batch() {
            warn!(
                source = %info.source,
                "failed-batch slot already taken; writing in-progress checkpoint instead"
            );
            let path = self.write_in_progress(&info.source, records)?;
            return Ok(FailedBatchLocation::InProgress(path));
        }

        let path = self.failed_batch_path();
        write_records(&path, records)?;
        fs::write(self.sidecar_path(), serde_json::to_vec_pretty(info)?)?;
        // The failed batch now holds everything left; an older checkpoint of
        // the same source would replay records this run already delivered.
        if self.clear_in_progress(&info.source)? {
            info!(source = %info.source, "removed superseded in-progress checkpoint");
        }
        error!(
            source = %info.source,
            failed_at = info.failed_at,
            remaining = records.len(),
            file = %path.display(),
            "wrote failed batch"
        );
        Ok(FailedBatchLocation::FailedBatch(path))
    }

    /// Sidecar of the outstanding failed batch, if any.
    pub fn read_failed_batch_info(&self) -> Result<Option<FailedBatchInfo>> {
        let path = self.sidecar_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    pub fn read_failed_batch(&self) -> Result<Vec<EventRecord>> {
        read_records(&self.failed_batch_path())
    }

    /// Delete the failed batch and its sidecar. Returns whether one existed.
    pub fn discard_failed_batch(&self) -> Result<bool> {
        let existed = remove_if_exists(&self.failed_batch_path())?;
        remove_if_exists(&self.sidecar_path())?;
        if existed {
            info!("discarded failed batch");
        }
        Ok(existed)
    }

    /// Turn the failed batch of `name` into its in-progress checkpoint so the
    /// next import of `name` resumes at the failing record.
    pub fn adopt_failed_batch(&self, name: &str) -> Result<PathBuf> {
        if !self.has_failed_batch() {
            return Err(StoreError::NoFailedBatch);
        }
        if let Some(info) = self.read_failed_batch_info()? {
            if info.source != name {
                return Err(StoreError::FailedBatchMismatch {
                    requested: name.to_string(),
                    actual: info.source,
                });
            }
        }
        let target = self.file_path(&Self::in_progress_name(name))?;
        fs::rename(self.failed_batch_path(), &target)?;
        remove_if_exists(&self.sidecar_path())?;
        info!(file = %target.display(), "adopted failed batch");
        Ok(target)
    }
}
