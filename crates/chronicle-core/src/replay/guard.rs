//! Teardown guards for a replay run.
//!
//! A run future can be dropped before it reaches a terminal state (task
//! abort, runtime shutdown). These guards make sure the unprocessed records
//! still land in a checkpoint and the delivery webhook is not leaked.

use std::sync::Arc;

use chronicle_net::{Destination, WebhookHandle};
use chronicle_shared::EventRecord;
use chronicle_store::RecordStore;
use tracing::{error, warn};

/// Flushes `records[cursor..]` to the in-progress checkpoint on drop unless
/// the run disarmed it.
pub(crate) struct CheckpointGuard<'a> {
    store: &'a RecordStore,
    name: &'a str,
    records: &'a [EventRecord],
    cursor: usize,
    armed: bool,
}

impl<'a> CheckpointGuard<'a> {
    pub(crate) fn new(store: &'a RecordStore, name: &'a str, records: &'a [EventRecord]) -> Self {
        Self {
            store,
            name,
            records,
            cursor: 0,
            armed: true,
        }
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn advance(&mut self) {
        self.cursor += 1;
    }

    /// The run reached a terminal state and wrote its own checkpoint.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CheckpointGuard<'_> {
    fn drop(&mut self) {
        if !self.armed || self.cursor >= self.records.len() {
            return;
        }
        let remaining = &self.records[self.cursor..];
        match self.store.write_in_progress(self.name, remaining) {
            Ok(path) => warn!(
                source = self.name,
                remaining = remaining.len(),
                file = %path.display(),
                "run interrupted; flushed remaining records"
            ),
            Err(e) => error!(
                source = self.name,
                remaining = remaining.len(),
                error = %e,
                "run interrupted and the remaining records could not be flushed"
            ),
        }
    }
}

/// Owns the run's webhook; deletes it in the background if dropped unclosed.
pub(crate) struct IdentityGuard {
    destination: Arc<dyn Destination>,
    webhook: WebhookHandle,
    open: bool,
}

impl IdentityGuard {
    pub(crate) fn new(destination: Arc<dyn Destination>, webhook: WebhookHandle) -> Self {
        Self {
            destination,
            webhook,
            open: true,
        }
    }

    pub(crate) fn webhook(&self) -> &WebhookHandle {
        &self.webhook
    }

    pub(crate) async fn close(mut self) {
        self.open = false;
        if let Err(e) = self.destination.close_identity(&self.webhook).await {
            warn!(webhook = %self.webhook.id, error = %e, "failed to delete webhook");
        }
    }
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        let destination = Arc::clone(&self.destination);
        let webhook = self.webhook.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = destination.close_identity(&webhook).await {
                        warn!(webhook = %webhook.id, error = %e, "failed to delete webhook");
                    }
                });
            }
            Err(_) => warn!(webhook = %webhook.id, "no runtime left to delete webhook"),
        }
    }
}
