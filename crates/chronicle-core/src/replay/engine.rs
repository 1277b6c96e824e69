//! The replay state machine.
//!
//! Records are processed strictly in order. Each one moves through
//! `PENDING -> RESOLVING_REFERENCES -> DELIVERING` and ends in `SENT`,
//! `DEFERRED_OVERSIZE` (sent, with some files replaced by their URLs) or
//! `FAILED`. Cancellation is only observed between records.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use chronicle_net::{
    split_content, AttachmentSource, DeliveryRequest, Destination, NetError, WebhookHandle,
};
use chronicle_shared::components::action_rows;
use chronicle_shared::constants::MAX_CONTENT_CHARS;
use chronicle_shared::{codec, DecodedRecord, EventRecord, Identity, MessageHandle, RecordKind, Snowflake, ThreadMarker};
use chronicle_store::{FailedBatchInfo, FailedBatchLocation, RecordStore};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::context::RunContext;
use super::guard::{CheckpointGuard, IdentityGuard};
use super::notices;
use super::remap::RemapTable;
use super::tiering::PartitionedFiles;
use crate::error::ReplayError;

/// Embeds accepted on a single message.
const MAX_EMBEDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Pending,
    ResolvingReferences,
    Delivering,
    Sent,
    DeferredOversize,
    Failed,
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::ResolvingReferences => "RESOLVING_REFERENCES",
            Self::Delivering => "DELIVERING",
            Self::Sent => "SENT",
            Self::DeferredOversize => "DEFERRED_OVERSIZE",
            Self::Failed => "FAILED",
        })
    }
}

fn trace_state(index: usize, original: Snowflake, state: RecordState) {
    debug!(index, original = %original, state = %state, "record state");
}

/// Where records are replayed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplayTarget {
    pub channel: Snowflake,
    /// Sub-thread of `channel` to deliver into.
    pub thread: Option<Snowflake>,
}

/// An import of one archive.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub source: String,
    pub target: ReplayTarget,
    /// Adopt the outstanding failed batch of `source` before starting.
    pub resume_failed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplayOutcome {
    Completed {
        sent: usize,
        deferred_files: usize,
        elapsed_secs: f64,
    },
    Cancelled {
        sent: usize,
        remaining: usize,
        checkpoint: String,
        elapsed_secs: f64,
    },
    Failed {
        sent: usize,
        failed_at: usize,
        remaining: usize,
        error: String,
        checkpoint: String,
        elapsed_secs: f64,
    },
}

impl ReplayOutcome {
    pub fn sent(&self) -> usize {
        match self {
            Self::Completed { sent, .. } | Self::Cancelled { sent, .. } | Self::Failed { sent, .. } => *sent,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// What delivering one record produced.
struct Delivered {
    handle: Option<MessageHandle>,
    deferred: usize,
}

#[derive(Clone)]
pub struct ReplayEngine {
    destination: Arc<dyn Destination>,
    attachments: Arc<dyn AttachmentSource>,
    store: RecordStore,
}

impl ReplayEngine {
    pub fn new(
        destination: Arc<dyn Destination>,
        attachments: Arc<dyn AttachmentSource>,
        store: RecordStore,
    ) -> Self {
        Self {
            destination,
            attachments,
            store,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub(crate) fn destination(&self) -> &Arc<dyn Destination> {
        &self.destination
    }

    /// Import an archive: check the failed-batch gate, pick the checkpoint
    /// or the export, and replay it.
    pub async fn import(
        &self,
        request: ImportRequest,
        ctx: &RunContext,
    ) -> Result<ReplayOutcome, ReplayError> {
        if request.resume_failed {
            self.store.adopt_failed_batch(&request.source)?;
        } else {
            self.store.ensure_no_failed_batch()?;
        }
        let source = self.store.resolve_import_source(&request.source)?;
        let records = self.store.read_source(&source)?;
        info!(
            source = %request.source,
            resumed = source.resumed,
            records = records.len(),
            channel = %request.target.channel,
            "starting import"
        );
        self.replay(&request.source, records, request.target, ctx).await
    }

    /// Replay a chronological record sequence under a fresh webhook.
    pub async fn replay(
        &self,
        name: &str,
        records: Vec<EventRecord>,
        target: ReplayTarget,
        ctx: &RunContext,
    ) -> Result<ReplayOutcome, ReplayError> {
        ctx.set_total(records.len());
        let tier = self.premium_tier(target.channel).await;
        let webhook = self.destination.open_identity(target.channel).await?;
        let identity = IdentityGuard::new(Arc::clone(&self.destination), webhook);

        let outcome = self
            .run_sequence(identity.webhook(), name, &records, target, tier, ctx)
            .await;
        identity.close().await;
        Ok(outcome)
    }

    pub(crate) async fn premium_tier(&self, channel: Snowflake) -> u8 {
        match self.destination.premium_tier(channel).await {
            Ok(tier) => tier,
            Err(e) => {
                warn!(channel = %channel, error = %e, "premium tier unknown; assuming the lowest");
                0
            }
        }
    }

    /// Drive the state machine over `records` with an already open webhook.
    pub(crate) async fn run_sequence(
        &self,
        webhook: &WebhookHandle,
        name: &str,
        records: &[EventRecord],
        target: ReplayTarget,
        tier: u8,
        ctx: &RunContext,
    ) -> ReplayOutcome {
        let started = Instant::now();
        let mut guard = CheckpointGuard::new(&self.store, name, records);
        let mut remap = RemapTable::new();
        let mut deferred_files = 0;

        while guard.cursor() < records.len() {
            let index = guard.cursor();

            if ctx.should_stop() {
                let remaining = &records[index..];
                let checkpoint = match self.store.write_in_progress(name, remaining) {
                    Ok(path) => {
                        guard.disarm();
                        path.display().to_string()
                    }
                    Err(e) => {
                        error!(source = name, error = %e, "cannot write in-progress checkpoint");
                        format!("not written: {e}")
                    }
                };
                info!(source = name, sent = index, remaining = remaining.len(), "replay cancelled");
                return ReplayOutcome::Cancelled {
                    sent: index,
                    remaining: remaining.len(),
                    checkpoint,
                    elapsed_secs: started.elapsed().as_secs_f64(),
                };
            }

            let record = &records[index];
            trace_state(index, record.original_id, RecordState::Pending);
            let decoded = codec::decode(record);

            match self
                .replay_record(webhook, &decoded, target, tier, &remap, index)
                .await
            {
                Ok(delivered) => {
                    if let Some(handle) = delivered.handle {
                        remap.insert(decoded.original_id, handle);
                    }
                    let state = if delivered.deferred > 0 {
                        RecordState::DeferredOversize
                    } else {
                        RecordState::Sent
                    };
                    trace_state(index, decoded.original_id, state);
                    deferred_files += delivered.deferred;
                    guard.advance();
                    ctx.record_processed();
                }
                Err(e) => {
                    trace_state(index, decoded.original_id, RecordState::Failed);
                    let remaining = &records[index..];
                    let info = FailedBatchInfo {
                        source: name.to_string(),
                        channel_id: target.channel,
                        thread_id: target.thread,
                        failed_at: index,
                        remaining: remaining.len(),
                        error: e.to_string(),
                        recorded_at: Utc::now(),
                    };
                    let checkpoint = match self.store.write_failed_batch(remaining, &info) {
                        Ok(location) => {
                            guard.disarm();
                            match location {
                                FailedBatchLocation::FailedBatch(path)
                                | FailedBatchLocation::InProgress(path) => path.display().to_string(),
                            }
                        }
                        Err(store_error) => {
                            error!(source = name, error = %store_error, "cannot write failed batch");
                            format!("not written: {store_error}")
                        }
                    };
                    error!(
                        source = name,
                        index,
                        original = %decoded.original_id,
                        error = %e,
                        "replay aborted"
                    );
                    return ReplayOutcome::Failed {
                        sent: index,
                        failed_at: index,
                        remaining: remaining.len(),
                        error: e.to_string(),
                        checkpoint,
                        elapsed_secs: started.elapsed().as_secs_f64(),
                    };
                }
            }
        }

        guard.disarm();
        if let Err(e) = self.store.clear_in_progress(name) {
            warn!(source = name, error = %e, "cannot remove in-progress checkpoint");
        }
        let elapsed_secs = started.elapsed().as_secs_f64();
        info!(source = name, sent = records.len(), deferred_files, elapsed_secs, "replay completed");
        ReplayOutcome::Completed {
            sent: records.len(),
            deferred_files,
            elapsed_secs,
        }
    }

    async fn replay_record(
        &self,
        webhook: &WebhookHandle,
        record: &DecodedRecord,
        target: ReplayTarget,
        tier: u8,
        remap: &RemapTable,
        index: usize,
    ) -> Result<Delivered, NetError> {
        trace_state(index, record.original_id, RecordState::ResolvingReferences);

        let mut identity = record.identity.clone();
        let mut content = record.content.clone();
        let mut reply_to = None;

        match &record.kind {
            RecordKind::ThreadEvent(marker) => {
                trace_state(index, record.original_id, RecordState::Delivering);
                let handle = self
                    .replay_thread_marker(webhook, record, marker, target)
                    .await?;
                return Ok(Delivered {
                    handle: Some(handle),
                    deferred: 0,
                });
            }
            RecordKind::Reply { target: original } => match remap.resolve(*original) {
                Some(handle) => reply_to = Some(*handle),
                None => {
                    debug!(original = %original, "reply target was not replayed; sending as plain message");
                    content = if content.is_empty() {
                        notices::UNRESOLVED_REPLY_MARKER.to_string()
                    } else {
                        format!("{content}\n{}", notices::UNRESOLVED_REPLY_MARKER)
                    };
                }
            },
            RecordKind::Command { name, user } => {
                identity.name = format!("{user} used {name}");
            }
            RecordKind::Plain => {}
        }

        let files = self.collect_files(record, tier).await?;
        trace_state(index, record.original_id, RecordState::Delivering);

        let handle = match reply_to {
            Some(replied) => {
                self.deliver_reply(webhook, &replied, record, &files, target.thread)
                    .await?
            }
            None => {
                self.deliver_plain(
                    webhook,
                    &identity,
                    &content,
                    record.embeds.clone(),
                    action_rows(&record.components),
                    &files,
                    target.thread,
                )
                .await?
            }
        };

        match &handle {
            Some(handle) => self.after_delivery(handle, record).await,
            None => debug!(original = %record.original_id, "record had nothing to deliver"),
        }

        Ok(Delivered {
            handle,
            deferred: files.deferred.len(),
        })
    }

    async fn collect_files(&self, record: &DecodedRecord, tier: u8) -> Result<PartitionedFiles, NetError> {
        let mut files = PartitionedFiles::default();
        for url in record.file_urls() {
            let file = self.attachments.fetch(url).await?;
            files.push(url, file, tier);
        }
        Ok(files)
    }

    /// Impersonated delivery: primary call, then follow-ups for the rest of
    /// the content, the remaining file batches and the deferred URLs.
    #[allow(clippy::too_many_arguments)]
    async fn deliver_plain(
        &self,
        webhook: &WebhookHandle,
        identity: &Identity,
        content: &str,
        embeds: Vec<Value>,
        components: Vec<Value>,
        files: &PartitionedFiles,
        thread: Option<Snowflake>,
    ) -> Result<Option<MessageHandle>, NetError> {
        let base = || DeliveryRequest::new(identity.clone()).in_thread(thread);
        let mut chunks = split_content(content, MAX_CONTENT_CHARS).into_iter();
        let mut batches = files.batches().into_iter();
        let first_chunk = chunks.next().unwrap_or_default();
        let first_batch = batches.next().unwrap_or_default();

        let mut embeds = embeds;
        embeds.truncate(MAX_EMBEDS);
        let primary = base()
            .content(first_chunk.clone())
            .embeds(embeds)
            .files(first_batch.clone())
            .components(components);

        let mut handle = None;
        let mut pending_text = None;
        if !primary.is_empty() {
            match self.destination.send(webhook, primary).await {
                Ok(sent) => handle = Some(sent),
                Err(e) => {
                    warn!(error = %e, "primary delivery failed; retrying with a reduced call");
                    let fallback = if first_batch.is_empty() {
                        base().content(first_chunk)
                    } else {
                        pending_text = Some(first_chunk).filter(|c| !c.is_empty());
                        base().files(first_batch)
                    };
                    if fallback.is_empty() {
                        return Err(e);
                    }
                    handle = Some(self.destination.send(webhook, fallback).await?);
                }
            }
        }

        let deferred = split_content(&files.deferred.join("\n"), MAX_CONTENT_CHARS);
        let follow_ups = pending_text
            .into_iter()
            .chain(chunks)
            .map(|chunk| base().content(chunk))
            .chain(batches.map(|batch| base().files(batch)))
            .chain(deferred.into_iter().map(|urls| base().content(urls)));

        for request in follow_ups {
            let sent = self.destination.send(webhook, request).await?;
            handle.get_or_insert(sent);
        }
        Ok(handle)
    }

    /// Native reply to an already replayed message, with the author card
    /// standing in for the impersonated identity.
    async fn deliver_reply(
        &self,
        webhook: &WebhookHandle,
        replied: &MessageHandle,
        record: &DecodedRecord,
        files: &PartitionedFiles,
        thread: Option<Snowflake>,
    ) -> Result<Option<MessageHandle>, NetError> {
        let card = notices::reply_card(&record.identity, &record.content, !record.embeds.is_empty());
        let mut embeds = vec![card.clone()];
        embeds.extend(record.embeds.iter().cloned());
        embeds.truncate(MAX_EMBEDS);

        let mut batches = files.batches().into_iter();
        let first_batch = batches.next().unwrap_or_default();
        let primary = DeliveryRequest::default()
            .embeds(embeds)
            .files(first_batch.clone())
            .components(action_rows(&record.components));

        let handle = match self.destination.reply(replied, primary).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!(error = %e, "reply failed; retrying with the author card only");
                let fallback = DeliveryRequest::default().embed(card).files(first_batch);
                self.destination.reply(replied, fallback).await?
            }
        };

        let base = || DeliveryRequest::new(record.identity.clone()).in_thread(thread);
        let deferred = split_content(&files.deferred.join("\n"), MAX_CONTENT_CHARS);
        let follow_ups = batches
            .map(|batch| base().files(batch))
            .chain(deferred.into_iter().map(|urls| base().content(urls)));
        for request in follow_ups {
            self.destination.send(webhook, request).await?;
        }
        Ok(Some(handle))
    }

    async fn after_delivery(&self, handle: &MessageHandle, record: &DecodedRecord) {
        if record.pinned {
            if let Err(e) = self.destination.pin(handle).await {
                warn!(message = %handle.id, error = %e, "failed to pin message");
            }
        }
        if !record.reactions.is_empty() {
            let summary = DeliveryRequest::default().embed(notices::reactions_summary(&record.reactions));
            if let Err(e) = self.destination.reply(handle, summary).await {
                warn!(message = %handle.id, error = %e, "failed to send reaction summary");
            }
        }
    }

    async fn replay_thread_marker(
        &self,
        webhook: &WebhookHandle,
        record: &DecodedRecord,
        marker: &ThreadMarker,
        target: ReplayTarget,
    ) -> Result<MessageHandle, NetError> {
        let identity = &record.identity;
        let notice = DeliveryRequest::new(identity.clone());

        let request = match marker {
            ThreadMarker::Missing => notice
                .embed(notices::deleted_thread(identity))
                .in_thread(target.thread),
            ThreadMarker::Ambiguous => notice
                .embed(notices::ambiguous_thread(identity))
                .in_thread(target.thread),
            ThreadMarker::Created { .. } if target.thread.is_some() => notice
                .embed(notices::nested_thread(identity, &record.content))
                .in_thread(target.thread),
            ThreadMarker::Created { source_thread } => {
                let thread = self
                    .destination
                    .create_thread(target.channel, &record.content)
                    .await?;
                match self
                    .destination
                    .delete_thread_placeholder(target.channel, thread)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => warn!(thread = %thread, "thread placeholder message not found"),
                    Err(e) => warn!(thread = %thread, error = %e, "failed to delete thread placeholder"),
                }
                info!(source_thread = %source_thread, thread = %thread, "recreated thread");
                notice
                    .embed(notices::thread_created(identity, thread, &record.content))
                    .in_thread(Some(thread))
            }
        };

        self.destination.send(webhook, request).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chronicle_store::StoreError;
    use tempfile::TempDir;

    use super::*;
    use crate::testing::{Call, FakeAttachments, FakeDestination};

    const CHANNEL: Snowflake = Snowflake(500);

    fn target() -> ReplayTarget {
        ReplayTarget {
            channel: CHANNEL,
            thread: None,
        }
    }

    fn setup(destination: FakeDestination) -> (ReplayEngine, Arc<FakeDestination>, TempDir) {
        setup_with(destination, FakeAttachments::default())
    }

    fn setup_with(
        destination: FakeDestination,
        attachments: FakeAttachments,
    ) -> (ReplayEngine, Arc<FakeDestination>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path()).unwrap();
        let destination = Arc::new(destination);
        let engine = ReplayEngine::new(destination.clone(), Arc::new(attachments), store);
        (engine, destination, dir)
    }

    fn records(n: u64) -> Vec<EventRecord> {
        (1..=n)
            .map(|i| EventRecord::plain(i, "ana", &format!("message {i}")))
            .collect()
    }

    fn request(source: &str) -> ImportRequest {
        ImportRequest {
            source: source.into(),
            target: target(),
            resume_failed: false,
        }
    }

    #[tokio::test]
    async fn test_plain_records_in_order() {
        let (engine, destination, _dir) = setup(FakeDestination::default());
        let (ctx, handle) = RunContext::new();

        let outcome = engine.replay("general", records(3), target(), &ctx).await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(destination.sent_contents(), vec!["message 1", "message 2", "message 3"]);
        assert_eq!(handle.progress().processed, 3);
        assert!(destination.calls().contains(&Call::CloseIdentity));
    }

    #[tokio::test]
    async fn test_failure_at_k_checkpoints_k_to_end() {
        let (engine, destination, _dir) = setup(FakeDestination::failing_on("message 3"));
        let input = records(5);
        engine.store().write(&input, "general").unwrap();
        let (ctx, _handle) = RunContext::new();

        let outcome = engine.import(request("general"), &ctx).await.unwrap();
        match outcome {
            ReplayOutcome::Failed { failed_at, remaining, sent, .. } => {
                assert_eq!(failed_at, 2);
                assert_eq!(remaining, 3);
                assert_eq!(sent, 2);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(engine.store().read_failed_batch().unwrap(), input[2..].to_vec());
        assert_eq!(destination.sent_contents(), vec!["message 1", "message 2"]);
        assert!(destination.calls().contains(&Call::CloseIdentity));

        // The gate now rejects a new import without touching the destination.
        let before = destination.calls().len();
        let (ctx, _handle) = RunContext::new();
        let err = engine.import(request("general"), &ctx).await.unwrap_err();
        assert!(matches!(
            err,
            ReplayError::Store(StoreError::FailedBatchOutstanding { .. })
        ));
        assert_eq!(destination.calls().len(), before);
    }

    #[tokio::test]
    async fn test_resume_failed_batch_continues_at_failing_record() {
        let (engine, destination, _dir) = setup(FakeDestination::failing_on("message 3"));
        engine.store().write(&records(4), "general").unwrap();
        let (ctx, _handle) = RunContext::new();
        engine.import(request("general"), &ctx).await.unwrap();

        destination.stop_failing();
        let (ctx, _handle) = RunContext::new();
        let mut resume = request("general");
        resume.resume_failed = true;
        let outcome = engine.import(resume, &ctx).await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(
            destination.sent_contents(),
            vec!["message 1", "message 2", "message 3", "message 4"]
        );
        assert!(!engine.store().has_failed_batch());
    }

    #[tokio::test]
    async fn test_cancel_after_m_then_resume_sends_rest_once() {
        let destination = FakeDestination::default();
        let (ctx, handle) = RunContext::new();
        destination.cancel_after_sends(2, handle.clone());
        let (engine, destination, _dir) = setup(destination);
        let input = records(5);
        engine.store().write(&input, "general").unwrap();

        let outcome = engine.import(request("general"), &ctx).await.unwrap();
        match outcome {
            ReplayOutcome::Cancelled { sent, remaining, .. } => {
                assert_eq!(sent, 2);
                assert_eq!(remaining, 3);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(engine.store().read("general_in_progress").unwrap(), input[2..].to_vec());

        let (ctx, _handle) = RunContext::new();
        let outcome = engine.import(request("general"), &ctx).await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(
            destination.sent_contents(),
            vec!["message 1", "message 2", "message 3", "message 4", "message 5"]
        );
        assert!(!engine.store().exists("general_in_progress").unwrap());
    }

    #[tokio::test]
    async fn test_failure_after_resume_drops_stale_checkpoint() {
        let destination = FakeDestination::default();
        let (ctx, handle) = RunContext::new();
        destination.cancel_after_sends(1, handle.clone());
        let (engine, destination, _dir) = setup(destination);
        engine.store().write(&records(4), "general").unwrap();

        let outcome = engine.import(request("general"), &ctx).await.unwrap();
        assert!(matches!(outcome, ReplayOutcome::Cancelled { sent: 1, .. }));

        destination.fail_on("message 3");
        let (ctx, _handle) = RunContext::new();
        let outcome = engine.import(request("general"), &ctx).await.unwrap();
        assert!(matches!(outcome, ReplayOutcome::Failed { failed_at: 1, .. }));
        assert_eq!(engine.store().read_failed_batch().unwrap(), records(4)[2..].to_vec());
        assert!(!engine.store().exists("general_in_progress").unwrap());

        // After a discard the next import is a fresh one, not the stale tail.
        engine.store().discard_failed_batch().unwrap();
        destination.stop_failing();
        let before = destination.sent_contents().len();
        let (ctx, _handle) = RunContext::new();
        let outcome = engine.import(request("general"), &ctx).await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(
            destination.sent_contents()[before..].to_vec(),
            vec!["message 1", "message 2", "message 3", "message 4"]
        );
    }

    #[tokio::test]
    async fn test_reply_resolution_and_degradation() {
        let (engine, destination, _dir) = setup(FakeDestination::default());
        let mut input = records(1);
        let mut resolved = EventRecord::plain(2, "bo", "agreed");
        resolved.reply_to = Some(Snowflake(1));
        let mut dangling = EventRecord::plain(3, "bo", "what about this?");
        dangling.reply_to = Some(Snowflake(99));
        input.push(resolved);
        input.push(dangling);

        let (ctx, _handle) = RunContext::new();
        let outcome = engine.replay("general", input, target(), &ctx).await.unwrap();
        assert!(outcome.is_completed());

        let calls = destination.calls();
        let reply = calls
            .iter()
            .find_map(|call| match call {
                Call::Reply { target, request } => Some((target, request)),
                _ => None,
            })
            .unwrap();
        assert_eq!(reply.1.embeds[0]["description"], "agreed");

        let contents = destination.sent_contents();
        assert_eq!(contents.len(), 2);
        assert!(contents[1].starts_with("what about this?\n"));
        assert!(contents[1].ends_with(notices::UNRESOLVED_REPLY_MARKER));
    }

    #[tokio::test]
    async fn test_oversized_attachment_depends_on_tier() {
        let attachments = FakeAttachments::default()
            .with("https://cdn.example/big.bin", 9_000_000)
            .with("https://cdn.example/small.txt", 10);
        let mut record = EventRecord::plain(1, "ana", "files");
        record.attachments = vec![
            "https://cdn.example/big.bin".into(),
            "https://cdn.example/small.txt".into(),
        ];

        let (engine, destination, _dir) = setup_with(FakeDestination::with_tier(0), attachments.clone());
        let (ctx, _handle) = RunContext::new();
        engine.replay("low", vec![record.clone()], target(), &ctx).await.unwrap();
        let sends = destination.sends();
        assert_eq!(sends[0].files.len(), 1);
        assert_eq!(sends[0].files[0].filename, "small.txt");
        assert_eq!(sends[1].content.as_deref(), Some("https://cdn.example/big.bin"));

        let (engine, destination, _dir) = setup_with(FakeDestination::with_tier(2), attachments);
        let (ctx, _handle) = RunContext::new();
        engine.replay("high", vec![record], target(), &ctx).await.unwrap();
        let sends = destination.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].files.len(), 2);
    }

    #[tokio::test]
    async fn test_long_content_and_many_files_follow_up() {
        let mut attachments = FakeAttachments::default();
        let mut record = EventRecord::plain(1, "ana", &"x".repeat(4100));
        for i in 0..12 {
            let url = format!("https://cdn.example/{i}.png");
            attachments = attachments.with(&url, 3);
            record.attachments.push(url);
        }
        let (engine, destination, _dir) = setup_with(FakeDestination::default(), attachments);
        let (ctx, _handle) = RunContext::new();
        engine.replay("long", vec![record], target(), &ctx).await.unwrap();

        let sends = destination.sends();
        assert_eq!(sends.len(), 4);
        assert_eq!(sends[0].content.as_ref().map(|c| c.len()), Some(2000));
        assert_eq!(sends[0].files.len(), 10);
        assert_eq!(sends[1].content.as_ref().map(|c| c.len()), Some(2000));
        assert_eq!(sends[2].content.as_ref().map(|c| c.len()), Some(100));
        assert_eq!(sends[3].files.len(), 2);
    }

    #[tokio::test]
    async fn test_primary_failure_falls_back_to_files_only() {
        let attachments = FakeAttachments::default().with("https://cdn.example/a.png", 3);
        let destination = FakeDestination::default();
        destination.reject_embeds();
        let mut record = EventRecord::plain(1, "ana", "caption");
        record.embeds = vec![serde_json::json!({ "title": "bad" })];
        record.attachments = vec!["https://cdn.example/a.png".into()];

        let (engine, destination, _dir) = setup_with(destination, attachments);
        let (ctx, _handle) = RunContext::new();
        let outcome = engine.replay("fallback", vec![record], target(), &ctx).await.unwrap();
        assert!(outcome.is_completed());

        let sends = destination.sends();
        assert_eq!(sends.len(), 2);
        assert_eq!(sends[0].files.len(), 1);
        assert!(sends[0].content.is_none());
        assert_eq!(sends[1].content.as_deref(), Some("caption"));
    }

    #[tokio::test]
    async fn test_command_pin_and_reactions() {
        let (engine, destination, _dir) = setup(FakeDestination::default());
        let mut record = EventRecord::plain(1, "bot", "rolled 4");
        record.command_name = Some("roll".into());
        record.command_user = Some("bo".into());
        record.pinned = true;
        record.reactions = vec![("🎲".into(), 2)];

        let (ctx, _handle) = RunContext::new();
        engine.replay("cmd", vec![record], target(), &ctx).await.unwrap();

        let sends = destination.sends();
        assert_eq!(sends[0].identity.as_ref().unwrap().name, "bo used roll");
        let calls = destination.calls();
        assert!(calls.iter().any(|c| matches!(c, Call::Pin(_))));
        assert!(calls.iter().any(|c| matches!(
            c,
            Call::Reply { request, .. } if request.embeds[0]["description"] == "| 🎲: `2` |"
        )));
    }

    #[tokio::test]
    async fn test_thread_markers() {
        let (engine, destination, _dir) = setup(FakeDestination::default());
        let mut created = EventRecord::plain(1, "ana", "design chat");
        created.thread_flag = chronicle_shared::ThreadFlag::Thread(Snowflake(777));
        let mut missing = EventRecord::plain(2, "ana", "thread placeholder text");
        missing.thread_flag = chronicle_shared::ThreadFlag::Missing;

        let (ctx, _handle) = RunContext::new();
        engine
            .replay("threads", vec![created, missing], target(), &ctx)
            .await
            .unwrap();

        let calls = destination.calls();
        let new_thread = calls
            .iter()
            .find_map(|c| match c {
                Call::CreateThread { name, id } => {
                    assert_eq!(name, "design chat");
                    Some(*id)
                }
                _ => None,
            })
            .unwrap();
        assert!(calls.contains(&Call::DeletePlaceholder(new_thread)));

        let sends = destination.sends();
        assert_eq!(sends[0].thread, Some(new_thread));
        assert!(sends[0].embeds[0]["description"]
            .as_str()
            .unwrap()
            .contains("design chat"));
        assert_eq!(sends[1].thread, None);
        assert!(sends[1].embeds[0]["description"]
            .as_str()
            .unwrap()
            .contains("deleted"));
    }

    #[tokio::test]
    async fn test_dropped_run_flushes_remaining_records() {
        let destination = FakeDestination::default();
        destination.hang_on("message 3");
        let (engine, destination, _dir) = setup(destination);
        let input = records(5);
        let (ctx, _handle) = RunContext::new();

        let run = engine.replay("general", input.clone(), target(), &ctx);
        assert!(tokio::time::timeout(Duration::from_millis(200), run).await.is_err());

        assert_eq!(engine.store().read("general_in_progress").unwrap(), input[2..].to_vec());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(destination.calls().contains(&Call::CloseIdentity));
    }
}
