//! Export pipelines: history -> records -> store.

use std::time::Instant;

use chronicle_net::HistorySource;
use chronicle_shared::atlas::{ForumAtlas, ForumHeader, ThreadDescriptor};
use chronicle_shared::protocol::{ChannelInfo, MessageKind, SourceThread};
use chronicle_shared::threads::associate_thread;
use chronicle_shared::{codec, EventRecord, Snowflake};
use chronicle_store::RecordStore;
use serde::Serialize;
use tracing::info;

use crate::error::ExportError;
use crate::fetcher::{fetch, FetchOutcome};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    /// Archive name the records were written under.
    pub name: String,
    pub channel_name: String,
    pub total: usize,
    pub accepted: usize,
    pub written: usize,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForumExportSummary {
    pub atlas: String,
    pub forum_name: String,
    pub threads: Vec<ExportSummary>,
    pub elapsed_secs: f64,
}

struct Encoded {
    fetched: FetchOutcome,
    records: Vec<EventRecord>,
}

/// Fetch and encode a channel's history, oldest first.
///
/// Thread markers are associated against the sub-threads of `parent`; pass
/// `None` when the channel cannot have sub-threads.
async fn encode_history(
    source: &dyn HistorySource,
    channel: Snowflake,
    parent: Option<&ChannelInfo>,
) -> Result<Encoded, ExportError> {
    let fetched = fetch(source, channel).await?;

    let has_markers = fetched
        .events
        .iter()
        .any(|message| message.message_kind() == MessageKind::ThreadCreated);
    let threads: Vec<SourceThread> = match parent {
        Some(parent) if has_markers => source.threads(parent).await?,
        _ => Vec::new(),
    };

    let records = fetched
        .events
        .iter()
        .rev()
        .map(|message| {
            if message.message_kind() == MessageKind::ThreadCreated {
                let association = associate_thread(message, &threads);
                codec::encode(message, Some(&association))
            } else {
                codec::encode(message, None)
            }
        })
        .collect();

    Ok(Encoded { fetched, records })
}

/// Export one channel (or sub-thread) to `<channel-id>.csv`.
pub async fn export_channel(
    source: &dyn HistorySource,
    store: &RecordStore,
    channel_id: Snowflake,
) -> Result<ExportSummary, ExportError> {
    let started = Instant::now();
    let channel = source.channel(channel_id).await?;
    let parent = (!channel.is_thread()).then_some(&channel);
    let encoded = encode_history(source, channel_id, parent).await?;

    let name = channel_id.to_string();
    let path = store.write(&encoded.records, &name)?;
    let summary = ExportSummary {
        name,
        channel_name: channel.display_name(),
        total: encoded.fetched.total,
        accepted: encoded.fetched.accepted,
        written: encoded.records.len(),
        elapsed_secs: started.elapsed().as_secs_f64(),
    };
    info!(
        channel = %channel_id,
        file = %path.display(),
        total = summary.total,
        written = summary.written,
        elapsed_secs = summary.elapsed_secs,
        "exported channel"
    );
    Ok(summary)
}

/// Export a forum: one record file per thread plus the atlas describing them.
pub async fn export_forum(
    source: &dyn HistorySource,
    store: &RecordStore,
    forum_id: Snowflake,
) -> Result<ForumExportSummary, ExportError> {
    let started = Instant::now();
    let forum = source.channel(forum_id).await?;
    if !forum.is_forum() {
        return Err(ExportError::NotAForum(forum_id));
    }

    let threads = source.threads(&forum).await?;
    let mut descriptors = Vec::with_capacity(threads.len());
    let mut summaries = Vec::with_capacity(threads.len());

    for thread in &threads {
        let thread_started = Instant::now();
        let encoded = encode_history(source, thread.id, None).await?;
        let owner_name = encoded
            .fetched
            .events
            .iter()
            .rev()
            .find(|message| Some(message.author.id) == thread.owner_id)
            .map(|message| message.author.display_name().to_string())
            .or_else(|| thread.owner_id.map(|id| id.to_string()))
            .unwrap_or_default();

        let name = thread.id.to_string();
        store.write(&encoded.records, &name)?;
        descriptors.push(ThreadDescriptor::from_thread(thread, &forum, owner_name));
        summaries.push(ExportSummary {
            name,
            channel_name: thread.name.clone(),
            total: encoded.fetched.total,
            accepted: encoded.fetched.accepted,
            written: encoded.records.len(),
            elapsed_secs: thread_started.elapsed().as_secs_f64(),
        });
    }

    let atlas = ForumAtlas {
        header: ForumHeader::from_channel(&forum),
        threads: descriptors,
    };
    let atlas_name = RecordStore::atlas_name(forum_id);
    store.write_atlas(&atlas, &atlas_name)?;

    let elapsed_secs = started.elapsed().as_secs_f64();
    info!(forum = %forum_id, threads = summaries.len(), elapsed_secs, "exported forum");
    Ok(ForumExportSummary {
        atlas: atlas_name,
        forum_name: forum.display_name(),
        threads: summaries,
        elapsed_secs,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chronicle_shared::protocol::{MessageReference, CHANNEL_KIND_FORUM, CHANNEL_KIND_TEXT};
    use chronicle_shared::ThreadFlag;
    use tempfile::TempDir;

    use super::*;
    use crate::replay::{notices, ImportRequest, ReplayEngine, ReplayTarget, RunContext};
    use crate::testing::{channel, message, thread, Call, FakeAttachments, FakeDestination, FakeHistory};

    const MARKER_ID: u64 = 175928847299117063;

    fn store() -> (RecordStore, TempDir) {
        let dir = TempDir::new().unwrap();
        (RecordStore::new(dir.path()).unwrap(), dir)
    }

    #[tokio::test]
    async fn test_export_writes_chronological_records() {
        let (store, _dir) = store();
        let history = FakeHistory::default()
            .with_channel(channel(42, CHANNEL_KIND_TEXT, "general"))
            .with_messages(
                Snowflake(42),
                vec![
                    message(100, 0, "ana", "first"),
                    message(101, 7, "bo", "joined"),
                    message(102, 0, "bo", "second"),
                ],
            );

        let summary = export_channel(&history, &store, Snowflake(42)).await.unwrap();
        assert_eq!(summary.name, "42");
        assert_eq!(summary.channel_name, "general");
        assert_eq!(summary.total, 3);
        assert_eq!(summary.written, 2);

        let records = store.read("42").unwrap();
        let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert_eq!(history.thread_listings(), 0);
    }

    #[tokio::test]
    async fn test_export_associates_thread_markers() {
        let (store, _dir) = store();
        let history = FakeHistory::default()
            .with_channel(channel(42, CHANNEL_KIND_TEXT, "general"))
            .with_messages(
                Snowflake(42),
                vec![
                    message(MARKER_ID, 18, "ana", ""),
                    message(MARKER_ID + (1 << 22) * 1000, 18, "ana", ""),
                ],
            )
            .with_threads(Snowflake(42), vec![thread(MARKER_ID + 1, 42, "design chat")]);

        export_channel(&history, &store, Snowflake(42)).await.unwrap();
        let records = store.read("42").unwrap();
        assert_eq!(records[0].thread_flag, ThreadFlag::Thread(Snowflake(MARKER_ID + 1)));
        assert_eq!(records[0].content, "design chat");
        assert_eq!(records[1].thread_flag, ThreadFlag::Missing);
        assert_eq!(history.thread_listings(), 1);
    }

    #[tokio::test]
    async fn test_reply_to_skipped_kind_keeps_target_and_degrades() {
        let (store, _dir) = store();
        let mut reply = message(102, 19, "bo", "welcome!");
        reply.message_reference = Some(MessageReference {
            message_id: Some(Snowflake(101)),
            channel_id: Some(Snowflake(42)),
        });
        let history = FakeHistory::default()
            .with_channel(channel(42, CHANNEL_KIND_TEXT, "general"))
            .with_messages(
                Snowflake(42),
                vec![
                    message(100, 0, "ana", "first"),
                    message(101, 7, "bo", "joined"),
                    reply,
                ],
            );

        let summary = export_channel(&history, &store, Snowflake(42)).await.unwrap();
        assert_eq!(summary.written, 2);
        let records = store.read("42").unwrap();
        assert_eq!(records[1].content, "welcome!");
        assert_eq!(records[1].reply_to, Some(Snowflake(101)));

        let destination = Arc::new(FakeDestination::default());
        let engine = ReplayEngine::new(destination.clone(), Arc::new(FakeAttachments::default()), store);
        let request = ImportRequest {
            source: "42".into(),
            target: ReplayTarget {
                channel: Snowflake(500),
                thread: None,
            },
            resume_failed: false,
        };
        let (ctx, _handle) = RunContext::new();
        let outcome = engine.import(request, &ctx).await.unwrap();
        assert!(outcome.is_completed());

        assert!(!destination
            .calls()
            .iter()
            .any(|call| matches!(call, Call::Reply { .. })));
        let contents = destination.sent_contents();
        assert_eq!(contents[0], "first");
        assert!(contents[1].starts_with("welcome!\n"));
        assert!(contents[1].ends_with(notices::UNRESOLVED_REPLY_MARKER));
    }

    #[tokio::test]
    async fn test_export_forum_writes_atlas_and_threads() {
        let (store, _dir) = store();
        let mut forum = channel(900, CHANNEL_KIND_FORUM, "help");
        forum.available_tags = serde_json::from_value(serde_json::json!([
            { "id": "5", "name": "solved" }
        ]))
        .unwrap();
        let mut post = thread(901, 900, "crash on start");
        post.applied_tags = vec![Snowflake(5)];

        let history = FakeHistory::default()
            .with_channel(forum)
            .with_threads(Snowflake(900), vec![post])
            .with_messages(
                Snowflake(901),
                vec![message(2_000, 0, "ana", "it crashes"), message(2_001, 0, "bo", "fixed")],
            );

        let summary = export_forum(&history, &store, Snowflake(900)).await.unwrap();
        assert_eq!(summary.atlas, "900_atlas");
        assert_eq!(summary.threads.len(), 1);

        let atlas = store.read_atlas("900_atlas").unwrap();
        assert_eq!(atlas.header.name, "help");
        assert_eq!(atlas.threads[0].owner_name, "ana");
        assert_eq!(atlas.threads[0].applied_tags, vec!["solved".to_string()]);
        assert_eq!(store.read("901").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_export_forum_rejects_other_channels() {
        let (store, _dir) = store();
        let history = FakeHistory::default().with_channel(channel(42, CHANNEL_KIND_TEXT, "general"));
        let err = export_forum(&history, &store, Snowflake(42)).await.unwrap_err();
        assert!(matches!(err, ExportError::NotAForum(Snowflake(42))));
    }
}
