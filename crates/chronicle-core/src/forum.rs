//! Forum import: recreate a forum from its atlas and replay every thread.

use std::collections::HashMap;
use std::sync::Arc;

use chronicle_shared::{EventRecord, Snowflake};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ReplayError;
use crate::replay::guard::IdentityGuard;
use crate::replay::{ReplayEngine, ReplayOutcome, ReplayTarget, RunContext};

/// The thread a forum import stopped at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoppedThread {
    /// Source thread id, also the name of its record file.
    pub thread: Snowflake,
    pub outcome: ReplayOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForumImportOutcome {
    pub forum_id: Snowflake,
    pub threads: usize,
    pub completed: usize,
    /// Set when a thread was cancelled or failed; later threads were not started.
    pub stopped: Option<StoppedThread>,
}

/// Import the forum described by atlas `atlas_name` into `guild`.
///
/// Every thread file is read in full before anything is created, so a
/// missing or malformed file rejects the import up front. Forum imports are
/// not resumed: each run creates a new forum.
pub async fn import_forum(
    engine: &ReplayEngine,
    atlas_name: &str,
    guild: Snowflake,
    parent: Option<Snowflake>,
    ctx: &RunContext,
) -> Result<ForumImportOutcome, ReplayError> {
    let store = engine.store();
    store.ensure_no_failed_batch()?;
    let atlas = store.read_atlas(atlas_name)?;

    let mut sequences: Vec<(String, Vec<EventRecord>)> = Vec::with_capacity(atlas.threads.len());
    for descriptor in &atlas.threads {
        let name = descriptor.id.to_string();
        let records = store.read(&name)?;
        sequences.push((name, records));
    }
    // Each run builds a fresh forum, so a thread checkpoint left by an
    // earlier run would leave that thread's head out of the new post.
    for (name, _) in &sequences {
        if store.clear_in_progress(name)? {
            info!(thread = %name, "removed stale thread checkpoint");
        }
    }
    ctx.set_total(sequences.iter().map(|(_, records)| records.len()).sum());

    let destination = engine.destination();
    let forum = destination
        .create_forum(guild, parent, &atlas.header)
        .await?;
    info!(atlas = atlas_name, forum = %forum.id, threads = atlas.threads.len(), "created forum");

    let tag_ids: HashMap<&str, Snowflake> = forum
        .available_tags
        .iter()
        .filter_map(|tag| tag.id.map(|id| (tag.name.as_str(), id)))
        .collect();

    let tier = engine.premium_tier(forum.id).await;
    let webhook = destination.open_identity(forum.id).await?;
    let identity = IdentityGuard::new(Arc::clone(destination), webhook);

    let mut completed = 0;
    let mut stopped = None;
    for (descriptor, (name, records)) in atlas.threads.iter().zip(&sequences) {
        if ctx.should_stop() {
            info!(forum = %forum.id, completed, "forum import cancelled between threads");
            break;
        }

        let applied: Vec<Snowflake> = descriptor
            .applied_tags
            .iter()
            .filter_map(|tag| tag_ids.get(tag.as_str()).copied())
            .collect();
        let opening = format!("Thread started by {}", descriptor.owner_name);
        let post = destination
            .create_forum_post(forum.id, &descriptor.name, &applied, &opening)
            .await?;

        let target = ReplayTarget {
            channel: forum.id,
            thread: Some(post),
        };
        let outcome = engine
            .run_sequence(identity.webhook(), name, records, target, tier, ctx)
            .await;
        if !outcome.is_completed() {
            stopped = Some(StoppedThread {
                thread: descriptor.id,
                outcome,
            });
            break;
        }

        if descriptor.locked {
            if let Err(e) = destination.lock_thread(post).await {
                warn!(thread = %post, error = %e, "failed to lock thread");
            }
        }
        completed += 1;
    }

    identity.close().await;
    info!(forum = %forum.id, completed, threads = atlas.threads.len(), "forum import finished");
    Ok(ForumImportOutcome {
        forum_id: forum.id,
        threads: atlas.threads.len(),
        completed,
        stopped,
    })
}
