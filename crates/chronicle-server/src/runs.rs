//! Registry of background import runs.
//!
//! Each import runs in its own tokio task with its own [`RunContext`]; the
//! registry keeps the invoker side ([`RunHandle`]) plus the task handle so
//! runs can be inspected, cancelled between records, or aborted at shutdown.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chronicle_core::{ForumImportOutcome, ReplayOutcome, RunContext, RunHandle};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ServerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Import,
    ForumImport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// What a finished run produced.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RunOutput {
    Replay(ReplayOutcome),
    Forum(ForumImportOutcome),
}

fn replay_state(outcome: &ReplayOutcome) -> RunState {
    match outcome {
        ReplayOutcome::Completed { .. } => RunState::Completed,
        ReplayOutcome::Cancelled { .. } => RunState::Cancelled,
        ReplayOutcome::Failed { .. } => RunState::Failed,
    }
}

impl RunOutput {
    pub fn state(&self) -> RunState {
        match self {
            Self::Replay(outcome) => replay_state(outcome),
            Self::Forum(forum) => match &forum.stopped {
                Some(stopped) => replay_state(&stopped.outcome),
                None if forum.completed < forum.threads => RunState::Cancelled,
                None => RunState::Completed,
            },
        }
    }
}

/// Point-in-time view of a run, as served by the API.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub id: Uuid,
    pub kind: RunKind,
    pub source: String,
    pub state: RunState,
    pub processed: usize,
    pub total: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<RunOutput>,
    pub error: Option<String>,
}

struct Finished {
    state: RunState,
    at: DateTime<Utc>,
    outcome: Option<RunOutput>,
    error: Option<String>,
}

struct RunEntry {
    kind: RunKind,
    source: String,
    started_at: DateTime<Utc>,
    handle: RunHandle,
    task: Option<JoinHandle<()>>,
    finished: Option<Finished>,
}

impl RunEntry {
    fn is_active(&self) -> bool {
        self.finished.is_none()
    }

    fn snapshot(&self, id: Uuid) -> RunSnapshot {
        let progress = self.handle.progress();
        let (state, finished_at, outcome, error) = match &self.finished {
            Some(done) => (done.state, Some(done.at), done.outcome.clone(), done.error.clone()),
            None => (RunState::Running, None, None, None),
        };
        RunSnapshot {
            id,
            kind: self.kind,
            source: self.source.clone(),
            state,
            processed: progress.processed,
            total: progress.total,
            started_at: self.started_at,
            finished_at,
            outcome,
            error,
        }
    }
}

#[derive(Clone, Default)]
pub struct RunRegistry {
    runs: Arc<RwLock<HashMap<Uuid, RunEntry>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a run. Two active runs may not share a source, since they would
    /// share checkpoint files.
    pub async fn start<F, Fut>(&self, kind: RunKind, source: String, run: F) -> Result<Uuid, ServerError>
    where
        F: FnOnce(RunContext) -> Fut,
        Fut: Future<Output = Result<RunOutput, ServerError>> + Send + 'static,
    {
        let mut runs = self.runs.write().await;
        if runs
            .values()
            .any(|entry| entry.is_active() && entry.source == source)
        {
            return Err(ServerError::Conflict(format!(
                "a run for `{source}` is already active"
            )));
        }

        let id = Uuid::new_v4();
        let (ctx, handle) = RunContext::new();
        let future = run(ctx);
        let registry = self.clone();
        // The entry is inserted before the write lock is released, so the
        // task always finds it when it finishes.
        let task = tokio::spawn(async move {
            let result = future.await;
            registry.finish(id, result).await;
        });

        runs.insert(
            id,
            RunEntry {
                kind,
                source: source.clone(),
                started_at: Utc::now(),
                handle,
                task: Some(task),
                finished: None,
            },
        );
        info!(run = %id, ?kind, source = %source, "run started");
        Ok(id)
    }

    async fn finish(&self, id: Uuid, result: Result<RunOutput, ServerError>) {
        let mut runs = self.runs.write().await;
        let Some(entry) = runs.get_mut(&id) else {
            return;
        };
        let finished = match result {
            Ok(output) => Finished {
                state: output.state(),
                at: Utc::now(),
                outcome: Some(output),
                error: None,
            },
            Err(e) => {
                warn!(run = %id, error = %e, "run rejected");
                Finished {
                    state: RunState::Failed,
                    at: Utc::now(),
                    outcome: None,
                    error: Some(e.to_string()),
                }
            }
        };
        info!(run = %id, state = ?finished.state, "run finished");
        entry.finished = Some(finished);
        entry.task = None;
    }

    pub async fn get(&self, id: Uuid) -> Option<RunSnapshot> {
        let runs = self.runs.read().await;
        runs.get(&id).map(|entry| entry.snapshot(id))
    }

    /// All runs, newest first.
    pub async fn list(&self) -> Vec<RunSnapshot> {
        let runs = self.runs.read().await;
        let mut snapshots: Vec<RunSnapshot> = runs
            .iter()
            .map(|(id, entry)| entry.snapshot(*id))
            .collect();
        snapshots.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        snapshots
    }

    /// Ask a run to stop at its next record boundary.
    pub async fn cancel(&self, id: Uuid) -> Result<RunSnapshot, ServerError> {
        let runs = self.runs.read().await;
        let entry = runs
            .get(&id)
            .ok_or_else(|| ServerError::NotFound(format!("run {id}")))?;
        if entry.is_active() {
            entry.handle.request_cancel();
            info!(run = %id, "cancellation requested");
        }
        Ok(entry.snapshot(id))
    }

    /// Abort every active run and wait for the tasks to unwind, which flushes
    /// their in-progress checkpoints. Returns how many were aborted.
    pub async fn abort_all(&self) -> usize {
        let tasks: Vec<(Uuid, JoinHandle<()>)> = {
            let mut runs = self.runs.write().await;
            runs.iter_mut()
                .filter_map(|(id, entry)| entry.task.take().map(|task| (*id, task)))
                .collect()
        };

        let count = tasks.len();
        for (id, task) in tasks {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(run = %id, error = %e, "run task panicked");
                }
            }
            let mut runs = self.runs.write().await;
            if let Some(entry) = runs.get_mut(&id) {
                if entry.finished.is_none() {
                    entry.finished = Some(Finished {
                        state: RunState::Cancelled,
                        at: Utc::now(),
                        outcome: None,
                        error: Some("aborted at shutdown".into()),
                    });
                }
            }
        }
        count
    }
}
