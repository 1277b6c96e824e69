//! Thread association heuristic.
//!
//! A thread-creation marker carries no reference to the thread it spawned.
//! The only correlation is time: the marker and the thread are created in
//! the same instant, so the marker is matched against every sub-thread of
//! its parent by creation time at millisecond resolution.

use tracing::{info, warn};

use crate::constants::MESSAGE_FLAG_HAS_THREAD;
use crate::protocol::{SourceMessage, SourceThread};
use crate::record::ThreadFlag;
use crate::types::Snowflake;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadAssociation<'a> {
    Unique(&'a SourceThread),
    NotFound,
    /// Candidate thread ids, in the order they were listed.
    Ambiguous(Vec<Snowflake>),
}

impl ThreadAssociation<'_> {
    pub fn flag(&self) -> ThreadFlag {
        match self {
            Self::Unique(thread) => ThreadFlag::Thread(thread.id),
            Self::NotFound => ThreadFlag::Missing,
            Self::Ambiguous(_) => ThreadFlag::Ambiguous,
        }
    }
}

/// Match a thread-creation marker against the parent's sub-threads.
pub fn associate_thread<'a>(
    marker: &SourceMessage,
    threads: &'a [SourceThread],
) -> ThreadAssociation<'a> {
    let created = marker.created_at().timestamp_millis();
    let matches: Vec<&SourceThread> = threads
        .iter()
        .filter(|thread| thread.created_at().timestamp_millis() == created)
        .collect();

    match matches.as_slice() {
        [thread] => ThreadAssociation::Unique(thread),
        [] => {
            let deleted = marker.flags & MESSAGE_FLAG_HAS_THREAD != 0;
            info!(
                marker = %marker.id,
                deleted,
                "no sub-thread matches thread marker"
            );
            ThreadAssociation::NotFound
        }
        many => {
            let ids: Vec<Snowflake> = many.iter().map(|thread| thread.id).collect();
            warn!(
                marker = %marker.id,
                candidates = ?ids,
                "found {} possible threads for marker, expected at most 1; manual fix required",
                ids.len()
            );
            ThreadAssociation::Ambiguous(ids)
        }
    }
}
