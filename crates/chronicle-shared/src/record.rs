//! The flat archive record and its decoded replay form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::components::PlacedComponent;
use crate::types::{EmojiRef, Identity, Snowflake};

// ---------------------------------------------------------------------------
// Thread flag
// ---------------------------------------------------------------------------

/// Thread-association flag stored in the last record column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadFlag {
    /// Ordinary message.
    None,
    /// A thread marker whose thread no longer exists (or never did).
    Missing,
    /// Several sub-threads matched the marker; needs manual resolution.
    Ambiguous,
    /// A thread marker associated with this source sub-thread.
    Thread(Snowflake),
}

impl ThreadFlag {
    pub fn to_column(self) -> u64 {
        match self {
            Self::None => 0,
            Self::Missing => 1,
            Self::Ambiguous => 2,
            Self::Thread(id) => id.0,
        }
    }

    pub fn from_column(value: u64) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Missing,
            2 => Self::Ambiguous,
            id => Self::Thread(Snowflake(id)),
        }
    }
}

// ---------------------------------------------------------------------------
// Event record
// ---------------------------------------------------------------------------

/// One archived event, in the column order of the record file.
///
/// Sentinels: `reply_to`, `command_name` and `command_user` are written as
/// `0` when absent, and at most one of reply / command / thread flag is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub author_name: String,
    pub author_avatar: String,
    pub content: String,
    /// Embed objects in the same shape the API accepts.
    pub embeds: Vec<Value>,
    pub original_id: Snowflake,
    pub reply_to: Option<Snowflake>,
    pub command_name: Option<String>,
    pub command_user: Option<String>,
    /// `(emoji, count)` pairs; custom emoji use `<:name:id>`.
    pub reactions: Vec<(String, u32)>,
    pub attachments: Vec<String>,
    pub stickers: Vec<String>,
    /// Interactive-element descriptors (see [`crate::components`]).
    pub components: Vec<Value>,
    pub pinned: bool,
    pub thread_flag: ThreadFlag,
}

impl EventRecord {
    /// A minimal plain record, mostly useful for tests and notices.
    pub fn plain(id: u64, author: &str, content: &str) -> Self {
        Self {
            author_name: author.to_string(),
            author_avatar: String::new(),
            content: content.to_string(),
            embeds: Vec::new(),
            original_id: Snowflake(id),
            reply_to: None,
            command_name: None,
            command_user: None,
            reactions: Vec::new(),
            attachments: Vec::new(),
            stickers: Vec::new(),
            components: Vec::new(),
            pinned: false,
            thread_flag: ThreadFlag::None,
        }
    }
}

// ---------------------------------------------------------------------------
// Decoded form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadMarker {
    Missing,
    Ambiguous,
    Created { source_thread: Snowflake },
}

/// What a record is, decided once while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    ThreadEvent(ThreadMarker),
    Reply { target: Snowflake },
    Command { name: String, user: String },
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: EmojiRef,
    pub count: u32,
}

/// Replay instructions for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub original_id: Snowflake,
    pub identity: Identity,
    pub content: String,
    pub embeds: Vec<Value>,
    pub kind: RecordKind,
    pub reactions: Vec<Reaction>,
    pub attachments: Vec<String>,
    pub stickers: Vec<String>,
    pub components: Vec<PlacedComponent>,
    pub pinned: bool,
}

impl DecodedRecord {
    /// Every file reference, attachments first.
    pub fn file_urls(&self) -> impl Iterator<Item = &str> {
        self.attachments
            .iter()
            .chain(self.stickers.iter())
            .map(String::as_str)
    }
}
