//! Source-side platform models.
//!
//! These mirror the subset of the REST API payloads Chronicle reads while
//! exporting. Unknown fields are ignored and missing list fields default to
//! empty so that older messages still deserialize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{CDN_BASE, MEDIA_BASE};
use crate::types::Snowflake;

/// Message kinds Chronicle distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Default,
    ThreadCreated,
    Reply,
    ChatInputCommand,
    ContextMenuCommand,
    Other(u8),
}

impl MessageKind {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Default,
            18 => Self::ThreadCreated,
            19 => Self::Reply,
            20 => Self::ChatInputCommand,
            23 => Self::ContextMenuCommand,
            other => Self::Other(other),
        }
    }

    /// Whether the record codec knows how to encode this kind.
    pub fn is_archivable(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMessage {
    pub id: Snowflake,
    #[serde(rename = "type", default)]
    pub kind: u8,
    #[serde(default)]
    pub content: String,
    pub author: SourceAuthor,
    #[serde(default)]
    pub embeds: Vec<Value>,
    #[serde(default)]
    pub reactions: Vec<SourceReaction>,
    #[serde(default)]
    pub attachments: Vec<SourceAttachment>,
    #[serde(default)]
    pub sticker_items: Vec<SourceSticker>,
    #[serde(default)]
    pub components: Vec<Value>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub message_reference: Option<MessageReference>,
    #[serde(default)]
    pub interaction: Option<SourceInteraction>,
    #[serde(default)]
    pub flags: u64,
}

impl SourceMessage {
    pub fn message_kind(&self) -> MessageKind {
        MessageKind::from_code(self.kind)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.id.created_at()
    }

    /// Id of the message this one replies to, if any.
    pub fn reply_target(&self) -> Option<Snowflake> {
        if self.message_kind() != MessageKind::Reply {
            return None;
        }
        self.message_reference.as_ref().and_then(|r| r.message_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAuthor {
    pub id: Snowflake,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl SourceAuthor {
    pub fn display_name(&self) -> &str {
        self.global_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.username)
    }

    /// Avatar URL, falling back to the default avatar for users without one.
    pub fn avatar_url(&self) -> String {
        match &self.avatar {
            Some(hash) => {
                let ext = if hash.starts_with("a_") { "gif" } else { "png" };
                format!("{CDN_BASE}/avatars/{}/{hash}.{ext}", self.id)
            }
            None => format!("{CDN_BASE}/embed/avatars/{}.png", (self.id.0 >> 22) % 6),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReaction {
    pub count: u32,
    pub emoji: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAttachment {
    pub url: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSticker {
    pub id: Snowflake,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub format_type: u8,
}

impl SourceSticker {
    pub fn url(&self) -> String {
        let ext = match self.format_type {
            3 => "json",
            4 => "gif",
            _ => "png",
        };
        format!("{MEDIA_BASE}/stickers/{}.{ext}", self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReference {
    #[serde(default)]
    pub message_id: Option<Snowflake>,
    #[serde(default)]
    pub channel_id: Option<Snowflake>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInteraction {
    pub name: String,
    pub user: SourceAuthor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMetadata {
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub create_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archive_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceThread {
    pub id: Snowflake,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<Snowflake>,
    #[serde(default)]
    pub owner_id: Option<Snowflake>,
    #[serde(default)]
    pub thread_metadata: Option<ThreadMetadata>,
    #[serde(default)]
    pub applied_tags: Vec<Snowflake>,
}

impl SourceThread {
    /// Threads created before 2022-01-09 carry no `create_timestamp`; their
    /// id timestamp is used instead.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.thread_metadata
            .as_ref()
            .and_then(|m| m.create_timestamp)
            .unwrap_or_else(|| self.id.created_at())
    }

    pub fn is_locked(&self) -> bool {
        self.thread_metadata.as_ref().is_some_and(|m| m.locked)
    }
}

/// Channel kinds Chronicle cares about.
pub const CHANNEL_KIND_TEXT: u8 = 0;
pub const CHANNEL_KIND_PUBLIC_THREAD: u8 = 11;
pub const CHANNEL_KIND_PRIVATE_THREAD: u8 = 12;
pub const CHANNEL_KIND_FORUM: u8 = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: Snowflake,
    #[serde(rename = "type", default)]
    pub kind: u8,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub parent_id: Option<Snowflake>,
    #[serde(default)]
    pub available_tags: Vec<ForumTag>,
    #[serde(default)]
    pub default_reaction_emoji: Option<DefaultReaction>,
}

impl ChannelInfo {
    pub fn is_thread(&self) -> bool {
        matches!(
            self.kind,
            CHANNEL_KIND_PUBLIC_THREAD | CHANNEL_KIND_PRIVATE_THREAD
        )
    }

    pub fn is_forum(&self) -> bool {
        self.kind == CHANNEL_KIND_FORUM
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumTag {
    #[serde(default)]
    pub id: Option<Snowflake>,
    pub name: String,
    #[serde(default)]
    pub moderated: bool,
    #[serde(default)]
    pub emoji_id: Option<Snowflake>,
    #[serde(default)]
    pub emoji_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultReaction {
    #[serde(default)]
    pub emoji_id: Option<Snowflake>,
    #[serde(default)]
    pub emoji_name: Option<String>,
}
