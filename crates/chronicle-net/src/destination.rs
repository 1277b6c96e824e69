//! Write-side collaborator trait: impersonated delivery into a channel.

use async_trait::async_trait;
use chronicle_shared::atlas::ForumHeader;
use chronicle_shared::protocol::ChannelInfo;
use chronicle_shared::{Identity, MessageHandle, Snowflake};
use serde_json::Value;

use crate::error::Result;
use crate::source::FileUpload;

/// Longest username a webhook accepts.
pub const MAX_USERNAME_CHARS: usize = 80;

/// The per-run delivery identity: a webhook on the destination channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookHandle {
    pub id: Snowflake,
    pub token: String,
    pub channel_id: Snowflake,
}

/// One delivery call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryRequest {
    /// Appearance to deliver under. Ignored by bot-native replies.
    pub identity: Option<Identity>,
    pub content: Option<String>,
    pub embeds: Vec<Value>,
    pub files: Vec<FileUpload>,
    /// API action rows.
    pub components: Vec<Value>,
    /// Sub-thread of the webhook's channel to deliver into.
    pub thread: Option<Snowflake>,
}

impl DeliveryRequest {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            ..Self::default()
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        self.content = (!content.is_empty()).then_some(content);
        self
    }

    pub fn embeds(mut self, embeds: Vec<Value>) -> Self {
        self.embeds = embeds;
        self
    }

    pub fn embed(mut self, embed: Value) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn files(mut self, files: Vec<FileUpload>) -> Self {
        self.files = files;
        self
    }

    pub fn components(mut self, components: Vec<Value>) -> Self {
        self.components = components;
        self
    }

    pub fn in_thread(mut self, thread: Option<Snowflake>) -> Self {
        self.thread = thread;
        self
    }

    /// Nothing would be delivered.
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.embeds.is_empty() && self.files.is_empty()
    }
}

/// Impersonated delivery plus the channel operations replay needs.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Premium tier of the guild owning `channel`.
    async fn premium_tier(&self, channel: Snowflake) -> Result<u8>;

    /// Create the delivery identity for one run.
    async fn open_identity(&self, channel: Snowflake) -> Result<WebhookHandle>;

    async fn close_identity(&self, webhook: &WebhookHandle) -> Result<()>;

    async fn send(&self, webhook: &WebhookHandle, request: DeliveryRequest) -> Result<MessageHandle>;

    /// Bot-native reply to an already delivered message.
    async fn reply(&self, target: &MessageHandle, request: DeliveryRequest) -> Result<MessageHandle>;

    async fn pin(&self, message: &MessageHandle) -> Result<()>;

    /// Create a public sub-thread of `channel` without a starter message.
    async fn create_thread(&self, channel: Snowflake, name: &str) -> Result<Snowflake>;

    /// Delete the system message the platform posts when `thread` is created.
    /// Returns whether one was found.
    async fn delete_thread_placeholder(&self, channel: Snowflake, thread: Snowflake) -> Result<bool>;

    async fn create_forum(
        &self,
        guild: Snowflake,
        parent: Option<Snowflake>,
        header: &ForumHeader,
    ) -> Result<ChannelInfo>;

    /// Create a forum post; the platform requires an opening message.
    async fn create_forum_post(
        &self,
        forum: Snowflake,
        name: &str,
        applied_tags: &[Snowflake],
        opening: &str,
    ) -> Result<Snowflake>;

    async fn lock_thread(&self, thread: Snowflake) -> Result<()>;
}

/// Split text into chunks of at most `max_chars` characters (UTF-8 safe).
pub fn split_content(message: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 || message.is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for ch in message.chars() {
        if current_chars == max_chars {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current.push(ch);
        current_chars += 1;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Make a display name acceptable as a webhook username.
///
/// The platform rejects empty names, names over 80 characters and names
/// containing "discord" or "clyde".
pub fn sanitize_username(name: &str) -> String {
    let mut cleaned: String = name.trim().chars().take(MAX_USERNAME_CHARS).collect();
    for (banned, replacement) in [("discord", "disc0rd"), ("clyde", "clyd3")] {
        while let Some(at) = cleaned.to_ascii_lowercase().find(banned) {
            cleaned.replace_range(at..at + banned.len(), replacement);
        }
    }
    if cleaned.is_empty() {
        "Unknown user".to_string()
    } else {
        cleaned
    }
}
