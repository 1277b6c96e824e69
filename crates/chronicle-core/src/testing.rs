//! In-memory fakes of the collaborator traits.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chronicle_net::source::filename_from_url;
use chronicle_net::{
    AttachmentSource, DeliveryRequest, Destination, FileUpload, HistorySource, NetError, Result,
    WebhookHandle,
};
use chronicle_shared::atlas::ForumHeader;
use chronicle_shared::protocol::{ChannelInfo, ForumTag, SourceMessage, SourceThread};
use chronicle_shared::{MessageHandle, Snowflake};
use serde_json::json;

use crate::RunHandle;

fn rejected(context: &'static str) -> NetError {
    NetError::Status {
        context,
        status: 400,
        body: "rejected".into(),
    }
}

// ---------------------------------------------------------------------------
// Destination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    OpenIdentity(Snowflake),
    CloseIdentity,
    Send(DeliveryRequest),
    Reply {
        target: MessageHandle,
        request: DeliveryRequest,
    },
    Pin(MessageHandle),
    CreateThread {
        name: String,
        id: Snowflake,
    },
    DeletePlaceholder(Snowflake),
    CreateForum {
        name: String,
        id: Snowflake,
    },
    CreatePost {
        name: String,
        tags: Vec<Snowflake>,
        opening: String,
        id: Snowflake,
    },
    Lock(Snowflake),
}

struct State {
    calls: Vec<Call>,
    next_id: u64,
    fail_on: Option<String>,
    reject_embeds: bool,
    hang_on: Option<String>,
    cancel_after: Option<(usize, RunHandle)>,
    sends: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            next_id: 9_000,
            fail_on: None,
            reject_embeds: false,
            hang_on: None,
            cancel_after: None,
            sends: 0,
        }
    }
}

impl State {
    fn next_id(&mut self) -> Snowflake {
        self.next_id += 1;
        Snowflake(self.next_id)
    }

    fn rejects(&self, request: &DeliveryRequest) -> bool {
        let content = request.content.as_deref().unwrap_or_default();
        let failing = self
            .fail_on
            .as_deref()
            .is_some_and(|needle| content.contains(needle));
        failing || (self.reject_embeds && !request.embeds.is_empty())
    }
}

#[derive(Default)]
pub(crate) struct FakeDestination {
    state: Mutex<State>,
    tier: u8,
}

impl FakeDestination {
    pub(crate) fn with_tier(tier: u8) -> Self {
        Self {
            tier,
            ..Self::default()
        }
    }

    /// Reject every delivery whose content contains `needle`.
    pub(crate) fn failing_on(needle: &str) -> Self {
        let fake = Self::default();
        fake.fail_on(needle);
        fake
    }

    pub(crate) fn fail_on(&self, needle: &str) {
        self.state.lock().unwrap().fail_on = Some(needle.to_string());
    }

    pub(crate) fn stop_failing(&self) {
        self.state.lock().unwrap().fail_on = None;
    }

    pub(crate) fn reject_embeds(&self) {
        self.state.lock().unwrap().reject_embeds = true;
    }

    /// Never complete a send whose content contains `needle`.
    pub(crate) fn hang_on(&self, needle: &str) {
        self.state.lock().unwrap().hang_on = Some(needle.to_string());
    }

    /// Request cancellation once `sends` webhook sends have succeeded.
    pub(crate) fn cancel_after_sends(&self, sends: usize, handle: RunHandle) {
        self.state.lock().unwrap().cancel_after = Some((sends, handle));
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn sends(&self) -> Vec<DeliveryRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn sent_contents(&self) -> Vec<String> {
        self.sends()
            .into_iter()
            .map(|request| request.content.unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl Destination for FakeDestination {
    async fn premium_tier(&self, _channel: Snowflake) -> Result<u8> {
        Ok(self.tier)
    }

    async fn open_identity(&self, channel: Snowflake) -> Result<WebhookHandle> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::OpenIdentity(channel));
        Ok(WebhookHandle {
            id: state.next_id(),
            token: "token".into(),
            channel_id: channel,
        })
    }

    async fn close_identity(&self, _webhook: &WebhookHandle) -> Result<()> {
        self.state.lock().unwrap().calls.push(Call::CloseIdentity);
        Ok(())
    }

    async fn send(&self, webhook: &WebhookHandle, request: DeliveryRequest) -> Result<MessageHandle> {
        let hang = {
            let state = self.state.lock().unwrap();
            let content = request.content.as_deref().unwrap_or_default();
            state
                .hang_on
                .as_deref()
                .is_some_and(|needle| content.contains(needle))
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        if state.rejects(&request) {
            return Err(rejected("execute webhook"));
        }
        let id = state.next_id();
        let channel_id = request.thread.unwrap_or(webhook.channel_id);
        state.calls.push(Call::Send(request));
        state.sends += 1;
        if let Some((after, handle)) = &state.cancel_after {
            if state.sends >= *after {
                handle.request_cancel();
            }
        }
        Ok(MessageHandle { id, channel_id })
    }

    async fn reply(&self, target: &MessageHandle, request: DeliveryRequest) -> Result<MessageHandle> {
        let mut state = self.state.lock().unwrap();
        if state.rejects(&request) {
            return Err(rejected("reply"));
        }
        let id = state.next_id();
        state.calls.push(Call::Reply {
            target: *target,
            request,
        });
        Ok(MessageHandle {
            id,
            channel_id: target.channel_id,
        })
    }

    async fn pin(&self, message: &MessageHandle) -> Result<()> {
        self.state.lock().unwrap().calls.push(Call::Pin(*message));
        Ok(())
    }

    async fn create_thread(&self, _channel: Snowflake, name: &str) -> Result<Snowflake> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.calls.push(Call::CreateThread {
            name: name.to_string(),
            id,
        });
        Ok(id)
    }

    async fn delete_thread_placeholder(&self, _channel: Snowflake, thread: Snowflake) -> Result<bool> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::DeletePlaceholder(thread));
        Ok(true)
    }

    async fn create_forum(
        &self,
        guild: Snowflake,
        parent: Option<Snowflake>,
        header: &ForumHeader,
    ) -> Result<ChannelInfo> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let mut available_tags = Vec::new();
        for tag in &header.tags {
            available_tags.push(ForumTag {
                id: Some(state.next_id()),
                name: tag.name.clone(),
                moderated: tag.moderated,
                emoji_id: None,
                emoji_name: tag.emoji.clone(),
            });
        }
        state.calls.push(Call::CreateForum {
            name: header.name.clone(),
            id,
        });
        Ok(ChannelInfo {
            id,
            kind: chronicle_shared::protocol::CHANNEL_KIND_FORUM,
            guild_id: Some(guild),
            name: Some(header.name.clone()),
            topic: header.topic.clone(),
            parent_id: parent,
            available_tags,
            default_reaction_emoji: None,
        })
    }

    async fn create_forum_post(
        &self,
        _forum: Snowflake,
        name: &str,
        applied_tags: &[Snowflake],
        opening: &str,
    ) -> Result<Snowflake> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.calls.push(Call::CreatePost {
            name: name.to_string(),
            tags: applied_tags.to_vec(),
            opening: opening.to_string(),
            id,
        });
        Ok(id)
    }

    async fn lock_thread(&self, thread: Snowflake) -> Result<()> {
        self.state.lock().unwrap().calls.push(Call::Lock(thread));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

/// Serves zero-filled files of a configured size per URL.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeAttachments {
    sizes: HashMap<String, usize>,
}

impl FakeAttachments {
    pub(crate) fn with(mut self, url: &str, size: usize) -> Self {
        self.sizes.insert(url.to_string(), size);
        self
    }
}

#[async_trait]
impl AttachmentSource for FakeAttachments {
    async fn fetch(&self, url: &str) -> Result<FileUpload> {
        let size = self.sizes.get(url).ok_or(NetError::Status {
            context: "download attachment",
            status: 404,
            body: url.to_string(),
        })?;
        Ok(FileUpload::new(filename_from_url(url), vec![0u8; *size]))
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub(crate) struct FakeHistory {
    channels: HashMap<Snowflake, ChannelInfo>,
    /// Newest first, as the platform returns them.
    messages: HashMap<Snowflake, Vec<SourceMessage>>,
    threads: HashMap<Snowflake, Vec<SourceThread>>,
    thread_listings: Mutex<usize>,
}

impl FakeHistory {
    pub(crate) fn with_channel(mut self, channel: ChannelInfo) -> Self {
        self.channels.insert(channel.id, channel);
        self
    }

    /// `messages` in chronological order.
    pub(crate) fn with_messages(mut self, channel: Snowflake, mut messages: Vec<SourceMessage>) -> Self {
        messages.reverse();
        self.messages.insert(channel, messages);
        self
    }

    pub(crate) fn with_threads(mut self, channel: Snowflake, threads: Vec<SourceThread>) -> Self {
        self.threads.insert(channel, threads);
        self
    }

    pub(crate) fn thread_listings(&self) -> usize {
        *self.thread_listings.lock().unwrap()
    }
}

#[async_trait]
impl HistorySource for FakeHistory {
    async fn channel(&self, id: Snowflake) -> Result<ChannelInfo> {
        self.channels.get(&id).cloned().ok_or(NetError::Status {
            context: "get channel",
            status: 404,
            body: id.to_string(),
        })
    }

    async fn history_page(
        &self,
        channel: Snowflake,
        before: Option<Snowflake>,
        limit: u8,
    ) -> Result<Vec<SourceMessage>> {
        let messages = self.messages.get(&channel).map(Vec::as_slice).unwrap_or_default();
        Ok(messages
            .iter()
            .filter(|message| before.map_or(true, |cursor| message.id < cursor))
            .take(usize::from(limit))
            .cloned()
            .collect())
    }

    async fn threads(&self, channel: &ChannelInfo) -> Result<Vec<SourceThread>> {
        *self.thread_listings.lock().unwrap() += 1;
        Ok(self.threads.get(&channel.id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub(crate) fn channel(id: u64, kind: u8, name: &str) -> ChannelInfo {
    serde_json::from_value(json!({
        "id": id.to_string(),
        "type": kind,
        "guild_id": "1",
        "name": name,
    }))
    .unwrap()
}

pub(crate) fn message(id: u64, kind: u8, author: &str, content: &str) -> SourceMessage {
    serde_json::from_value(json!({
        "id": id.to_string(),
        "type": kind,
        "content": content,
        "author": { "id": "10", "username": author },
    }))
    .unwrap()
}

pub(crate) fn thread(id: u64, parent: u64, name: &str) -> SourceThread {
    serde_json::from_value(json!({
        "id": id.to_string(),
        "name": name,
        "parent_id": parent.to_string(),
        "owner_id": "10",
    }))
    .unwrap()
}
