//! Discord implementation of the collaborator traits.

use async_trait::async_trait;
use chronicle_shared::atlas::{ForumHeader, TagDefinition};
use chronicle_shared::protocol::{ChannelInfo, SourceMessage, SourceThread, CHANNEL_KIND_FORUM};
use chronicle_shared::{EmojiRef, MessageHandle, Snowflake};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::client::{ApiClient, Auth};
use crate::destination::{sanitize_username, DeliveryRequest, Destination, WebhookHandle};
use crate::error::{NetError, Result};
use crate::pacing::DeliveryPacer;
use crate::source::{filename_from_url, AttachmentSource, FileUpload, HistorySource};

const THREAD_CREATED_KIND: u8 = 18;
const PUBLIC_THREAD_KIND: u8 = 11;
/// How far back the placeholder search looks after creating a thread.
const PLACEHOLDER_SEARCH_LIMIT: u8 = 20;

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: Snowflake,
    channel_id: Snowflake,
}

#[derive(Debug, Deserialize)]
struct CreatedWebhook {
    id: Snowflake,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GuildInfo {
    #[serde(default)]
    premium_tier: u8,
}

#[derive(Debug, Deserialize)]
struct ThreadList {
    threads: Vec<SourceThread>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedChannel {
    id: Snowflake,
}

/// REST-backed source and destination.
#[derive(Clone)]
pub struct DiscordClient {
    api: ApiClient,
    pacer: DeliveryPacer,
    webhook_name: String,
}

impl DiscordClient {
    pub fn new(api: ApiClient, pacer: DeliveryPacer, webhook_name: impl Into<String>) -> Self {
        Self {
            api,
            pacer,
            webhook_name: webhook_name.into(),
        }
    }

    async fn archived_threads(&self, channel: Snowflake, scope: &str) -> Result<Vec<SourceThread>> {
        let mut threads = Vec::new();
        let mut before: Option<String> = None;
        loop {
            let mut path = format!("channels/{channel}/threads/archived/{scope}?limit=100");
            if let Some(before) = &before {
                path.push_str(&format!("&before={before}"));
            }
            let page: ThreadList = self.api.get_json("list archived threads", &path).await?;
            before = page
                .threads
                .last()
                .and_then(|t| t.thread_metadata.as_ref())
                .and_then(|m| m.archive_timestamp)
                .map(|ts| ts.to_rfc3339());
            let done = !page.has_more || page.threads.is_empty() || before.is_none();
            threads.extend(page.threads);
            if done {
                return Ok(threads);
            }
        }
    }

    async fn deliver(
        &self,
        context: &'static str,
        auth: Auth,
        url: String,
        payload: Value,
        files: &[FileUpload],
    ) -> Result<MessageHandle> {
        let response = if files.is_empty() {
            self.api
                .execute(context, auth, |http| http.post(&url).json(&payload))
                .await?
        } else {
            let payload_json = serde_json::to_string(&payload)?;
            self.api
                .execute(context, auth, |http| {
                    http.post(&url).multipart(multipart_form(&payload_json, files))
                })
                .await?
        };
        let created: CreatedMessage = response.json().await?;
        Ok(MessageHandle {
            id: created.id,
            channel_id: created.channel_id,
        })
    }
}

fn multipart_form(payload_json: &str, files: &[FileUpload]) -> Form {
    let mut form = Form::new().text("payload_json", payload_json.to_string());
    for (index, file) in files.iter().enumerate() {
        let part = Part::bytes(file.data.to_vec()).file_name(file.filename.clone());
        form = form.part(format!("files[{index}]"), part);
    }
    form
}

/// JSON body shared by webhook executions and bot messages.
fn message_payload(request: &DeliveryRequest) -> Map<String, Value> {
    let mut payload = Map::new();
    if let Some(content) = &request.content {
        payload.insert("content".into(), json!(content));
    }
    if !request.embeds.is_empty() {
        payload.insert("embeds".into(), json!(request.embeds));
    }
    if !request.components.is_empty() {
        payload.insert("components".into(), json!(request.components));
    }
    if !request.files.is_empty() {
        let attachments: Vec<Value> = request
            .files
            .iter()
            .enumerate()
            .map(|(id, file)| json!({ "id": id, "filename": file.filename }))
            .collect();
        payload.insert("attachments".into(), json!(attachments));
    }
    payload.insert("allowed_mentions".into(), json!({ "parse": [] }));
    payload
}

fn tag_payload(tag: &TagDefinition) -> Value {
    let mut value = json!({ "name": tag.name, "moderated": tag.moderated });
    if let Some(emoji) = tag.emoji.as_deref().and_then(|e| e.parse::<EmojiRef>().ok()) {
        value["emoji_id"] = emoji_id(&emoji);
        value["emoji_name"] = emoji_name(&emoji);
    }
    value
}

fn emoji_id(emoji: &EmojiRef) -> Value {
    match emoji {
        EmojiRef::Custom { id, .. } => json!(id.to_string()),
        EmojiRef::Unicode(_) => Value::Null,
    }
}

fn emoji_name(emoji: &EmojiRef) -> Value {
    match emoji {
        EmojiRef::Custom { .. } => Value::Null,
        EmojiRef::Unicode(symbol) => json!(symbol),
    }
}

#[async_trait]
impl HistorySource for DiscordClient {
    async fn channel(&self, id: Snowflake) -> Result<ChannelInfo> {
        self.api.get_json("get channel", &format!("channels/{id}")).await
    }

    async fn history_page(
        &self,
        channel: Snowflake,
        before: Option<Snowflake>,
        limit: u8,
    ) -> Result<Vec<SourceMessage>> {
        let mut path = format!("channels/{channel}/messages?limit={limit}");
        if let Some(before) = before {
            path.push_str(&format!("&before={before}"));
        }
        self.api.get_json("get history page", &path).await
    }

    async fn threads(&self, channel: &ChannelInfo) -> Result<Vec<SourceThread>> {
        let mut threads = Vec::new();

        if let Some(guild) = channel.guild_id {
            let active: ThreadList = self
                .api
                .get_json("list active threads", &format!("guilds/{guild}/threads/active"))
                .await?;
            threads.extend(
                active
                    .threads
                    .into_iter()
                    .filter(|t| t.parent_id == Some(channel.id)),
            );
        }

        threads.extend(self.archived_threads(channel.id, "public").await?);
        if !channel.is_forum() {
            match self.archived_threads(channel.id, "private").await {
                Ok(private) => threads.extend(private),
                Err(e) => warn!(channel = %channel.id, error = %e, "cannot list private archived threads"),
            }
        }

        threads.sort_by_key(|t| t.id);
        threads.dedup_by_key(|t| t.id);
        debug!(channel = %channel.id, count = threads.len(), "listed threads");
        Ok(threads)
    }
}

#[async_trait]
impl AttachmentSource for DiscordClient {
    async fn fetch(&self, url: &str) -> Result<FileUpload> {
        let response = self
            .api
            .execute("download attachment", Auth::None, |http| http.get(url))
            .await?;
        let data = response.bytes().await?;
        debug!(url, size = data.len(), "downloaded attachment");
        Ok(FileUpload::new(filename_from_url(url), data))
    }
}

#[async_trait]
impl Destination for DiscordClient {
    async fn premium_tier(&self, channel: Snowflake) -> Result<u8> {
        let info = HistorySource::channel(self, channel).await?;
        let guild = info
            .guild_id
            .ok_or_else(|| NetError::Unexpected(format!("channel {channel} has no guild")))?;
        let guild: GuildInfo = self.api.get_json("get guild", &format!("guilds/{guild}")).await?;
        Ok(guild.premium_tier)
    }

    async fn open_identity(&self, channel: Snowflake) -> Result<WebhookHandle> {
        let created: CreatedWebhook = self
            .api
            .send_json(
                "create webhook",
                Method::POST,
                &format!("channels/{channel}/webhooks"),
                &json!({ "name": self.webhook_name }),
            )
            .await?;
        let token = created
            .token
            .ok_or_else(|| NetError::Unexpected("webhook created without a token".into()))?;
        info!(channel = %channel, webhook = %created.id, "opened delivery webhook");
        Ok(WebhookHandle {
            id: created.id,
            token,
            channel_id: channel,
        })
    }

    async fn close_identity(&self, webhook: &WebhookHandle) -> Result<()> {
        self.pacer.forget(webhook.id).await;
        self.api
            .send_empty(
                "delete webhook",
                Method::DELETE,
                &format!("webhooks/{}", webhook.id),
                None,
            )
            .await?;
        info!(webhook = %webhook.id, "closed delivery webhook");
        Ok(())
    }

    async fn send(&self, webhook: &WebhookHandle, request: DeliveryRequest) -> Result<MessageHandle> {
        self.pacer.acquire(webhook.id).await;

        let mut payload = message_payload(&request);
        if let Some(identity) = &request.identity {
            payload.insert("username".into(), json!(sanitize_username(&identity.name)));
            if !identity.avatar_url.is_empty() {
                payload.insert("avatar_url".into(), json!(identity.avatar_url));
            }
        }

        let mut url = self.api.url(&format!(
            "webhooks/{}/{}?wait=true",
            webhook.id, webhook.token
        ));
        if let Some(thread) = request.thread {
            url.push_str(&format!("&thread_id={thread}"));
        }
        if !request.components.is_empty() {
            url.push_str("&with_components=true");
        }

        self.deliver("execute webhook", Auth::None, url, Value::Object(payload), &request.files)
            .await
    }

    async fn reply(&self, target: &MessageHandle, request: DeliveryRequest) -> Result<MessageHandle> {
        let mut payload = message_payload(&request);
        payload.insert(
            "message_reference".into(),
            json!({
                "message_id": target.id.to_string(),
                "channel_id": target.channel_id.to_string(),
                "fail_if_not_exists": false,
            }),
        );
        payload.insert(
            "allowed_mentions".into(),
            json!({ "parse": [], "replied_user": false }),
        );
        let url = self
            .api
            .url(&format!("channels/{}/messages", target.channel_id));
        self.deliver("send reply", Auth::Bot, url, Value::Object(payload), &request.files)
            .await
    }

    async fn pin(&self, message: &MessageHandle) -> Result<()> {
        self.api
            .send_empty(
                "pin message",
                Method::PUT,
                &format!("channels/{}/pins/{}", message.channel_id, message.id),
                None,
            )
            .await
    }

    async fn create_thread(&self, channel: Snowflake, name: &str) -> Result<Snowflake> {
        let created: CreatedChannel = self
            .api
            .send_json(
                "create thread",
                Method::POST,
                &format!("channels/{channel}/threads"),
                &json!({ "name": thread_name(name), "type": PUBLIC_THREAD_KIND }),
            )
            .await?;
        Ok(created.id)
    }

    async fn delete_thread_placeholder(&self, channel: Snowflake, thread: Snowflake) -> Result<bool> {
        let recent = self
            .history_page(channel, None, PLACEHOLDER_SEARCH_LIMIT)
            .await?;
        let placeholder = recent.iter().find(|message| {
            message.kind == THREAD_CREATED_KIND
                && message
                    .message_reference
                    .as_ref()
                    .and_then(|r| r.channel_id)
                    == Some(thread)
        });
        let Some(placeholder) = placeholder else {
            return Ok(false);
        };
        self.api
            .send_empty(
                "delete placeholder",
                Method::DELETE,
                &format!("channels/{channel}/messages/{}", placeholder.id),
                None,
            )
            .await?;
        Ok(true)
    }

    async fn create_forum(
        &self,
        guild: Snowflake,
        parent: Option<Snowflake>,
        header: &ForumHeader,
    ) -> Result<ChannelInfo> {
        let mut body = json!({
            "name": header.name,
            "type": CHANNEL_KIND_FORUM,
            "available_tags": header.tags.iter().map(tag_payload).collect::<Vec<_>>(),
        });
        if let Some(topic) = &header.topic {
            body["topic"] = json!(topic);
        }
        if let Some(parent) = parent {
            body["parent_id"] = json!(parent.to_string());
        }
        if let Some(emoji) = header
            .default_reaction
            .as_deref()
            .and_then(|e| e.parse::<EmojiRef>().ok())
        {
            body["default_reaction_emoji"] =
                json!({ "emoji_id": emoji_id(&emoji), "emoji_name": emoji_name(&emoji) });
        }
        let forum: ChannelInfo = self
            .api
            .send_json("create forum", Method::POST, &format!("guilds/{guild}/channels"), &body)
            .await?;
        info!(guild = %guild, forum = %forum.id, "created forum");
        Ok(forum)
    }

    async fn create_forum_post(
        &self,
        forum: Snowflake,
        name: &str,
        applied_tags: &[Snowflake],
        opening: &str,
    ) -> Result<Snowflake> {
        let body = json!({
            "name": thread_name(name),
            "applied_tags": applied_tags.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
            "message": { "content": opening, "allowed_mentions": { "parse": [] } },
        });
        let created: CreatedChannel = self
            .api
            .send_json("create forum post", Method::POST, &format!("channels/{forum}/threads"), &body)
            .await?;
        Ok(created.id)
    }

    async fn lock_thread(&self, thread: Snowflake) -> Result<()> {
        let _: Value = self
            .api
            .send_json(
                "lock thread",
                Method::PATCH,
                &format!("channels/{thread}"),
                &json!({ "locked": true }),
            )
            .await?;
        Ok(())
    }
}

/// Thread names are 1 to 100 characters.
fn thread_name(name: &str) -> String {
    let trimmed: String = name.trim().chars().take(100).collect();
    if trimmed.is_empty() {
        "thread".to_string()
    } else {
        trimmed
    }
}
