//! Forum atlas: the container description written next to per-thread
//! record files when a forum channel is exported.

use serde::{Deserialize, Serialize};

use crate::protocol::{ChannelInfo, ForumTag, SourceThread};
use crate::types::{EmojiRef, Snowflake};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDefinition {
    pub name: String,
    #[serde(default)]
    pub moderated: bool,
    /// Emoji as a literal or `<:name:id>`.
    #[serde(default)]
    pub emoji: Option<String>,
}

impl From<&ForumTag> for TagDefinition {
    fn from(tag: &ForumTag) -> Self {
        let emoji = match (tag.emoji_id, &tag.emoji_name) {
            (Some(id), name) => Some(
                EmojiRef::Custom {
                    name: name.clone().unwrap_or_else(|| "_".into()),
                    id,
                    animated: false,
                }
                .to_string(),
            ),
            (None, Some(name)) => Some(name.clone()),
            (None, None) => None,
        };
        Self {
            name: tag.name.clone(),
            moderated: tag.moderated,
            emoji,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumHeader {
    pub name: String,
    pub tags: Vec<TagDefinition>,
    pub default_reaction: Option<String>,
    pub topic: Option<String>,
}

impl ForumHeader {
    pub fn from_channel(channel: &ChannelInfo) -> Self {
        let default_reaction = channel.default_reaction_emoji.as_ref().and_then(|reaction| {
            match (reaction.emoji_id, &reaction.emoji_name) {
                (Some(id), name) => Some(
                    EmojiRef::Custom {
                        name: name.clone().unwrap_or_else(|| "_".into()),
                        id,
                        animated: false,
                    }
                    .to_string(),
                ),
                (None, Some(name)) => Some(name.clone()),
                (None, None) => None,
            }
        });
        Self {
            name: channel.display_name(),
            tags: channel.available_tags.iter().map(TagDefinition::from).collect(),
            default_reaction,
            topic: channel.topic.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadDescriptor {
    pub id: Snowflake,
    pub name: String,
    pub locked: bool,
    pub owner_name: String,
    pub applied_tags: Vec<String>,
}

impl ThreadDescriptor {
    /// Describe a thread, resolving applied tag ids against the forum tags.
    pub fn from_thread(thread: &SourceThread, forum: &ChannelInfo, owner_name: String) -> Self {
        let applied_tags = thread
            .applied_tags
            .iter()
            .filter_map(|tag_id| {
                forum
                    .available_tags
                    .iter()
                    .find(|tag| tag.id == Some(*tag_id))
                    .map(|tag| tag.name.clone())
            })
            .collect();
        Self {
            id: thread.id,
            name: thread.name.clone(),
            locked: thread.is_locked(),
            owner_name,
            applied_tags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumAtlas {
    pub header: ForumHeader,
    pub threads: Vec<ThreadDescriptor>,
}
