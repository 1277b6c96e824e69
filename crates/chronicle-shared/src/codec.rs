//! Record codec: source message -> [`EventRecord`] -> [`DecodedRecord`].

use serde_json::Value;
use tracing::warn;

use crate::components::{flatten_descriptors, Component};
use crate::constants::THREAD_PLACEHOLDER_TEXT;
use crate::protocol::{MessageKind, SourceMessage};
use crate::record::{DecodedRecord, EventRecord, Reaction, RecordKind, ThreadFlag, ThreadMarker};
use crate::threads::ThreadAssociation;
use crate::types::{EmojiRef, Identity};

/// Encode one source message.
///
/// `association` is only consulted for thread-creation markers; a marker
/// without an association is encoded as a missing thread.
pub fn encode(message: &SourceMessage, association: Option<&ThreadAssociation<'_>>) -> EventRecord {
    let author = &message.author;
    let mut record = EventRecord {
        author_name: author.display_name().to_string(),
        author_avatar: author.avatar_url(),
        content: message.content.clone(),
        embeds: Vec::new(),
        original_id: message.id,
        reply_to: None,
        command_name: None,
        command_user: None,
        reactions: Vec::new(),
        attachments: Vec::new(),
        stickers: Vec::new(),
        components: Vec::new(),
        pinned: false,
        thread_flag: ThreadFlag::None,
    };

    let kind = message.message_kind();
    if kind == MessageKind::ThreadCreated {
        let (content, flag) = match association {
            Some(ThreadAssociation::Unique(thread)) => {
                (thread.name.clone(), ThreadFlag::Thread(thread.id))
            }
            Some(ThreadAssociation::Ambiguous(_)) => {
                (THREAD_PLACEHOLDER_TEXT.to_string(), ThreadFlag::Ambiguous)
            }
            Some(ThreadAssociation::NotFound) | None => {
                (THREAD_PLACEHOLDER_TEXT.to_string(), ThreadFlag::Missing)
            }
        };
        record.content = content;
        record.thread_flag = flag;
        return record;
    }

    record.embeds = message
        .embeds
        .iter()
        .filter(|embed| embed.is_object())
        .cloned()
        .collect();

    record.reactions = message
        .reactions
        .iter()
        .filter_map(|reaction| {
            EmojiRef::from_api(&reaction.emoji).map(|emoji| (emoji.to_string(), reaction.count))
        })
        .collect();

    record.attachments = message.attachments.iter().map(|a| a.url.clone()).collect();
    record.stickers = message.sticker_items.iter().map(|s| s.url()).collect();

    record.components = message
        .components
        .iter()
        .filter_map(|raw| match Component::from_api(raw) {
            Ok(component) => Some(component.to_descriptor()),
            Err(e) => {
                warn!(message = %message.id, error = %e, "dropping component on export");
                None
            }
        })
        .collect();

    record.pinned = message.pinned;

    if let Some(target) = message.reply_target() {
        record.reply_to = Some(target);
    } else if matches!(
        kind,
        MessageKind::ChatInputCommand | MessageKind::ContextMenuCommand
    ) {
        if let Some(interaction) = &message.interaction {
            record.command_name = Some(interaction.name.clone());
            record.command_user = Some(interaction.user.display_name().to_string());
        }
    }

    record
}

/// Decode a record into replay instructions.
///
/// Sub-elements the codec cannot rebuild (non-object embeds, unknown
/// components, unparsable emoji) are skipped with a warning; the record
/// itself always decodes.
pub fn decode(record: &EventRecord) -> DecodedRecord {
    let kind = match record.thread_flag {
        ThreadFlag::Missing => RecordKind::ThreadEvent(ThreadMarker::Missing),
        ThreadFlag::Ambiguous => RecordKind::ThreadEvent(ThreadMarker::Ambiguous),
        ThreadFlag::Thread(id) => {
            RecordKind::ThreadEvent(ThreadMarker::Created { source_thread: id })
        }
        ThreadFlag::None => match (&record.reply_to, &record.command_name) {
            (Some(target), _) => RecordKind::Reply { target: *target },
            (None, Some(name)) => RecordKind::Command {
                name: name.clone(),
                user: record
                    .command_user
                    .clone()
                    .unwrap_or_else(|| record.author_name.clone()),
            },
            (None, None) => RecordKind::Plain,
        },
    };

    let embeds: Vec<Value> = record
        .embeds
        .iter()
        .filter(|embed| {
            let ok = embed.is_object();
            if !ok {
                warn!(record = %record.original_id, "skipping non-object embed");
            }
            ok
        })
        .cloned()
        .collect();

    let reactions = record
        .reactions
        .iter()
        .filter_map(|(emoji, count)| match emoji.parse::<EmojiRef>() {
            Ok(emoji) => Some(Reaction {
                emoji,
                count: *count,
            }),
            Err(e) => {
                warn!(record = %record.original_id, error = %e, "skipping reaction");
                None
            }
        })
        .collect();

    DecodedRecord {
        original_id: record.original_id,
        identity: Identity::new(record.author_name.clone(), record.author_avatar.clone()),
        content: record.content.clone(),
        embeds,
        kind,
        reactions,
        attachments: record.attachments.clone(),
        stickers: record.stickers.clone(),
        components: flatten_descriptors(&record.components),
        pinned: record.pinned,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::components::Component;
    use crate::protocol::SourceThread;
    use crate::types::Snowflake;

    fn message(raw: Value) -> SourceMessage {
        serde_json::from_value(raw).unwrap()
    }

    fn rich_message() -> SourceMessage {
        message(json!({
            "id": "1200000000000000000",
            "type": 0,
            "content": "release notes",
            "author": { "id": "10", "username": "ana", "avatar": "abc" },
            "embeds": [{ "title": "v1", "description": "shipped", "color": 3, "footer": { "text": "f" } }],
            "reactions": [
                { "count": 3, "emoji": { "id": null, "name": "🎉" } },
                { "count": 1, "emoji": { "id": "555", "name": "blob" } }
            ],
            "attachments": [{ "url": "https://cdn.example/a/b/notes.txt", "size": 10 }],
            "sticker_items": [{ "id": "77", "name": "wave", "format_type": 1 }],
            "components": [{
                "type": 1,
                "components": [{ "type": 2, "style": 1, "label": "Ack", "custom_id": "ack" }]
            }],
            "pinned": true
        }))
    }

    #[test]
    fn test_round_trip_preserves_content() {
        let source = rich_message();
        let decoded = decode(&encode(&source, None));

        assert_eq!(decoded.content, "release notes");
        assert_eq!(decoded.identity.name, "ana");
        assert_eq!(decoded.kind, RecordKind::Plain);
        assert!(decoded.pinned);
        assert_eq!(decoded.embeds[0]["title"], "v1");
        assert_eq!(decoded.reactions.len(), 2);
        assert_eq!(decoded.reactions[0].emoji, EmojiRef::Unicode("🎉".into()));
        assert_eq!(decoded.reactions[0].count, 3);
        assert_eq!(
            decoded.reactions[1].emoji,
            EmojiRef::Custom {
                name: "blob".into(),
                id: Snowflake(555),
                animated: false
            }
        );
        assert_eq!(decoded.attachments, vec!["https://cdn.example/a/b/notes.txt"]);
        assert_eq!(decoded.stickers.len(), 1);
        assert_eq!(decoded.components.len(), 1);
        assert!(matches!(decoded.components[0].component, Component::Button(_)));
    }

    #[test]
    fn test_reply_and_command_sentinels() {
        let reply = message(json!({
            "id": "1300000000000000000", "type": 19, "content": "yes",
            "author": { "id": "1", "username": "bo" },
            "message_reference": { "message_id": "1200000000000000000" }
        }));
        let record = encode(&reply, None);
        assert_eq!(record.reply_to, Some(Snowflake(1_200_000_000_000_000_000)));
        assert!(record.command_name.is_none());
        assert_eq!(
            decode(&record).kind,
            RecordKind::Reply {
                target: Snowflake(1_200_000_000_000_000_000)
            }
        );

        let command = message(json!({
            "id": "1400000000000000000", "type": 20, "content": "",
            "author": { "id": "2", "username": "bot" },
            "interaction": { "name": "roll", "user": { "id": "1", "username": "bo" } }
        }));
        let record = encode(&command, None);
        assert_eq!(record.reply_to, None);
        assert_eq!(
            decode(&record).kind,
            RecordKind::Command {
                name: "roll".into(),
                user: "bo".into()
            }
        );
    }

    #[test]
    fn test_thread_marker_encoding() {
        let marker = message(json!({
            "id": "1500000000000000000", "type": 18, "content": "ignored",
            "author": { "id": "1", "username": "bo" }
        }));
        let thread: SourceThread = serde_json::from_value(json!({
            "id": "1500000000000000001", "name": "design chat"
        }))
        .unwrap();

        let unique = ThreadAssociation::Unique(&thread);
        let record = encode(&marker, Some(&unique));
        assert_eq!(record.content, "design chat");
        assert_eq!(record.thread_flag, ThreadFlag::Thread(thread.id));
        assert_eq!(
            decode(&record).kind,
            RecordKind::ThreadEvent(ThreadMarker::Created {
                source_thread: thread.id
            })
        );

        let ambiguous = ThreadAssociation::Ambiguous(vec![thread.id, Snowflake(3)]);
        assert_eq!(encode(&marker, Some(&ambiguous)).thread_flag, ThreadFlag::Ambiguous);
        assert_eq!(encode(&marker, None).thread_flag, ThreadFlag::Missing);
        assert_eq!(encode(&marker, None).content, THREAD_PLACEHOLDER_TEXT);
    }

    #[test]
    fn test_decode_skips_bad_subelements() {
        let mut record = EventRecord::plain(1, "ana", "hi");
        record.embeds = vec![json!("not an object"), json!({ "title": "kept" })];
        record.reactions = vec![("<:x:notanumber>".into(), 2), ("👍".into(), 1)];
        record.components = vec![json!({ "type": 77 })];

        let decoded = decode(&record);
        assert_eq!(decoded.embeds.len(), 1);
        assert_eq!(decoded.reactions.len(), 1);
        assert!(decoded.components.is_empty());
    }
}
