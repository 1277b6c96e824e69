//! Row encoding of [`EventRecord`]s.
//!
//! Fields are written in the fixed archive column order. List and object
//! columns hold JSON text and are parsed back strictly against the known
//! shape; anything else is reported as [`CodecError::Malformed`].

use chronicle_shared::error::CodecError;
use chronicle_shared::{EventRecord, Snowflake, ThreadFlag};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Number of columns in a record row.
pub const RECORD_COLUMNS: usize = 14;

const NONE_SENTINEL: &str = "0";

pub fn to_row(record: &EventRecord) -> Result<Vec<String>, CodecError> {
    Ok(vec![
        record.author_name.clone(),
        record.author_avatar.clone(),
        record.content.clone(),
        json_column(&record.embeds)?,
        record.original_id.to_string(),
        record
            .reply_to
            .map(|id| id.to_string())
            .unwrap_or_else(|| NONE_SENTINEL.into()),
        text_or_sentinel(&record.command_name),
        text_or_sentinel(&record.command_user),
        json_column(&record.reactions)?,
        json_column(&record.attachments)?,
        json_column(&record.stickers)?,
        json_column(&record.components)?,
        if record.pinned { "1" } else { "0" }.to_string(),
        record.thread_flag.to_column().to_string(),
    ])
}

pub fn from_row(row: &csv::StringRecord) -> Result<EventRecord, CodecError> {
    if row.len() != RECORD_COLUMNS {
        return Err(CodecError::Malformed {
            field: "row",
            reason: format!("expected {RECORD_COLUMNS} columns, found {}", row.len()),
        });
    }
    let col = |i: usize| row.get(i).unwrap_or_default();

    let embeds: Vec<Value> = parse_json("embeds", col(3))?;
    if embeds.iter().any(|embed| !embed.is_object()) {
        return Err(CodecError::Malformed {
            field: "embeds",
            reason: "every embed must be an object".into(),
        });
    }

    Ok(EventRecord {
        author_name: col(0).to_string(),
        author_avatar: col(1).to_string(),
        content: col(2).to_string(),
        embeds,
        original_id: parse_id("original_id", col(4))?,
        reply_to: match col(5).trim() {
            NONE_SENTINEL | "" => None,
            raw => Some(parse_id("reply_to", raw)?),
        },
        command_name: sentinel_text(col(6)),
        command_user: sentinel_text(col(7)),
        reactions: parse_json("reactions", col(8))?,
        attachments: parse_json("attachments", col(9))?,
        stickers: parse_json("stickers", col(10))?,
        components: parse_json("components", col(11))?,
        pinned: match col(12).trim() {
            "0" => false,
            "1" => true,
            other => {
                return Err(CodecError::Malformed {
                    field: "pinned",
                    reason: format!("expected 0 or 1, found {other:?}"),
                })
            }
        },
        thread_flag: col(13)
            .trim()
            .parse::<u64>()
            .map(ThreadFlag::from_column)
            .map_err(|e| CodecError::Malformed {
                field: "thread_flag",
                reason: e.to_string(),
            })?,
    })
}

fn json_column<T: Serialize>(value: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(value)?)
}

fn parse_json<T: DeserializeOwned>(field: &'static str, raw: &str) -> Result<T, CodecError> {
    serde_json::from_str(raw).map_err(|e| CodecError::Malformed {
        field,
        reason: e.to_string(),
    })
}

fn parse_id(field: &'static str, raw: &str) -> Result<Snowflake, CodecError> {
    raw.parse().map_err(|_| CodecError::Malformed {
        field,
        reason: format!("not a snowflake: {raw:?}"),
    })
}

fn text_or_sentinel(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| NONE_SENTINEL.into())
}

fn sentinel_text(raw: &str) -> Option<String> {
    (raw != NONE_SENTINEL && !raw.is_empty()).then(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(fields: &[&str]) -> csv::StringRecord {
        csv::StringRecord::from(fields.to_vec())
    }

    #[test]
    fn test_row_sentinels() {
        let record = EventRecord::plain(42, "ana", "hello, \"world\"");
        let fields = to_row(&record).unwrap();
        assert_eq!(fields.len(), RECORD_COLUMNS);
        assert_eq!(fields[5], "0");
        assert_eq!(fields[6], "0");
        assert_eq!(fields[7], "0");
        assert_eq!(fields[13], "0");

        let parsed = from_row(&csv::StringRecord::from(fields)).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_rich_row() {
        let mut record = EventRecord::plain(7, "bo", "look");
        record.embeds = vec![json!({ "title": "t" })];
        record.reply_to = Some(Snowflake(5));
        record.reactions = vec![("<:blob:9>".into(), 4)];
        record.attachments = vec!["https://cdn.example/x.png".into()];
        record.components = vec![json!({ "type": 1, "children": [] })];
        record.pinned = true;

        let parsed = from_row(&csv::StringRecord::from(to_row(&record).unwrap())).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_literal_that_is_not_json_is_rejected() {
        let fields = [
            "ana", "", "hi", "[]", "1", "0", "0", "0",
            "[('👍', 1)]", "[]", "[]", "[]", "0", "0",
        ];
        let err = from_row(&row(&fields)).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { field: "reactions", .. }));
    }

    #[test]
    fn test_wrong_column_count() {
        let err = from_row(&row(&["ana", "", "hi"])).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { field: "row", .. }));
    }

    #[test]
    fn test_bad_pin_flag() {
        let fields = [
            "ana", "", "hi", "[]", "1", "0", "0", "0", "[]", "[]", "[]", "[]", "yes", "0",
        ];
        assert!(from_row(&row(&fields)).is_err());
    }
}
