use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::SNOWFLAKE_EPOCH_MS;
use crate::error::CodecError;

// Platform identifier: a 64-bit snowflake, carried as a decimal string in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Snowflake(pub u64);

impl Snowflake {
    /// Creation time embedded in the upper 42 bits.
    pub fn created_at(&self) -> DateTime<Utc> {
        let millis = (self.0 >> 22) + SNOWFLAKE_EPOCH_MS;
        Utc.timestamp_millis_opt(millis as i64)
            .single()
            .unwrap_or_default()
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Snowflake {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Snowflake)
            .map_err(|_| CodecError::InvalidSnowflake(s.to_string()))
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SnowflakeVisitor;

        impl de::Visitor<'_> for SnowflakeVisitor {
            type Value = Snowflake;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a snowflake as a decimal string or integer")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Snowflake, E> {
                Ok(Snowflake(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Snowflake, E> {
                u64::try_from(v)
                    .map(Snowflake)
                    .map_err(|_| E::custom("negative snowflake"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Snowflake, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(SnowflakeVisitor)
    }
}

/// The appearance a replayed message is delivered under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub avatar_url: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, avatar_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            avatar_url: avatar_url.into(),
        }
    }
}

/// A message created in the destination channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub id: Snowflake,
    pub channel_id: Snowflake,
}

/// A reaction emoji, either a plain unicode symbol or a custom guild emoji.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EmojiRef {
    Unicode(String),
    Custom {
        name: String,
        id: Snowflake,
        animated: bool,
    },
}

impl EmojiRef {
    /// Build from an API emoji object (`{"id": .., "name": .., "animated": ..}`).
    pub fn from_api(value: &serde_json::Value) -> Option<Self> {
        let name = value.get("name").and_then(serde_json::Value::as_str);
        let id = value
            .get("id")
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value::<Snowflake>(v.clone()).ok());
        let animated = value
            .get("animated")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        match (id, name) {
            (Some(id), name) => Some(Self::Custom {
                name: name.unwrap_or("_").to_string(),
                id,
                animated,
            }),
            (None, Some(name)) if !name.is_empty() => Some(Self::Unicode(name.to_string())),
            _ => None,
        }
    }

    /// Shape accepted by the API when sending components or forum settings.
    pub fn to_api(&self) -> serde_json::Value {
        match self {
            Self::Unicode(symbol) => serde_json::json!({ "name": symbol }),
            Self::Custom { name, id, animated } => serde_json::json!({
                "id": id.to_string(),
                "name": name,
                "animated": animated,
            }),
        }
    }
}

impl fmt::Display for EmojiRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unicode(symbol) => f.write_str(symbol),
            Self::Custom {
                name,
                id,
                animated: true,
            } => write!(f, "<a:{name}:{id}>"),
            Self::Custom { name, id, .. } => write!(f, "<:{name}:{id}>"),
        }
    }
}

impl FromStr for EmojiRef {
    type Err = CodecError;

    /// Accepts `👍`, `<:name:id>`, `<a:name:id>` and bare `name:id`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CodecError::Unsupported("empty emoji".into()));
        }
        if !trimmed.contains(':') {
            return Ok(Self::Unicode(trimmed.to_string()));
        }

        let inner = trimmed
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap_or(trimmed);
        let parts: Vec<&str> = inner.split(':').collect();

        let (animated, name, id) = match parts.as_slice() {
            [name, id] => (false, *name, *id),
            ["", name, id] => (false, *name, *id),
            ["a", name, id] => (true, *name, *id),
            _ => return Err(CodecError::Unsupported(format!("emoji `{trimmed}`"))),
        };

        let id = id
            .parse::<u64>()
            .map_err(|_| CodecError::Unsupported(format!("emoji `{trimmed}`")))?;

        Ok(Self::Custom {
            name: name.to_string(),
            id: Snowflake(id),
            animated,
        })
    }
}
