/// Application name, also the default webhook name used during replay.
pub const APP_NAME: &str = "chronicle";

/// Default REST API base URL.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// CDN base used to build avatar and sticker URLs.
pub const CDN_BASE: &str = "https://cdn.discordapp.com";

/// Media proxy base used for sticker images.
pub const MEDIA_BASE: &str = "https://media.discordapp.net";

/// First millisecond of the snowflake epoch (2015-01-01T00:00:00Z).
pub const SNOWFLAKE_EPOCH_MS: u64 = 1_420_070_400_000;

/// Maximum number of characters in a single message body.
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Maximum number of files attached to a single delivery call.
pub const MAX_FILES_PER_MESSAGE: usize = 10;

/// Maximum number of action rows on a single message.
pub const MAX_ACTION_ROWS: usize = 5;

/// Maximum number of buttons inside one action row.
pub const MAX_BUTTONS_PER_ROW: usize = 5;

/// Upload limit for destinations below [`ELEVATED_PREMIUM_TIER`] (bytes).
pub const LOW_TIER_FILE_LIMIT: u64 = 8_000_000;

/// Attachments at or above this size are never uploaded (bytes).
pub const HARD_FILE_LIMIT: u64 = 50_000_000;

/// Premium tier from which the low-tier upload limit no longer applies.
pub const ELEVATED_PREMIUM_TIER: u8 = 2;

/// Page size for history requests.
pub const HISTORY_PAGE_SIZE: u8 = 100;

/// Message flag set on thread starter messages whose thread still exists.
pub const MESSAGE_FLAG_HAS_THREAD: u64 = 1 << 5;

/// Content written for thread markers that could not be associated.
pub const THREAD_PLACEHOLDER_TEXT: &str = "thread placeholder text";

/// Archive file extension.
pub const RECORD_FILE_EXT: &str = "csv";
