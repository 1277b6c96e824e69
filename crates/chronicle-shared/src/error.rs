use thiserror::Error;

/// Errors produced while encoding or decoding records.
///
/// `Unsupported` is non-fatal: callers skip the offending sub-element
/// (a component, an embed, a reaction) and keep the rest of the record.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unsupported content: {0}")]
    Unsupported(String),

    #[error("Malformed record field `{field}`: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("Invalid snowflake: {0}")]
    InvalidSnowflake(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;
