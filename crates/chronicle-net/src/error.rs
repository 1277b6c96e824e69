use thiserror::Error;

/// Errors produced while talking to the platform.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response; `body` is a short preview.
    #[error("{context} failed: status={status} body={body}")]
    Status {
        context: &'static str,
        status: u16,
        body: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{context} still rate limited after {attempts} attempts")]
    RateLimited {
        context: &'static str,
        attempts: u32,
    },

    #[error("Unexpected response: {0}")]
    Unexpected(String),
}

impl NetError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

pub type Result<T> = std::result::Result<T, NetError>;
