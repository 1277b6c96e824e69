//! Read-side collaborator traits.

use async_trait::async_trait;
use bytes::Bytes;
use chronicle_shared::protocol::{ChannelInfo, SourceMessage, SourceThread};
use chronicle_shared::Snowflake;

use crate::error::Result;

/// A file ready to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub filename: String,
    pub data: Bytes,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Paged access to a channel's history and its sub-threads.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn channel(&self, id: Snowflake) -> Result<ChannelInfo>;

    /// One page of history, newest first, strictly older than `before`.
    async fn history_page(
        &self,
        channel: Snowflake,
        before: Option<Snowflake>,
        limit: u8,
    ) -> Result<Vec<SourceMessage>>;

    /// Every sub-thread of `channel`, active and archived.
    async fn threads(&self, channel: &ChannelInfo) -> Result<Vec<SourceThread>>;
}

/// Download of attachment and sticker bytes by URL.
#[async_trait]
pub trait AttachmentSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FileUpload>;
}

/// File name from the last path segment of a URL, without the query string.
pub fn filename_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .filter(|segment| !segment.contains(':'))
        .unwrap_or("file")
        .to_string()
}
