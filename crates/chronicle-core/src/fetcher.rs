//! Content fetcher: full channel history through a [`HistorySource`].

use std::pin::pin;

use chronicle_net::{HistorySource, NetError};
use chronicle_shared::constants::HISTORY_PAGE_SIZE;
use chronicle_shared::protocol::SourceMessage;
use chronicle_shared::Snowflake;
use futures::{stream, Stream, TryStreamExt};
use tracing::{debug, info};

/// History of one channel, newest first.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub events: Vec<SourceMessage>,
    /// Messages in the channel, archivable or not.
    pub total: usize,
    pub accepted: usize,
}

/// Stream every message of `channel`, newest first, one page at a time.
pub fn history(
    source: &dyn HistorySource,
    channel: Snowflake,
) -> impl Stream<Item = Result<SourceMessage, NetError>> + '_ {
    // `None` once the last page has been seen.
    let start: Option<Option<Snowflake>> = Some(None);
    stream::try_unfold(start, move |cursor| async move {
        let Some(before) = cursor else {
            return Ok::<_, NetError>(None);
        };
        let page = source.history_page(channel, before, HISTORY_PAGE_SIZE).await?;
        debug!(channel = %channel, before = ?before, size = page.len(), "history page");
        if page.is_empty() {
            return Ok(None);
        }
        let next = if page.len() < usize::from(HISTORY_PAGE_SIZE) {
            None
        } else {
            page.last().map(|message| Some(message.id))
        };
        Ok(Some((stream::iter(page.into_iter().map(Ok::<_, NetError>)), next)))
    })
    .try_flatten()
}

/// Number of messages in `channel`, counted with a separate pass.
pub async fn count_history(source: &dyn HistorySource, channel: Snowflake) -> Result<usize, NetError> {
    history(source, channel)
        .try_fold(0usize, |count, _| async move { Ok(count + 1) })
        .await
}

/// Fetch the archivable history of `channel`, newest first.
pub async fn fetch(source: &dyn HistorySource, channel: Snowflake) -> Result<FetchOutcome, NetError> {
    let mut messages = pin!(history(source, channel));
    let mut events = Vec::new();
    while let Some(message) = messages.try_next().await? {
        if message.message_kind().is_archivable() {
            events.push(message);
        } else {
            info!(message = %message.id, kind = message.kind, "skipping message of unsupported kind");
        }
    }

    let total = count_history(source, channel).await?;
    let accepted = events.len();
    info!(channel = %channel, total, accepted, "fetched history");
    Ok(FetchOutcome {
        events,
        total,
        accepted,
    })
}
