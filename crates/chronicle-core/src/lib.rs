//! # chronicle-core
//!
//! The export and import pipelines.
//!
//! Export pulls a channel's history through a [`HistorySource`], encodes it
//! oldest first and writes it to a [`RecordStore`]. Import reads it back and
//! hands it to the [`ReplayEngine`], which reconstructs every record in the
//! destination through a [`Destination`] while checkpointing progress.
//!
//! [`HistorySource`]: chronicle_net::HistorySource
//! [`Destination`]: chronicle_net::Destination
//! [`RecordStore`]: chronicle_store::RecordStore

pub mod error;
pub mod export;
pub mod fetcher;
pub mod forum;
pub mod replay;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ExportError, ReplayError};
pub use export::{export_channel, export_forum, ExportSummary, ForumExportSummary};
pub use fetcher::{fetch, FetchOutcome};
pub use forum::{import_forum, ForumImportOutcome, StoppedThread};
pub use replay::{ImportRequest, ReplayEngine, ReplayOutcome, ReplayTarget, RunContext, RunHandle, RunProgress};
