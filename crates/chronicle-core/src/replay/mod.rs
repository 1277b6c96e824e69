//! Replay of a record sequence into a destination channel.

mod context;
mod engine;
pub(crate) mod guard;
pub mod notices;
mod remap;
pub mod tiering;

pub use context::{RunContext, RunHandle, RunProgress};
pub use engine::{ImportRequest, RecordState, ReplayEngine, ReplayOutcome, ReplayTarget};
pub use remap::RemapTable;
