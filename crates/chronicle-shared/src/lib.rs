//! # chronicle-shared
//!
//! Types shared by every Chronicle crate: the flat [`record::EventRecord`]
//! that is written to archive files, the source-side platform models it is
//! encoded from, and the codec that moves between the two.

pub mod atlas;
pub mod codec;
pub mod components;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod record;
pub mod threads;
pub mod types;

pub use codec::{decode, encode};
pub use error::CodecError;
pub use record::{DecodedRecord, EventRecord, RecordKind, ThreadFlag, ThreadMarker};
pub use types::{EmojiRef, Identity, MessageHandle, Snowflake};
