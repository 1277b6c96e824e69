//! # chronicle-net
//!
//! Platform access for Chronicle: the REST client, per-webhook delivery
//! pacing, and the collaborator traits the export and replay pipelines are
//! written against ([`HistorySource`], [`AttachmentSource`],
//! [`Destination`]) together with their Discord implementation.

pub mod client;
pub mod destination;
pub mod discord;
pub mod error;
pub mod pacing;
pub mod source;

pub use client::ApiClient;
pub use destination::{split_content, DeliveryRequest, Destination, WebhookHandle};
pub use discord::DiscordClient;
pub use error::{NetError, Result};
pub use pacing::DeliveryPacer;
pub use source::{AttachmentSource, FileUpload, HistorySource};
