//! Shared wire and domain types for the clawrelay workspace.
//!
//! This crate defines the vocabulary every other crate speaks: identifier
//! newtypes, the pairing/message state enums, the in-chat command sum, the
//! tenant-facing API DTOs, the chat-platform payload and response templates,
//! and the tenant-facing error taxonomy with its HTTP mapping.
//!
//! It deliberately has no I/O dependencies; storage and transport crates
//! convert to and from these types at their edges.

pub mod api;
pub mod error;
pub mod ids;
pub mod platform;
pub mod types;

pub use api::*;
pub use error::{ErrorBody, ErrorCode};
pub use ids::{CodeId, ConversationKey, MessageId, OutboundId, TenantId};
pub use types::{Command, MessageStatus, OutboundStatus, PairingState, SessionKind, TenantMode};
