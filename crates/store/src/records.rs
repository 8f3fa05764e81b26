//! Persistent record shapes and insert parameter structs.

use chrono::{DateTime, Utc};
use relay_proto::{
	CodeId, MessageId, MessageStatus, OutboundId, OutboundStatus, PairingState, SessionKind,
	TenantId, TenantMode,
};
use serde_json::Value;
use uuid::Uuid;

/// A tenant row.
#[derive(Debug, Clone)]
pub struct TenantRecord {
	/// Identifier.
	pub id: TenantId,
	/// Operator-facing label.
	pub name: String,
	/// SHA-256 hex of the bearer token. Unique; the token itself is never stored.
	pub token_hash: String,
	/// Operating mode.
	pub mode: TenantMode,
	/// Requests allowed per 60-second window.
	pub rate_limit_per_min: u32,
	/// Set when an admin disabled the tenant.
	pub disabled_at: Option<DateTime<Utc>>,
	/// Creation instant.
	pub created_at: DateTime<Utc>,
}

impl TenantRecord {
	/// Whether the tenant may authenticate.
	#[must_use]
	pub fn is_enabled(&self) -> bool {
		self.disabled_at.is_none()
	}
}

/// Parameters for creating a tenant.
#[derive(Debug, Clone)]
pub struct NewTenant {
	/// Operator-facing label.
	pub name: String,
	/// SHA-256 hex of the freshly generated bearer token.
	pub token_hash: String,
	/// Operating mode.
	pub mode: TenantMode,
	/// Requests allowed per 60-second window.
	pub rate_limit_per_min: u32,
}

/// A conversation row.
#[derive(Debug, Clone)]
pub struct ConversationRecord {
	/// Channel part of the key.
	pub channel_id: String,
	/// User part of the key.
	pub user_key: String,
	/// Joined key, unique.
	pub conversation_key: String,
	/// Pairing state.
	pub state: PairingState,
	/// Owning tenant; non-null iff state is PAIRED.
	pub tenant_id: Option<TenantId>,
	/// Most recent callback URL seen for this conversation.
	pub callback_url: Option<String>,
	/// Expiry of the most recent callback URL.
	pub callback_expires_at: Option<DateTime<Utc>>,
	/// First inbound event instant.
	pub first_seen_at: DateTime<Utc>,
	/// Most recent inbound event instant.
	pub last_seen_at: DateTime<Utc>,
	/// Set on the first successful redemption, updated on replacement.
	pub paired_at: Option<DateTime<Utc>>,
}

/// An inbound message row.
#[derive(Debug, Clone)]
pub struct InboundMessageRecord {
	/// Identifier.
	pub id: MessageId,
	/// Monotonic insertion sequence; tie-breaker for `created_at` ordering.
	pub seq: i64,
	/// Owning tenant.
	pub tenant_id: TenantId,
	/// Joined conversation key.
	pub conversation_key: String,
	/// Raw platform payload as received.
	pub raw_payload: Value,
	/// Denormalized view handed to the tenant.
	pub payload: Value,
	/// Callback URL captured at ingress.
	pub callback_url: Option<String>,
	/// Callback expiry captured at ingress.
	pub callback_expires_at: Option<DateTime<Utc>>,
	/// Lifecycle status.
	pub status: MessageStatus,
	/// Idempotency anchor; globally unique when set.
	pub source_event_id: Option<String>,
	/// Enqueue instant.
	pub created_at: DateTime<Utc>,
	/// Lease instant.
	pub delivered_at: Option<DateTime<Utc>>,
	/// Acknowledgement instant.
	pub acked_at: Option<DateTime<Utc>>,
}

/// Parameters for enqueueing an inbound message.
#[derive(Debug, Clone)]
pub struct NewInbound {
	/// Owning tenant.
	pub tenant_id: TenantId,
	/// Joined conversation key.
	pub conversation_key: String,
	/// Raw platform payload.
	pub raw_payload: Value,
	/// Denormalized view for the tenant.
	pub payload: Value,
	/// Callback URL, when the platform supplied one.
	pub callback_url: Option<String>,
	/// Callback expiry, when a URL was supplied.
	pub callback_expires_at: Option<DateTime<Utc>>,
	/// Idempotency anchor.
	pub source_event_id: Option<String>,
}

/// Result of an enqueue: either a fresh row or the prior row for the same
/// source event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
	/// A new row was inserted.
	Inserted(MessageId),
	/// A row with this source event id already existed.
	Duplicate(MessageId),
}

impl EnqueueOutcome {
	/// The id either way.
	#[must_use]
	pub fn id(self) -> MessageId {
		match self {
			Self::Inserted(id) | Self::Duplicate(id) => id,
		}
	}
}

/// An outbound reply row.
#[derive(Debug, Clone)]
pub struct OutboundMessageRecord {
	/// Identifier.
	pub id: OutboundId,
	/// Sending tenant.
	pub tenant_id: TenantId,
	/// The inbound message answered, when known.
	pub inbound_id: Option<MessageId>,
	/// Joined conversation key.
	pub conversation_key: String,
	/// Callback body as posted.
	pub response: Value,
	/// Delivery status.
	pub status: OutboundStatus,
	/// Error text when status is FAILED.
	pub error: Option<String>,
	/// Creation instant.
	pub created_at: DateTime<Utc>,
	/// Instant of the 2xx, when status is SENT.
	pub sent_at: Option<DateTime<Utc>>,
}

/// Parameters for recording an outbound reply.
#[derive(Debug, Clone)]
pub struct NewOutbound {
	/// Sending tenant.
	pub tenant_id: TenantId,
	/// The inbound message answered.
	pub inbound_id: Option<MessageId>,
	/// Joined conversation key.
	pub conversation_key: String,
	/// Callback body to post.
	pub response: Value,
}

/// A pairing code row.
#[derive(Debug, Clone)]
pub struct PairingCodeRecord {
	/// Identifier.
	pub id: CodeId,
	/// Issuing tenant.
	pub tenant_id: TenantId,
	/// The `XXXX-XXXX` code, unique.
	pub code: String,
	/// Expiry instant.
	pub expires_at: DateTime<Utc>,
	/// Redemption instant; NULL while the code is live.
	pub used_at: Option<DateTime<Utc>>,
	/// Conversation key that redeemed the code.
	pub used_by: Option<String>,
	/// Free-form operator metadata.
	pub metadata: Option<Value>,
	/// Creation instant.
	pub created_at: DateTime<Utc>,
}

impl PairingCodeRecord {
	/// Whether the code can still be redeemed at `now`.
	#[must_use]
	pub fn is_active(&self, now: DateTime<Utc>) -> bool {
		self.used_at.is_none() && self.expires_at > now
	}
}

/// Parameters for inserting a pairing code.
#[derive(Debug, Clone)]
pub struct NewCode {
	/// Issuing tenant.
	pub tenant_id: TenantId,
	/// The drawn code.
	pub code: String,
	/// Expiry instant.
	pub expires_at: DateTime<Utc>,
	/// Free-form operator metadata.
	pub metadata: Option<Value>,
}

/// Result of a capped, collision-checked code insert.
#[derive(Debug, Clone)]
pub enum CodeInsert {
	/// The code was inserted.
	Inserted(PairingCodeRecord),
	/// Another live code already uses this text; redraw.
	DuplicateCode,
	/// The tenant already holds the maximum number of active codes.
	CapReached,
}

/// Result of an atomic redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemOutcome {
	/// Code consumed; conversation is now paired to this tenant.
	Redeemed(TenantId),
	/// Code unknown or already used.
	Invalid,
	/// Code exists and is unused, but its TTL lapsed.
	Expired,
}

/// A session row (admin / portal / tenant).
#[derive(Debug, Clone)]
pub struct SessionRecord {
	/// Identifier.
	pub id: Uuid,
	/// Session kind.
	pub kind: SessionKind,
	/// SHA-256 hex of the session token.
	pub token_hash: String,
	/// Bound tenant for `tenant` sessions.
	pub tenant_id: Option<TenantId>,
	/// Expiry instant.
	pub expires_at: DateTime<Utc>,
	/// Creation instant.
	pub created_at: DateTime<Utc>,
}

/// Parameters for creating a session.
#[derive(Debug, Clone)]
pub struct NewSession {
	/// Session kind.
	pub kind: SessionKind,
	/// SHA-256 hex of the session token.
	pub token_hash: String,
	/// Bound tenant for `tenant` sessions.
	pub tenant_id: Option<TenantId>,
	/// Expiry instant.
	pub expires_at: DateTime<Utc>,
}
