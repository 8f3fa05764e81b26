//! Tenant-facing API request and response bodies.
//!
//! Field names follow the wire convention (camelCase) of the platform the
//! relay fronts; timestamps serialize as ISO-8601 via chrono.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{MessageId, OutboundId, TenantId};
use crate::types::PairingState;

/// One leased message as returned by `GET /openclaw/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
	/// Message identifier; pass back in the ack call.
	pub id: MessageId,
	/// Denormalized inbound payload for tenant consumption.
	pub payload: Value,
	/// Per-message callback URL supplied by the platform, if any.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub callback_url: Option<String>,
	/// Instant after which the callback URL is dead.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub callback_expires_at: Option<DateTime<Utc>>,
	/// Enqueue instant.
	pub created_at: DateTime<Utc>,
}

/// Response body of `GET /openclaw/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
	/// Leased messages, oldest first.
	pub messages: Vec<MessageView>,
	/// True when more QUEUED rows remained after this lease.
	pub has_more: bool,
}

/// Request body of `POST /openclaw/messages/ack`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckRequest {
	/// Messages to acknowledge.
	pub message_ids: Vec<MessageId>,
}

/// Response body of `POST /openclaw/messages/ack`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
	/// How many rows actually transitioned to ACKED.
	pub acknowledged: u64,
	/// How many ids the request carried.
	pub requested: u64,
}

/// Request body of `POST /openclaw/reply`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
	/// The inbound message being answered.
	pub message_id: MessageId,
	/// Platform callback body to POST verbatim.
	pub response: Value,
}

/// Response body of `POST /openclaw/reply`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResponse {
	/// Whether the platform accepted the callback with a 2xx.
	pub success: bool,
	/// The outbound record created for this attempt, when one was created.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub outbound_message_id: Option<OutboundId>,
	/// Failure detail when `success` is false.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

/// Request body of `POST /openclaw/pairing/generate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCodeRequest {
	/// Requested code lifetime; clamped to the server's allowed range.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub expiry_seconds: Option<u64>,
	/// Free-form operator metadata stored with the code.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub metadata: Option<Value>,
}

/// Response body of `POST /openclaw/pairing/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCodeResponse {
	/// The code in `XXXX-XXXX` form.
	pub code: String,
	/// Expiry instant.
	pub expires_at: DateTime<Utc>,
}

/// Request body of `POST /openclaw/pairing/unpair`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpairRequest {
	/// Joined conversation key (`{channel}:{user}`).
	pub conversation_key: String,
}

/// One conversation as returned by `GET /openclaw/pairing/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
	/// Joined conversation key.
	pub conversation_key: String,
	/// Current pairing state.
	pub state: PairingState,
	/// Owning tenant when state is PAIRED.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tenant_id: Option<TenantId>,
	/// First inbound event instant.
	pub first_seen_at: DateTime<Utc>,
	/// Most recent inbound event instant.
	pub last_seen_at: DateTime<Utc>,
	/// Instant of the most recent successful redemption, if ever paired.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub paired_at: Option<DateTime<Utc>>,
}

/// Response body of `GET /openclaw/pairing/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingListResponse {
	/// Conversations paired to the calling tenant, most recently seen first.
	pub conversations: Vec<ConversationView>,
	/// Echoed paging limit.
	pub limit: u32,
	/// Echoed paging offset.
	pub offset: u32,
}
