//! Domain state enums and the in-chat command sum.
//!
//! Enum values are stored as their `as_str` text in the database; both store
//! implementations round-trip through the `parse` constructors here.

use serde::{Deserialize, Serialize};

/// Pairing state of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PairingState {
	/// No tenant bound; inbound content gets pairing guidance.
	Unpaired,
	/// Reserved for multi-step pairing flows; no transition writes it.
	Pending,
	/// Bound to exactly one tenant; inbound content is enqueued.
	Paired,
	/// Administratively blocked; inbound content is silently acknowledged.
	Blocked,
}

impl PairingState {
	/// Storage text for this state.
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Unpaired => "UNPAIRED",
			Self::Pending => "PENDING",
			Self::Paired => "PAIRED",
			Self::Blocked => "BLOCKED",
		}
	}

	/// Parse the storage text.
	#[must_use]
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"UNPAIRED" => Some(Self::Unpaired),
			"PENDING" => Some(Self::Pending),
			"PAIRED" => Some(Self::Paired),
			"BLOCKED" => Some(Self::Blocked),
			_ => None,
		}
	}
}

/// Lifecycle status of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageStatus {
	/// Inserted, awaiting lease.
	Queued,
	/// Leased to the owning tenant by a poll.
	Delivered,
	/// Confirmed consumed by the tenant. Terminal.
	Acked,
	/// Callback TTL lapsed before acknowledgement. Terminal.
	Expired,
}

impl MessageStatus {
	/// Storage text for this status.
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Queued => "QUEUED",
			Self::Delivered => "DELIVERED",
			Self::Acked => "ACKED",
			Self::Expired => "EXPIRED",
		}
	}

	/// Parse the storage text.
	#[must_use]
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"QUEUED" => Some(Self::Queued),
			"DELIVERED" => Some(Self::Delivered),
			"ACKED" => Some(Self::Acked),
			"EXPIRED" => Some(Self::Expired),
			_ => None,
		}
	}

	/// Whether the status can still transition.
	#[must_use]
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Acked | Self::Expired)
	}
}

/// Lifecycle status of an outbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutboundStatus {
	/// Accepted, callback POST not yet resolved.
	Pending,
	/// Platform returned 2xx within the callback TTL.
	Sent,
	/// Callback POST failed or timed out.
	Failed,
}

impl OutboundStatus {
	/// Storage text for this status.
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "PENDING",
			Self::Sent => "SENT",
			Self::Failed => "FAILED",
		}
	}

	/// Parse the storage text.
	#[must_use]
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"PENDING" => Some(Self::Pending),
			"SENT" => Some(Self::Sent),
			"FAILED" => Some(Self::Failed),
			_ => None,
		}
	}
}

/// Operating mode of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantMode {
	/// Relaxed limits, intended for local plugin development.
	Development,
	/// Hardened limits.
	Production,
}

impl TenantMode {
	/// Storage text for this mode.
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Development => "development",
			Self::Production => "production",
		}
	}

	/// Parse the storage text.
	#[must_use]
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"development" => Some(Self::Development),
			"production" => Some(Self::Production),
			_ => None,
		}
	}
}

/// Kind of an opaque session token row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
	/// Admin UI session.
	Admin,
	/// Portal UI session.
	Portal,
	/// Tenant plugin session used for webhook-driven auto-pairing.
	Tenant,
}

impl SessionKind {
	/// Storage text for this kind.
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Admin => "admin",
			Self::Portal => "portal",
			Self::Tenant => "tenant",
		}
	}

	/// Parse the storage text.
	#[must_use]
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"admin" => Some(Self::Admin),
			"portal" => Some(Self::Portal),
			"tenant" => Some(Self::Tenant),
			_ => None,
		}
	}
}

/// A parsed end-user utterance.
///
/// Commands are a closed set; everything that is not a recognized leading
/// slash-command is ordinary content relayed to the paired tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	/// `/pair <code>` — redeem a pairing code. Code is trimmed and upper-cased.
	Pair(String),
	/// `/unpair` — drop the current pairing.
	Unpair,
	/// `/status` — report the conversation's pairing state.
	Status,
	/// `/help` — list the available commands.
	Help,
	/// `/code` — explain how pairing codes are issued.
	Code,
	/// Ordinary content; relayed verbatim.
	Content(String),
}
