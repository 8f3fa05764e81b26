//! Identifier newtypes.
//!
//! Every persistent entity is keyed by a UUIDv4 wrapped in a newtype so the
//! compiler keeps tenant, message, and code identifiers from crossing wires.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tenant (an independent bot backend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub Uuid);

/// Unique identifier for an inbound message row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

/// Unique identifier for an outbound (reply) message row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboundId(pub Uuid);

/// Unique identifier for a pairing code row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeId(pub Uuid);

macro_rules! uuid_id {
	($name:ident) => {
		impl $name {
			/// Generate a fresh random identifier.
			#[must_use]
			pub fn generate() -> Self {
				Self(Uuid::new_v4())
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				self.0.fmt(f)
			}
		}

		impl FromStr for $name {
			type Err = uuid::Error;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Ok(Self(Uuid::from_str(s)?))
			}
		}
	};
}

uuid_id!(TenantId);
uuid_id!(MessageId);
uuid_id!(OutboundId);
uuid_id!(CodeId);

/// Routing key for a single (channel, user) pair.
///
/// Stored both decomposed and as the joined string `{channel_id}:{user_key}`.
/// The joined form is what the tenant API and the database unique index use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
	/// Identifier of the shared chat channel.
	pub channel_id: String,
	/// Platform-scoped key of the end user.
	pub user_key: String,
}

impl ConversationKey {
	/// Build a key from its parts.
	#[must_use]
	pub fn new(channel_id: impl Into<String>, user_key: impl Into<String>) -> Self {
		Self {
			channel_id: channel_id.into(),
			user_key: user_key.into(),
		}
	}

	/// The joined string form used for storage and the wire.
	#[must_use]
	pub fn joined(&self) -> String {
		format!("{}:{}", self.channel_id, self.user_key)
	}

	/// Parse the joined form. The user key may itself contain `:`; only the
	/// first separator splits.
	#[must_use]
	pub fn parse(joined: &str) -> Option<Self> {
		let (channel, user) = joined.split_once(':')?;
		if channel.is_empty() || user.is_empty() {
			return None;
		}
		Some(Self::new(channel, user))
	}
}

impl fmt::Display for ConversationKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.channel_id, self.user_key)
	}
}
