//! Pairing codes and the conversation state machine's tenant-side edges.
//!
//! Codes are eight characters from a confusion-free alphabet (no `0`, `1`,
//! `I`, `O`), formatted `XXXX-XXXX`. Redemption is single-use and atomic;
//! the per-tenant active-code cap is enforced at insert under the tenant row
//! lock.

use std::time::Duration;

use rand::Rng;
use relay_proto::{ConversationKey, TenantId};
use relay_store::{
	CodeInsert, ConversationStore, NewCode, PairingCodeRecord, PairingCodeStore, RedeemOutcome,
};
use serde_json::Value;

use crate::{RelayCore, RelayError};

/// Code alphabet; omits `0`, `1`, `I`, `O`.
const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Collision redraws before giving up.
const MAX_DRAWS: u32 = 10;

/// Draw a fresh `XXXX-XXXX` code.
#[must_use]
pub fn draw_code() -> String {
	let mut rng = rand::rng();
	let mut code = String::with_capacity(9);
	for i in 0..8 {
		if i == 4 {
			code.push('-');
		}
		let idx = rng.random_range(0..CODE_ALPHABET.len());
		code.push(CODE_ALPHABET[idx] as char);
	}
	code
}

impl RelayCore {
	/// Issue a pairing code for a tenant.
	///
	/// The requested TTL is clamped to `[code_ttl_default, code_ttl_max]`;
	/// omitting it uses the default. Fails with
	/// [`RelayError::CodeLimitReached`] when the tenant already holds the
	/// maximum number of active codes.
	pub async fn generate_code(
		&self,
		tenant_id: TenantId,
		ttl: Option<Duration>,
		metadata: Option<Value>,
	) -> Result<PairingCodeRecord, RelayError> {
		let ttl = ttl
			.unwrap_or(self.config.code_ttl_default)
			.clamp(self.config.code_ttl_default, self.config.code_ttl_max);
		let expires_at = chrono::Utc::now()
			+ chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(600));

		for _ in 0..MAX_DRAWS {
			let new = NewCode {
				tenant_id,
				code: draw_code(),
				expires_at,
				metadata: metadata.clone(),
			};
			match self
				.store
				.insert_code_capped(new, self.config.active_code_cap)
				.await?
			{
				CodeInsert::Inserted(record) => {
					tracing::info!(tenant = %tenant_id, code = %record.code, expires_at = %record.expires_at, "pairing code issued");
					return Ok(record);
				}
				CodeInsert::DuplicateCode => continue,
				CodeInsert::CapReached => return Err(RelayError::CodeLimitReached),
			}
		}
		Err(RelayError::Internal(
			"pairing code space exhausted after redraws".to_string(),
		))
	}

	/// Atomically redeem a code for a conversation.
	///
	/// On success the conversation is `PAIRED` to the code's tenant in the
	/// same transaction; a previously paired conversation is re-pointed, not
	/// rejected.
	pub async fn redeem_code(
		&self,
		code: &str,
		key: &ConversationKey,
	) -> Result<RedeemOutcome, RelayError> {
		let outcome = self.store.redeem_and_pair(code, key).await?;
		match outcome {
			RedeemOutcome::Redeemed(tenant_id) => {
				tracing::info!(tenant = %tenant_id, conversation = %key, "conversation paired");
			}
			RedeemOutcome::Invalid | RedeemOutcome::Expired => {
				tracing::debug!(conversation = %key, ?outcome, "code redemption refused");
			}
		}
		Ok(outcome)
	}

	/// Drop a conversation's pairing. Returns false when there was none.
	pub async fn unpair(&self, conversation_key: &str) -> Result<bool, RelayError> {
		let changed = self.store.unpair(conversation_key).await?;
		if changed {
			tracing::info!(conversation = conversation_key, "conversation unpaired");
		}
		Ok(changed)
	}

	/// Admin edge: block a conversation (`* → BLOCKED`).
	pub async fn block_conversation(&self, conversation_key: &str) -> Result<bool, RelayError> {
		Ok(self.store.set_blocked(conversation_key, true).await?)
	}

	/// Admin edge: unblock a conversation (`BLOCKED → UNPAIRED`).
	pub async fn unblock_conversation(&self, conversation_key: &str) -> Result<bool, RelayError> {
		Ok(self.store.set_blocked(conversation_key, false).await?)
	}
}

#[cfg(test)]
mod unit_tests {
	use super::*;

	#[test]
	fn drawn_codes_use_the_confusion_free_alphabet() {
		for _ in 0..64 {
			let code = draw_code();
			let bytes = code.as_bytes();
			assert_eq!(bytes.len(), 9);
			assert_eq!(bytes[4], b'-');
			for (i, b) in bytes.iter().enumerate() {
				if i == 4 {
					continue;
				}
				assert!(
					CODE_ALPHABET.contains(b),
					"unexpected symbol {:?} in {code}",
					*b as char
				);
			}
		}
	}
}
