//! Conversation resolution, inbound upsert, and command parsing.

use chrono::{DateTime, Utc};
use relay_proto::{Command, ConversationKey};
use relay_store::{ConversationRecord, ConversationStore};

use crate::{RelayCore, RelayError};

impl RelayCore {
	/// Look up a conversation's current state and tenant.
	pub async fn resolve(
		&self,
		conversation_key: &str,
	) -> Result<Option<ConversationRecord>, RelayError> {
		Ok(self.store.conversation(conversation_key).await?)
	}

	/// Create the conversation on first contact and always refresh
	/// `last_seen_at` and the callback fields (last-writer-wins).
	pub async fn upsert_on_inbound(
		&self,
		key: &ConversationKey,
		callback_url: Option<&str>,
		callback_expires_at: Option<DateTime<Utc>>,
	) -> Result<ConversationRecord, RelayError> {
		Ok(self
			.store
			.upsert_on_inbound(key, callback_url, callback_expires_at)
			.await?)
	}
}

/// Parse an utterance into the closed command set.
///
/// A leading `/` followed by a known word (case-insensitive) is a command;
/// the `/pair` argument is whitespace-trimmed and folded to upper case.
/// Everything else, including unknown slash-words, is ordinary content.
#[must_use]
pub fn parse_command(utterance: &str) -> Command {
	let trimmed = utterance.trim();
	let Some(rest) = trimmed.strip_prefix('/') else {
		return Command::Content(trimmed.to_string());
	};
	let mut parts = rest.split_whitespace();
	let word = parts.next().unwrap_or_default().to_ascii_lowercase();
	match word.as_str() {
		"pair" => {
			let code = parts.next().unwrap_or_default().trim().to_ascii_uppercase();
			Command::Pair(code)
		}
		"unpair" => Command::Unpair,
		"status" => Command::Status,
		"help" => Command::Help,
		"code" => Command::Code,
		_ => Command::Content(trimmed.to_string()),
	}
}
