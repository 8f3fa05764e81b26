//! Webhook ingress: signature check, idempotency, routing orchestration.
//!
//! All work here must finish inside the platform's synchronous budget; the
//! only suspension points are store calls and the (fire-and-forget) bus
//! publish. Callback delivery never blocks a webhook.

use std::sync::Once;

use chrono::Utc;
use hmac::{Hmac, Mac};
use relay_proto::platform::{InboundEvent, SkillPayload, SkillResponse};
use relay_proto::{Command, ConversationKey, PairingState};
use relay_store::{ConversationRecord, RedeemOutcome};
use sha2::{Digest, Sha256};

use crate::routing::parse_command;
use crate::{RelayCore, RelayError};

type HmacSha256 = Hmac<Sha256>;

/// User-facing reply texts, in the channel's language.
mod texts {
	pub const GUIDANCE: &str = "아직 연결된 봇이 없습니다. 봇 운영자에게 받은 코드를 '/pair 코드' 형식으로 입력해 주세요.";
	pub const PAIR_OK: &str = "연결되었습니다! 이제 보내시는 메시지가 봇으로 전달됩니다.";
	pub const PAIR_INVALID: &str = "유효하지 않은 코드입니다. 코드를 다시 확인해 주세요.";
	pub const PAIR_EXPIRED: &str = "만료된 코드입니다. 운영자에게 새 코드를 요청해 주세요.";
	pub const UNPAIR_OK: &str = "연결이 해제되었습니다.";
	pub const UNPAIR_NONE: &str = "해제할 연결이 없습니다.";
	pub const STATUS_PAIRED: &str = "연결 상태: 연결됨";
	pub const STATUS_UNPAIRED: &str = "연결 상태: 연결되지 않음";
	pub const CODE_INFO: &str =
		"연결 코드는 봇 운영자가 발급합니다. 코드를 받은 뒤 '/pair 코드'를 입력해 주세요.";
	pub const HELP: &str = "사용할 수 있는 명령어:\n/pair 코드 - 봇과 연결\n/unpair - 연결 해제\n/status - 연결 상태 확인\n/code - 코드 안내\n/help - 도움말";
}

/// Verify an `sha256=<hex>` signature header over the raw body.
///
/// Comparison happens inside the MAC's constant-time verify, never on hex
/// strings.
#[must_use]
pub fn verify_signature(secret: &str, raw_body: &[u8], header: &str) -> bool {
	let Some(hex_mac) = header.strip_prefix("sha256=") else {
		return false;
	};
	let Ok(expected) = hex::decode(hex_mac.trim()) else {
		return false;
	};
	let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
		return false;
	};
	mac.update(raw_body);
	mac.verify_slice(&expected).is_ok()
}

/// Compute the `sha256=<hex>` header value for a body. Test and tooling aid.
#[must_use]
pub fn sign_body(secret: &str, raw_body: &[u8]) -> String {
	let mut mac =
		HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
	mac.update(raw_body);
	format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Reduce a parsed payload to the fields routing runs on.
///
/// The idempotency anchor prefers the platform's event id; without one it
/// falls back to a digest of (channel, user, utterance, platform timestamp).
/// A payload with neither event id nor timestamp gets no anchor at all —
/// deduplicating on content alone would collapse a user legitimately saying
/// the same thing twice.
fn derive_event(payload: &SkillPayload, raw: serde_json::Value) -> InboundEvent {
	let channel_id = payload.bot.id.clone();
	let user_key = payload.user_request.user.id.clone();
	let utterance = payload.user_request.utterance.clone();

	let source_event_id = payload.event_id.clone().or_else(|| {
		payload.user_request.timestamp.as_ref().map(|ts| {
			let mut hasher = Sha256::new();
			hasher.update(channel_id.as_bytes());
			hasher.update(b"\n");
			hasher.update(user_key.as_bytes());
			hasher.update(b"\n");
			hasher.update(utterance.as_bytes());
			hasher.update(b"\n");
			hasher.update(ts.as_bytes());
			hex::encode(hasher.finalize())
		})
	});

	InboundEvent {
		channel_id,
		user_key,
		utterance,
		callback_url: payload.user_request.callback_url.clone(),
		source_event_id,
		raw,
	}
}

static UNSIGNED_WARNING: Once = Once::new();

impl RelayCore {
	/// Handle one webhook delivery.
	///
	/// Returns the synchronous response the platform expects. Errors before
	/// the payload is durably captured propagate (the platform retries and
	/// idempotency absorbs the replay); failures after capture degrade to the
	/// acknowledgement.
	pub async fn webhook(
		&self,
		raw_body: &[u8],
		signature: Option<&str>,
	) -> Result<SkillResponse, RelayError> {
		if let Some(secret) = &self.config.signing_secret {
			let ok = signature.is_some_and(|header| verify_signature(secret, raw_body, header));
			if !ok {
				tracing::warn!("webhook rejected: bad or missing signature");
				return Err(RelayError::InvalidSignature);
			}
		} else {
			UNSIGNED_WARNING.call_once(|| {
				tracing::warn!("no webhook signing secret configured; accepting unsigned webhooks");
			});
		}

		let raw: serde_json::Value = serde_json::from_slice(raw_body)
			.map_err(|err| RelayError::InvalidPayload(err.to_string()))?;
		let payload: SkillPayload = serde_json::from_value(raw.clone())
			.map_err(|err| RelayError::InvalidPayload(err.to_string()))?;
		let event = derive_event(&payload, raw);

		let key = ConversationKey::new(&event.channel_id, &event.user_key);
		let callback_expires_at = event.callback_url.is_some().then(|| {
			Utc::now()
				+ chrono::Duration::from_std(self.config.callback_ttl)
					.unwrap_or(chrono::Duration::seconds(55))
		});
		let conversation = self
			.upsert_on_inbound(&key, event.callback_url.as_deref(), callback_expires_at)
			.await?;

		// Blocked conversations are silently acknowledged, commands included.
		if conversation.state == PairingState::Blocked {
			return Ok(SkillResponse::silent());
		}

		match parse_command(&event.utterance) {
			Command::Pair(code) => self.handle_pair(&key, &code).await,
			Command::Unpair => self.handle_unpair(&key).await,
			Command::Status => Ok(status_reply(&conversation)),
			Command::Help => Ok(SkillResponse::simple_text(texts::HELP)),
			Command::Code => Ok(SkillResponse::simple_text(texts::CODE_INFO)),
			Command::Content(_) => self.handle_content(&conversation, &event).await,
		}
	}

	async fn handle_pair(
		&self,
		key: &ConversationKey,
		code: &str,
	) -> Result<SkillResponse, RelayError> {
		let reply = match self.redeem_code(code, key).await? {
			RedeemOutcome::Redeemed(_) => texts::PAIR_OK,
			RedeemOutcome::Invalid => texts::PAIR_INVALID,
			RedeemOutcome::Expired => texts::PAIR_EXPIRED,
		};
		Ok(SkillResponse::simple_text(reply))
	}

	async fn handle_unpair(&self, key: &ConversationKey) -> Result<SkillResponse, RelayError> {
		let reply = if self.unpair(&key.joined()).await? {
			texts::UNPAIR_OK
		} else {
			texts::UNPAIR_NONE
		};
		Ok(SkillResponse::simple_text(reply))
	}

	async fn handle_content(
		&self,
		conversation: &ConversationRecord,
		event: &InboundEvent,
	) -> Result<SkillResponse, RelayError> {
		match conversation.state {
			PairingState::Paired => {
				let Some(tenant_id) = conversation.tenant_id else {
					// The store's check constraint makes this unreachable.
					return Err(RelayError::Internal(
						"paired conversation without tenant".to_string(),
					));
				};
				self.enqueue_for(tenant_id, event).await?;
				if event.callback_url.is_some() {
					Ok(SkillResponse::use_callback())
				} else {
					// Without a callback URL the platform cannot take an async
					// reply; the row still queues for the tenant.
					Ok(SkillResponse::silent())
				}
			}
			PairingState::Unpaired | PairingState::Pending => {
				Ok(SkillResponse::simple_text(texts::GUIDANCE))
			}
			PairingState::Blocked => Ok(SkillResponse::silent()),
		}
	}
}

fn status_reply(conversation: &ConversationRecord) -> SkillResponse {
	let text = match conversation.state {
		PairingState::Paired => texts::STATUS_PAIRED,
		_ => texts::STATUS_UNPAIRED,
	};
	SkillResponse::simple_text(text)
}

/// Pairing-guidance text, exposed for the HTTP layer's tests.
#[must_use]
pub fn guidance_text() -> &'static str {
	texts::GUIDANCE
}
