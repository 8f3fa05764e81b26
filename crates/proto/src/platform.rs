//! Chat-platform skill payload and response templates.
//!
//! The relay fronts a KakaoTalk channel in skill-webhook flavor: the platform
//! POSTs a skill payload per user utterance and expects either an immediate
//! text template or the use-callback acknowledgement, in which case the reply
//! is POSTed later to `userRequest.callbackUrl`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound skill payload, reduced to the fields the relay routes on.
///
/// Unknown fields are preserved nowhere; ingress stores the raw body
/// alongside this parse, so nothing is lost for the tenant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillPayload {
	/// Platform-supplied event id, when the platform sends one.
	///
	/// Preferred idempotency anchor; absent on most payloads, in which case
	/// ingress derives a digest-based fallback.
	#[serde(default)]
	pub event_id: Option<String>,
	/// The bot (channel) this event belongs to.
	pub bot: SkillBot,
	/// The user request block.
	pub user_request: SkillUserRequest,
}

/// Bot block of a skill payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillBot {
	/// Channel identifier.
	pub id: String,
	/// Display name, unused by routing.
	#[serde(default)]
	pub name: Option<String>,
}

/// User-request block of a skill payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillUserRequest {
	/// The raw utterance text.
	pub utterance: String,
	/// Short-lived URL for the asynchronous reply, when callback is enabled.
	#[serde(default)]
	pub callback_url: Option<String>,
	/// Platform timestamp string, used only in the fallback event digest.
	#[serde(default)]
	pub timestamp: Option<String>,
	/// The end user.
	pub user: SkillUser,
}

/// User block of a skill payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillUser {
	/// Platform-scoped user key.
	pub id: String,
	/// User key type (`botUserKey` et al.), unused by routing.
	#[serde(default, rename = "type")]
	pub kind: Option<String>,
}

/// Synchronous webhook response.
///
/// Exactly one of the three shapes the platform accepts: the use-callback
/// acknowledgement, a text template, or the bare silent acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillResponse {
	/// Always `"2.0"`.
	pub version: String,
	/// Present and true when the reply will arrive via the callback URL.
	#[serde(rename = "useCallback", skip_serializing_if = "Option::is_none")]
	pub use_callback: Option<bool>,
	/// Present for immediate text replies.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub template: Option<SkillTemplate>,
}

/// Template block of a text response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillTemplate {
	/// Ordered output components.
	pub outputs: Vec<SkillOutput>,
}

/// One output component; the relay only emits simple text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillOutput {
	/// Simple text component.
	#[serde(rename = "simpleText")]
	pub simple_text: SimpleText,
}

/// Simple text content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleText {
	/// The text shown to the user.
	pub text: String,
}

impl SkillResponse {
	/// The acknowledgement telling the platform to await the callback POST.
	#[must_use]
	pub fn use_callback() -> Self {
		Self {
			version: "2.0".to_string(),
			use_callback: Some(true),
			template: None,
		}
	}

	/// An immediate simple-text reply.
	#[must_use]
	pub fn simple_text(text: impl Into<String>) -> Self {
		Self {
			version: "2.0".to_string(),
			use_callback: None,
			template: Some(SkillTemplate {
				outputs: vec![SkillOutput {
					simple_text: SimpleText { text: text.into() },
				}],
			}),
		}
	}

	/// The bare acknowledgement with no user-visible output.
	#[must_use]
	pub fn silent() -> Self {
		Self {
			version: "2.0".to_string(),
			use_callback: None,
			template: None,
		}
	}
}

/// Raw inbound event fields ingress derives from a payload, before routing.
#[derive(Debug, Clone)]
pub struct InboundEvent {
	/// Channel identifier (`bot.id`).
	pub channel_id: String,
	/// End-user key (`userRequest.user.id`).
	pub user_key: String,
	/// Utterance text.
	pub utterance: String,
	/// Callback URL, when present.
	pub callback_url: Option<String>,
	/// Deduplication key: platform event id or the digest fallback. Absent
	/// when the payload carries neither an event id nor a timestamp.
	pub source_event_id: Option<String>,
	/// The raw JSON body as received.
	pub raw: Value,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn skill_payload_parses_minimal_body() {
		let body = serde_json::json!({
			"bot": { "id": "C1" },
			"userRequest": {
				"utterance": "hello",
				"user": { "id": "U1", "type": "botUserKey" }
			}
		});
		let payload: SkillPayload = serde_json::from_value(body).unwrap();
		assert_eq!(payload.bot.id, "C1");
		assert_eq!(payload.user_request.user.id, "U1");
		assert_eq!(payload.user_request.utterance, "hello");
		assert!(payload.user_request.callback_url.is_none());
		assert!(payload.event_id.is_none());
	}

	#[test]
	fn use_callback_response_wire_shape() {
		let json = serde_json::to_value(SkillResponse::use_callback()).unwrap();
		assert_eq!(
			json,
			serde_json::json!({ "version": "2.0", "useCallback": true })
		);
	}

	#[test]
	fn simple_text_response_wire_shape() {
		let json = serde_json::to_value(SkillResponse::simple_text("안내")).unwrap();
		assert_eq!(
			json,
			serde_json::json!({
				"version": "2.0",
				"template": { "outputs": [ { "simpleText": { "text": "안내" } } ] }
			})
		);
	}

	#[test]
	fn silent_response_wire_shape() {
		let json = serde_json::to_value(SkillResponse::silent()).unwrap();
		assert_eq!(json, serde_json::json!({ "version": "2.0" }));
	}
}
