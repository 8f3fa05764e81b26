//! Webhook ingress tests: signature, idempotency, state-directed responses.

use relay_proto::PairingState;
use relay_proto::platform::SkillResponse;
use relay_store::{ConversationStore, PairingCodeStore};

use super::helpers::{TestRelay, response_text, webhook_body};
use crate::ingress::{guidance_text, sign_body};
use crate::{CoreConfig, RelayError};

#[tokio::test]
async fn unpaired_first_contact_gets_guidance_and_enqueues_nothing() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;

	let body = webhook_body("C", "U1", "hi", None, Some("100"));
	let response = relay.core.webhook(&body, None).await.unwrap();

	assert_eq!(response_text(&response), Some(guidance_text()));
	let conv = relay.store.conversation("C:U1").await.unwrap().unwrap();
	assert_eq!(conv.state, PairingState::Unpaired);
	assert_eq!(conv.tenant_id, None);
	assert_eq!(relay.core.queued_count(tenant.id).await.unwrap(), 0);
}

#[tokio::test]
async fn paired_content_is_enqueued_and_acknowledged_with_use_callback() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;
	let code = relay.core.generate_code(tenant.id, None, None).await.unwrap();

	// Lowercase, padded: the parser folds it.
	let pair = webhook_body("C", "U1", &format!("/pair {}", code.code.to_lowercase()), None, Some("1"));
	let response = relay.core.webhook(&pair, None).await.unwrap();
	assert!(response_text(&response).unwrap().contains("연결되었습니다"));

	let hello = webhook_body("C", "U1", "hello", Some("https://cb.example/1"), Some("2"));
	let response = relay.core.webhook(&hello, None).await.unwrap();
	assert_eq!(response, SkillResponse::use_callback());
	assert_eq!(relay.core.queued_count(tenant.id).await.unwrap(), 1);
}

#[tokio::test]
async fn paired_content_without_callback_url_is_silently_acknowledged() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;
	let code = relay.core.generate_code(tenant.id, None, None).await.unwrap();
	let pair = webhook_body("C", "U1", &format!("/pair {}", code.code), None, Some("1"));
	relay.core.webhook(&pair, None).await.unwrap();

	let body = webhook_body("C", "U1", "hello", None, Some("2"));
	let response = relay.core.webhook(&body, None).await.unwrap();
	assert_eq!(response, SkillResponse::silent());
	assert_eq!(relay.core.queued_count(tenant.id).await.unwrap(), 1);
}

#[tokio::test]
async fn duplicate_webhook_creates_one_row_and_two_success_acks() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;
	let code = relay.core.generate_code(tenant.id, None, None).await.unwrap();
	let pair = webhook_body("C", "U1", &format!("/pair {}", code.code), None, Some("1"));
	relay.core.webhook(&pair, None).await.unwrap();

	let body = webhook_body("C", "U1", "hello", Some("https://cb.example/1"), Some("42"));
	let first = relay.core.webhook(&body, None).await.unwrap();
	let second = relay.core.webhook(&body, None).await.unwrap();

	assert_eq!(first, SkillResponse::use_callback());
	assert_eq!(second, SkillResponse::use_callback());
	assert_eq!(relay.core.queued_count(tenant.id).await.unwrap(), 1);
}

#[tokio::test]
async fn signature_mismatch_is_rejected() {
	let relay = TestRelay::with_config(CoreConfig {
		signing_secret: Some("webhook-secret".to_string()),
		..CoreConfig::default()
	});

	let body = webhook_body("C", "U1", "hi", None, Some("1"));
	let good = sign_body("webhook-secret", &body);

	// The correct signature passes.
	assert!(relay.core.webhook(&body, Some(&good)).await.is_ok());

	// Any byte difference fails, as does a missing header.
	let bad = sign_body("webhook-secret", b"other body");
	assert!(matches!(
		relay.core.webhook(&body, Some(&bad)).await,
		Err(RelayError::InvalidSignature)
	));
	assert!(matches!(
		relay.core.webhook(&body, None).await,
		Err(RelayError::InvalidSignature)
	));
	assert!(matches!(
		relay.core.webhook(&body, Some("sha256=zz-not-hex")).await,
		Err(RelayError::InvalidSignature)
	));
}

#[tokio::test]
async fn unsigned_deployment_accepts_unsigned_webhooks() {
	let relay = TestRelay::new();
	let body = webhook_body("C", "U1", "hi", None, Some("1"));
	assert!(relay.core.webhook(&body, None).await.is_ok());
}

#[tokio::test]
async fn malformed_body_is_invalid_payload() {
	let relay = TestRelay::new();
	assert!(matches!(
		relay.core.webhook(b"not json", None).await,
		Err(RelayError::InvalidPayload(_))
	));
	assert!(matches!(
		relay.core.webhook(br#"{"bot":{"id":"C"}}"#, None).await,
		Err(RelayError::InvalidPayload(_))
	));
}

#[tokio::test]
async fn blocked_conversation_is_silent_for_content_and_commands() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;

	relay
		.core
		.webhook(&webhook_body("C", "U1", "hi", None, Some("1")), None)
		.await
		.unwrap();
	relay.core.block_conversation("C:U1").await.unwrap();

	let content = relay
		.core
		.webhook(&webhook_body("C", "U1", "hello", Some("https://cb.example/1"), Some("2")), None)
		.await
		.unwrap();
	assert_eq!(content, SkillResponse::silent());
	assert_eq!(relay.core.queued_count(tenant.id).await.unwrap(), 0);

	let status = relay
		.core
		.webhook(&webhook_body("C", "U1", "/status", None, Some("3")), None)
		.await
		.unwrap();
	assert_eq!(status, SkillResponse::silent());
}

#[tokio::test]
async fn command_replies_cover_status_help_code_unpair() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;

	let status = relay
		.core
		.webhook(&webhook_body("C", "U1", "/status", None, Some("1")), None)
		.await
		.unwrap();
	assert!(response_text(&status).unwrap().contains("연결되지 않음"));

	let help = relay
		.core
		.webhook(&webhook_body("C", "U1", "/help", None, Some("2")), None)
		.await
		.unwrap();
	assert!(response_text(&help).unwrap().contains("/pair"));

	let code = relay
		.core
		.webhook(&webhook_body("C", "U1", "/code", None, Some("3")), None)
		.await
		.unwrap();
	assert!(response_text(&code).unwrap().contains("운영자"));

	// Unpair before pairing reports nothing to undo.
	let unpair = relay
		.core
		.webhook(&webhook_body("C", "U1", "/unpair", None, Some("4")), None)
		.await
		.unwrap();
	assert!(response_text(&unpair).unwrap().contains("해제할 연결이 없습니다"));

	// After pairing, status and unpair flip.
	let issued = relay.core.generate_code(tenant.id, None, None).await.unwrap();
	relay
		.core
		.webhook(&webhook_body("C", "U1", &format!("/pair {}", issued.code), None, Some("5")), None)
		.await
		.unwrap();
	let status = relay
		.core
		.webhook(&webhook_body("C", "U1", "/status", None, Some("6")), None)
		.await
		.unwrap();
	assert!(response_text(&status).unwrap().contains("연결됨"));

	let unpair = relay
		.core
		.webhook(&webhook_body("C", "U1", "/unpair", None, Some("7")), None)
		.await
		.unwrap();
	assert!(response_text(&unpair).unwrap().contains("연결이 해제되었습니다"));
	let conv = relay.store.conversation("C:U1").await.unwrap().unwrap();
	assert_eq!(conv.state, PairingState::Unpaired);
}

#[tokio::test]
async fn invalid_and_expired_codes_get_distinct_replies() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;
	relay
		.store
		.insert_code_capped(
			relay_store::NewCode {
				tenant_id: tenant.id,
				code: "AAAA-BBBB".to_string(),
				expires_at: chrono::Utc::now() - chrono::Duration::seconds(1),
				metadata: None,
			},
			5,
		)
		.await
		.unwrap();

	let invalid = relay
		.core
		.webhook(&webhook_body("C", "U1", "/pair ZZZZ-ZZZZ", None, Some("1")), None)
		.await
		.unwrap();
	assert!(response_text(&invalid).unwrap().contains("유효하지 않은"));

	let expired = relay
		.core
		.webhook(&webhook_body("C", "U1", "/pair AAAA-BBBB", None, Some("2")), None)
		.await
		.unwrap();
	assert!(response_text(&expired).unwrap().contains("만료된"));
}

#[tokio::test]
async fn callback_fields_are_last_writer_wins() {
	let relay = TestRelay::new();
	relay
		.core
		.webhook(&webhook_body("C", "U1", "a", Some("https://cb.example/1"), Some("1")), None)
		.await
		.unwrap();
	relay
		.core
		.webhook(&webhook_body("C", "U1", "b", None, Some("2")), None)
		.await
		.unwrap();

	let conv = relay.store.conversation("C:U1").await.unwrap().unwrap();
	assert_eq!(conv.callback_url, None);
	assert_eq!(conv.callback_expires_at, None);
}
