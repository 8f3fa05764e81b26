//! Pairing code issuance and redemption tests.

use std::time::Duration;

use chrono::Utc;
use relay_proto::{ConversationKey, PairingState};
use relay_store::{ConversationStore, RedeemOutcome};

use super::helpers::TestRelay;
use crate::RelayError;

#[tokio::test]
async fn redeemed_code_never_redeems_again() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;
	let code = relay.core.generate_code(tenant.id, None, None).await.unwrap();

	let key1 = ConversationKey::new("C", "U1");
	let key2 = ConversationKey::new("C", "U2");
	relay.store.upsert_on_inbound(&key1, None, None).await.unwrap();
	relay.store.upsert_on_inbound(&key2, None, None).await.unwrap();

	assert_eq!(
		relay.core.redeem_code(&code.code, &key1).await.unwrap(),
		RedeemOutcome::Redeemed(tenant.id)
	);
	// Any later attempt, from any conversation, reads as invalid.
	assert_eq!(
		relay.core.redeem_code(&code.code, &key2).await.unwrap(),
		RedeemOutcome::Invalid
	);
	assert_eq!(
		relay.core.redeem_code(&code.code, &key1).await.unwrap(),
		RedeemOutcome::Invalid
	);
}

#[tokio::test]
async fn active_code_cap_is_enforced() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;

	let mut codes = Vec::new();
	for _ in 0..5 {
		codes.push(relay.core.generate_code(tenant.id, None, None).await.unwrap());
	}
	assert!(matches!(
		relay.core.generate_code(tenant.id, None, None).await,
		Err(RelayError::CodeLimitReached)
	));

	// Redemption frees a slot.
	let key = ConversationKey::new("C", "U1");
	relay.core.redeem_code(&codes[0].code, &key).await.unwrap();
	assert!(relay.core.generate_code(tenant.id, None, None).await.is_ok());
}

#[tokio::test]
async fn requested_ttl_is_clamped_to_the_allowed_range() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;

	let low = relay
		.core
		.generate_code(tenant.id, Some(Duration::from_secs(10)), None)
		.await
		.unwrap();
	let floor = Utc::now() + chrono::Duration::seconds(590);
	assert!(low.expires_at > floor, "short request clamps up to the default");

	let high = relay
		.core
		.generate_code(tenant.id, Some(Duration::from_secs(86_400)), None)
		.await
		.unwrap();
	let ceiling = Utc::now() + chrono::Duration::seconds(1810);
	assert!(high.expires_at < ceiling, "long request clamps down to the max");
}

#[tokio::test]
async fn second_redemption_replaces_the_paired_tenant() {
	let relay = TestRelay::new();
	let a = relay.tenant("a").await;
	let b = relay.tenant("b").await;
	let key = ConversationKey::new("C", "U1");
	relay.store.upsert_on_inbound(&key, None, None).await.unwrap();

	let code_a = relay.core.generate_code(a.id, None, None).await.unwrap();
	let code_b = relay.core.generate_code(b.id, None, None).await.unwrap();

	relay.core.redeem_code(&code_a.code, &key).await.unwrap();
	let conv = relay.store.conversation("C:U1").await.unwrap().unwrap();
	assert_eq!(conv.tenant_id, Some(a.id));

	// Replacement, not rejection.
	assert_eq!(
		relay.core.redeem_code(&code_b.code, &key).await.unwrap(),
		RedeemOutcome::Redeemed(b.id)
	);
	let conv = relay.store.conversation("C:U1").await.unwrap().unwrap();
	assert_eq!(conv.state, PairingState::Paired);
	assert_eq!(conv.tenant_id, Some(b.id));
}

#[tokio::test]
async fn generated_metadata_is_stored_with_the_code() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;
	let code = relay
		.core
		.generate_code(
			tenant.id,
			None,
			Some(serde_json::json!({"label": "store-front"})),
		)
		.await
		.unwrap();
	assert_eq!(
		code.metadata,
		Some(serde_json::json!({"label": "store-front"}))
	);
}

#[tokio::test]
async fn unpair_is_a_noop_without_pairing() {
	let relay = TestRelay::new();
	let key = ConversationKey::new("C", "U1");
	relay.store.upsert_on_inbound(&key, None, None).await.unwrap();
	assert!(!relay.core.unpair("C:U1").await.unwrap());
	assert!(!relay.core.unpair("C:missing").await.unwrap());
}
