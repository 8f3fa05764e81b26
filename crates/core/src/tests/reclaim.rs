//! Reclaimer sweep tests.

use std::time::Duration;

use chrono::Utc;
use relay_proto::{MessageStatus, SessionKind};
use relay_store::{
	MessageStore, NewCode, NewInbound, NewSession, PairingCodeStore, SessionStore,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::helpers::TestRelay;
use crate::Reclaimer;

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn sweep_expires_and_deletes_overdue_rows() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;

	let overdue = relay
		.store
		.enqueue(NewInbound {
			tenant_id: tenant.id,
			conversation_key: "C:U1".to_string(),
			raw_payload: json!({}),
			payload: json!({}),
			callback_url: Some("https://cb.example/1".to_string()),
			callback_expires_at: Some(Utc::now() - chrono::Duration::seconds(5)),
			source_event_id: Some("evt-overdue".to_string()),
		})
		.await
		.unwrap()
		.id();
	relay
		.store
		.insert_code_capped(
			NewCode {
				tenant_id: tenant.id,
				code: "GONE-0001".to_string(),
				expires_at: Utc::now() - chrono::Duration::seconds(5),
				metadata: None,
			},
			5,
		)
		.await
		.unwrap();
	relay
		.store
		.create_session(NewSession {
			kind: SessionKind::Tenant,
			token_hash: "stale-session".to_string(),
			tenant_id: Some(tenant.id),
			expires_at: Utc::now() - chrono::Duration::seconds(5),
		})
		.await
		.unwrap();

	Reclaimer::sweep(&relay.core).await;

	let row = relay.store.inbound_by_id(overdue).await.unwrap().unwrap();
	assert_eq!(row.status, MessageStatus::Expired);
	assert_eq!(relay.store.active_code_count(tenant.id).await.unwrap(), 0);
	assert!(
		relay
			.store
			.session_by_token_hash(SessionKind::Tenant, "stale-session")
			.await
			.unwrap()
			.is_none()
	);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn spawned_reclaimer_runs_and_stops_on_cancel() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;
	relay
		.store
		.insert_code_capped(
			NewCode {
				tenant_id: tenant.id,
				code: "GONE-0002".to_string(),
				expires_at: Utc::now() - chrono::Duration::seconds(5),
				metadata: None,
			},
			5,
		)
		.await
		.unwrap();

	let cancel = CancellationToken::new();
	let handle = Reclaimer::spawn(relay.core.clone(), cancel.clone());

	// The first tick fires immediately.
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(relay.store.delete_expired_codes().await.unwrap(), 0, "sweep already removed it");

	cancel.cancel();
	handle.await.expect("reclaimer joins cleanly");
}
