//! Egress tests against a real local callback endpoint.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use relay_proto::{MessageId, OutboundStatus, TenantId};
use relay_store::{EnqueueOutcome, MessageStore, NewInbound};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::helpers::TestRelay;
use crate::RelayError;

/// Stand up a callback endpoint answering `status` and recording bodies.
async fn callback_stub(status: StatusCode) -> (SocketAddr, mpsc::Receiver<Value>) {
	let (tx, rx) = mpsc::channel::<Value>(8);
	let app = Router::new().route(
		"/callback",
		post({
			let tx = tx.clone();
			move |Json(body): Json<Value>| {
				let tx = tx.clone();
				async move {
					tx.send(body).await.ok();
					status
				}
			}
		}),
	);
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
		.await
		.expect("bind stub");
	let addr = listener.local_addr().expect("stub addr");
	tokio::spawn(async move {
		axum::serve(listener, app).await.ok();
	});
	(addr, rx)
}

async fn enqueue_with_callback(
	relay: &TestRelay,
	tenant_id: TenantId,
	callback_url: Option<String>,
	expires_in_secs: i64,
) -> MessageId {
	let outcome = relay
		.store
		.enqueue(NewInbound {
			tenant_id,
			conversation_key: "C:U1".to_string(),
			raw_payload: json!({}),
			payload: json!({"utterance": "hello"}),
			callback_url: callback_url.clone(),
			callback_expires_at: callback_url
				.is_some()
				.then(|| Utc::now() + Duration::seconds(expires_in_secs)),
			source_event_id: None,
		})
		.await
		.unwrap();
	match outcome {
		EnqueueOutcome::Inserted(id) => id,
		EnqueueOutcome::Duplicate(id) => id,
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reply_round_trip_marks_sent_and_reaches_the_platform() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;
	let (addr, mut received) = callback_stub(StatusCode::OK).await;

	let message_id = enqueue_with_callback(
		&relay,
		tenant.id,
		Some(format!("http://{addr}/callback")),
		30,
	)
	.await;
	relay.core.lease_queued(tenant.id, 10).await.unwrap();

	let body = json!({"version": "2.0", "template": {"outputs": [{"simpleText": {"text": "answer"}}]}});
	let outcome = relay
		.core
		.send_reply(tenant.id, message_id, body.clone())
		.await
		.unwrap();

	assert!(outcome.success);
	assert_eq!(received.recv().await, Some(body));
	let outbound = relay
		.store
		.outbound_by_id(outcome.outbound_id)
		.await
		.unwrap()
		.unwrap();
	assert_eq!(outbound.status, OutboundStatus::Sent);
	assert!(outbound.sent_at.is_some());

	// The inbound is still ack-able after the reply.
	assert_eq!(relay.core.ack_messages(tenant.id, &[message_id]).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expired_callback_is_rejected_without_post() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;
	let (addr, mut received) = callback_stub(StatusCode::OK).await;

	let message_id = enqueue_with_callback(
		&relay,
		tenant.id,
		Some(format!("http://{addr}/callback")),
		-1,
	)
	.await;

	let result = relay
		.core
		.send_reply(tenant.id, message_id, json!({"text": "late"}))
		.await;
	assert!(matches!(result, Err(RelayError::CallbackExpired)));

	// No HTTP request left the process, and no outbound row exists.
	assert!(received.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_callback_url_reads_as_expired() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;
	let message_id = enqueue_with_callback(&relay, tenant.id, None, 30).await;

	assert!(matches!(
		relay.core.send_reply(tenant.id, message_id, json!({})).await,
		Err(RelayError::CallbackExpired)
	));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn platform_error_marks_the_outbound_failed() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;
	let (addr, _received) = callback_stub(StatusCode::INTERNAL_SERVER_ERROR).await;

	let message_id = enqueue_with_callback(
		&relay,
		tenant.id,
		Some(format!("http://{addr}/callback")),
		30,
	)
	.await;

	let outcome = relay
		.core
		.send_reply(tenant.id, message_id, json!({"text": "hi"}))
		.await
		.unwrap();
	assert!(!outcome.success);
	let error = outcome.error.expect("failure detail");
	assert!(error.contains("500"));

	let outbound = relay
		.store
		.outbound_by_id(outcome.outbound_id)
		.await
		.unwrap()
		.unwrap();
	assert_eq!(outbound.status, OutboundStatus::Failed);
	assert_eq!(outbound.error.as_deref(), Some(error.as_str()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_callback_marks_the_outbound_failed() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;

	// A port nothing listens on: connection refused, not a timeout.
	let message_id = enqueue_with_callback(
		&relay,
		tenant.id,
		Some("http://127.0.0.1:9/callback".to_string()),
		30,
	)
	.await;

	let outcome = relay
		.core
		.send_reply(tenant.id, message_id, json!({"text": "hi"}))
		.await
		.unwrap();
	assert!(!outcome.success);
	assert!(outcome.error.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn foreign_tenant_reply_is_forbidden() {
	let relay = TestRelay::new();
	let a = relay.tenant("a").await;
	let b = relay.tenant("b").await;
	let (addr, mut received) = callback_stub(StatusCode::OK).await;

	let message_id = enqueue_with_callback(
		&relay,
		a.id,
		Some(format!("http://{addr}/callback")),
		30,
	)
	.await;

	assert!(matches!(
		relay.core.send_reply(b.id, message_id, json!({})).await,
		Err(RelayError::Forbidden)
	));
	assert!(received.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_message_is_not_found() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;
	assert!(matches!(
		relay
			.core
			.send_reply(tenant.id, MessageId::generate(), json!({}))
			.await,
		Err(RelayError::NotFound)
	));
}
