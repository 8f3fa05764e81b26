//! Queue semantics tests: idempotency and lease exclusivity.

use std::collections::HashSet;

use relay_proto::MessageId;
use relay_proto::platform::InboundEvent;
use relay_store::EnqueueOutcome;
use serde_json::json;

use super::helpers::TestRelay;

fn event(channel: &str, user: &str, utterance: &str, event_id: &str) -> InboundEvent {
	InboundEvent {
		channel_id: channel.to_string(),
		user_key: user.to_string(),
		utterance: utterance.to_string(),
		callback_url: Some("https://cb.example/1".to_string()),
		source_event_id: Some(event_id.to_string()),
		raw: json!({ "utterance": utterance }),
	}
}

#[tokio::test]
async fn enqueue_is_idempotent_per_source_event() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;

	let first = relay
		.core
		.enqueue_for(tenant.id, &event("C", "U1", "hello", "evt-1"))
		.await
		.unwrap();
	let second = relay
		.core
		.enqueue_for(tenant.id, &event("C", "U1", "hello", "evt-1"))
		.await
		.unwrap();

	assert!(matches!(first, EnqueueOutcome::Inserted(_)));
	assert!(matches!(second, EnqueueOutcome::Duplicate(_)));
	assert_eq!(first.id(), second.id());
	assert_eq!(relay.core.queued_count(tenant.id).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_leases_are_disjoint() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;

	for i in 0..20 {
		relay
			.core
			.enqueue_for(tenant.id, &event("C", "U1", "msg", &format!("evt-{i}")))
			.await
			.unwrap();
	}

	let core_a = relay.core.clone();
	let core_b = relay.core.clone();
	let a = tokio::spawn(async move { core_a.lease_queued(tenant.id, 10).await.unwrap() });
	let b = tokio::spawn(async move { core_b.lease_queued(tenant.id, 10).await.unwrap() });
	let (a, b) = (a.await.unwrap(), b.await.unwrap());

	let ids_a: HashSet<MessageId> = a.iter().map(|m| m.id).collect();
	let ids_b: HashSet<MessageId> = b.iter().map(|m| m.id).collect();
	assert!(ids_a.is_disjoint(&ids_b), "no row leases twice");
	assert_eq!(ids_a.len() + ids_b.len(), 20, "every row leases exactly once");
}

#[tokio::test]
async fn lease_preserves_per_conversation_arrival_order() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;

	for i in 0..3 {
		relay
			.core
			.enqueue_for(tenant.id, &event("C", "U1", &format!("m{i}"), &format!("u1-{i}")))
			.await
			.unwrap();
		relay
			.core
			.enqueue_for(tenant.id, &event("C", "U2", &format!("m{i}"), &format!("u2-{i}")))
			.await
			.unwrap();
	}

	let leased = relay.core.lease_queued(tenant.id, 100).await.unwrap();
	assert_eq!(leased.len(), 6);
	// Global drain is by arrival; within each conversation that implies FIFO.
	let seqs: Vec<i64> = leased.iter().map(|m| m.seq).collect();
	let mut sorted = seqs.clone();
	sorted.sort_unstable();
	assert_eq!(seqs, sorted);
}

#[tokio::test]
async fn ack_counts_only_rows_that_moved() {
	let relay = TestRelay::new();
	let tenant = relay.tenant("a").await;

	let id = relay
		.core
		.enqueue_for(tenant.id, &event("C", "U1", "hello", "evt-1"))
		.await
		.unwrap()
		.id();
	relay.core.lease_queued(tenant.id, 10).await.unwrap();

	let ghost = MessageId::generate();
	assert_eq!(relay.core.ack_messages(tenant.id, &[id, ghost]).await.unwrap(), 1);
	assert_eq!(relay.core.ack_messages(tenant.id, &[id]).await.unwrap(), 0);
}
