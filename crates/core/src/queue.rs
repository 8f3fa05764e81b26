//! Message queue service over the store, with bus wakeups.
//!
//! The store owns the atomics (idempotent insert, skip-locked lease); this
//! layer builds the denormalized tenant view, publishes the post-enqueue
//! wakeup, and exposes the lease/ack surface the long-poll and API use.

use chrono::Utc;
use relay_bus::tenant_topic;
use relay_proto::platform::InboundEvent;
use relay_proto::{MessageId, TenantId};
use relay_store::{EnqueueOutcome, InboundMessageRecord, MessageStore, NewInbound};
use serde_json::json;

use crate::{RelayCore, RelayError};

impl RelayCore {
	/// Enqueue an inbound event for a tenant.
	///
	/// Idempotent over the event's source id: a replayed webhook returns the
	/// original row's id and publishes no second wakeup. The wakeup itself is
	/// best-effort; a publish failure is logged and swallowed because the
	/// queue already holds the row.
	pub async fn enqueue_for(
		&self,
		tenant_id: TenantId,
		event: &InboundEvent,
	) -> Result<EnqueueOutcome, RelayError> {
		let conversation_key = format!("{}:{}", event.channel_id, event.user_key);
		let callback_expires_at = event
			.callback_url
			.is_some()
			.then(|| Utc::now() + chrono::Duration::from_std(self.config.callback_ttl).unwrap_or(chrono::Duration::seconds(55)));

		let new = NewInbound {
			tenant_id,
			conversation_key: conversation_key.clone(),
			raw_payload: event.raw.clone(),
			payload: json!({
				"channelId": event.channel_id,
				"userKey": event.user_key,
				"conversationKey": conversation_key,
				"utterance": event.utterance,
			}),
			callback_url: event.callback_url.clone(),
			callback_expires_at,
			source_event_id: event.source_event_id.clone(),
		};

		let outcome = self.store.enqueue(new).await?;
		match outcome {
			EnqueueOutcome::Inserted(id) => {
				tracing::debug!(tenant = %tenant_id, message = %id, "inbound enqueued");
				if let Err(err) = self
					.bus
					.publish(&tenant_topic(tenant_id), id.to_string().as_bytes())
					.await
				{
					tracing::warn!(error = %err, tenant = %tenant_id, "wakeup publish failed");
				}
			}
			EnqueueOutcome::Duplicate(id) => {
				tracing::debug!(tenant = %tenant_id, message = %id, "duplicate source event, row reused");
			}
		}
		Ok(outcome)
	}

	/// Lease up to `limit` queued messages to the tenant.
	pub async fn lease_queued(
		&self,
		tenant_id: TenantId,
		limit: u32,
	) -> Result<Vec<InboundMessageRecord>, RelayError> {
		Ok(self.store.lease_queued(tenant_id, limit).await?)
	}

	/// Acknowledge leased messages. Idempotent; returns how many moved.
	pub async fn ack_messages(
		&self,
		tenant_id: TenantId,
		ids: &[MessageId],
	) -> Result<u64, RelayError> {
		let moved = self.store.ack(tenant_id, ids).await?;
		tracing::debug!(tenant = %tenant_id, requested = ids.len(), acknowledged = moved, "messages acked");
		Ok(moved)
	}

	/// Rows still queued for the tenant.
	pub async fn queued_count(&self, tenant_id: TenantId) -> Result<u64, RelayError> {
		Ok(self.store.queued_count(tenant_id).await?)
	}
}
