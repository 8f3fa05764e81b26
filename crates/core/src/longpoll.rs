//! Blocking retrieval combining the queue with broker wakeups.

use std::time::Duration;

use relay_proto::TenantId;
use relay_store::InboundMessageRecord;
use tokio_util::sync::CancellationToken;

use crate::{RelayCore, RelayError};

/// Result of one poll.
#[derive(Debug, Clone)]
pub struct PollResult {
	/// Leased messages, oldest first.
	pub messages: Vec<InboundMessageRecord>,
	/// Whether more QUEUED rows remained after the lease.
	pub has_more: bool,
}

impl RelayCore {
	/// Lease up to `limit` messages, waiting up to `wait` for new arrivals.
	///
	/// At least one lease attempt always runs. The wait ends on the first of:
	/// a bus wakeup, the deadline, or caller cancellation — after which one
	/// final lease attempt decides the (possibly empty) result. Lost wakeups
	/// cannot stall the poll past its deadline, and the broker subscription
	/// is released on every exit path via its drop guard.
	pub async fn poll(
		&self,
		tenant_id: TenantId,
		limit: u32,
		wait: Duration,
		cancel: CancellationToken,
	) -> Result<PollResult, RelayError> {
		let messages = self.lease_queued(tenant_id, limit).await?;
		if !messages.is_empty() {
			return self.finish_poll(tenant_id, messages).await;
		}
		if wait.is_zero() {
			return Ok(PollResult {
				messages: Vec::new(),
				has_more: false,
			});
		}

		// A failed subscription degrades to a plain deadline wait; the queue
		// stays authoritative either way.
		let subscription = match self.broker.subscribe(tenant_id).await {
			Ok(sub) => Some(sub),
			Err(err) => {
				tracing::warn!(error = %err, tenant = %tenant_id, "broker subscribe failed, deadline-only poll");
				None
			}
		};

		let deadline = tokio::time::sleep(wait);
		tokio::pin!(deadline);
		match subscription {
			Some(mut sub) => {
				tokio::select! {
					() = &mut deadline => {}
					_ = sub.recv() => {}
					() = cancel.cancelled() => {}
				}
			}
			None => {
				tokio::select! {
					() = &mut deadline => {}
					() = cancel.cancelled() => {}
				}
			}
		}

		let messages = self.lease_queued(tenant_id, limit).await?;
		self.finish_poll(tenant_id, messages).await
	}

	async fn finish_poll(
		&self,
		tenant_id: TenantId,
		messages: Vec<InboundMessageRecord>,
	) -> Result<PollResult, RelayError> {
		let has_more = if messages.is_empty() {
			false
		} else {
			self.queued_count(tenant_id).await? > 0
		};
		Ok(PollResult { messages, has_more })
	}
}
