//! Callback dispatch: post a tenant's reply to the platform within the TTL.
//!
//! No automatic retry lives here: the callback TTL makes a retry nearly
//! always useless, so the tenant is expected to fail fast and re-issue
//! within the TTL if it wants another attempt.

use std::time::Duration;

use chrono::Utc;
use relay_proto::{MessageId, OutboundId, TenantId};
use relay_store::{MessageStore, NewOutbound};
use serde_json::Value;

use crate::{RelayCore, RelayError};

/// Hard cap on a single callback POST, independent of the remaining TTL.
const MAX_POST_BUDGET: Duration = Duration::from_secs(10);

/// Result of a reply attempt that got as far as the POST.
#[derive(Debug, Clone)]
pub struct ReplyOutcome {
	/// The outbound accounting row.
	pub outbound_id: OutboundId,
	/// Whether the platform answered 2xx within the deadline.
	pub success: bool,
	/// Failure detail when `success` is false.
	pub error: Option<String>,
}

impl RelayCore {
	/// Post a tenant's reply to the inbound message's captured callback URL.
	///
	/// Fails with [`RelayError::NotFound`] / [`RelayError::Forbidden`] on
	/// ownership problems and [`RelayError::CallbackExpired`] when the TTL
	/// has lapsed — in that case no outbound row is created and no HTTP
	/// request leaves the process. A POST that fails or times out yields a
	/// `FAILED` outbound row and a non-success outcome, not an `Err`.
	pub async fn send_reply(
		&self,
		tenant_id: TenantId,
		message_id: MessageId,
		response: Value,
	) -> Result<ReplyOutcome, RelayError> {
		let inbound = self
			.store
			.inbound_by_id(message_id)
			.await?
			.ok_or(RelayError::NotFound)?;
		if inbound.tenant_id != tenant_id {
			return Err(RelayError::Forbidden);
		}

		let now = Utc::now();
		let (url, expires_at) = match (&inbound.callback_url, inbound.callback_expires_at) {
			(Some(url), Some(expires_at)) if expires_at > now => (url.clone(), expires_at),
			_ => return Err(RelayError::CallbackExpired),
		};

		let outbound = self
			.store
			.insert_outbound(NewOutbound {
				tenant_id,
				inbound_id: Some(message_id),
				conversation_key: inbound.conversation_key.clone(),
				response: response.clone(),
			})
			.await?;

		let remaining = (expires_at - now).to_std().unwrap_or_default();
		let budget = remaining.min(MAX_POST_BUDGET);

		let result = self
			.http
			.post(&url)
			.timeout(budget)
			.json(&response)
			.send()
			.await;

		match result {
			Ok(resp) if resp.status().is_success() => {
				self.store.mark_outbound_sent(outbound.id).await?;
				tracing::info!(tenant = %tenant_id, message = %message_id, outbound = %outbound.id, "reply delivered");
				Ok(ReplyOutcome {
					outbound_id: outbound.id,
					success: true,
					error: None,
				})
			}
			Ok(resp) => {
				let error = format!("callback returned {}", resp.status());
				self.store.mark_outbound_failed(outbound.id, &error).await?;
				tracing::warn!(tenant = %tenant_id, outbound = %outbound.id, %error, "reply rejected by platform");
				Ok(ReplyOutcome {
					outbound_id: outbound.id,
					success: false,
					error: Some(error),
				})
			}
			Err(err) => {
				let error = err.to_string();
				self.store.mark_outbound_failed(outbound.id, &error).await?;
				tracing::warn!(tenant = %tenant_id, outbound = %outbound.id, %error, "reply delivery failed");
				Ok(ReplyOutcome {
					outbound_id: outbound.id,
					success: false,
					error: Some(error),
				})
			}
		}
	}
}
