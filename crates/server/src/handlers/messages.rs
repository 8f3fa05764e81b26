//! Long-poll retrieval and acknowledgement.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::{Extension, Json};
use relay_proto::{AckRequest, AckResponse, MessageView, PollResponse};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::AppState;
use crate::auth::AuthedTenant;
use crate::error::ApiError;

/// Query parameters of `GET /openclaw/messages`.
#[derive(Debug, Deserialize)]
pub struct PollQuery {
	/// Lease batch size, clamped to 1..=100. Default 20.
	pub limit: Option<u32>,
	/// Long-poll wait in seconds, clamped to 0..=30. Default 0.
	pub wait: Option<u64>,
}

/// `GET /openclaw/messages?limit=&wait=`
pub async fn poll(
	State(state): State<AppState>,
	Extension(tenant): Extension<AuthedTenant>,
	Query(query): Query<PollQuery>,
) -> Result<Json<PollResponse>, ApiError> {
	let limit = query.limit.unwrap_or(20).clamp(1, 100);
	let wait = Duration::from_secs(query.wait.unwrap_or(0).min(30));

	// Client disconnects drop this future; the broker subscription's drop
	// guard unsubscribes on that path, so no extra token wiring is needed.
	let result = state
		.core
		.poll(tenant.0.id, limit, wait, CancellationToken::new())
		.await?;

	let messages = result
		.messages
		.into_iter()
		.map(|m| MessageView {
			id: m.id,
			payload: m.payload,
			callback_url: m.callback_url,
			callback_expires_at: m.callback_expires_at,
			created_at: m.created_at,
		})
		.collect();
	Ok(Json(PollResponse {
		messages,
		has_more: result.has_more,
	}))
}

/// `POST /openclaw/messages/ack`
pub async fn ack(
	State(state): State<AppState>,
	Extension(tenant): Extension<AuthedTenant>,
	Json(request): Json<AckRequest>,
) -> Result<Json<AckResponse>, ApiError> {
	let requested = request.message_ids.len() as u64;
	let acknowledged = state
		.core
		.ack_messages(tenant.0.id, &request.message_ids)
		.await?;
	Ok(Json(AckResponse {
		acknowledged,
		requested,
	}))
}
