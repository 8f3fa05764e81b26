//! Reply egress.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use relay_proto::{ReplyRequest, ReplyResponse};

use crate::AppState;
use crate::auth::AuthedTenant;
use crate::error::ApiError;

/// `POST /openclaw/reply`
///
/// Ownership and TTL violations surface as taxonomy errors; a POST that ran
/// and failed answers 502 with the outbound id so the tenant can correlate.
pub async fn reply(
	State(state): State<AppState>,
	Extension(tenant): Extension<AuthedTenant>,
	Json(request): Json<ReplyRequest>,
) -> Result<Response, ApiError> {
	let outcome = state
		.core
		.send_reply(tenant.0.id, request.message_id, request.response)
		.await?;

	let body = ReplyResponse {
		success: outcome.success,
		outbound_message_id: Some(outcome.outbound_id),
		error: outcome.error,
	};
	let status = if outcome.success {
		StatusCode::OK
	} else {
		StatusCode::BAD_GATEWAY
	};
	Ok((status, Json(body)).into_response())
}
