//! Pairing management surface.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::{Extension, Json};
use relay_proto::{
	ConversationView, GenerateCodeRequest, GenerateCodeResponse, PairingListResponse,
	UnpairRequest,
};
use relay_core::RelayError;
use relay_store::ConversationStore;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::AppState;
use crate::auth::AuthedTenant;
use crate::error::ApiError;

/// `POST /openclaw/pairing/generate`
pub async fn generate(
	State(state): State<AppState>,
	Extension(tenant): Extension<AuthedTenant>,
	Json(request): Json<GenerateCodeRequest>,
) -> Result<Json<GenerateCodeResponse>, ApiError> {
	let ttl = request.expiry_seconds.map(Duration::from_secs);
	let code = state
		.core
		.generate_code(tenant.0.id, ttl, request.metadata)
		.await?;
	Ok(Json(GenerateCodeResponse {
		code: code.code,
		expires_at: code.expires_at,
	}))
}

/// `POST /openclaw/pairing/unpair`
///
/// A tenant may only release conversations paired to itself; an unpaired
/// conversation unpairs as a no-op.
pub async fn unpair(
	State(state): State<AppState>,
	Extension(tenant): Extension<AuthedTenant>,
	Json(request): Json<UnpairRequest>,
) -> Result<Json<Value>, ApiError> {
	let conversation = state
		.core
		.resolve(&request.conversation_key)
		.await?
		.ok_or(RelayError::NotFound)?;
	if conversation
		.tenant_id
		.is_some_and(|owner| owner != tenant.0.id)
	{
		return Err(RelayError::Forbidden.into());
	}
	let changed = state.core.unpair(&request.conversation_key).await?;
	Ok(Json(json!({ "success": true, "changed": changed })))
}

/// Query parameters of `GET /openclaw/pairing/list`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
	/// Page size, clamped to 1..=100. Default 50.
	pub limit: Option<u32>,
	/// Page offset. Default 0.
	pub offset: Option<u32>,
}

/// `GET /openclaw/pairing/list?limit=&offset=`
pub async fn list(
	State(state): State<AppState>,
	Extension(tenant): Extension<AuthedTenant>,
	Query(query): Query<ListQuery>,
) -> Result<Json<PairingListResponse>, ApiError> {
	let limit = query.limit.unwrap_or(50).clamp(1, 100);
	let offset = query.offset.unwrap_or(0);
	let conversations = state
		.core
		.store()
		.list_conversations(tenant.0.id, limit, offset)
		.await
		.map_err(RelayError::from)?;

	let conversations = conversations
		.into_iter()
		.map(|c| ConversationView {
			conversation_key: c.conversation_key,
			state: c.state,
			tenant_id: c.tenant_id,
			first_seen_at: c.first_seen_at,
			last_seen_at: c.last_seen_at,
			paired_at: c.paired_at,
		})
		.collect();
	Ok(Json(PairingListResponse {
		conversations,
		limit,
		offset,
	}))
}
