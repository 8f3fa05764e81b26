//! Platform webhook ingress.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use relay_proto::platform::SkillResponse;

use crate::AppState;
use crate::error::ApiError;

/// Signature header the platform sends: `sha256=<hex-hmac-of-raw-body>`.
const SIGNATURE_HEADER: &str = "x-kakao-signature";

/// `POST /{channel}/webhook`
///
/// The channel path segment is deployment routing only; the authoritative
/// channel id comes from the payload's `bot.id`.
pub async fn webhook(
	State(state): State<AppState>,
	Path(_channel): Path<String>,
	headers: HeaderMap,
	body: Bytes,
) -> Result<Json<SkillResponse>, ApiError> {
	let signature = headers
		.get(SIGNATURE_HEADER)
		.and_then(|value| value.to_str().ok());
	let response = state.core.webhook(&body, signature).await?;
	Ok(Json(response))
}
