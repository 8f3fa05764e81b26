//! Tenant authentication middleware with rate-limit headers.
//!
//! The bearer token arrives in `Authorization: Bearer …` or the `token`
//! query parameter; both are equivalent. Every authenticated response
//! carries `X-RateLimit-Limit`, `X-RateLimit-Remaining`, and
//! `X-RateLimit-Reset`; a denied request additionally gets
//! `Retry-After: 60` before any handler work runs.

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use relay_core::{RateDecision, RelayError};
use relay_store::TenantRecord;

use crate::AppState;
use crate::error::ApiError;

/// The authenticated tenant, attached to the request extensions.
#[derive(Debug, Clone)]
pub struct AuthedTenant(pub TenantRecord);

/// Pull the bearer token from the header or the `token` query parameter.
fn extract_token(req: &Request) -> Option<String> {
	if let Some(value) = req.headers().get(axum::http::header::AUTHORIZATION)
		&& let Ok(value) = value.to_str()
		&& let Some(token) = value.strip_prefix("Bearer ")
	{
		return Some(token.trim().to_string());
	}
	req.uri().query().and_then(|query| {
		query
			.split('&')
			.find_map(|pair| pair.strip_prefix("token="))
			.map(str::to_string)
	})
}

fn apply_rate_headers(response: &mut Response, decision: RateDecision) {
	let headers = response.headers_mut();
	headers.insert("x-ratelimit-limit", int_header(decision.limit as i64));
	headers.insert("x-ratelimit-remaining", int_header(decision.remaining as i64));
	headers.insert("x-ratelimit-reset", int_header(decision.reset_epoch));
}

fn int_header(value: i64) -> HeaderValue {
	HeaderValue::from_str(&value.to_string())
		.unwrap_or_else(|_| HeaderValue::from_static("0"))
}

/// Authenticate, admit, and annotate one tenant API request.
pub async fn tenant_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
	let Some(token) = extract_token(&req) else {
		return ApiError(RelayError::Unauthorized).into_response();
	};
	let tenant = match state.core.authenticate(&token).await {
		Ok(tenant) => tenant,
		Err(err) => return ApiError(err).into_response(),
	};

	let decision = state
		.limiter
		.check(tenant.id, tenant.rate_limit_per_min)
		.await;
	if !decision.allowed {
		let mut response = ApiError(RelayError::RateLimited).into_response();
		apply_rate_headers(&mut response, decision);
		return response;
	}

	req.extensions_mut().insert(AuthedTenant(tenant));
	let mut response = next.run(req).await;
	apply_rate_headers(&mut response, decision);
	response
}
