//! HTTP surface for the relay.
//!
//! Owns what the engine deliberately excludes: request framing, token
//! extraction, rate-limit headers, status mapping, and the operator CLI.
//! Everything behavior-bearing calls into [`relay_core::RelayCore`].
//!
//! Routes:
//!
//! - `POST /{channel}/webhook` — platform ingress (signature-checked).
//! - `GET  /openclaw/messages` — long-poll drain (Bearer auth).
//! - `POST /openclaw/messages/ack` — acknowledge leased messages.
//! - `POST /openclaw/reply` — post a reply through the captured callback.
//! - `POST /openclaw/pairing/generate` — issue a pairing code.
//! - `POST /openclaw/pairing/unpair` — drop a pairing.
//! - `GET  /openclaw/pairing/list` — page the tenant's conversations.
//! - `GET  /healthz` — liveness.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use relay_core::{RateLimiter, RelayCore};
use relay_proto::{ErrorBody, ErrorCode};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Hard cap on webhook (and any other request) handling time.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
	/// The routing and delivery engine.
	pub core: Arc<RelayCore>,
	/// Per-tenant admission control.
	pub limiter: Arc<dyn RateLimiter>,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
	let tenant_api = Router::new()
		.route("/messages", get(handlers::messages::poll))
		.route("/messages/ack", post(handlers::messages::ack))
		.route("/reply", post(handlers::reply::reply))
		.route("/pairing/generate", post(handlers::pairing::generate))
		.route("/pairing/unpair", post(handlers::pairing::unpair))
		.route("/pairing/list", get(handlers::pairing::list))
		.layer(middleware::from_fn_with_state(
			state.clone(),
			auth::tenant_auth,
		));

	Router::new()
		.route("/healthz", get(handlers::health::healthz))
		.route("/{channel}/webhook", post(handlers::webhook::webhook))
		.nest("/openclaw", tenant_api)
		.layer(TraceLayer::new_for_http())
		.layer(CatchPanicLayer::custom(recover_panic))
		.layer(TimeoutLayer::new(REQUEST_TIMEOUT))
		.with_state(state)
}

/// Recovered handler panics surface as the `INTERNAL` taxonomy code.
fn recover_panic(err: Box<dyn std::any::Any + Send + 'static>) -> axum::response::Response {
	let detail = err
		.downcast_ref::<String>()
		.map(String::as_str)
		.or_else(|| err.downcast_ref::<&str>().copied())
		.unwrap_or("unknown panic");
	tracing::error!(panic = detail, "handler panicked");
	(
		StatusCode::INTERNAL_SERVER_ERROR,
		axum::Json(ErrorBody::new(ErrorCode::Internal, "internal error")),
	)
		.into_response()
}
