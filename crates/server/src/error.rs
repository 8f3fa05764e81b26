//! Engine-error to HTTP-response mapping.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use relay_core::RelayError;
use relay_proto::{ErrorBody, ErrorCode};

/// A handler failure carrying its taxonomy code.
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl From<RelayError> for ApiError {
	fn from(err: RelayError) -> Self {
		Self(err)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let code = self.0.code();
		// Storage and internal detail stays in the logs, not on the wire.
		let message = match &self.0 {
			RelayError::Store(err) => {
				tracing::error!(error = %err, "storage failure surfaced to client");
				"storage failure".to_string()
			}
			RelayError::Internal(err) => {
				tracing::error!(error = %err, "internal failure surfaced to client");
				"internal error".to_string()
			}
			other => other.to_string(),
		};
		let status = StatusCode::from_u16(code.http_status())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		let mut response = (status, Json(ErrorBody::new(code, message))).into_response();
		if code == ErrorCode::RateLimited {
			response
				.headers_mut()
				.insert(header::RETRY_AFTER, HeaderValue::from_static("60"));
		}
		response
	}
}
