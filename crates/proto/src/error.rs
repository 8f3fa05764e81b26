//! Tenant-facing error taxonomy and its HTTP mapping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable error codes surfaced to tenants and the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// Missing or unknown bearer token.
	Unauthorized,
	/// Authenticated, but the resource belongs to another tenant.
	Forbidden,
	/// Token failed validation before lookup.
	InvalidToken,
	/// Tenant session exists but is not paired to a conversation.
	SessionNotPaired,
	/// Request body failed validation.
	ValidationError,
	/// Malformed input.
	InvalidInput,
	/// A required field is absent.
	MissingRequired,
	/// Referenced entity does not exist.
	NotFound,
	/// Entity already exists.
	AlreadyExists,
	/// State conflict.
	Conflict,
	/// Conversation is already paired.
	AlreadyPaired,
	/// Pairing code unknown or already used.
	InvalidPairingCode,
	/// Pairing code exists but its TTL lapsed.
	ExpiredPairingCode,
	/// Tenant holds the maximum number of active codes.
	CodeLimitReached,
	/// Webhook signature mismatch.
	InvalidSignature,
	/// Per-tenant rate limit exceeded.
	RateLimited,
	/// Reply arrived after the callback TTL.
	CallbackExpired,
	/// The platform rejected or never received the callback POST.
	CallbackFailed,
	/// An external collaborator failed.
	External,
	/// Storage-layer failure.
	Database,
	/// Any other internal failure.
	Internal,
}

impl ErrorCode {
	/// HTTP status this code maps to.
	#[must_use]
	pub fn http_status(self) -> u16 {
		match self {
			Self::Unauthorized | Self::InvalidToken | Self::SessionNotPaired => 401,
			Self::Forbidden => 403,
			Self::ValidationError
			| Self::InvalidInput
			| Self::MissingRequired
			| Self::InvalidPairingCode
			| Self::ExpiredPairingCode
			| Self::CodeLimitReached
			| Self::InvalidSignature
			| Self::CallbackExpired => 400,
			Self::NotFound => 404,
			Self::AlreadyExists | Self::Conflict | Self::AlreadyPaired => 409,
			Self::RateLimited => 429,
			Self::CallbackFailed | Self::External => 502,
			Self::Database | Self::Internal => 500,
		}
	}

	/// Wire text of this code.
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Unauthorized => "UNAUTHORIZED",
			Self::Forbidden => "FORBIDDEN",
			Self::InvalidToken => "INVALID_TOKEN",
			Self::SessionNotPaired => "SESSION_NOT_PAIRED",
			Self::ValidationError => "VALIDATION_ERROR",
			Self::InvalidInput => "INVALID_INPUT",
			Self::MissingRequired => "MISSING_REQUIRED",
			Self::NotFound => "NOT_FOUND",
			Self::AlreadyExists => "ALREADY_EXISTS",
			Self::Conflict => "CONFLICT",
			Self::AlreadyPaired => "ALREADY_PAIRED",
			Self::InvalidPairingCode => "INVALID_PAIRING_CODE",
			Self::ExpiredPairingCode => "EXPIRED_PAIRING_CODE",
			Self::CodeLimitReached => "CODE_LIMIT_REACHED",
			Self::InvalidSignature => "INVALID_SIGNATURE",
			Self::RateLimited => "RATE_LIMITED",
			Self::CallbackExpired => "CALLBACK_EXPIRED",
			Self::CallbackFailed => "CALLBACK_FAILED",
			Self::External => "EXTERNAL",
			Self::Database => "DATABASE",
			Self::Internal => "INTERNAL",
		}
	}
}

/// JSON error body: `{ "error": "...", "code": "...", "details": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
	/// Human-readable message.
	pub error: String,
	/// Stable machine code.
	pub code: ErrorCode,
	/// Optional structured detail.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}

impl ErrorBody {
	/// Build a body with no details.
	#[must_use]
	pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
		Self {
			error: error.into(),
			code,
			details: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_mapping_matches_taxonomy() {
		assert_eq!(ErrorCode::Unauthorized.http_status(), 401);
		assert_eq!(ErrorCode::Forbidden.http_status(), 403);
		assert_eq!(ErrorCode::NotFound.http_status(), 404);
		assert_eq!(ErrorCode::AlreadyPaired.http_status(), 409);
		assert_eq!(ErrorCode::InvalidPairingCode.http_status(), 400);
		assert_eq!(ErrorCode::RateLimited.http_status(), 429);
		assert_eq!(ErrorCode::CallbackExpired.http_status(), 400);
		assert_eq!(ErrorCode::CallbackFailed.http_status(), 502);
		assert_eq!(ErrorCode::Database.http_status(), 500);
	}

	#[test]
	fn wire_text_is_screaming_snake() {
		let json = serde_json::to_string(&ErrorCode::InvalidPairingCode).unwrap();
		assert_eq!(json, "\"INVALID_PAIRING_CODE\"");
		assert_eq!(ErrorCode::CodeLimitReached.as_str(), "CODE_LIMIT_REACHED");
	}
}
