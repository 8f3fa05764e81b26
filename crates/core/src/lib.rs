//! The relay's routing and delivery engine.
//!
//! # Purpose
//!
//! - Accept chat-platform webhook events, enforce idempotency, resolve the
//!   conversation-to-tenant mapping, and drive the pairing state machine
//!   including in-chat command parsing.
//! - Maintain the per-tenant at-least-once message queue (lease/ack/expiry)
//!   and its long-poll retrieval combining the queue with broker wakeups.
//! - Post tenant replies to the platform's per-message callback URL within
//!   its TTL, with outcome accounting and no automatic retry.
//! - Issue and redeem single-use pairing codes under a per-tenant cap.
//! - Periodically reclaim expired messages, codes, and sessions.
//! - Authorize tenants by bearer-token hash and rate-limit them per minute.
//! - Exclude the HTTP surface itself; `relay-server` owns framing, extraction,
//!   and status mapping and calls into [`RelayCore`].
//!
//! # Mental model
//!
//! - The queue (in the store) is the source of truth. The bus is only a
//!   wakeup signal; anything lost there costs one poll latency, never data.
//! - Every state transition the invariants depend on is a single atomic
//!   store operation; the engine holds no cross-call in-process state beyond
//!   the broker registry and the local rate-limiter window map.
//! - A conversation is the unit of routing: exactly one tenant (or none)
//!   receives its messages, decided by the pairing state machine.
//! - Callback URLs are untrusted-but-required and validated only by TTL; the
//!   TTL, not re-delivery, bounds wasted work after a crash mid-lease.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints |
//! |---|---|---|
//! | [`RelayCore`] | The engine facade over store, bus, broker, HTTP client | MUST be shared as `Arc`; all methods take `&self` |
//! | [`CoreConfig`] | Engine tunables (TTLs, caps, signing secret) | Fixed at construction |
//! | [`RelayError`] | Engine failure taxonomy | Maps 1:1 onto `relay_proto::ErrorCode` |
//! | [`authz::RateLimiter`] | Sliding-window admission check | Implementations MUST be safe under concurrent `check` calls |
//! | [`reclaim::Reclaimer`] | Periodic expiry sweep | MUST be singleton per process; stops on cancel |
//!
//! # Invariants
//!
//! 1. Repeated enqueues with one source event id produce exactly one row and
//!    return the same id.
//!    - Enforced in: `RelayCore::enqueue_for`, store `enqueue`.
//!    - Tested by: `tests::queue::enqueue_is_idempotent_per_source_event`.
//! 2. Two concurrent leases for one tenant return disjoint messages.
//!    - Enforced in: store `lease_queued` (skip-locked / table mutex).
//!    - Tested by: `tests::queue::concurrent_leases_are_disjoint`.
//! 3. Only the owning tenant's poll ever returns a conversation's messages.
//!    - Enforced in: `RelayCore::handle_content` (enqueue targets the paired
//!      tenant), lease filters by tenant.
//!    - Tested by: `tests::longpoll::two_tenants_never_cross`.
//! 4. A redeemed code never redeems again; a second redemption attempt fails
//!    with `INVALID_PAIRING_CODE` for any conversation.
//!    - Enforced in: store `redeem_and_pair` conditional update.
//!    - Tested by: `tests::pairing::redeemed_code_never_redeems_again`.
//! 5. A tenant holds at most five active codes; expiry or redemption frees a
//!    slot.
//!    - Enforced in: store `insert_code_capped` under the tenant row lock.
//!    - Tested by: `tests::pairing::active_code_cap_is_enforced`.
//! 6. A reply after `callback_expires_at` fails with `CALLBACK_EXPIRED`,
//!    creates no outbound row, and performs no HTTP request.
//!    - Enforced in: `RelayCore::send_reply` TTL guard before insert.
//!    - Tested by: `tests::egress::expired_callback_is_rejected_without_post`.
//! 7. `poll` returns within the caller's wait bound even with no activity and
//!    no bus, and always runs at least one lease attempt.
//!    - Enforced in: `RelayCore::poll` deadline select.
//!    - Tested by: `tests::longpoll::poll_deadline_is_hard`.
//! 8. With a signing secret configured, any byte difference in the HMAC
//!    rejects the webhook.
//!    - Enforced in: `ingress::verify_signature` (constant-time MAC verify).
//!    - Tested by: `tests::ingress::signature_mismatch_is_rejected`.
//!
//! # Data flow
//!
//! Inbound: platform webhook → signature check → payload parse → conversation
//! upsert (callback last-writer-wins) → command dispatch (pairing) or
//! state-directed enqueue + bus wakeup → synchronous template response.
//!
//! Outbound: tenant long-poll drains the queue (lease `QUEUED → DELIVERED`)
//! → tenant processes → `send_reply` posts to the captured callback URL with
//! deadline `min(callback_expiry − now, 10 s)` → outbound row `SENT`/`FAILED`
//! → tenant acks (`DELIVERED → ACKED`).
//!
//! # Concurrency and ordering
//!
//! - Within one conversation, messages are enqueued in webhook arrival order
//!   and drained by `(created_at, seq)`; across a tenant's conversations the
//!   drain interleaves fairly by arrival. Nothing is promised across tenants.
//! - Every suspension point (store, bus, HTTP, deadline wait) honors the
//!   caller's cancellation; a cancelled poll unsubscribes from the broker via
//!   its drop guard before returning.
//! - Transactions are the sole concurrency control for ingress/egress
//!   transitions; no cross-row application locks exist.
//!
//! # Failure modes and recovery
//!
//! - Crash after lease, before the tenant sees it: the row stays `DELIVERED`
//!   until its callback TTL lapses and the reclaimer expires it.
//! - Bus outage: enqueues succeed, wakeups are lost, polls degrade to their
//!   deadline. No data loss.
//! - Callback POST failure or timeout: outbound row `FAILED` with error text;
//!   the tenant may re-issue within the TTL. No automatic retry.
//! - Storage failure mid-webhook before the payload is captured: the error
//!   propagates (the platform retries; idempotency absorbs the replay).

pub mod authz;
pub mod egress;
pub mod ingress;
pub mod longpoll;
pub mod pairing;
pub mod queue;
pub mod reclaim;
pub mod routing;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use relay_bus::{Broker, Bus, BusError};
use relay_proto::ErrorCode;
use relay_store::{Store, StoreError};
use thiserror::Error;

pub use authz::{LocalRateLimiter, RateDecision, RateLimiter, RedisRateLimiter};
pub use egress::ReplyOutcome;
pub use longpoll::PollResult;
pub use reclaim::Reclaimer;

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct CoreConfig {
	/// HMAC-SHA256 secret for webhook signatures; unset accepts all bodies.
	pub signing_secret: Option<String>,
	/// Lifetime of a captured callback URL.
	pub callback_ttl: Duration,
	/// Upper bound on a queued message's life when it carries no callback.
	pub queue_ttl: Duration,
	/// Default pairing-code lifetime.
	pub code_ttl_default: Duration,
	/// Maximum pairing-code lifetime a tenant may request.
	pub code_ttl_max: Duration,
	/// Maximum simultaneously active codes per tenant.
	pub active_code_cap: u32,
	/// Retention horizon for delivered inbound rows.
	pub retention: Duration,
	/// Reclaimer sweep interval.
	pub reclaim_interval: Duration,
}

impl Default for CoreConfig {
	fn default() -> Self {
		Self {
			signing_secret: None,
			callback_ttl: Duration::from_secs(55),
			queue_ttl: Duration::from_secs(900),
			code_ttl_default: Duration::from_secs(600),
			code_ttl_max: Duration::from_secs(1800),
			active_code_cap: 5,
			retention: Duration::from_secs(7 * 24 * 3600),
			reclaim_interval: Duration::from_secs(300),
		}
	}
}

/// Engine failure taxonomy.
#[derive(Debug, Error)]
pub enum RelayError {
	/// Missing, unknown, or disabled bearer token.
	#[error("unauthorized")]
	Unauthorized,

	/// The resource belongs to a different tenant.
	#[error("forbidden")]
	Forbidden,

	/// Referenced entity does not exist.
	#[error("not found")]
	NotFound,

	/// Webhook signature mismatch.
	#[error("invalid webhook signature")]
	InvalidSignature,

	/// Webhook body failed to parse.
	#[error("invalid payload: {0}")]
	InvalidPayload(String),

	/// The tenant already holds the maximum number of active codes.
	#[error("active pairing code limit reached")]
	CodeLimitReached,

	/// Pairing code unknown or already used.
	#[error("invalid pairing code")]
	InvalidPairingCode,

	/// Pairing code exists but its TTL lapsed.
	#[error("expired pairing code")]
	ExpiredPairingCode,

	/// Reply arrived after the message's callback TTL.
	#[error("callback expired")]
	CallbackExpired,

	/// Per-tenant rate limit exceeded.
	#[error("rate limited")]
	RateLimited,

	/// Unexpected internal condition.
	#[error("internal error: {0}")]
	Internal(String),

	/// Storage failure, wrapped at the service boundary.
	#[error("storage failure: {0}")]
	Store(#[from] StoreError),

	/// Pub/sub failure on a path where it cannot be degraded.
	#[error("bus failure: {0}")]
	Bus(#[from] BusError),
}

impl RelayError {
	/// The tenant-facing code this error surfaces as.
	#[must_use]
	pub fn code(&self) -> ErrorCode {
		match self {
			Self::Unauthorized => ErrorCode::Unauthorized,
			Self::Forbidden => ErrorCode::Forbidden,
			Self::NotFound => ErrorCode::NotFound,
			Self::InvalidSignature => ErrorCode::InvalidSignature,
			Self::InvalidPayload(_) => ErrorCode::InvalidInput,
			Self::CodeLimitReached => ErrorCode::CodeLimitReached,
			Self::InvalidPairingCode => ErrorCode::InvalidPairingCode,
			Self::ExpiredPairingCode => ErrorCode::ExpiredPairingCode,
			Self::CallbackExpired => ErrorCode::CallbackExpired,
			Self::RateLimited => ErrorCode::RateLimited,
			Self::Internal(_) => ErrorCode::Internal,
			Self::Store(_) => ErrorCode::Database,
			Self::Bus(_) => ErrorCode::External,
		}
	}
}

/// The engine facade.
///
/// Construct once, share as `Arc`. Behavior-bearing methods live in the
/// per-concern modules (`ingress`, `pairing`, `queue`, `longpoll`, `egress`,
/// `reclaim`, `authz`) as `impl RelayCore` blocks.
#[derive(Debug)]
pub struct RelayCore {
	store: Arc<dyn Store>,
	bus: Arc<dyn Bus>,
	broker: Broker,
	http: reqwest::Client,
	config: CoreConfig,
}

impl RelayCore {
	/// Build the engine over its collaborators.
	#[must_use]
	pub fn new(store: Arc<dyn Store>, bus: Arc<dyn Bus>, config: CoreConfig) -> Arc<Self> {
		let broker = Broker::new(bus.clone());
		Arc::new(Self {
			store,
			bus,
			broker,
			http: reqwest::Client::new(),
			config,
		})
	}

	/// The engine's storage handle.
	#[must_use]
	pub fn store(&self) -> &Arc<dyn Store> {
		&self.store
	}

	/// The engine's configuration.
	#[must_use]
	pub fn config(&self) -> &CoreConfig {
		&self.config
	}
}
