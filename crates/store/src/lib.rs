//! Durable records for the relay.
//!
//! # Purpose
//!
//! - Define the storage traits the routing core runs on: tenants,
//!   conversations, inbound/outbound messages, pairing codes, sessions.
//! - Provide two interchangeable implementations: [`PgStore`] (Postgres via
//!   sqlx) for deployments and [`MemStore`] (single-mutex tables) for tests
//!   and single-process development runs.
//! - Exclude business policy: TTL clamping, code drawing, command parsing,
//!   and rate limiting live in `relay-core`; this crate only guarantees the
//!   storage-level atomics those policies rest on.
//!
//! # Mental model
//!
//! Every compound state transition the relay's invariants depend on is a
//! single store operation, atomic inside one implementation call:
//!
//! - [`MessageStore::enqueue`] — `INSERT … ON CONFLICT (source_event_id) DO
//!   NOTHING` is the idempotency contract; a duplicate returns the existing
//!   row's id.
//! - [`MessageStore::lease_queued`] — `SELECT … FOR UPDATE SKIP LOCKED` plus
//!   the `QUEUED → DELIVERED` transition in one transaction; two concurrent
//!   leases never observe the same row.
//! - [`PairingCodeStore::redeem_and_pair`] — the single-use conditional
//!   update (`used_at IS NULL AND expires_at > now()`) and the conversation's
//!   `* → PAIRED` transition commit together or not at all.
//! - [`PairingCodeStore::insert_code_capped`] — the active-code cap check and
//!   the insert are serialized per tenant.
//!
//! # Invariants
//!
//! 1. A conversation's `tenant_id` is non-null iff its state is `PAIRED`.
//!    - Enforced in: every transition writing `state` or `tenant_id`.
//!    - Tested by: `memory::tests::pair_unpair_block_keep_tenant_invariant`.
//! 2. At most one inbound row exists per non-null `source_event_id`.
//!    - Enforced in: `enqueue` (partial unique index / map check).
//!    - Tested by: `memory::tests::enqueue_same_event_id_is_idempotent`.
//! 3. Concurrent `lease_queued` calls return disjoint row sets.
//!    - Enforced in: `FOR UPDATE SKIP LOCKED` (Postgres), the table mutex
//!      (memory).
//!    - Tested by: `relay-core` queue tests.
//! 4. A pairing code is consumed by at most one redemption.
//!    - Enforced in: the conditional update in `redeem_and_pair`.
//!    - Tested by: `memory::tests::redeem_is_single_use`.

pub mod memory;
pub mod postgres;
mod records;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_proto::{
	ConversationKey, MessageId, OutboundId, SessionKind, TenantId,
};
pub use records::*;
use thiserror::Error;

/// Storage-layer failure.
///
/// The service boundary wraps this into the tenant-facing `DATABASE` code.
#[derive(Debug, Error)]
pub enum StoreError {
	/// Postgres operation failed.
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	/// Schema migration failed.
	#[error("migration error: {0}")]
	Migrate(#[from] sqlx::migrate::MigrateError),

	/// A stored value failed to decode into its domain type.
	#[error("corrupt row: {0}")]
	Decode(String),
}

/// Convenience alias used throughout the storage traits.
pub type StoreResult<T> = Result<T, StoreError>;

/// Tenant rows.
#[async_trait]
pub trait TenantStore: Send + Sync {
	/// Insert a tenant.
	async fn create_tenant(&self, new: NewTenant) -> StoreResult<TenantRecord>;

	/// Fetch by id.
	async fn tenant_by_id(&self, id: TenantId) -> StoreResult<Option<TenantRecord>>;

	/// Fetch by bearer-token hash. The authorization hot path.
	async fn tenant_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<TenantRecord>>;

	/// Atomically replace the token hash. In-flight requests holding the old
	/// token fail at their next authorization.
	async fn replace_token_hash(&self, id: TenantId, token_hash: &str) -> StoreResult<bool>;

	/// Set or clear the disabled timestamp.
	async fn set_tenant_disabled(&self, id: TenantId, disabled: bool) -> StoreResult<bool>;

	/// Delete the tenant: codes and messages go with it, conversations are
	/// detached back to `UNPAIRED`.
	async fn delete_tenant(&self, id: TenantId) -> StoreResult<bool>;
}

/// Conversation rows.
#[async_trait]
pub trait ConversationStore: Send + Sync {
	/// Create the row on first contact (state `UNPAIRED`) and always update
	/// `last_seen_at` and the callback fields (last-writer-wins).
	async fn upsert_on_inbound(
		&self,
		key: &ConversationKey,
		callback_url: Option<&str>,
		callback_expires_at: Option<DateTime<Utc>>,
	) -> StoreResult<ConversationRecord>;

	/// Fetch by joined key.
	async fn conversation(&self, conversation_key: &str) -> StoreResult<Option<ConversationRecord>>;

	/// Transition to `UNPAIRED` and clear the tenant. Returns false when the
	/// row is absent or was already unpaired.
	async fn unpair(&self, conversation_key: &str) -> StoreResult<bool>;

	/// Admin block (`* → BLOCKED`, tenant cleared) or unblock
	/// (`BLOCKED → UNPAIRED`).
	async fn set_blocked(&self, conversation_key: &str, blocked: bool) -> StoreResult<bool>;

	/// Page through a tenant's conversations, most recently seen first.
	async fn list_conversations(
		&self,
		tenant_id: TenantId,
		limit: u32,
		offset: u32,
	) -> StoreResult<Vec<ConversationRecord>>;
}

/// Inbound queue and outbound accounting rows.
#[async_trait]
pub trait MessageStore: Send + Sync {
	/// Insert a `QUEUED` row; idempotent over `source_event_id`.
	async fn enqueue(&self, new: NewInbound) -> StoreResult<EnqueueOutcome>;

	/// Atomically lease up to `limit` `QUEUED` rows (creation order) to
	/// `DELIVERED`, returning them oldest first.
	async fn lease_queued(
		&self,
		tenant_id: TenantId,
		limit: u32,
	) -> StoreResult<Vec<InboundMessageRecord>>;

	/// Count of rows still `QUEUED` for the tenant.
	async fn queued_count(&self, tenant_id: TenantId) -> StoreResult<u64>;

	/// Transition the given ids to `ACKED` where still non-terminal and owned
	/// by the tenant. Idempotent; returns how many moved.
	async fn ack(&self, tenant_id: TenantId, ids: &[MessageId]) -> StoreResult<u64>;

	/// Fetch one inbound row.
	async fn inbound_by_id(&self, id: MessageId) -> StoreResult<Option<InboundMessageRecord>>;

	/// Transition every non-terminal row whose callback expiry has passed to
	/// `EXPIRED`. Returns the count.
	async fn expire_overdue(&self) -> StoreResult<u64>;

	/// Transition non-terminal rows created before the horizon to `EXPIRED`,
	/// regardless of callback expiry. The queue-TTL bound for rows that
	/// carried no callback. Returns the count.
	async fn expire_stale(&self, created_before: DateTime<Utc>) -> StoreResult<u64>;

	/// Hard-delete inbound rows created before the horizon. Returns the count.
	async fn delete_inbound_older_than(&self, horizon: DateTime<Utc>) -> StoreResult<u64>;

	/// Insert a `PENDING` outbound row.
	async fn insert_outbound(&self, new: NewOutbound) -> StoreResult<OutboundMessageRecord>;

	/// Mark an outbound row `SENT` and stamp `sent_at`.
	async fn mark_outbound_sent(&self, id: OutboundId) -> StoreResult<bool>;

	/// Mark an outbound row `FAILED` with error text.
	async fn mark_outbound_failed(&self, id: OutboundId, error: &str) -> StoreResult<bool>;

	/// Fetch one outbound row.
	async fn outbound_by_id(&self, id: OutboundId) -> StoreResult<Option<OutboundMessageRecord>>;
}

/// Pairing code rows.
#[async_trait]
pub trait PairingCodeStore: Send + Sync {
	/// Insert a code unless the tenant already holds `cap` active codes or
	/// the code text collides with a live code.
	async fn insert_code_capped(&self, new: NewCode, cap: u32) -> StoreResult<CodeInsert>;

	/// Atomic single-use redemption: consume the code and pair the
	/// conversation in the same transaction.
	async fn redeem_and_pair(
		&self,
		code: &str,
		conversation_key: &ConversationKey,
	) -> StoreResult<RedeemOutcome>;

	/// Count of unused, unexpired codes for the tenant.
	async fn active_code_count(&self, tenant_id: TenantId) -> StoreResult<u64>;

	/// Delete expired unused codes. Returns the count.
	async fn delete_expired_codes(&self) -> StoreResult<u64>;
}

/// Session rows (admin / portal / tenant).
#[async_trait]
pub trait SessionStore: Send + Sync {
	/// Insert a session.
	async fn create_session(&self, new: NewSession) -> StoreResult<SessionRecord>;

	/// Fetch an unexpired session by kind and token hash.
	async fn session_by_token_hash(
		&self,
		kind: SessionKind,
		token_hash: &str,
	) -> StoreResult<Option<SessionRecord>>;

	/// Delete expired sessions of every kind. Returns the count.
	async fn delete_expired_sessions(&self) -> StoreResult<u64>;
}

/// The full storage surface the relay core runs on.
pub trait Store:
	TenantStore
	+ ConversationStore
	+ MessageStore
	+ PairingCodeStore
	+ SessionStore
	+ std::fmt::Debug
{
}

impl<T> Store for T where
	T: TenantStore
		+ ConversationStore
		+ MessageStore
		+ PairingCodeStore
		+ SessionStore
		+ std::fmt::Debug
{
}

pub use memory::MemStore;
pub use postgres::PgStore;
