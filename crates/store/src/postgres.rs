//! Postgres store.
//!
//! Runtime-built queries only (no compile-time macro checks), so the crate
//! builds without a live database. Compound transitions run inside explicit
//! transactions; single-statement updates lean on Postgres' own atomicity.
//! The lease uses `FOR UPDATE SKIP LOCKED` so concurrent polls for the same
//! tenant never observe the same row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_proto::{
	CodeId, ConversationKey, MessageId, MessageStatus, OutboundId, OutboundStatus, PairingState,
	SessionKind, TenantId, TenantMode,
};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::{
	CodeInsert, ConversationRecord, ConversationStore, EnqueueOutcome, InboundMessageRecord,
	MessageStore, NewCode, NewInbound, NewOutbound, NewSession, NewTenant, OutboundMessageRecord,
	PairingCodeRecord, PairingCodeStore, RedeemOutcome, SessionRecord, SessionStore, StoreError,
	StoreResult, TenantRecord, TenantStore,
};

/// Postgres-backed [`crate::Store`] implementation.
#[derive(Debug, Clone)]
pub struct PgStore {
	pool: PgPool,
}

impl PgStore {
	/// Connect a pool to the given database URL.
	pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
		let pool = PgPoolOptions::new()
			.max_connections(max_connections)
			.connect(database_url)
			.await?;
		Ok(Self { pool })
	}

	/// Wrap an existing pool.
	#[must_use]
	pub fn from_pool(pool: PgPool) -> Self {
		Self { pool }
	}

	/// Apply embedded migrations.
	pub async fn migrate(&self) -> StoreResult<()> {
		sqlx::migrate!("./migrations").run(&self.pool).await?;
		Ok(())
	}
}

#[derive(sqlx::FromRow)]
struct TenantRow {
	id: Uuid,
	name: String,
	token_hash: String,
	mode: String,
	rate_limit_per_min: i32,
	disabled_at: Option<DateTime<Utc>>,
	created_at: DateTime<Utc>,
}

impl TryFrom<TenantRow> for TenantRecord {
	type Error = StoreError;

	fn try_from(row: TenantRow) -> Result<Self, StoreError> {
		Ok(Self {
			id: TenantId(row.id),
			name: row.name,
			mode: TenantMode::parse(&row.mode)
				.ok_or_else(|| StoreError::Decode(format!("tenant mode {:?}", row.mode)))?,
			token_hash: row.token_hash,
			rate_limit_per_min: row.rate_limit_per_min.max(0) as u32,
			disabled_at: row.disabled_at,
			created_at: row.created_at,
		})
	}
}

const TENANT_COLS: &str = "id, name, token_hash, mode, rate_limit_per_min, disabled_at, created_at";

#[derive(sqlx::FromRow)]
struct ConversationRow {
	conversation_key: String,
	channel_id: String,
	user_key: String,
	state: String,
	tenant_id: Option<Uuid>,
	callback_url: Option<String>,
	callback_expires_at: Option<DateTime<Utc>>,
	first_seen_at: DateTime<Utc>,
	last_seen_at: DateTime<Utc>,
	paired_at: Option<DateTime<Utc>>,
}

impl TryFrom<ConversationRow> for ConversationRecord {
	type Error = StoreError;

	fn try_from(row: ConversationRow) -> Result<Self, StoreError> {
		Ok(Self {
			state: PairingState::parse(&row.state)
				.ok_or_else(|| StoreError::Decode(format!("pairing state {:?}", row.state)))?,
			channel_id: row.channel_id,
			user_key: row.user_key,
			conversation_key: row.conversation_key,
			tenant_id: row.tenant_id.map(TenantId),
			callback_url: row.callback_url,
			callback_expires_at: row.callback_expires_at,
			first_seen_at: row.first_seen_at,
			last_seen_at: row.last_seen_at,
			paired_at: row.paired_at,
		})
	}
}

const CONVERSATION_COLS: &str = "conversation_key, channel_id, user_key, state, tenant_id, \
	 callback_url, callback_expires_at, first_seen_at, last_seen_at, paired_at";

#[derive(sqlx::FromRow)]
struct InboundRow {
	id: Uuid,
	seq: i64,
	tenant_id: Uuid,
	conversation_key: String,
	raw_payload: Value,
	payload: Value,
	callback_url: Option<String>,
	callback_expires_at: Option<DateTime<Utc>>,
	status: String,
	source_event_id: Option<String>,
	created_at: DateTime<Utc>,
	delivered_at: Option<DateTime<Utc>>,
	acked_at: Option<DateTime<Utc>>,
}

impl TryFrom<InboundRow> for InboundMessageRecord {
	type Error = StoreError;

	fn try_from(row: InboundRow) -> Result<Self, StoreError> {
		Ok(Self {
			status: MessageStatus::parse(&row.status)
				.ok_or_else(|| StoreError::Decode(format!("message status {:?}", row.status)))?,
			id: MessageId(row.id),
			seq: row.seq,
			tenant_id: TenantId(row.tenant_id),
			conversation_key: row.conversation_key,
			raw_payload: row.raw_payload,
			payload: row.payload,
			callback_url: row.callback_url,
			callback_expires_at: row.callback_expires_at,
			source_event_id: row.source_event_id,
			created_at: row.created_at,
			delivered_at: row.delivered_at,
			acked_at: row.acked_at,
		})
	}
}

const INBOUND_COLS: &str = "id, seq, tenant_id, conversation_key, raw_payload, payload, \
	 callback_url, callback_expires_at, status, source_event_id, created_at, delivered_at, acked_at";

#[derive(sqlx::FromRow)]
struct OutboundRow {
	id: Uuid,
	tenant_id: Uuid,
	inbound_id: Option<Uuid>,
	conversation_key: String,
	response: Value,
	status: String,
	error: Option<String>,
	created_at: DateTime<Utc>,
	sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<OutboundRow> for OutboundMessageRecord {
	type Error = StoreError;

	fn try_from(row: OutboundRow) -> Result<Self, StoreError> {
		Ok(Self {
			status: OutboundStatus::parse(&row.status)
				.ok_or_else(|| StoreError::Decode(format!("outbound status {:?}", row.status)))?,
			id: OutboundId(row.id),
			tenant_id: TenantId(row.tenant_id),
			inbound_id: row.inbound_id.map(MessageId),
			conversation_key: row.conversation_key,
			response: row.response,
			error: row.error,
			created_at: row.created_at,
			sent_at: row.sent_at,
		})
	}
}

const OUTBOUND_COLS: &str =
	"id, tenant_id, inbound_id, conversation_key, response, status, error, created_at, sent_at";

#[derive(sqlx::FromRow)]
struct CodeRow {
	id: Uuid,
	tenant_id: Uuid,
	code: String,
	expires_at: DateTime<Utc>,
	used_at: Option<DateTime<Utc>>,
	used_by: Option<String>,
	metadata: Option<Value>,
	created_at: DateTime<Utc>,
}

impl From<CodeRow> for PairingCodeRecord {
	fn from(row: CodeRow) -> Self {
		Self {
			id: CodeId(row.id),
			tenant_id: TenantId(row.tenant_id),
			code: row.code,
			expires_at: row.expires_at,
			used_at: row.used_at,
			used_by: row.used_by,
			metadata: row.metadata,
			created_at: row.created_at,
		}
	}
}

const CODE_COLS: &str = "id, tenant_id, code, expires_at, used_at, used_by, metadata, created_at";

#[derive(sqlx::FromRow)]
struct SessionRow {
	id: Uuid,
	kind: String,
	token_hash: String,
	tenant_id: Option<Uuid>,
	expires_at: DateTime<Utc>,
	created_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for SessionRecord {
	type Error = StoreError;

	fn try_from(row: SessionRow) -> Result<Self, StoreError> {
		Ok(Self {
			kind: SessionKind::parse(&row.kind)
				.ok_or_else(|| StoreError::Decode(format!("session kind {:?}", row.kind)))?,
			id: row.id,
			token_hash: row.token_hash,
			tenant_id: row.tenant_id.map(TenantId),
			expires_at: row.expires_at,
			created_at: row.created_at,
		})
	}
}

const SESSION_COLS: &str = "id, kind, token_hash, tenant_id, expires_at, created_at";

#[async_trait]
impl TenantStore for PgStore {
	async fn create_tenant(&self, new: NewTenant) -> StoreResult<TenantRecord> {
		let sql = format!(
			"INSERT INTO tenants (id, name, token_hash, mode, rate_limit_per_min) \
			 VALUES ($1, $2, $3, $4, $5) RETURNING {TENANT_COLS}"
		);
		let row: TenantRow = sqlx::query_as(&sql)
			.bind(Uuid::new_v4())
			.bind(&new.name)
			.bind(&new.token_hash)
			.bind(new.mode.as_str())
			.bind(new.rate_limit_per_min as i32)
			.fetch_one(&self.pool)
			.await?;
		row.try_into()
	}

	async fn tenant_by_id(&self, id: TenantId) -> StoreResult<Option<TenantRecord>> {
		let sql = format!("SELECT {TENANT_COLS} FROM tenants WHERE id = $1");
		let row: Option<TenantRow> = sqlx::query_as(&sql).bind(id.0).fetch_optional(&self.pool).await?;
		row.map(TryInto::try_into).transpose()
	}

	async fn tenant_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<TenantRecord>> {
		let sql = format!("SELECT {TENANT_COLS} FROM tenants WHERE token_hash = $1");
		let row: Option<TenantRow> = sqlx::query_as(&sql)
			.bind(token_hash)
			.fetch_optional(&self.pool)
			.await?;
		row.map(TryInto::try_into).transpose()
	}

	async fn replace_token_hash(&self, id: TenantId, token_hash: &str) -> StoreResult<bool> {
		let done = sqlx::query("UPDATE tenants SET token_hash = $2 WHERE id = $1")
			.bind(id.0)
			.bind(token_hash)
			.execute(&self.pool)
			.await?;
		Ok(done.rows_affected() > 0)
	}

	async fn set_tenant_disabled(&self, id: TenantId, disabled: bool) -> StoreResult<bool> {
		let sql = if disabled {
			"UPDATE tenants SET disabled_at = now() WHERE id = $1"
		} else {
			"UPDATE tenants SET disabled_at = NULL WHERE id = $1"
		};
		let done = sqlx::query(sql).bind(id.0).execute(&self.pool).await?;
		Ok(done.rows_affected() > 0)
	}

	async fn delete_tenant(&self, id: TenantId) -> StoreResult<bool> {
		let mut tx = self.pool.begin().await?;
		// Detach before delete so the tenant-iff-paired check never trips on
		// the FK's SET NULL.
		sqlx::query(
			"UPDATE conversations SET state = 'UNPAIRED', tenant_id = NULL WHERE tenant_id = $1",
		)
		.bind(id.0)
		.execute(&mut *tx)
		.await?;
		let done = sqlx::query("DELETE FROM tenants WHERE id = $1")
			.bind(id.0)
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;
		Ok(done.rows_affected() > 0)
	}
}

#[async_trait]
impl ConversationStore for PgStore {
	async fn upsert_on_inbound(
		&self,
		key: &ConversationKey,
		callback_url: Option<&str>,
		callback_expires_at: Option<DateTime<Utc>>,
	) -> StoreResult<ConversationRecord> {
		let sql = format!(
			"INSERT INTO conversations \
			 (conversation_key, channel_id, user_key, state, callback_url, callback_expires_at) \
			 VALUES ($1, $2, $3, 'UNPAIRED', $4, $5) \
			 ON CONFLICT (conversation_key) DO UPDATE SET \
			   last_seen_at = now(), \
			   callback_url = EXCLUDED.callback_url, \
			   callback_expires_at = EXCLUDED.callback_expires_at \
			 RETURNING {CONVERSATION_COLS}"
		);
		let row: ConversationRow = sqlx::query_as(&sql)
			.bind(key.joined())
			.bind(&key.channel_id)
			.bind(&key.user_key)
			.bind(callback_url)
			.bind(callback_expires_at)
			.fetch_one(&self.pool)
			.await?;
		row.try_into()
	}

	async fn conversation(&self, conversation_key: &str) -> StoreResult<Option<ConversationRecord>> {
		let sql = format!("SELECT {CONVERSATION_COLS} FROM conversations WHERE conversation_key = $1");
		let row: Option<ConversationRow> = sqlx::query_as(&sql)
			.bind(conversation_key)
			.fetch_optional(&self.pool)
			.await?;
		row.map(TryInto::try_into).transpose()
	}

	async fn unpair(&self, conversation_key: &str) -> StoreResult<bool> {
		let done = sqlx::query(
			"UPDATE conversations SET state = 'UNPAIRED', tenant_id = NULL \
			 WHERE conversation_key = $1 AND state IN ('PAIRED', 'PENDING')",
		)
		.bind(conversation_key)
		.execute(&self.pool)
		.await?;
		Ok(done.rows_affected() > 0)
	}

	async fn set_blocked(&self, conversation_key: &str, blocked: bool) -> StoreResult<bool> {
		let sql = if blocked {
			"UPDATE conversations SET state = 'BLOCKED', tenant_id = NULL \
			 WHERE conversation_key = $1 AND state <> 'BLOCKED'"
		} else {
			"UPDATE conversations SET state = 'UNPAIRED', tenant_id = NULL \
			 WHERE conversation_key = $1 AND state = 'BLOCKED'"
		};
		let done = sqlx::query(sql)
			.bind(conversation_key)
			.execute(&self.pool)
			.await?;
		Ok(done.rows_affected() > 0)
	}

	async fn list_conversations(
		&self,
		tenant_id: TenantId,
		limit: u32,
		offset: u32,
	) -> StoreResult<Vec<ConversationRecord>> {
		let sql = format!(
			"SELECT {CONVERSATION_COLS} FROM conversations WHERE tenant_id = $1 \
			 ORDER BY last_seen_at DESC LIMIT $2 OFFSET $3"
		);
		let rows: Vec<ConversationRow> = sqlx::query_as(&sql)
			.bind(tenant_id.0)
			.bind(limit as i64)
			.bind(offset as i64)
			.fetch_all(&self.pool)
			.await?;
		rows.into_iter().map(TryInto::try_into).collect()
	}
}

#[async_trait]
impl MessageStore for PgStore {
	async fn enqueue(&self, new: NewInbound) -> StoreResult<EnqueueOutcome> {
		let id = Uuid::new_v4();
		let inserted: Option<(Uuid,)> = sqlx::query_as(
			"INSERT INTO inbound_messages \
			 (id, tenant_id, conversation_key, raw_payload, payload, \
			  callback_url, callback_expires_at, status, source_event_id) \
			 VALUES ($1, $2, $3, $4, $5, $6, $7, 'QUEUED', $8) \
			 ON CONFLICT (source_event_id) WHERE source_event_id IS NOT NULL DO NOTHING \
			 RETURNING id",
		)
		.bind(id)
		.bind(new.tenant_id.0)
		.bind(&new.conversation_key)
		.bind(&new.raw_payload)
		.bind(&new.payload)
		.bind(new.callback_url.as_deref())
		.bind(new.callback_expires_at)
		.bind(new.source_event_id.as_deref())
		.fetch_optional(&self.pool)
		.await?;

		if let Some((id,)) = inserted {
			return Ok(EnqueueOutcome::Inserted(MessageId(id)));
		}
		// Conflict: the row for this source event already exists.
		let existing: (Uuid,) =
			sqlx::query_as("SELECT id FROM inbound_messages WHERE source_event_id = $1")
				.bind(new.source_event_id.as_deref())
				.fetch_one(&self.pool)
				.await?;
		Ok(EnqueueOutcome::Duplicate(MessageId(existing.0)))
	}

	async fn lease_queued(
		&self,
		tenant_id: TenantId,
		limit: u32,
	) -> StoreResult<Vec<InboundMessageRecord>> {
		let sql = format!(
			"WITH picked AS ( \
			   SELECT id FROM inbound_messages \
			   WHERE tenant_id = $1 AND status = 'QUEUED' \
			   ORDER BY created_at, seq \
			   LIMIT $2 \
			   FOR UPDATE SKIP LOCKED \
			 ) \
			 UPDATE inbound_messages m \
			 SET status = 'DELIVERED', delivered_at = now() \
			 FROM picked WHERE m.id = picked.id \
			 RETURNING {}",
			INBOUND_COLS
				.split(", ")
				.map(|c| format!("m.{c}"))
				.collect::<Vec<_>>()
				.join(", ")
		);
		let rows: Vec<InboundRow> = sqlx::query_as(&sql)
			.bind(tenant_id.0)
			.bind(limit as i64)
			.fetch_all(&self.pool)
			.await?;
		let mut records: Vec<InboundMessageRecord> = rows
			.into_iter()
			.map(TryInto::try_into)
			.collect::<Result<_, _>>()?;
		// UPDATE ... FROM does not preserve the CTE's ordering.
		records.sort_by(|a, b| (a.created_at, a.seq).cmp(&(b.created_at, b.seq)));
		Ok(records)
	}

	async fn queued_count(&self, tenant_id: TenantId) -> StoreResult<u64> {
		let count: i64 = sqlx::query_scalar(
			"SELECT count(*) FROM inbound_messages WHERE tenant_id = $1 AND status = 'QUEUED'",
		)
		.bind(tenant_id.0)
		.fetch_one(&self.pool)
		.await?;
		Ok(count.max(0) as u64)
	}

	async fn ack(&self, tenant_id: TenantId, ids: &[MessageId]) -> StoreResult<u64> {
		if ids.is_empty() {
			return Ok(0);
		}
		let raw: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
		let done = sqlx::query(
			"UPDATE inbound_messages SET status = 'ACKED', acked_at = now() \
			 WHERE id = ANY($1) AND tenant_id = $2 AND status IN ('QUEUED', 'DELIVERED')",
		)
		.bind(&raw)
		.bind(tenant_id.0)
		.execute(&self.pool)
		.await?;
		Ok(done.rows_affected())
	}

	async fn inbound_by_id(&self, id: MessageId) -> StoreResult<Option<InboundMessageRecord>> {
		let sql = format!("SELECT {INBOUND_COLS} FROM inbound_messages WHERE id = $1");
		let row: Option<InboundRow> = sqlx::query_as(&sql).bind(id.0).fetch_optional(&self.pool).await?;
		row.map(TryInto::try_into).transpose()
	}

	async fn expire_overdue(&self) -> StoreResult<u64> {
		let done = sqlx::query(
			"UPDATE inbound_messages SET status = 'EXPIRED' \
			 WHERE callback_expires_at < now() AND status IN ('QUEUED', 'DELIVERED')",
		)
		.execute(&self.pool)
		.await?;
		Ok(done.rows_affected())
	}

	async fn expire_stale(&self, created_before: DateTime<Utc>) -> StoreResult<u64> {
		let done = sqlx::query(
			"UPDATE inbound_messages SET status = 'EXPIRED' \
			 WHERE created_at < $1 AND status IN ('QUEUED', 'DELIVERED')",
		)
		.bind(created_before)
		.execute(&self.pool)
		.await?;
		Ok(done.rows_affected())
	}

	async fn delete_inbound_older_than(&self, horizon: DateTime<Utc>) -> StoreResult<u64> {
		let done = sqlx::query("DELETE FROM inbound_messages WHERE created_at < $1")
			.bind(horizon)
			.execute(&self.pool)
			.await?;
		Ok(done.rows_affected())
	}

	async fn insert_outbound(&self, new: NewOutbound) -> StoreResult<OutboundMessageRecord> {
		let sql = format!(
			"INSERT INTO outbound_messages \
			 (id, tenant_id, inbound_id, conversation_key, response, status) \
			 VALUES ($1, $2, $3, $4, $5, 'PENDING') RETURNING {OUTBOUND_COLS}"
		);
		let row: OutboundRow = sqlx::query_as(&sql)
			.bind(Uuid::new_v4())
			.bind(new.tenant_id.0)
			.bind(new.inbound_id.map(|id| id.0))
			.bind(&new.conversation_key)
			.bind(&new.response)
			.fetch_one(&self.pool)
			.await?;
		row.try_into()
	}

	async fn mark_outbound_sent(&self, id: OutboundId) -> StoreResult<bool> {
		let done = sqlx::query(
			"UPDATE outbound_messages SET status = 'SENT', sent_at = now(), error = NULL \
			 WHERE id = $1",
		)
		.bind(id.0)
		.execute(&self.pool)
		.await?;
		Ok(done.rows_affected() > 0)
	}

	async fn mark_outbound_failed(&self, id: OutboundId, error: &str) -> StoreResult<bool> {
		let done = sqlx::query("UPDATE outbound_messages SET status = 'FAILED', error = $2 WHERE id = $1")
			.bind(id.0)
			.bind(error)
			.execute(&self.pool)
			.await?;
		Ok(done.rows_affected() > 0)
	}

	async fn outbound_by_id(&self, id: OutboundId) -> StoreResult<Option<OutboundMessageRecord>> {
		let sql = format!("SELECT {OUTBOUND_COLS} FROM outbound_messages WHERE id = $1");
		let row: Option<OutboundRow> = sqlx::query_as(&sql).bind(id.0).fetch_optional(&self.pool).await?;
		row.map(TryInto::try_into).transpose()
	}
}

#[async_trait]
impl PairingCodeStore for PgStore {
	async fn insert_code_capped(&self, new: NewCode, cap: u32) -> StoreResult<CodeInsert> {
		let mut tx = self.pool.begin().await?;
		// Serialize cap checks per tenant on the tenant row.
		sqlx::query("SELECT id FROM tenants WHERE id = $1 FOR UPDATE")
			.bind(new.tenant_id.0)
			.execute(&mut *tx)
			.await?;
		let active: i64 = sqlx::query_scalar(
			"SELECT count(*) FROM pairing_codes \
			 WHERE tenant_id = $1 AND used_at IS NULL AND expires_at > now()",
		)
		.bind(new.tenant_id.0)
		.fetch_one(&mut *tx)
		.await?;
		if active >= cap as i64 {
			return Ok(CodeInsert::CapReached);
		}
		let sql = format!(
			"INSERT INTO pairing_codes (id, tenant_id, code, expires_at, metadata) \
			 VALUES ($1, $2, $3, $4, $5) \
			 ON CONFLICT (code) DO NOTHING \
			 RETURNING {CODE_COLS}"
		);
		let row: Option<CodeRow> = sqlx::query_as(&sql)
			.bind(Uuid::new_v4())
			.bind(new.tenant_id.0)
			.bind(&new.code)
			.bind(new.expires_at)
			.bind(&new.metadata)
			.fetch_optional(&mut *tx)
			.await?;
		match row {
			Some(row) => {
				tx.commit().await?;
				Ok(CodeInsert::Inserted(row.into()))
			}
			None => Ok(CodeInsert::DuplicateCode),
		}
	}

	async fn redeem_and_pair(
		&self,
		code: &str,
		conversation_key: &ConversationKey,
	) -> StoreResult<RedeemOutcome> {
		let mut tx = self.pool.begin().await?;
		let redeemed: Option<(Uuid,)> = sqlx::query_as(
			"UPDATE pairing_codes SET used_at = now(), used_by = $2 \
			 WHERE code = $1 AND used_at IS NULL AND expires_at > now() \
			 RETURNING tenant_id",
		)
		.bind(code)
		.bind(conversation_key.joined())
		.fetch_optional(&mut *tx)
		.await?;

		let Some((tenant_id,)) = redeemed else {
			// Unused-but-expired reads differently from unknown/used.
			let expired: Option<(bool,)> = sqlx::query_as(
				"SELECT expires_at <= now() FROM pairing_codes WHERE code = $1 AND used_at IS NULL",
			)
			.bind(code)
			.fetch_optional(&mut *tx)
			.await?;
			return Ok(match expired {
				Some((true,)) => RedeemOutcome::Expired,
				_ => RedeemOutcome::Invalid,
			});
		};

		sqlx::query(
			"INSERT INTO conversations \
			 (conversation_key, channel_id, user_key, state, tenant_id, paired_at) \
			 VALUES ($1, $2, $3, 'PAIRED', $4, now()) \
			 ON CONFLICT (conversation_key) DO UPDATE SET \
			   state = 'PAIRED', tenant_id = $4, paired_at = now(), last_seen_at = now()",
		)
		.bind(conversation_key.joined())
		.bind(&conversation_key.channel_id)
		.bind(&conversation_key.user_key)
		.bind(tenant_id)
		.execute(&mut *tx)
		.await?;
		tx.commit().await?;
		Ok(RedeemOutcome::Redeemed(TenantId(tenant_id)))
	}

	async fn active_code_count(&self, tenant_id: TenantId) -> StoreResult<u64> {
		let count: i64 = sqlx::query_scalar(
			"SELECT count(*) FROM pairing_codes \
			 WHERE tenant_id = $1 AND used_at IS NULL AND expires_at > now()",
		)
		.bind(tenant_id.0)
		.fetch_one(&self.pool)
		.await?;
		Ok(count.max(0) as u64)
	}

	async fn delete_expired_codes(&self) -> StoreResult<u64> {
		let done =
			sqlx::query("DELETE FROM pairing_codes WHERE used_at IS NULL AND expires_at <= now()")
				.execute(&self.pool)
				.await?;
		Ok(done.rows_affected())
	}
}

#[async_trait]
impl SessionStore for PgStore {
	async fn create_session(&self, new: NewSession) -> StoreResult<SessionRecord> {
		let sql = format!(
			"INSERT INTO sessions (id, kind, token_hash, tenant_id, expires_at) \
			 VALUES ($1, $2, $3, $4, $5) RETURNING {SESSION_COLS}"
		);
		let row: SessionRow = sqlx::query_as(&sql)
			.bind(Uuid::new_v4())
			.bind(new.kind.as_str())
			.bind(&new.token_hash)
			.bind(new.tenant_id.map(|id| id.0))
			.bind(new.expires_at)
			.fetch_one(&self.pool)
			.await?;
		row.try_into()
	}

	async fn session_by_token_hash(
		&self,
		kind: SessionKind,
		token_hash: &str,
	) -> StoreResult<Option<SessionRecord>> {
		let sql = format!(
			"SELECT {SESSION_COLS} FROM sessions \
			 WHERE kind = $1 AND token_hash = $2 AND expires_at > now()"
		);
		let row: Option<SessionRow> = sqlx::query_as(&sql)
			.bind(kind.as_str())
			.bind(token_hash)
			.fetch_optional(&self.pool)
			.await?;
		row.map(TryInto::try_into).transpose()
	}

	async fn delete_expired_sessions(&self) -> StoreResult<u64> {
		let done = sqlx::query("DELETE FROM sessions WHERE expires_at <= now()")
			.execute(&self.pool)
			.await?;
		Ok(done.rows_affected())
	}
}
