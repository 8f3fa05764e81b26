//! Single-process store backed by in-memory tables.
//!
//! One mutex guards all tables, so every trait method is atomic exactly the
//! way the Postgres implementation's transactions are. Used by the test
//! suite and by `development`-mode single-process runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_proto::{
	ConversationKey, MessageId, MessageStatus, OutboundId, OutboundStatus, PairingState,
	SessionKind, TenantId,
};
use uuid::Uuid;

use crate::{
	CodeInsert, ConversationRecord, ConversationStore, EnqueueOutcome, InboundMessageRecord,
	MessageStore, NewCode, NewInbound, NewOutbound, NewSession, NewTenant, OutboundMessageRecord,
	PairingCodeRecord, PairingCodeStore, RedeemOutcome, SessionRecord, SessionStore, StoreResult,
	TenantRecord, TenantStore,
};

#[derive(Debug, Default)]
struct Inner {
	tenants: HashMap<TenantId, TenantRecord>,
	conversations: HashMap<String, ConversationRecord>,
	/// Inbound rows keyed by insertion sequence; iteration order is queue order.
	inbound: BTreeMap<i64, InboundMessageRecord>,
	inbound_by_id: HashMap<MessageId, i64>,
	inbound_by_event: HashMap<String, MessageId>,
	outbound: HashMap<OutboundId, OutboundMessageRecord>,
	codes: HashMap<String, PairingCodeRecord>,
	sessions: HashMap<String, SessionRecord>,
	next_seq: i64,
}

/// In-memory [`crate::Store`] implementation.
#[derive(Debug, Default)]
pub struct MemStore {
	inner: Mutex<Inner>,
}

impl MemStore {
	/// Create an empty store.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}
}

fn detach_conversation(conv: &mut ConversationRecord) {
	conv.state = PairingState::Unpaired;
	conv.tenant_id = None;
}

#[async_trait]
impl TenantStore for MemStore {
	async fn create_tenant(&self, new: NewTenant) -> StoreResult<TenantRecord> {
		let record = TenantRecord {
			id: TenantId::generate(),
			name: new.name,
			token_hash: new.token_hash,
			mode: new.mode,
			rate_limit_per_min: new.rate_limit_per_min,
			disabled_at: None,
			created_at: Utc::now(),
		};
		let mut inner = self.inner.lock().unwrap();
		inner.tenants.insert(record.id, record.clone());
		Ok(record)
	}

	async fn tenant_by_id(&self, id: TenantId) -> StoreResult<Option<TenantRecord>> {
		let inner = self.inner.lock().unwrap();
		Ok(inner.tenants.get(&id).cloned())
	}

	async fn tenant_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<TenantRecord>> {
		let inner = self.inner.lock().unwrap();
		Ok(inner
			.tenants
			.values()
			.find(|t| t.token_hash == token_hash)
			.cloned())
	}

	async fn replace_token_hash(&self, id: TenantId, token_hash: &str) -> StoreResult<bool> {
		let mut inner = self.inner.lock().unwrap();
		match inner.tenants.get_mut(&id) {
			Some(tenant) => {
				tenant.token_hash = token_hash.to_string();
				Ok(true)
			}
			None => Ok(false),
		}
	}

	async fn set_tenant_disabled(&self, id: TenantId, disabled: bool) -> StoreResult<bool> {
		let mut inner = self.inner.lock().unwrap();
		match inner.tenants.get_mut(&id) {
			Some(tenant) => {
				tenant.disabled_at = disabled.then(Utc::now);
				Ok(true)
			}
			None => Ok(false),
		}
	}

	async fn delete_tenant(&self, id: TenantId) -> StoreResult<bool> {
		let mut inner = self.inner.lock().unwrap();
		if inner.tenants.remove(&id).is_none() {
			return Ok(false);
		}
		for conv in inner.conversations.values_mut() {
			if conv.tenant_id == Some(id) {
				detach_conversation(conv);
			}
		}
		inner.codes.retain(|_, c| c.tenant_id != id);
		let dead: Vec<i64> = inner
			.inbound
			.iter()
			.filter(|(_, m)| m.tenant_id == id)
			.map(|(seq, _)| *seq)
			.collect();
		for seq in dead {
			if let Some(msg) = inner.inbound.remove(&seq) {
				inner.inbound_by_id.remove(&msg.id);
				if let Some(eid) = &msg.source_event_id {
					inner.inbound_by_event.remove(eid);
				}
			}
		}
		inner.outbound.retain(|_, o| o.tenant_id != id);
		inner
			.sessions
			.retain(|_, s| s.tenant_id != Some(id));
		Ok(true)
	}
}

#[async_trait]
impl ConversationStore for MemStore {
	async fn upsert_on_inbound(
		&self,
		key: &ConversationKey,
		callback_url: Option<&str>,
		callback_expires_at: Option<DateTime<Utc>>,
	) -> StoreResult<ConversationRecord> {
		let now = Utc::now();
		let joined = key.joined();
		let mut inner = self.inner.lock().unwrap();
		let record = inner
			.conversations
			.entry(joined.clone())
			.or_insert_with(|| ConversationRecord {
				channel_id: key.channel_id.clone(),
				user_key: key.user_key.clone(),
				conversation_key: joined,
				state: PairingState::Unpaired,
				tenant_id: None,
				callback_url: None,
				callback_expires_at: None,
				first_seen_at: now,
				last_seen_at: now,
				paired_at: None,
			});
		record.last_seen_at = now;
		record.callback_url = callback_url.map(str::to_string);
		record.callback_expires_at = callback_expires_at;
		Ok(record.clone())
	}

	async fn conversation(&self, conversation_key: &str) -> StoreResult<Option<ConversationRecord>> {
		let inner = self.inner.lock().unwrap();
		Ok(inner.conversations.get(conversation_key).cloned())
	}

	async fn unpair(&self, conversation_key: &str) -> StoreResult<bool> {
		let mut inner = self.inner.lock().unwrap();
		match inner.conversations.get_mut(conversation_key) {
			Some(conv) if matches!(conv.state, PairingState::Paired | PairingState::Pending) => {
				detach_conversation(conv);
				Ok(true)
			}
			_ => Ok(false),
		}
	}

	async fn set_blocked(&self, conversation_key: &str, blocked: bool) -> StoreResult<bool> {
		let mut inner = self.inner.lock().unwrap();
		let Some(conv) = inner.conversations.get_mut(conversation_key) else {
			return Ok(false);
		};
		if blocked {
			if conv.state == PairingState::Blocked {
				return Ok(false);
			}
			conv.state = PairingState::Blocked;
			conv.tenant_id = None;
			Ok(true)
		} else if conv.state == PairingState::Blocked {
			detach_conversation(conv);
			Ok(true)
		} else {
			Ok(false)
		}
	}

	async fn list_conversations(
		&self,
		tenant_id: TenantId,
		limit: u32,
		offset: u32,
	) -> StoreResult<Vec<ConversationRecord>> {
		let inner = self.inner.lock().unwrap();
		let mut rows: Vec<ConversationRecord> = inner
			.conversations
			.values()
			.filter(|c| c.tenant_id == Some(tenant_id))
			.cloned()
			.collect();
		rows.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
		Ok(rows
			.into_iter()
			.skip(offset as usize)
			.take(limit as usize)
			.collect())
	}
}

#[async_trait]
impl MessageStore for MemStore {
	async fn enqueue(&self, new: NewInbound) -> StoreResult<EnqueueOutcome> {
		let mut inner = self.inner.lock().unwrap();
		if let Some(eid) = &new.source_event_id
			&& let Some(existing) = inner.inbound_by_event.get(eid)
		{
			return Ok(EnqueueOutcome::Duplicate(*existing));
		}
		let seq = inner.next_seq;
		inner.next_seq += 1;
		let record = InboundMessageRecord {
			id: MessageId::generate(),
			seq,
			tenant_id: new.tenant_id,
			conversation_key: new.conversation_key,
			raw_payload: new.raw_payload,
			payload: new.payload,
			callback_url: new.callback_url,
			callback_expires_at: new.callback_expires_at,
			status: MessageStatus::Queued,
			source_event_id: new.source_event_id,
			created_at: Utc::now(),
			delivered_at: None,
			acked_at: None,
		};
		inner.inbound_by_id.insert(record.id, seq);
		if let Some(eid) = &record.source_event_id {
			inner.inbound_by_event.insert(eid.clone(), record.id);
		}
		let id = record.id;
		inner.inbound.insert(seq, record);
		Ok(EnqueueOutcome::Inserted(id))
	}

	async fn lease_queued(
		&self,
		tenant_id: TenantId,
		limit: u32,
	) -> StoreResult<Vec<InboundMessageRecord>> {
		let now = Utc::now();
		let mut inner = self.inner.lock().unwrap();
		let mut leased = Vec::new();
		for msg in inner.inbound.values_mut() {
			if leased.len() >= limit as usize {
				break;
			}
			if msg.tenant_id == tenant_id && msg.status == MessageStatus::Queued {
				msg.status = MessageStatus::Delivered;
				msg.delivered_at = Some(now);
				leased.push(msg.clone());
			}
		}
		Ok(leased)
	}

	async fn queued_count(&self, tenant_id: TenantId) -> StoreResult<u64> {
		let inner = self.inner.lock().unwrap();
		Ok(inner
			.inbound
			.values()
			.filter(|m| m.tenant_id == tenant_id && m.status == MessageStatus::Queued)
			.count() as u64)
	}

	async fn ack(&self, tenant_id: TenantId, ids: &[MessageId]) -> StoreResult<u64> {
		let now = Utc::now();
		let mut inner = self.inner.lock().unwrap();
		let mut moved = 0;
		for id in ids {
			let Some(seq) = inner.inbound_by_id.get(id).copied() else {
				continue;
			};
			if let Some(msg) = inner.inbound.get_mut(&seq)
				&& msg.tenant_id == tenant_id
				&& !msg.status.is_terminal()
			{
				msg.status = MessageStatus::Acked;
				msg.acked_at = Some(now);
				moved += 1;
			}
		}
		Ok(moved)
	}

	async fn inbound_by_id(&self, id: MessageId) -> StoreResult<Option<InboundMessageRecord>> {
		let inner = self.inner.lock().unwrap();
		let Some(seq) = inner.inbound_by_id.get(&id) else {
			return Ok(None);
		};
		Ok(inner.inbound.get(seq).cloned())
	}

	async fn expire_overdue(&self) -> StoreResult<u64> {
		let now = Utc::now();
		let mut inner = self.inner.lock().unwrap();
		let mut expired = 0;
		for msg in inner.inbound.values_mut() {
			if let Some(deadline) = msg.callback_expires_at
				&& deadline < now
				&& !msg.status.is_terminal()
			{
				msg.status = MessageStatus::Expired;
				expired += 1;
			}
		}
		Ok(expired)
	}

	async fn expire_stale(&self, created_before: DateTime<Utc>) -> StoreResult<u64> {
		let mut inner = self.inner.lock().unwrap();
		let mut expired = 0;
		for msg in inner.inbound.values_mut() {
			if msg.created_at < created_before && !msg.status.is_terminal() {
				msg.status = MessageStatus::Expired;
				expired += 1;
			}
		}
		Ok(expired)
	}

	async fn delete_inbound_older_than(&self, horizon: DateTime<Utc>) -> StoreResult<u64> {
		let mut inner = self.inner.lock().unwrap();
		let dead: Vec<i64> = inner
			.inbound
			.iter()
			.filter(|(_, m)| m.created_at < horizon)
			.map(|(seq, _)| *seq)
			.collect();
		let count = dead.len() as u64;
		for seq in dead {
			if let Some(msg) = inner.inbound.remove(&seq) {
				inner.inbound_by_id.remove(&msg.id);
				if let Some(eid) = &msg.source_event_id {
					inner.inbound_by_event.remove(eid);
				}
			}
		}
		Ok(count)
	}

	async fn insert_outbound(&self, new: NewOutbound) -> StoreResult<OutboundMessageRecord> {
		let record = OutboundMessageRecord {
			id: OutboundId::generate(),
			tenant_id: new.tenant_id,
			inbound_id: new.inbound_id,
			conversation_key: new.conversation_key,
			response: new.response,
			status: OutboundStatus::Pending,
			error: None,
			created_at: Utc::now(),
			sent_at: None,
		};
		let mut inner = self.inner.lock().unwrap();
		inner.outbound.insert(record.id, record.clone());
		Ok(record)
	}

	async fn mark_outbound_sent(&self, id: OutboundId) -> StoreResult<bool> {
		let mut inner = self.inner.lock().unwrap();
		match inner.outbound.get_mut(&id) {
			Some(out) => {
				out.status = OutboundStatus::Sent;
				out.sent_at = Some(Utc::now());
				out.error = None;
				Ok(true)
			}
			None => Ok(false),
		}
	}

	async fn mark_outbound_failed(&self, id: OutboundId, error: &str) -> StoreResult<bool> {
		let mut inner = self.inner.lock().unwrap();
		match inner.outbound.get_mut(&id) {
			Some(out) => {
				out.status = OutboundStatus::Failed;
				out.error = Some(error.to_string());
				Ok(true)
			}
			None => Ok(false),
		}
	}

	async fn outbound_by_id(&self, id: OutboundId) -> StoreResult<Option<OutboundMessageRecord>> {
		let inner = self.inner.lock().unwrap();
		Ok(inner.outbound.get(&id).cloned())
	}
}

#[async_trait]
impl PairingCodeStore for MemStore {
	async fn insert_code_capped(&self, new: NewCode, cap: u32) -> StoreResult<CodeInsert> {
		let now = Utc::now();
		let mut inner = self.inner.lock().unwrap();
		let active = inner
			.codes
			.values()
			.filter(|c| c.tenant_id == new.tenant_id && c.is_active(now))
			.count() as u32;
		if active >= cap {
			return Ok(CodeInsert::CapReached);
		}
		if inner.codes.contains_key(&new.code) {
			return Ok(CodeInsert::DuplicateCode);
		}
		let record = PairingCodeRecord {
			id: relay_proto::CodeId::generate(),
			tenant_id: new.tenant_id,
			code: new.code.clone(),
			expires_at: new.expires_at,
			used_at: None,
			used_by: None,
			metadata: new.metadata,
			created_at: now,
		};
		inner.codes.insert(new.code, record.clone());
		Ok(CodeInsert::Inserted(record))
	}

	async fn redeem_and_pair(
		&self,
		code: &str,
		conversation_key: &ConversationKey,
	) -> StoreResult<RedeemOutcome> {
		let now = Utc::now();
		let joined = conversation_key.joined();
		let mut inner = self.inner.lock().unwrap();
		let tenant_id = match inner.codes.get_mut(code) {
			None => return Ok(RedeemOutcome::Invalid),
			Some(c) if c.used_at.is_some() => return Ok(RedeemOutcome::Invalid),
			Some(c) if c.expires_at <= now => return Ok(RedeemOutcome::Expired),
			Some(c) => {
				c.used_at = Some(now);
				c.used_by = Some(joined.clone());
				c.tenant_id
			}
		};
		let conv = inner
			.conversations
			.entry(joined.clone())
			.or_insert_with(|| ConversationRecord {
				channel_id: conversation_key.channel_id.clone(),
				user_key: conversation_key.user_key.clone(),
				conversation_key: joined,
				state: PairingState::Unpaired,
				tenant_id: None,
				callback_url: None,
				callback_expires_at: None,
				first_seen_at: now,
				last_seen_at: now,
				paired_at: None,
			});
		conv.state = PairingState::Paired;
		conv.tenant_id = Some(tenant_id);
		conv.paired_at = Some(now);
		Ok(RedeemOutcome::Redeemed(tenant_id))
	}

	async fn active_code_count(&self, tenant_id: TenantId) -> StoreResult<u64> {
		let now = Utc::now();
		let inner = self.inner.lock().unwrap();
		Ok(inner
			.codes
			.values()
			.filter(|c| c.tenant_id == tenant_id && c.is_active(now))
			.count() as u64)
	}

	async fn delete_expired_codes(&self) -> StoreResult<u64> {
		let now = Utc::now();
		let mut inner = self.inner.lock().unwrap();
		let before = inner.codes.len();
		inner
			.codes
			.retain(|_, c| !(c.used_at.is_none() && c.expires_at <= now));
		Ok((before - inner.codes.len()) as u64)
	}
}

#[async_trait]
impl SessionStore for MemStore {
	async fn create_session(&self, new: NewSession) -> StoreResult<SessionRecord> {
		let record = SessionRecord {
			id: Uuid::new_v4(),
			kind: new.kind,
			token_hash: new.token_hash.clone(),
			tenant_id: new.tenant_id,
			expires_at: new.expires_at,
			created_at: Utc::now(),
		};
		let mut inner = self.inner.lock().unwrap();
		inner.sessions.insert(new.token_hash, record.clone());
		Ok(record)
	}

	async fn session_by_token_hash(
		&self,
		kind: SessionKind,
		token_hash: &str,
	) -> StoreResult<Option<SessionRecord>> {
		let now = Utc::now();
		let inner = self.inner.lock().unwrap();
		Ok(inner
			.sessions
			.get(token_hash)
			.filter(|s| s.kind == kind && s.expires_at > now)
			.cloned())
	}

	async fn delete_expired_sessions(&self) -> StoreResult<u64> {
		let now = Utc::now();
		let mut inner = self.inner.lock().unwrap();
		let before = inner.sessions.len();
		inner.sessions.retain(|_, s| s.expires_at > now);
		Ok((before - inner.sessions.len()) as u64)
	}
}
