//! Tenant authorization and per-tenant rate limiting.
//!
//! Tokens are never stored; authorization hashes the presented bearer token
//! (SHA-256 hex) and looks the tenant up by hash. Rate limiting is a
//! 60-second sliding window with two interchangeable implementations: a
//! process-local map for single-instance deployments and an atomic redis
//! script for multi-instance ones.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use redis::aio::ConnectionManager;
use relay_proto::TenantId;
use relay_store::{TenantRecord, TenantStore};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{RelayCore, RelayError};

/// The sliding window, in milliseconds.
const WINDOW_MS: i64 = 60_000;

/// SHA-256 hex of an input. The token-to-row mapping everywhere.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(input.as_bytes());
	hex::encode(hasher.finalize())
}

/// Draw a fresh bearer token (256 bits, hex).
#[must_use]
pub fn generate_token() -> String {
	let mut bytes = [0u8; 32];
	rand::rng().fill(&mut bytes[..]);
	hex::encode(bytes)
}

impl RelayCore {
	/// Resolve a bearer token to an enabled tenant.
	pub async fn authenticate(&self, token: &str) -> Result<TenantRecord, RelayError> {
		let hash = sha256_hex(token);
		let Some(tenant) = self.store.tenant_by_token_hash(&hash).await? else {
			return Err(RelayError::Unauthorized);
		};
		if !tenant.is_enabled() {
			tracing::debug!(tenant = %tenant.id, "disabled tenant rejected");
			return Err(RelayError::Unauthorized);
		}
		Ok(tenant)
	}
}

/// Outcome of one admission check, carrying the response-header fields.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
	/// Whether the request may proceed.
	pub allowed: bool,
	/// The tenant's window limit.
	pub limit: u32,
	/// Requests left in the current window.
	pub remaining: u32,
	/// Epoch second at which the window resets.
	pub reset_epoch: i64,
}

/// Sliding-window admission check.
#[async_trait]
pub trait RateLimiter: Send + Sync + fmt::Debug {
	/// Record and judge one request for a tenant.
	async fn check(&self, tenant_id: TenantId, limit: u32) -> RateDecision;
}

/// Process-local sliding window. Correct for single-instance deployments.
#[derive(Debug, Default)]
pub struct LocalRateLimiter {
	windows: Mutex<HashMap<TenantId, VecDeque<i64>>>,
}

impl LocalRateLimiter {
	/// Create an empty limiter.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn check_at(&self, tenant_id: TenantId, limit: u32, now_ms: i64) -> RateDecision {
		let mut windows = self.windows.lock().unwrap();
		let window = windows.entry(tenant_id).or_default();
		while window.front().is_some_and(|&t| t <= now_ms - WINDOW_MS) {
			window.pop_front();
		}
		if (window.len() as u32) >= limit {
			let reset_ms = window.front().map_or(now_ms + WINDOW_MS, |&t| t + WINDOW_MS);
			return RateDecision {
				allowed: false,
				limit,
				remaining: 0,
				reset_epoch: reset_ms.div_euclid(1000),
			};
		}
		window.push_back(now_ms);
		RateDecision {
			allowed: true,
			limit,
			remaining: limit - window.len() as u32,
			reset_epoch: (now_ms + WINDOW_MS).div_euclid(1000),
		}
	}

	/// Drop windows whose newest entry is older than the window span.
	pub fn evict_idle(&self) {
		let horizon = Utc::now().timestamp_millis() - WINDOW_MS;
		let mut windows = self.windows.lock().unwrap();
		windows.retain(|_, w| w.back().is_some_and(|&t| t > horizon));
	}

	/// Spawn the periodic eviction task.
	pub fn spawn_evictor(
		self: &Arc<Self>,
		every: Duration,
		cancel: CancellationToken,
	) -> JoinHandle<()> {
		let limiter = self.clone();
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(every);
			loop {
				tokio::select! {
					() = cancel.cancelled() => break,
					_ = ticker.tick() => limiter.evict_idle(),
				}
			}
		})
	}
}

#[async_trait]
impl RateLimiter for LocalRateLimiter {
	async fn check(&self, tenant_id: TenantId, limit: u32) -> RateDecision {
		self.check_at(tenant_id, limit, Utc::now().timestamp_millis())
	}
}

/// Atomic sliding window over redis, for multi-instance deployments.
///
/// The window script prunes, counts, and records in one round trip. Redis
/// outages fail open: admission control is load shedding, not a security
/// boundary, so a broken limiter must not take the API down with it.
pub struct RedisRateLimiter {
	conn: ConnectionManager,
	script: redis::Script,
}

impl fmt::Debug for RedisRateLimiter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RedisRateLimiter").finish_non_exhaustive()
	}
}

const SLIDING_WINDOW_LUA: &str = r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count >= limit then
  local reset = now + window
  local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
  if oldest[2] then reset = tonumber(oldest[2]) + window end
  return {0, 0, reset}
end
local seq = redis.call('INCR', key .. ':seq')
redis.call('ZADD', key, now, now .. '-' .. seq)
redis.call('PEXPIRE', key, window)
redis.call('PEXPIRE', key .. ':seq', window)
return {1, limit - count - 1, now + window}
";

impl RedisRateLimiter {
	/// Connect to the given redis URL.
	pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
		let client = redis::Client::open(redis_url)?;
		let conn = ConnectionManager::new(client).await?;
		Ok(Self {
			conn,
			script: redis::Script::new(SLIDING_WINDOW_LUA),
		})
	}
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
	async fn check(&self, tenant_id: TenantId, limit: u32) -> RateDecision {
		let now_ms = Utc::now().timestamp_millis();
		let mut conn = self.conn.clone();
		let result: Result<(i64, i64, i64), redis::RedisError> = self
			.script
			.key(format!("ratelimit:{tenant_id}"))
			.arg(now_ms)
			.arg(WINDOW_MS)
			.arg(limit)
			.invoke_async(&mut conn)
			.await;
		match result {
			Ok((allowed, remaining, reset_ms)) => RateDecision {
				allowed: allowed == 1,
				limit,
				remaining: remaining.max(0) as u32,
				reset_epoch: reset_ms.div_euclid(1000),
			},
			Err(err) => {
				tracing::warn!(error = %err, tenant = %tenant_id, "rate limiter unavailable, failing open");
				RateDecision {
					allowed: true,
					limit,
					remaining: 0,
					reset_epoch: (now_ms + WINDOW_MS).div_euclid(1000),
				}
			}
		}
	}
}
