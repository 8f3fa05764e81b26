//! Periodic expiration sweep.
//!
//! One reclaimer runs per process. Each sub-step is its own short store call
//! (its own transaction in Postgres); a failing step logs and the sweep
//! continues, so one wedged table cannot stop code or session cleanup.

use std::sync::Arc;

use chrono::Utc;
use relay_store::{MessageStore, PairingCodeStore, SessionStore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::RelayCore;

/// Handle to the background sweep task.
#[derive(Debug)]
pub struct Reclaimer;

impl Reclaimer {
	/// Spawn the sweep loop; it runs once immediately, then every
	/// `reclaim_interval`, and stops cleanly when `cancel` fires.
	pub fn spawn(core: Arc<RelayCore>, cancel: CancellationToken) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(core.config.reclaim_interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			loop {
				tokio::select! {
					() = cancel.cancelled() => {
						tracing::info!("reclaimer stopped");
						break;
					}
					_ = ticker.tick() => Self::sweep(&core).await,
				}
			}
		})
	}

	/// Run one full sweep.
	pub async fn sweep(core: &RelayCore) {
		let now = Utc::now();

		match core.store.expire_overdue().await {
			Ok(0) => {}
			Ok(n) => tracing::info!(count = n, "expired messages past callback TTL"),
			Err(err) => tracing::warn!(error = %err, "message expiry sweep failed"),
		}

		let stale_horizon = now
			- chrono::Duration::from_std(core.config.queue_ttl)
				.unwrap_or(chrono::Duration::seconds(900));
		match core.store.expire_stale(stale_horizon).await {
			Ok(0) => {}
			Ok(n) => tracing::info!(count = n, "expired messages past queue TTL"),
			Err(err) => tracing::warn!(error = %err, "stale message sweep failed"),
		}

		match core.store.delete_expired_codes().await {
			Ok(0) => {}
			Ok(n) => tracing::info!(count = n, "deleted expired pairing codes"),
			Err(err) => tracing::warn!(error = %err, "code sweep failed"),
		}

		match core.store.delete_expired_sessions().await {
			Ok(0) => {}
			Ok(n) => tracing::info!(count = n, "deleted expired sessions"),
			Err(err) => tracing::warn!(error = %err, "session sweep failed"),
		}

		let retention_horizon = now
			- chrono::Duration::from_std(core.config.retention)
				.unwrap_or(chrono::Duration::days(7));
		match core.store.delete_inbound_older_than(retention_horizon).await {
			Ok(0) => {}
			Ok(n) => tracing::info!(count = n, "hard-deleted messages past retention"),
			Err(err) => tracing::warn!(error = %err, "retention sweep failed"),
		}
	}
}
