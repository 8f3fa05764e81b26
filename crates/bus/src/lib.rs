//! Best-effort per-tenant event fan-out.
//!
//! # Purpose
//!
//! - Define the [`Bus`] abstraction: publish/subscribe over per-tenant topics
//!   named `messages:{tenant_id}`, payloads opaque bytes.
//! - Provide [`RedisBus`] (redis pub/sub) for multi-instance deployments and
//!   [`MemoryBus`] (process-local broadcast) for single-instance runs and
//!   tests. The two are interchangeable behind the trait.
//! - Provide the in-process [`Broker`]: a registry mapping tenant id to
//!   connected subscribers, each with a bounded delivery channel.
//!
//! # Mental model
//!
//! The message queue is authoritative; the Bus is a wakeup signal, never
//! transport of record. A dropped or missed publish costs one poll latency,
//! not data: the subscriber finds the corresponding row in the queue on its
//! next lease. This is why every delivery path here is allowed to drop —
//! full subscriber channels, torn pub/sub connections, absent subscribers.
//!
//! # Invariants
//!
//! 1. The Broker holds at most one upstream Bus subscription per tenant,
//!    established on the first subscriber and torn down on the last
//!    unsubscribe.
//!    - Enforced in: `Broker::subscribe`, `Shared::unsubscribe`.
//!    - Tested by: `broker::tests::upstream_torn_down_on_last_unsubscribe`.
//! 2. A full subscriber channel drops the event; it never blocks fan-out to
//!    the remaining subscribers.
//!    - Enforced in: `Shared::fan_out`.
//!    - Tested by: `broker::tests::full_subscriber_channel_drops_events`.
//! 3. Dropping a subscription always unregisters it, including on cancelled
//!    long-polls.
//!    - Enforced in: `BrokerSubscription::drop`.
//!    - Tested by: `broker::tests::drop_unsubscribes`.

pub mod broker;
mod memory;
mod redis;

use std::fmt;

use async_trait::async_trait;
use relay_proto::TenantId;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

pub use self::broker::{Broker, BrokerSubscription};
pub use self::memory::MemoryBus;
pub use self::redis::RedisBus;

/// Pub/sub failure.
#[derive(Debug, Error)]
pub enum BusError {
	/// Redis operation failed.
	#[error("redis error: {0}")]
	Redis(#[from] ::redis::RedisError),
}

/// Topic carrying wakeups for one tenant.
#[must_use]
pub fn tenant_topic(tenant_id: TenantId) -> String {
	format!("messages:{tenant_id}")
}

/// Minimal publish/subscribe abstraction.
///
/// Delivery is best-effort: publishes to topics without subscribers vanish,
/// and subscribers may miss messages around connect/disconnect edges.
#[async_trait]
pub trait Bus: Send + Sync + fmt::Debug {
	/// Publish an opaque payload to a topic.
	async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError>;

	/// Open a subscription to a topic.
	async fn subscribe(&self, topic: &str) -> Result<BusSubscription, BusError>;
}

/// A live subscription feeding payloads from one topic.
///
/// Dropping the subscription releases the underlying connection or channel.
#[derive(Debug)]
pub struct BusSubscription {
	rx: mpsc::Receiver<Vec<u8>>,
	_cancel: DropGuard,
}

impl BusSubscription {
	pub(crate) fn new(rx: mpsc::Receiver<Vec<u8>>, cancel: DropGuard) -> Self {
		Self { rx, _cancel: cancel }
	}

	/// Receive the next payload; `None` when the feed is gone.
	pub async fn recv(&mut self) -> Option<Vec<u8>> {
		self.rx.recv().await
	}
}
