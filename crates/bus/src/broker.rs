//! In-process subscriber registry over the [`Bus`].
//!
//! Long-polls subscribe here instead of opening their own pub/sub
//! connections; the broker multiplexes one upstream Bus subscription per
//! tenant across all of that tenant's connected pollers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use relay_proto::TenantId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{Bus, BusError, tenant_topic};

/// Default bound of one subscriber's delivery channel.
const SUBSCRIBER_DEPTH: usize = 100;

#[derive(Debug)]
struct TenantEntry {
	subscribers: HashMap<u64, mpsc::Sender<Vec<u8>>>,
	next_id: u64,
	/// Cancels the upstream forwarding task when the last subscriber leaves.
	upstream_cancel: CancellationToken,
}

#[derive(Debug)]
struct Shared {
	bus: Arc<dyn Bus>,
	tenants: Mutex<HashMap<TenantId, TenantEntry>>,
	depth: usize,
}

impl Shared {
	/// Deliver a wakeup to every subscriber of a tenant.
	///
	/// Full channels drop the event: the queue is authoritative, so the
	/// subscriber finds the message on its next lease anyway. Closed channels
	/// are pruned.
	fn fan_out(&self, tenant_id: TenantId, payload: &[u8]) {
		let mut tenants = self.tenants.lock().unwrap();
		let Some(entry) = tenants.get_mut(&tenant_id) else {
			return;
		};
		let mut dead = Vec::new();
		for (id, tx) in &entry.subscribers {
			match tx.try_send(payload.to_vec()) {
				Ok(()) => {}
				Err(mpsc::error::TrySendError::Full(_)) => {
					tracing::debug!(tenant = %tenant_id, subscriber = id, "subscriber channel full, dropping wakeup");
				}
				Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
			}
		}
		for id in dead {
			entry.subscribers.remove(&id);
		}
	}

	fn unsubscribe(&self, tenant_id: TenantId, subscriber_id: u64) {
		let mut tenants = self.tenants.lock().unwrap();
		let Some(entry) = tenants.get_mut(&tenant_id) else {
			return;
		};
		entry.subscribers.remove(&subscriber_id);
		if entry.subscribers.is_empty() {
			entry.upstream_cancel.cancel();
			tenants.remove(&tenant_id);
			tracing::debug!(tenant = %tenant_id, "last subscriber left, upstream subscription torn down");
		}
	}
}

/// Subscriber registry multiplexing Bus wakeups to connected long-polls.
#[derive(Debug, Clone)]
pub struct Broker {
	shared: Arc<Shared>,
}

impl Broker {
	/// Create a broker over the given bus with the default channel depth.
	#[must_use]
	pub fn new(bus: Arc<dyn Bus>) -> Self {
		Self::with_depth(bus, SUBSCRIBER_DEPTH)
	}

	/// Create a broker with a custom subscriber channel depth.
	#[must_use]
	pub fn with_depth(bus: Arc<dyn Bus>, depth: usize) -> Self {
		Self {
			shared: Arc::new(Shared {
				bus,
				tenants: Mutex::new(HashMap::new()),
				depth,
			}),
		}
	}

	/// Register a subscriber for a tenant's wakeups.
	///
	/// The first subscriber for a tenant establishes the upstream Bus
	/// subscription; failures there are logged and surface as a silent
	/// subscription (the deadline still bounds the caller's wait).
	pub async fn subscribe(&self, tenant_id: TenantId) -> Result<BrokerSubscription, BusError> {
		let (tx, rx) = mpsc::channel(self.shared.depth);

		let spawn_upstream = {
			let mut tenants = self.shared.tenants.lock().unwrap();
			let entry = tenants.entry(tenant_id).or_insert_with(|| TenantEntry {
				subscribers: HashMap::new(),
				next_id: 0,
				upstream_cancel: CancellationToken::new(),
			});
			let id = entry.next_id;
			entry.next_id += 1;
			entry.subscribers.insert(id, tx);
			let first = entry.subscribers.len() == 1;
			(id, first, entry.upstream_cancel.clone())
		};
		let (id, first, cancel) = spawn_upstream;

		if first {
			let shared = self.shared.clone();
			let topic = tenant_topic(tenant_id);
			tokio::spawn(async move {
				let mut upstream = match shared.bus.subscribe(&topic).await {
					Ok(sub) => sub,
					Err(err) => {
						tracing::warn!(error = %err, topic, "bus subscription failed");
						return;
					}
				};
				loop {
					tokio::select! {
						() = cancel.cancelled() => break,
						msg = upstream.recv() => match msg {
							Some(payload) => shared.fan_out(tenant_id, &payload),
							None => break,
						},
					}
				}
			});
		}

		Ok(BrokerSubscription {
			tenant_id,
			id,
			rx,
			shared: self.shared.clone(),
		})
	}

	#[cfg(test)]
	fn subscriber_count(&self, tenant_id: TenantId) -> usize {
		let tenants = self.shared.tenants.lock().unwrap();
		tenants
			.get(&tenant_id)
			.map_or(0, |entry| entry.subscribers.len())
	}
}

/// A registered wakeup subscription; unsubscribes on drop.
#[derive(Debug)]
pub struct BrokerSubscription {
	tenant_id: TenantId,
	id: u64,
	rx: mpsc::Receiver<Vec<u8>>,
	shared: Arc<Shared>,
}

impl BrokerSubscription {
	/// Wait for the next wakeup; `None` when the feed is gone.
	pub async fn recv(&mut self) -> Option<Vec<u8>> {
		self.rx.recv().await
	}
}

impl Drop for BrokerSubscription {
	fn drop(&mut self) {
		self.shared.unsubscribe(self.tenant_id, self.id);
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::MemoryBus;

	fn harness() -> (Arc<MemoryBus>, Broker) {
		let bus = Arc::new(MemoryBus::new());
		let broker = Broker::new(bus.clone() as Arc<dyn Bus>);
		(bus, broker)
	}

	/// Let spawned forwarding tasks drain; paused time advances only when
	/// every task is idle.
	async fn settle() {
		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	#[tokio::test(flavor = "current_thread", start_paused = true)]
	async fn wakeup_reaches_all_subscribers() {
		let (bus, broker) = harness();
		let tenant = TenantId::generate();
		let mut sub1 = broker.subscribe(tenant).await.unwrap();
		let mut sub2 = broker.subscribe(tenant).await.unwrap();
		settle().await;

		bus.publish(&tenant_topic(tenant), b"wake").await.unwrap();
		settle().await;

		assert_eq!(sub1.recv().await, Some(b"wake".to_vec()));
		assert_eq!(sub2.recv().await, Some(b"wake".to_vec()));
	}

	#[tokio::test(flavor = "current_thread", start_paused = true)]
	async fn tenants_are_isolated() {
		let (bus, broker) = harness();
		let a = TenantId::generate();
		let b = TenantId::generate();
		let mut sub_a = broker.subscribe(a).await.unwrap();
		let mut sub_b = broker.subscribe(b).await.unwrap();
		settle().await;

		bus.publish(&tenant_topic(a), b"for-a").await.unwrap();
		settle().await;

		assert_eq!(sub_a.recv().await, Some(b"for-a".to_vec()));
		assert!(sub_b.rx.try_recv().is_err());
	}

	#[tokio::test(flavor = "current_thread", start_paused = true)]
	async fn full_subscriber_channel_drops_events() {
		let bus = Arc::new(MemoryBus::new());
		let broker = Broker::with_depth(bus.clone() as Arc<dyn Bus>, 1);
		let tenant = TenantId::generate();
		let mut sub = broker.subscribe(tenant).await.unwrap();
		settle().await;

		for _ in 0..3 {
			bus.publish(&tenant_topic(tenant), b"wake").await.unwrap();
		}
		settle().await;

		// Depth 1: exactly one buffered wakeup survives, the rest dropped.
		assert_eq!(sub.recv().await, Some(b"wake".to_vec()));
		assert!(sub.rx.try_recv().is_err());

		// The subscription still works after the drop.
		bus.publish(&tenant_topic(tenant), b"again").await.unwrap();
		settle().await;
		assert_eq!(sub.recv().await, Some(b"again".to_vec()));
	}

	#[tokio::test(flavor = "current_thread", start_paused = true)]
	async fn drop_unsubscribes() {
		let (_bus, broker) = harness();
		let tenant = TenantId::generate();
		let sub1 = broker.subscribe(tenant).await.unwrap();
		let sub2 = broker.subscribe(tenant).await.unwrap();
		assert_eq!(broker.subscriber_count(tenant), 2);

		drop(sub1);
		assert_eq!(broker.subscriber_count(tenant), 1);
		drop(sub2);
		assert_eq!(broker.subscriber_count(tenant), 0);
	}

	#[tokio::test(flavor = "current_thread", start_paused = true)]
	async fn upstream_torn_down_on_last_unsubscribe() {
		let (bus, broker) = harness();
		let tenant = TenantId::generate();
		let sub = broker.subscribe(tenant).await.unwrap();
		settle().await;
		drop(sub);
		settle().await;

		// A fresh subscription after teardown still receives wakeups,
		// proving the upstream is re-established per generation.
		let mut sub = broker.subscribe(tenant).await.unwrap();
		settle().await;
		bus.publish(&tenant_topic(tenant), b"wake").await.unwrap();
		settle().await;
		assert_eq!(sub.recv().await, Some(b"wake".to_vec()));
	}
}
