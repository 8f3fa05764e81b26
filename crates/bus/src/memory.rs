//! Process-local bus over tokio broadcast channels.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::{Bus, BusError, BusSubscription};

const TOPIC_DEPTH: usize = 64;

/// In-process [`Bus`] for single-instance deployments and tests.
///
/// Publishing to a topic nobody subscribes to is a no-op, matching the
/// best-effort contract of the redis implementation.
#[derive(Debug, Default)]
pub struct MemoryBus {
	topics: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl MemoryBus {
	/// Create an empty bus.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
		let mut topics = self.topics.lock().unwrap();
		topics
			.entry(topic.to_string())
			.or_insert_with(|| broadcast::channel(TOPIC_DEPTH).0)
			.clone()
	}
}

#[async_trait]
impl Bus for MemoryBus {
	async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
		// An Err only means no live receivers; best-effort says that's fine.
		let _ = self.sender(topic).send(payload.to_vec());
		Ok(())
	}

	async fn subscribe(&self, topic: &str) -> Result<BusSubscription, BusError> {
		let mut upstream = self.sender(topic).subscribe();
		let (tx, rx) = mpsc::channel(TOPIC_DEPTH);
		let cancel = CancellationToken::new();
		let token = cancel.clone();
		tokio::spawn(async move {
			loop {
				tokio::select! {
					() = token.cancelled() => break,
					received = upstream.recv() => match received {
						Ok(payload) => {
							if tx.send(payload).await.is_err() {
								break;
							}
						}
						// Lagged receivers skip ahead; best-effort.
						Err(broadcast::error::RecvError::Lagged(_)) => {}
						Err(broadcast::error::RecvError::Closed) => break,
					},
				}
			}
		});
		Ok(BusSubscription::new(rx, cancel.drop_guard()))
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;

	#[tokio::test]
	async fn publish_reaches_subscriber() {
		let bus = Arc::new(MemoryBus::new());
		let mut sub = bus.subscribe("messages:t1").await.unwrap();
		bus.publish("messages:t1", b"wake").await.unwrap();
		assert_eq!(sub.recv().await, Some(b"wake".to_vec()));
	}

	#[tokio::test]
	async fn topics_are_isolated() {
		let bus = Arc::new(MemoryBus::new());
		let mut sub_a = bus.subscribe("messages:a").await.unwrap();
		let mut sub_b = bus.subscribe("messages:b").await.unwrap();

		bus.publish("messages:a", b"for-a").await.unwrap();
		assert_eq!(sub_a.recv().await, Some(b"for-a".to_vec()));

		// B saw nothing; a follow-up publish is the next thing it receives.
		bus.publish("messages:b", b"for-b").await.unwrap();
		assert_eq!(sub_b.recv().await, Some(b"for-b".to_vec()));
	}

	#[tokio::test]
	async fn publish_without_subscribers_is_noop() {
		let bus = MemoryBus::new();
		bus.publish("messages:nobody", b"lost").await.unwrap();
	}
}
