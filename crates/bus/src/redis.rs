//! Redis pub/sub bus for multi-instance deployments.

use std::fmt;

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{Bus, BusError, BusSubscription};

const SUBSCRIPTION_DEPTH: usize = 64;

/// Redis-backed [`Bus`].
///
/// Publishes go through a shared auto-reconnecting connection manager; each
/// subscription holds its own pub/sub connection for the lifetime of the
/// subscriber.
pub struct RedisBus {
	client: redis::Client,
	conn: ConnectionManager,
}

impl fmt::Debug for RedisBus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RedisBus").finish_non_exhaustive()
	}
}

impl RedisBus {
	/// Connect to the given redis URL.
	pub async fn connect(redis_url: &str) -> Result<Self, BusError> {
		let client = redis::Client::open(redis_url)?;
		let conn = ConnectionManager::new(client.clone()).await?;
		Ok(Self { client, conn })
	}
}

#[async_trait]
impl Bus for RedisBus {
	async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
		let mut conn = self.conn.clone();
		let _: () = conn.publish(topic, payload).await?;
		Ok(())
	}

	async fn subscribe(&self, topic: &str) -> Result<BusSubscription, BusError> {
		let mut pubsub = self.client.get_async_pubsub().await?;
		pubsub.subscribe(topic).await?;

		let (tx, rx) = mpsc::channel(SUBSCRIPTION_DEPTH);
		let cancel = CancellationToken::new();
		let token = cancel.clone();
		let topic = topic.to_string();
		tokio::spawn(async move {
			let mut stream = pubsub.into_on_message();
			loop {
				tokio::select! {
					() = token.cancelled() => break,
					msg = stream.next() => match msg {
						Some(msg) => match msg.get_payload::<Vec<u8>>() {
							Ok(payload) => {
								if tx.send(payload).await.is_err() {
									break;
								}
							}
							Err(err) => {
								tracing::warn!(error = %err, topic, "undecodable pub/sub payload");
							}
						},
						None => {
							tracing::debug!(topic, "pub/sub connection closed");
							break;
						}
					},
				}
			}
		});
		Ok(BusSubscription::new(rx, cancel.drop_guard()))
	}
}
