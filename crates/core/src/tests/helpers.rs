//! Shared test harness.

use std::sync::Arc;

use relay_bus::{Bus, MemoryBus};
use relay_proto::TenantMode;
use relay_store::{MemStore, NewTenant, Store, TenantRecord, TenantStore};
use serde_json::{Value, json};

use crate::authz::sha256_hex;
use crate::{CoreConfig, RelayCore};

/// An engine wired to in-memory collaborators.
pub struct TestRelay {
	pub core: Arc<RelayCore>,
	pub store: Arc<MemStore>,
	pub bus: Arc<MemoryBus>,
}

impl TestRelay {
	/// Build with default configuration.
	pub fn new() -> Self {
		Self::with_config(CoreConfig::default())
	}

	/// Build with custom configuration.
	pub fn with_config(config: CoreConfig) -> Self {
		let store = Arc::new(MemStore::new());
		let bus = Arc::new(MemoryBus::new());
		let core = RelayCore::new(
			store.clone() as Arc<dyn Store>,
			bus.clone() as Arc<dyn Bus>,
			config,
		);
		Self { core, store, bus }
	}

	/// Create a tenant whose bearer token is `tok-{name}`.
	pub async fn tenant(&self, name: &str) -> TenantRecord {
		self.tenant_with_limit(name, 60).await
	}

	/// Create a tenant with an explicit rate limit.
	pub async fn tenant_with_limit(&self, name: &str, rate_limit_per_min: u32) -> TenantRecord {
		self.store
			.create_tenant(NewTenant {
				name: name.to_string(),
				token_hash: sha256_hex(&format!("tok-{name}")),
				mode: TenantMode::Development,
				rate_limit_per_min,
			})
			.await
			.expect("create tenant")
	}
}

/// A platform skill payload body.
pub fn webhook_body(
	channel: &str,
	user: &str,
	utterance: &str,
	callback_url: Option<&str>,
	timestamp: Option<&str>,
) -> Vec<u8> {
	let mut user_request = json!({
		"utterance": utterance,
		"user": { "id": user, "type": "botUserKey" },
	});
	if let Some(url) = callback_url {
		user_request["callbackUrl"] = Value::String(url.to_string());
	}
	if let Some(ts) = timestamp {
		user_request["timestamp"] = Value::String(ts.to_string());
	}
	serde_json::to_vec(&json!({
		"bot": { "id": channel, "name": "relay-test" },
		"userRequest": user_request,
	}))
	.expect("serialize webhook body")
}

/// Extract the simple-text of a template response.
pub fn response_text(response: &relay_proto::platform::SkillResponse) -> Option<&str> {
	response
		.template
		.as_ref()
		.and_then(|t| t.outputs.first())
		.map(|o| o.simple_text.text.as_str())
}
