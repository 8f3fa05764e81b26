//! Relay server binary and operator CLI.
//!
//! `serve` (the default) runs the HTTP surface with the reclaimer; the other
//! subcommands cover the operational tasks the out-of-scope web UIs would
//! otherwise provide: migrations, tenant lifecycle, conversation blocking.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use relay_bus::{Bus, MemoryBus, RedisBus};
use relay_core::authz::{generate_token, sha256_hex};
use relay_core::{LocalRateLimiter, RateLimiter, RedisRateLimiter, Reclaimer, RelayCore};
use relay_proto::{TenantId, TenantMode};
use relay_server::config::{Config, Mode};
use relay_server::{AppState, router};
use relay_store::{ConversationStore, MemStore, NewTenant, PgStore, Store, TenantStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(about = "Multi-tenant chat-channel relay")]
struct Args {
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the HTTP server (default).
	Serve,
	/// Apply database migrations and exit.
	Migrate,
	/// Tenant administration.
	Tenant {
		#[command(subcommand)]
		action: TenantAction,
	},
	/// Conversation administration.
	Conversation {
		#[command(subcommand)]
		action: ConversationAction,
	},
}

#[derive(Subcommand, Debug)]
enum TenantAction {
	/// Create a tenant and print its bearer token. The token is shown once
	/// and stored only as a hash.
	Create {
		/// Operator-facing label.
		name: String,
		/// Requests allowed per 60-second window.
		#[arg(long, default_value_t = 60)]
		rate_limit: u32,
		/// Create in production mode.
		#[arg(long)]
		production: bool,
	},
	/// Replace a tenant's bearer token and print the new one.
	RegenerateToken {
		/// Tenant id.
		id: Uuid,
	},
	/// Disable a tenant; its requests fail at next authorization.
	Disable {
		/// Tenant id.
		id: Uuid,
	},
	/// Re-enable a disabled tenant.
	Enable {
		/// Tenant id.
		id: Uuid,
	},
	/// Delete a tenant: codes and messages go with it, conversations revert
	/// to unpaired.
	Delete {
		/// Tenant id.
		id: Uuid,
	},
}

#[derive(Subcommand, Debug)]
enum ConversationAction {
	/// Block a conversation; its webhooks are silently acknowledged.
	Block {
		/// Joined conversation key (`{channel}:{user}`).
		conversation_key: String,
	},
	/// Unblock a conversation back to unpaired.
	Unblock {
		/// Joined conversation key (`{channel}:{user}`).
		conversation_key: String,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	dotenvy::dotenv().ok();
	let args = Args::parse();
	let config = Config::from_env().context("configuration")?;

	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
		)
		.init();

	match args.command.unwrap_or(Command::Serve) {
		Command::Serve => serve(config).await,
		Command::Migrate => migrate(&config).await,
		Command::Tenant { action } => tenant_admin(&config, action).await,
		Command::Conversation { action } => conversation_admin(&config, action).await,
	}
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
	match &config.database_url {
		Some(url) => {
			let store = PgStore::connect(url, 10).await.context("postgres")?;
			Ok(Arc::new(store))
		}
		None => {
			warn!("no DATABASE_URL; using the in-memory store (state is lost on restart)");
			Ok(Arc::new(MemStore::new()))
		}
	}
}

async fn serve(config: Config) -> anyhow::Result<()> {
	let store = build_store(&config).await?;
	let cancel = CancellationToken::new();

	let bus: Arc<dyn Bus> = match &config.redis_url {
		Some(url) => Arc::new(RedisBus::connect(url).await.context("redis bus")?),
		None => {
			info!("no REDIS_URL; using the in-process bus");
			Arc::new(MemoryBus::new())
		}
	};
	let limiter: Arc<dyn RateLimiter> = match &config.redis_url {
		Some(url) => Arc::new(
			RedisRateLimiter::connect(url)
				.await
				.context("redis rate limiter")?,
		),
		None => {
			let limiter = Arc::new(LocalRateLimiter::new());
			let _evictor = limiter.spawn_evictor(Duration::from_secs(300), cancel.clone());
			limiter
		}
	};

	let core = RelayCore::new(store, bus, config.core_config());
	let reclaimer = Reclaimer::spawn(core.clone(), cancel.clone());

	let app = router(AppState {
		core,
		limiter,
	});
	let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
		.await
		.with_context(|| format!("bind port {}", config.port))?;
	info!(port = config.port, mode = ?config.mode, "relay listening");

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal(cancel.clone()))
		.await
		.context("server")?;

	cancel.cancel();
	reclaimer.await.ok();
	info!("relay stopped");
	Ok(())
}

/// Resolve on SIGINT or SIGTERM and trip the shared cancellation token.
async fn shutdown_signal(cancel: CancellationToken) {
	let ctrl_c = tokio::signal::ctrl_c();
	#[cfg(unix)]
	{
		let mut terminate =
			tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
		tokio::select! {
			_ = ctrl_c => {}
			() = async {
				match terminate.as_mut() {
					Some(term) => { term.recv().await; }
					None => std::future::pending().await,
				}
			} => {}
		}
	}
	#[cfg(not(unix))]
	{
		ctrl_c.await.ok();
	}
	info!("shutdown signal received");
	cancel.cancel();
}

async fn migrate(config: &Config) -> anyhow::Result<()> {
	let url = config
		.database_url
		.as_deref()
		.context("DATABASE_URL is required for migrate")?;
	let store = PgStore::connect(url, 2).await.context("postgres")?;
	store.migrate().await.context("migrations")?;
	println!("migrations applied");
	Ok(())
}

async fn tenant_admin(config: &Config, action: TenantAction) -> anyhow::Result<()> {
	if config.mode == Mode::Production && config.database_url.is_none() {
		anyhow::bail!("tenant administration in production requires DATABASE_URL");
	}
	let store = build_store(config).await?;
	match action {
		TenantAction::Create {
			name,
			rate_limit,
			production,
		} => {
			let token = generate_token();
			let tenant = store
				.create_tenant(NewTenant {
					name,
					token_hash: sha256_hex(&token),
					mode: if production {
						TenantMode::Production
					} else {
						TenantMode::Development
					},
					rate_limit_per_min: rate_limit,
				})
				.await?;
			println!("tenant id: {}", tenant.id);
			println!("bearer token (shown once): {token}");
		}
		TenantAction::RegenerateToken { id } => {
			let token = generate_token();
			if store.replace_token_hash(TenantId(id), &sha256_hex(&token)).await? {
				println!("new bearer token (shown once): {token}");
			} else {
				anyhow::bail!("no tenant {id}");
			}
		}
		TenantAction::Disable { id } => {
			if store.set_tenant_disabled(TenantId(id), true).await? {
				println!("tenant {id} disabled");
			} else {
				anyhow::bail!("no tenant {id}");
			}
		}
		TenantAction::Enable { id } => {
			if store.set_tenant_disabled(TenantId(id), false).await? {
				println!("tenant {id} enabled");
			} else {
				anyhow::bail!("no tenant {id}");
			}
		}
		TenantAction::Delete { id } => {
			if store.delete_tenant(TenantId(id)).await? {
				println!("tenant {id} deleted");
			} else {
				anyhow::bail!("no tenant {id}");
			}
		}
	}
	Ok(())
}

async fn conversation_admin(config: &Config, action: ConversationAction) -> anyhow::Result<()> {
	let store = build_store(config).await?;
	match action {
		ConversationAction::Block { conversation_key } => {
			if store.set_blocked(&conversation_key, true).await? {
				println!("conversation {conversation_key} blocked");
			} else {
				anyhow::bail!("no conversation {conversation_key} (or already blocked)");
			}
		}
		ConversationAction::Unblock { conversation_key } => {
			if store.set_blocked(&conversation_key, false).await? {
				println!("conversation {conversation_key} unblocked");
			} else {
				anyhow::bail!("conversation {conversation_key} is not blocked");
			}
		}
	}
	Ok(())
}
