//! Environment configuration with startup validation.
//!
//! Everything is read once at boot; a bad value refuses to start rather than
//! limping. `production` mode hardens the checks: a database is mandatory,
//! and session secrets must be long and not on the weak list.

use std::collections::HashMap;
use std::time::Duration;

use relay_core::CoreConfig;
use thiserror::Error;

/// Session secrets we refuse outright.
const WEAK_SECRETS: &[&str] = &[
	"password",
	"secret",
	"changeme",
	"development",
	"00000000000000000000000000000000",
	"0123456789abcdef0123456789abcdef",
];

/// Minimum session secret length in production.
const MIN_SECRET_LEN: usize = 32;

/// Configuration failure; the process must not start.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
	/// A variable did not parse as its expected type.
	#[error("invalid value for {name}: {value:?}")]
	Invalid {
		/// Variable name.
		name: &'static str,
		/// Offending value.
		value: String,
	},

	/// A variable production mode requires is absent.
	#[error("{name} is required in production mode")]
	MissingInProduction {
		/// Variable name.
		name: &'static str,
	},

	/// The session secret is too short or on the weak list.
	#[error("SESSION_SECRET is too weak: {reason}")]
	WeakSecret {
		/// What exactly is wrong.
		reason: &'static str,
	},
}

/// Deployment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
	/// Single-process friendly, relaxed validation.
	Development,
	/// Hardened validation.
	Production,
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct Config {
	/// Listen port.
	pub port: u16,
	/// Postgres URL; absent runs the in-memory store (development only).
	pub database_url: Option<String>,
	/// Redis URL; absent runs the in-memory bus and local rate limiter.
	pub redis_url: Option<String>,
	/// Webhook signing secret.
	pub signing_secret: Option<String>,
	/// Queue TTL.
	pub queue_ttl: Duration,
	/// Callback TTL.
	pub callback_ttl: Duration,
	/// Default tracing filter.
	pub log_level: String,
	/// Deployment mode.
	pub mode: Mode,
	/// Session-token signing secret for the UI surfaces.
	pub session_secret: Option<String>,
	/// Admin password hash (consumed by the out-of-scope admin surface).
	pub admin_password_hash: Option<String>,
	/// Inbound row retention.
	pub retention: Duration,
	/// Reclaimer interval.
	pub reclaim_interval: Duration,
}

impl Config {
	/// Read and validate configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_vars(&std::env::vars().collect())
	}

	/// Read and validate configuration from an explicit variable map.
	pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
		let get = |name: &str| vars.get(name).map(String::as_str).filter(|v| !v.is_empty());

		let mode = match get("RELAY_MODE") {
			None | Some("development") => Mode::Development,
			Some("production") => Mode::Production,
			Some(other) => {
				return Err(ConfigError::Invalid {
					name: "RELAY_MODE",
					value: other.to_string(),
				});
			}
		};

		let config = Self {
			port: parse_or("PORT", get("PORT"), 8080)?,
			database_url: get("DATABASE_URL").map(str::to_string),
			redis_url: get("REDIS_URL").map(str::to_string),
			signing_secret: get("WEBHOOK_SIGNING_SECRET").map(str::to_string),
			queue_ttl: Duration::from_secs(parse_or(
				"QUEUE_TTL_SECONDS",
				get("QUEUE_TTL_SECONDS"),
				900,
			)?),
			callback_ttl: Duration::from_secs(parse_or(
				"CALLBACK_TTL_SECONDS",
				get("CALLBACK_TTL_SECONDS"),
				55,
			)?),
			log_level: get("LOG_LEVEL").unwrap_or("info").to_string(),
			mode,
			session_secret: get("SESSION_SECRET").map(str::to_string),
			admin_password_hash: get("ADMIN_PASSWORD_HASH").map(str::to_string),
			retention: Duration::from_secs(
				parse_or("RETENTION_DAYS", get("RETENTION_DAYS"), 7)? * 24 * 3600,
			),
			reclaim_interval: Duration::from_secs(parse_or(
				"RECLAIM_INTERVAL_SECONDS",
				get("RECLAIM_INTERVAL_SECONDS"),
				300,
			)?),
		};
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.mode == Mode::Production {
			if self.database_url.is_none() {
				return Err(ConfigError::MissingInProduction {
					name: "DATABASE_URL",
				});
			}
			let Some(secret) = &self.session_secret else {
				return Err(ConfigError::MissingInProduction {
					name: "SESSION_SECRET",
				});
			};
			if secret.len() < MIN_SECRET_LEN {
				return Err(ConfigError::WeakSecret {
					reason: "shorter than 32 characters",
				});
			}
			if WEAK_SECRETS.contains(&secret.to_ascii_lowercase().as_str()) {
				return Err(ConfigError::WeakSecret {
					reason: "on the known-weak list",
				});
			}
			if self.admin_password_hash.is_none() {
				return Err(ConfigError::MissingInProduction {
					name: "ADMIN_PASSWORD_HASH",
				});
			}
		}
		Ok(())
	}

	/// The engine-facing slice of this configuration.
	#[must_use]
	pub fn core_config(&self) -> CoreConfig {
		CoreConfig {
			signing_secret: self.signing_secret.clone(),
			callback_ttl: self.callback_ttl,
			queue_ttl: self.queue_ttl,
			retention: self.retention,
			reclaim_interval: self.reclaim_interval,
			..CoreConfig::default()
		}
	}
}

fn parse_or<T: std::str::FromStr>(
	name: &'static str,
	value: Option<&str>,
	default: T,
) -> Result<T, ConfigError> {
	match value {
		None => Ok(default),
		Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
			name,
			value: raw.to_string(),
		}),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn defaults_apply_in_development() {
		let config = Config::from_vars(&vars(&[])).unwrap();
		assert_eq!(config.port, 8080);
		assert_eq!(config.mode, Mode::Development);
		assert_eq!(config.queue_ttl, Duration::from_secs(900));
		assert_eq!(config.callback_ttl, Duration::from_secs(55));
		assert_eq!(config.retention, Duration::from_secs(7 * 24 * 3600));
		assert!(config.database_url.is_none());
	}

	#[test]
	fn bad_numbers_refuse_to_start() {
		let err = Config::from_vars(&vars(&[("PORT", "not-a-port")])).unwrap_err();
		assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
	}

	#[test]
	fn production_requires_database_and_secrets() {
		let err = Config::from_vars(&vars(&[("RELAY_MODE", "production")])).unwrap_err();
		assert_eq!(
			err,
			ConfigError::MissingInProduction {
				name: "DATABASE_URL"
			}
		);

		let err = Config::from_vars(&vars(&[
			("RELAY_MODE", "production"),
			("DATABASE_URL", "postgres://relay@localhost/relay"),
			("SESSION_SECRET", "short"),
			("ADMIN_PASSWORD_HASH", "$2b$12$abcdefghijklmnopqrstuv"),
		]))
		.unwrap_err();
		assert!(matches!(err, ConfigError::WeakSecret { .. }));
	}

	#[test]
	fn production_rejects_known_weak_secrets() {
		let err = Config::from_vars(&vars(&[
			("RELAY_MODE", "production"),
			("DATABASE_URL", "postgres://relay@localhost/relay"),
			("SESSION_SECRET", "0123456789abcdef0123456789abcdef"),
			("ADMIN_PASSWORD_HASH", "$2b$12$abcdefghijklmnopqrstuv"),
		]))
		.unwrap_err();
		assert!(matches!(err, ConfigError::WeakSecret { .. }));
	}

	#[test]
	fn production_accepts_a_strong_secret() {
		let config = Config::from_vars(&vars(&[
			("RELAY_MODE", "production"),
			("DATABASE_URL", "postgres://relay@localhost/relay"),
			("SESSION_SECRET", "d41b7afc92e0c5a2b1a7f3e86d9c04571b2a8f3c"),
			("ADMIN_PASSWORD_HASH", "$2b$12$abcdefghijklmnopqrstuv"),
		]))
		.unwrap();
		assert_eq!(config.mode, Mode::Production);
	}

	#[test]
	fn unknown_mode_is_rejected() {
		let err = Config::from_vars(&vars(&[("RELAY_MODE", "staging")])).unwrap_err();
		assert!(matches!(err, ConfigError::Invalid { name: "RELAY_MODE", .. }));
	}
}
