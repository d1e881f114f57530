use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use bazaar_gateway::{GatewaySettings, PresenceScope};

/// Values shipped in sample `.env` files. A server started with one of these
/// would accept tokens anyone can forge.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "changeme",
    "secret",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BAZAAR_JWT_SECRET is unset")]
    MissingSecret,

    #[error("BAZAAR_JWT_SECRET is still a placeholder value")]
    PlaceholderSecret,

    #[error("invalid {key}='{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub persist_timeout: Duration,
    pub presence_scope: PresenceScope,
    pub heartbeat_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("BAZAAR_JWT_SECRET")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSecret)?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::PlaceholderSecret);
        }

        let persist_timeout_ms: u64 = try_load(&lookup, "BAZAAR_PERSIST_TIMEOUT_MS", "5000")?;
        if persist_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "BAZAAR_PERSIST_TIMEOUT_MS",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let heartbeat_secs: u64 = try_load(&lookup, "BAZAAR_HEARTBEAT_SECS", "15")?;
        if heartbeat_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "BAZAAR_HEARTBEAT_SECS",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            host: try_load(&lookup, "BAZAAR_HOST", "0.0.0.0")?,
            port: try_load(&lookup, "BAZAAR_PORT", "3000")?,
            db_path: try_load(&lookup, "BAZAAR_DB_PATH", "bazaar.db")?,
            jwt_secret,
            persist_timeout: Duration::from_millis(persist_timeout_ms),
            presence_scope: try_load(&lookup, "BAZAAR_PRESENCE_SCOPE", "global")?,
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
        })
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            jwt_secret: self.jwt_secret.clone(),
            persist_timeout: self.persist_timeout,
            presence_scope: self.presence_scope,
            heartbeat_interval: self.heartbeat_interval,
        }
    }
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}
