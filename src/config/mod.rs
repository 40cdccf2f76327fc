use std::env;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::with_security_headers;

const DEV_ENCRYPTION_KEY: &str = "ticket-core-development-key";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set in production")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub port: u16,
    pub reservation_ttl_minutes: i64,
    pub reservation_max_ttl_minutes: i64,
    pub sweep_interval_secs: u64,
    pub encryption_key: String,
    pub legacy_encryption_keys: Vec<String>,
    pub credential_grace_minutes: i64,
    pub cors_allowed_origins: Vec<String>,
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let production = lookup("RUST_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let encryption_key = match lookup("TICKET_ENCRYPTION_KEY").filter(|k| !k.is_empty()) {
            Some(key) => key,
            None if production => return Err(ConfigError::Missing("TICKET_ENCRYPTION_KEY")),
            None => {
                warn!("TICKET_ENCRYPTION_KEY not set, using development key");
                DEV_ENCRYPTION_KEY.to_string()
            }
        };

        let config = Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            database_max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            port: parse(&lookup, "PORT", 3001)?,
            reservation_ttl_minutes: parse(&lookup, "RESERVATION_TTL_MINUTES", 10)?,
            reservation_max_ttl_minutes: parse(&lookup, "RESERVATION_MAX_TTL_MINUTES", 30)?,
            sweep_interval_secs: parse(&lookup, "RESERVATION_SWEEP_INTERVAL_SECS", 30)?,
            encryption_key,
            legacy_encryption_keys: list(lookup("TICKET_LEGACY_KEYS").as_deref().unwrap_or("")),
            credential_grace_minutes: parse(&lookup, "CREDENTIAL_GRACE_MINUTES", 60)?,
            cors_allowed_origins: list(
                lookup("CORS_ALLOWED_ORIGINS")
                    .as_deref()
                    .unwrap_or(DEFAULT_ALLOWED_ORIGINS),
            ),
            production,
        };

        if config.reservation_ttl_minutes < 1
            || config.reservation_ttl_minutes > config.reservation_max_ttl_minutes
        {
            return Err(ConfigError::Invalid {
                key: "RESERVATION_TTL_MINUTES",
                value: config.reservation_ttl_minutes.to_string(),
                reason: format!(
                    "must be between 1 and RESERVATION_MAX_TTL_MINUTES ({})",
                    config.reservation_max_ttl_minutes
                ),
            });
        }
        if config.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "RESERVATION_SWEEP_INTERVAL_SECS",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(config)
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
