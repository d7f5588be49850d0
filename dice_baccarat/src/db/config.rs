//! Database configuration.

use std::{env, str::FromStr};

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,

    /// Maximum connection lifetime in seconds
    pub max_lifetime_secs: u64,
}

impl DatabaseConfig {
    /// Read the configuration from the environment.
    ///
    /// Returns `None` when `DATABASE_URL` is unset, in which case callers run
    /// on the in-memory store. Other variables fall back to their defaults
    /// when missing or malformed:
    /// - `DB_MAX_CONNECTIONS` (default: 10)
    /// - `DB_MIN_CONNECTIONS` (default: 1)
    /// - `DB_CONNECTION_TIMEOUT` seconds (default: 10)
    /// - `DB_IDLE_TIMEOUT` seconds (default: 600)
    /// - `DB_MAX_LIFETIME` seconds (default: 1800)
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let database_url = env::var("DATABASE_URL").ok()?;
        let defaults = Self::development();

        Some(Self {
            database_url,
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: env_or("DB_MIN_CONNECTIONS", defaults.min_connections),
            connection_timeout_secs: env_or(
                "DB_CONNECTION_TIMEOUT",
                defaults.connection_timeout_secs,
            ),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT", defaults.idle_timeout_secs),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME", defaults.max_lifetime_secs),
        })
    }

    /// Local development defaults against `postgres://postgres@localhost/dice_baccarat`.
    #[must_use]
    pub fn development() -> Self {
        Self {
            database_url: "postgres://postgres@localhost/dice_baccarat".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::development()
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            log::warn!("Ignoring malformed {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
