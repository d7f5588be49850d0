//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use dice_baccarat::{GameConfig, db::DatabaseConfig, game::BetLimits};
use std::{fmt, net::SocketAddr, time::Duration};

/// Default Bot API endpoint
pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

const DEFAULT_BIND: SocketAddr =
    SocketAddr::V4(std::net::SocketAddrV4::new(std::net::Ipv4Addr::LOCALHOST, 6969));

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP bind address
    pub bind: SocketAddr,
    /// PostgreSQL settings. `None` runs on the in-memory store.
    pub database: Option<DatabaseConfig>,
    /// Bot API settings. `None` narrates to the log instead.
    pub telegram: Option<TelegramConfig>,
    /// Prometheus scrape address, if metrics are exported
    pub metrics_bind: Option<SocketAddr>,
    /// Round timing and stake ceilings shared by every room
    pub game: GameConfig,
}

/// Telegram Bot API settings
#[derive(Clone)]
pub struct TelegramConfig {
    pub token: String,
    /// Base URL without the `/bot<token>` suffix
    pub api_base: String,
    /// Upper bound on a single API call
    pub request_timeout: Duration,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `metrics_bind_override` - Optional metrics address override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but malformed
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        metrics_bind_override: Option<SocketAddr>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_optional("SERVER_BIND")?.unwrap_or(DEFAULT_BIND),
        };

        let metrics_bind = match metrics_bind_override {
            Some(addr) => Some(addr),
            None => parse_optional("METRICS_BIND")?,
        };

        // The CLI URL wins but pool sizing still comes from the environment
        let database = match (database_url_override, DatabaseConfig::from_env()) {
            (Some(database_url), Some(config)) => Some(DatabaseConfig {
                database_url,
                ..config
            }),
            (Some(database_url), None) => Some(DatabaseConfig {
                database_url,
                ..DatabaseConfig::development()
            }),
            (None, config) => config,
        };

        let telegram = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty())
            .map(|token| TelegramConfig {
                token,
                api_base: std::env::var("TELEGRAM_API_BASE")
                    .unwrap_or_else(|_| DEFAULT_TELEGRAM_API.to_string()),
                request_timeout: Duration::from_secs(parse_env_or("TELEGRAM_TIMEOUT_SECS", 10)),
            });

        let defaults = GameConfig::default();
        let game = GameConfig {
            betting_window: secs_env_or("BETTING_WINDOW_SECS", defaults.betting_window),
            auto_next_delay: secs_env_or("AUTO_NEXT_DELAY_SECS", defaults.auto_next_delay),
            cleanup_delay: secs_env_or("CLEANUP_DELAY_SECS", defaults.cleanup_delay),
            recovery_grace: secs_env_or("RECOVERY_GRACE_SECS", defaults.recovery_grace),
            watchdog_timeout: secs_env_or("WATCHDOG_TIMEOUT_SECS", defaults.watchdog_timeout),
            limits: BetLimits {
                max_per_class: parse_env_or("MAX_BET_PER_CLASS", defaults.limits.max_per_class),
                max_total: parse_env_or("MAX_BET_TOTAL", defaults.limits.max_total),
            },
            tie_multiplier: parse_env_or("TIE_MULTIPLIER", defaults.tie_multiplier),
            ..defaults
        };

        Ok(ServerConfig {
            bind,
            database,
            telegram,
            metrics_bind,
            game,
        })
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    ///
    /// Names the first setting that cannot work
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.game
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                var: "game settings".to_string(),
                reason,
            })?;

        if let Some(telegram) = &self.telegram
            && !telegram.api_base.starts_with("http")
        {
            return Err(ConfigError::Invalid {
                var: "TELEGRAM_API_BASE".to_string(),
                reason: "Must be an http(s) URL".to_string(),
            });
        }

        if let Some(database) = &self.database
            && database.min_connections > database.max_connections
        {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed DB_MAX_CONNECTIONS ({})",
                    database.max_connections
                ),
            });
        }

        if self.metrics_bind == Some(self.bind) {
            return Err(ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: "Must differ from SERVER_BIND".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn secs_env_or(key: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_env_or(key, default.as_secs()))
}

/// Unset is fine, malformed is not.
fn parse_optional<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            var: key.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:8080".parse().unwrap(),
            database: None,
            telegram: None,
            metrics_bind: None,
            game: GameConfig::default(),
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Invalid {
            var: "SERVER_BIND".to_string(),
            reason: "invalid socket address syntax".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("SERVER_BIND"));
        assert!(msg.contains("invalid socket address"));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_bad_game_settings() {
        let mut config = config();
        config.game.tie_multiplier = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Tie multiplier"));
    }

    #[test]
    fn test_config_validation_metrics_on_server_port() {
        let mut config = config();
        config.metrics_bind = Some(config.bind);

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var, .. } if var == "METRICS_BIND"));
    }

    #[test]
    fn test_config_validation_pool_bounds() {
        let mut config = config();
        config.database = Some(DatabaseConfig {
            min_connections: 20,
            max_connections: 5,
            ..DatabaseConfig::development()
        });

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_telegram_debug_hides_token() {
        let telegram = TelegramConfig {
            token: "123:secret".to_string(),
            api_base: DEFAULT_TELEGRAM_API.to_string(),
            request_timeout: Duration::from_secs(10),
        };
        let debug = format!("{telegram:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("api.telegram.org"));
    }
}
