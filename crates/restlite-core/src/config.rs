//! Configuration for restlite.

use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    // ========================================================================
    // Database Settings
    // ========================================================================
    /// SQLite connection URI, e.g. `sqlite://restlite.db` or
    /// `sqlite::memory:`.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Role for unauthenticated requests.
    #[serde(default = "default_anon_role")]
    pub db_anon_role: String,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub db_pool_size: u32,

    /// Pool acquisition timeout in seconds.
    #[serde(default = "default_pool_timeout")]
    pub db_pool_timeout: u64,

    /// Maximum rows allowed in a response.
    pub db_max_rows: Option<i64>,

    // ========================================================================
    // Server Settings
    // ========================================================================
    /// Server host to bind.
    #[serde(default = "default_host")]
    pub server_host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub server_port: u16,

    // ========================================================================
    // JWT Settings
    // ========================================================================
    /// JWT secret key. When absent, auth is disabled and every request is
    /// treated as `anon`.
    pub jwt_secret: Option<String>,

    /// JWT secret as base64.
    #[serde(default)]
    pub jwt_secret_is_base64: bool,

    /// JWT audience claim to validate.
    pub jwt_aud: Option<String>,

    /// JWT claim that contains the role.
    #[serde(default = "default_jwt_role_claim")]
    pub jwt_role_claim_key: String,

    // ========================================================================
    // Logging Settings
    // ========================================================================
    /// Log level: crit, error, warn, info, debug.
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            db_anon_role: default_anon_role(),
            db_pool_size: default_pool_size(),
            db_pool_timeout: default_pool_timeout(),
            db_max_rows: None,
            server_host: default_host(),
            server_port: default_port(),
            jwt_secret: None,
            jwt_secret_is_base64: false,
            jwt_aud: None,
            jwt_role_claim_key: default_jwt_role_claim(),
            log_level: LogLevel::Error,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("RESTLITE_DB_PATH") {
            config.db_path = path;
        }
        if let Ok(path) = std::env::var("DATABASE_URL") {
            config.db_path = path;
        }
        if let Ok(role) = std::env::var("RESTLITE_ANON_ROLE") {
            config.db_anon_role = role;
        }
        if let Ok(size) = std::env::var("RESTLITE_DB_POOL") {
            if let Ok(n) = size.parse() {
                config.db_pool_size = n;
            }
        }
        if let Ok(secret) = std::env::var("RESTLITE_JWT_SECRET") {
            config.jwt_secret = Some(secret);
        }
        if let Ok(aud) = std::env::var("RESTLITE_JWT_AUD") {
            config.jwt_aud = Some(aud);
        }
        if let Ok(host) = std::env::var("RESTLITE_SERVER_HOST") {
            config.server_host = host;
        }
        if let Ok(port) = std::env::var("RESTLITE_SERVER_PORT") {
            if let Ok(p) = port.parse() {
                config.server_port = p;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                config.server_port = p;
            }
        }

        config
    }
}

/// Log levels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Crit,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn to_tracing(&self) -> tracing::Level {
        match self {
            Self::Crit | Self::Error => tracing::Level::ERROR,
            Self::Warn => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
        }
    }
}

fn default_db_path() -> String {
    "sqlite://restlite.db".to_string()
}

fn default_anon_role() -> String {
    "anon".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_pool_timeout() -> u64 {
    10
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_jwt_role_claim() -> String {
    "role".to_string()
}

fn default_log_level() -> LogLevel {
    LogLevel::Error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.db_pool_size, 10);
        assert_eq!(config.db_anon_role, "anon");
    }

    #[test]
    fn test_log_level_to_tracing() {
        assert_eq!(LogLevel::Error.to_tracing(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Debug.to_tracing(), tracing::Level::DEBUG);
    }
}
