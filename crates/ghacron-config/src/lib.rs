//! ghacron-config: runtime settings from `GHACRON_*` environment variables.

use std::env;

use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GHACRON_APP_ID is required")]
    MissingAppId,
    #[error("GHACRON_APP_PRIVATE_KEY or GHACRON_APP_PRIVATE_KEY_PATH is required")]
    MissingPrivateKey,
    #[error("invalid {var} ({value:?}): {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to read private key file: {0}")]
    PrivateKeyIo(#[from] std::io::Error),
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub github: GithubConfig,
    pub reconcile: ReconcileConfig,
    pub log: LogConfig,
    pub webapi: WebApiConfig,
}

/// GitHub App credentials.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub app_id: i64,
    pub private_key: String,
    pub private_key_path: String,
}

/// Reconciliation loop settings.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub interval_minutes: u64,
    pub duplicate_guard_seconds: u64,
    pub dry_run: bool,
    pub timezone: String,
}

/// Logging settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

/// Observation API server settings.
#[derive(Debug, Clone)]
pub struct WebApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Load configuration from the environment (a `.env` file is honored
    /// when present).
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    /// Load configuration from the current process environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config {
            github: GithubConfig {
                app_id: env_i64("GHACRON_APP_ID", 0)?,
                private_key: env_str("GHACRON_APP_PRIVATE_KEY", ""),
                private_key_path: env_str("GHACRON_APP_PRIVATE_KEY_PATH", ""),
            },
            reconcile: ReconcileConfig {
                interval_minutes: env_u64("GHACRON_RECONCILE_INTERVAL_MINUTES", 5)?,
                duplicate_guard_seconds: env_u64("GHACRON_RECONCILE_DUPLICATE_GUARD_SECONDS", 60)?,
                dry_run: env_bool("GHACRON_DRY_RUN", false)?,
                timezone: env_str("GHACRON_TIMEZONE", "UTC"),
            },
            log: LogConfig {
                level: env_str("GHACRON_LOG_LEVEL", "info"),
                format: env_str("GHACRON_LOG_FORMAT", "json"),
            },
            webapi: WebApiConfig {
                enabled: env_bool("GHACRON_WEBAPI_ENABLED", true)?,
                host: env_str("GHACRON_WEBAPI_HOST", "0.0.0.0"),
                port: env_u16("GHACRON_WEBAPI_PORT", 8080)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// The private key bytes: the inline value wins over the file path.
    pub fn private_key(&self) -> Result<Vec<u8>, ConfigError> {
        if !self.github.private_key.is_empty() {
            return Ok(self.github.private_key.clone().into_bytes());
        }
        if !self.github.private_key_path.is_empty() {
            return Ok(std::fs::read(&self.github.private_key_path)?);
        }
        Err(ConfigError::MissingPrivateKey)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.github.app_id <= 0 {
            return Err(ConfigError::MissingAppId);
        }
        if self.github.private_key.is_empty() && self.github.private_key_path.is_empty() {
            return Err(ConfigError::MissingPrivateKey);
        }
        if self.reconcile.interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                var: "GHACRON_RECONCILE_INTERVAL_MINUTES",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.reconcile.timezone.parse::<Tz>().is_err() {
            return Err(ConfigError::InvalidValue {
                var: "GHACRON_TIMEZONE",
                value: self.reconcile.timezone.clone(),
                reason: "unknown time zone".into(),
            });
        }
        match self.log.level.to_lowercase().as_str() {
            "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    var: "GHACRON_LOG_LEVEL",
                    value: other.into(),
                    reason: "must be one of debug, info, warn, error".into(),
                });
            }
        }
        match self.log.format.to_lowercase().as_str() {
            "json" | "text" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    var: "GHACRON_LOG_FORMAT",
                    value: other.into(),
                    reason: "must be one of json, text".into(),
                });
            }
        }
        Ok(())
    }
}

fn env_str(var: &'static str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.is_empty() => v,
        _ => fallback.to_string(),
    }
}

fn env_i64(var: &'static str, fallback: i64) -> Result<i64, ConfigError> {
    match env::var(var) {
        Ok(v) if !v.is_empty() => v.parse().map_err(|_| ConfigError::InvalidValue {
            var,
            value: v,
            reason: "expected integer".into(),
        }),
        _ => Ok(fallback),
    }
}

fn env_u64(var: &'static str, fallback: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Ok(v) if !v.is_empty() => v.parse().map_err(|_| ConfigError::InvalidValue {
            var,
            value: v,
            reason: "expected non-negative integer".into(),
        }),
        _ => Ok(fallback),
    }
}

fn env_u16(var: &'static str, fallback: u16) -> Result<u16, ConfigError> {
    match env::var(var) {
        Ok(v) if !v.is_empty() => v.parse().map_err(|_| ConfigError::InvalidValue {
            var,
            value: v,
            reason: "expected port number".into(),
        }),
        _ => Ok(fallback),
    }
}

fn env_bool(var: &'static str, fallback: bool) -> Result<bool, ConfigError> {
    match env::var(var) {
        Ok(v) if !v.is_empty() => match v.to_lowercase().as_str() {
            "1" | "true" | "t" | "yes" => Ok(true),
            "0" | "false" | "f" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var,
                value: v,
                reason: "expected boolean".into(),
            }),
        },
        _ => Ok(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_VARS: &[&str] = &[
        "GHACRON_APP_ID",
        "GHACRON_APP_PRIVATE_KEY",
        "GHACRON_APP_PRIVATE_KEY_PATH",
        "GHACRON_RECONCILE_INTERVAL_MINUTES",
        "GHACRON_RECONCILE_DUPLICATE_GUARD_SECONDS",
        "GHACRON_DRY_RUN",
        "GHACRON_TIMEZONE",
        "GHACRON_LOG_LEVEL",
        "GHACRON_LOG_FORMAT",
        "GHACRON_WEBAPI_ENABLED",
        "GHACRON_WEBAPI_HOST",
        "GHACRON_WEBAPI_PORT",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            env::remove_var(var);
        }
    }

    fn set_required() {
        env::set_var("GHACRON_APP_ID", "12345");
        env::set_var("GHACRON_APP_PRIVATE_KEY", "dummy-pem");
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        set_required();

        let config = Config::from_env().unwrap();
        assert_eq!(config.github.app_id, 12345);
        assert_eq!(config.reconcile.interval_minutes, 5);
        assert_eq!(config.reconcile.duplicate_guard_seconds, 60);
        assert!(!config.reconcile.dry_run);
        assert_eq!(config.reconcile.timezone, "UTC");
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, "json");
        assert!(config.webapi.enabled);
        assert_eq!(config.webapi.host, "0.0.0.0");
        assert_eq!(config.webapi.port, 8080);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        set_required();
        env::set_var("GHACRON_RECONCILE_INTERVAL_MINUTES", "10");
        env::set_var("GHACRON_RECONCILE_DUPLICATE_GUARD_SECONDS", "0");
        env::set_var("GHACRON_DRY_RUN", "true");
        env::set_var("GHACRON_TIMEZONE", "Asia/Tokyo");
        env::set_var("GHACRON_LOG_FORMAT", "text");
        env::set_var("GHACRON_WEBAPI_PORT", "9090");

        let config = Config::from_env().unwrap();
        assert_eq!(config.reconcile.interval_minutes, 10);
        assert_eq!(config.reconcile.duplicate_guard_seconds, 0);
        assert!(config.reconcile.dry_run);
        assert_eq!(config.reconcile.timezone, "Asia/Tokyo");
        assert_eq!(config.log.format, "text");
        assert_eq!(config.webapi.port, 9090);
    }

    #[test]
    #[serial]
    fn test_missing_app_id() {
        clear_env();
        env::set_var("GHACRON_APP_PRIVATE_KEY", "dummy-pem");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingAppId));
    }

    #[test]
    #[serial]
    fn test_missing_private_key() {
        clear_env();
        env::set_var("GHACRON_APP_ID", "12345");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingPrivateKey));
    }

    #[test]
    #[serial]
    fn test_invalid_integer() {
        clear_env();
        set_required();
        env::set_var("GHACRON_RECONCILE_INTERVAL_MINUTES", "soon");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("GHACRON_RECONCILE_INTERVAL_MINUTES"));
    }

    #[test]
    #[serial]
    fn test_zero_interval_rejected() {
        clear_env();
        set_required();
        env::set_var("GHACRON_RECONCILE_INTERVAL_MINUTES", "0");

        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_invalid_timezone() {
        clear_env();
        set_required();
        env::set_var("GHACRON_TIMEZONE", "Mars/Olympus");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("GHACRON_TIMEZONE"));
    }

    #[test]
    #[serial]
    fn test_invalid_log_level() {
        clear_env();
        set_required();
        env::set_var("GHACRON_LOG_LEVEL", "verbose");

        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_private_key_inline_wins() {
        clear_env();
        set_required();
        env::set_var("GHACRON_APP_PRIVATE_KEY_PATH", "/nonexistent/key.pem");

        let config = Config::from_env().unwrap();
        assert_eq!(config.private_key().unwrap(), b"dummy-pem".to_vec());
    }
}
