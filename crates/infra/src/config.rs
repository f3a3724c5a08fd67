//! Process configuration loaded from environment variables.

use std::net::SocketAddr;

use rust_decimal::Decimal;
use thiserror::Error;

use pansoft_inventory::StockPolicy;
pub use pansoft_observability::LogFormat;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Which store implementation backs the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreBackend,
    pub stock_policy: StockPolicy,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = var("PANSOFT_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                var: "PANSOFT_BIND_ADDR",
                reason: e.to_string(),
            })?;

        let database_url = var("DATABASE_URL");
        let backend = match var("PANSOFT_STORE").map(|v| v.to_lowercase()) {
            Some(v) if v == "memory" => "memory",
            Some(v) if v == "postgres" => "postgres",
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "PANSOFT_STORE",
                    reason: format!("unknown store '{other}' (expected memory or postgres)"),
                });
            }
            None if database_url.is_some() => "postgres",
            None => "memory",
        };

        let store = if backend == "postgres" {
            let database_url = database_url.ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let max_connections = match var("PANSOFT_DB_MAX_CONNECTIONS") {
                Some(v) => v.parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(|| {
                    ConfigError::Invalid {
                        var: "PANSOFT_DB_MAX_CONNECTIONS",
                        reason: format!("expected a positive integer, got '{v}'"),
                    }
                })?,
                None => DEFAULT_DB_MAX_CONNECTIONS,
            };
            StoreBackend::Postgres {
                database_url,
                max_connections,
            }
        } else {
            StoreBackend::Memory
        };

        let stock_policy = match var("PANSOFT_MAX_MOVEMENT_QUANTITY") {
            Some(v) => {
                let max_quantity = v
                    .parse::<Decimal>()
                    .ok()
                    .filter(|d| *d > Decimal::ZERO)
                    .ok_or_else(|| ConfigError::Invalid {
                        var: "PANSOFT_MAX_MOVEMENT_QUANTITY",
                        reason: format!("expected a positive number, got '{v}'"),
                    })?;
                StockPolicy { max_quantity }
            }
            None => StockPolicy::default(),
        };

        let log_format = match var("PANSOFT_LOG_FORMAT") {
            Some(v) => v.parse::<LogFormat>().map_err(|reason| ConfigError::Invalid {
                var: "PANSOFT_LOG_FORMAT",
                reason,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind_addr,
            store,
            stock_policy,
            log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_to_memory_store() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.stock_policy, StockPolicy::default());
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn database_url_selects_postgres() {
        let cfg = config(&[("DATABASE_URL", "postgres://localhost/pansoft")]).unwrap();
        assert_eq!(
            cfg.store,
            StoreBackend::Postgres {
                database_url: "postgres://localhost/pansoft".into(),
                max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            }
        );

        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/pansoft"),
            ("PANSOFT_STORE", "memory"),
        ])
        .unwrap();
        assert_eq!(cfg.store, StoreBackend::Memory);
    }

    #[test]
    fn postgres_without_url_is_an_error() {
        assert_eq!(
            config(&[("PANSOFT_STORE", "postgres")]).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = config(&[("PANSOFT_MAX_MOVEMENT_QUANTITY", "-3")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "PANSOFT_MAX_MOVEMENT_QUANTITY",
                ..
            }
        ));
        assert!(config(&[("PANSOFT_BIND_ADDR", "nowhere")]).is_err());
        assert!(config(&[("PANSOFT_LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn overrides_apply() {
        let cfg = config(&[
            ("PANSOFT_BIND_ADDR", "127.0.0.1:9000"),
            ("PANSOFT_MAX_MOVEMENT_QUANTITY", "250.5"),
            ("PANSOFT_LOG_FORMAT", "pretty"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.stock_policy.max_quantity, Decimal::new(2505, 1));
        assert_eq!(cfg.log_format, LogFormat::Pretty);
    }
}
