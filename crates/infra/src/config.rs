//! Engine configuration loaded from environment variables.

use std::time::Duration;

use tracing::warn;

pub const USE_PERSISTENT_STORE: &str = "STOREOPS_USE_PERSISTENT_STORE";
pub const DATABASE_URL: &str = "STOREOPS_DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "STOREOPS_DB_MAX_CONNECTIONS";
pub const STATEMENT_TIMEOUT_MS: &str = "STOREOPS_STATEMENT_TIMEOUT_MS";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 5_000;

/// Which store backs the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub backend: StoreBackend,
    /// Upper bound for a single store call (Postgres `statement_timeout`,
    /// in-memory commit lock wait).
    pub statement_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::InMemory,
            statement_timeout: Duration::from_millis(DEFAULT_STATEMENT_TIMEOUT_MS),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Invalid values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let use_persistent = parse_or(&lookup, USE_PERSISTENT_STORE, false);
        let statement_timeout = Duration::from_millis(parse_or(
            &lookup,
            STATEMENT_TIMEOUT_MS,
            DEFAULT_STATEMENT_TIMEOUT_MS,
        ));

        let backend = if use_persistent {
            match lookup(DATABASE_URL).filter(|url| !url.trim().is_empty()) {
                Some(database_url) => StoreBackend::Postgres {
                    database_url,
                    max_connections: parse_or(&lookup, DB_MAX_CONNECTIONS, DEFAULT_MAX_CONNECTIONS),
                },
                None => {
                    warn!(
                        "{USE_PERSISTENT_STORE}=true but {DATABASE_URL} is not set, falling back to in-memory"
                    );
                    StoreBackend::InMemory
                }
            }
        } else {
            StoreBackend::InMemory
        };

        Self {
            backend,
            statement_timeout,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default = ?default, "invalid config value, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> EngineConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_in_memory() {
        assert_eq!(config(&[]), EngineConfig::default());
    }

    #[test]
    fn persistent_store_needs_a_database_url() {
        let cfg = config(&[(USE_PERSISTENT_STORE, "true")]);
        assert_eq!(cfg.backend, StoreBackend::InMemory);

        let cfg = config(&[
            (USE_PERSISTENT_STORE, "true"),
            (DATABASE_URL, "postgres://localhost/storeops"),
            (DB_MAX_CONNECTIONS, "4"),
        ]);
        assert_eq!(
            cfg.backend,
            StoreBackend::Postgres {
                database_url: "postgres://localhost/storeops".to_string(),
                max_connections: 4,
            }
        );
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let cfg = config(&[
            (USE_PERSISTENT_STORE, "yes please"),
            (STATEMENT_TIMEOUT_MS, "soon"),
        ]);
        assert_eq!(cfg.backend, StoreBackend::InMemory);
        assert_eq!(cfg.statement_timeout, Duration::from_millis(5_000));
    }

    #[test]
    fn statement_timeout_is_read_in_millis() {
        let cfg = config(&[(STATEMENT_TIMEOUT_MS, "250")]);
        assert_eq!(cfg.statement_timeout, Duration::from_millis(250));
    }
}
