use serde::Deserialize;
use time::Duration;

use crate::error::{BasaltError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: String,
    pub database: String,
    pub lock_ttl_secs: u64,
    pub lock_cache_capacity: usize,
    pub lock_cache_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8529".to_owned(),
            database: "basalt".to_owned(),
            lock_ttl_secs: 300,
            lock_cache_capacity: 1024,
            lock_cache_grace_secs: 5,
        }
    }
}

impl Config {
    /// Profile for contended deployments: short lock tenure, larger
    /// locked-by-me cache.
    pub fn contended() -> Self {
        Self {
            lock_ttl_secs: 30,
            lock_cache_capacity: 8192,
            lock_cache_grace_secs: 2,
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| BasaltError::Config(err.to_string()))
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::seconds(self.lock_ttl_secs as i64)
    }

    pub fn lock_cache_grace(&self) -> Duration {
        Duration::seconds(self.lock_cache_grace_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.lock_ttl(), Duration::seconds(300));
        assert!(config.lock_cache_capacity > 0);
    }

    #[test]
    fn loads_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            database = "graph"
            lock_ttl_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.database, "graph");
        assert_eq!(config.lock_ttl_secs, 60);
        assert_eq!(config.endpoint, "http://localhost:8529");
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(Config::from_toml_str("lock_ttl_secs = \"soon\"").is_err());
    }
}
