use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::libs::error::{OrmError, Result};

/// Connection settings for [`PgExecutor`](crate::PgExecutor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrmConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://postgres@localhost:5432/postgres".to_string(),
            max_connections: 5,
            connect_timeout_secs: 10,
        }
    }
}

impl OrmConfig {
    pub fn new(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            ..Self::default()
        }
    }

    /// Read `DATABASE_URL`, `PKMAPPER_MAX_CONNECTIONS` and
    /// `PKMAPPER_CONNECT_TIMEOUT`, keeping defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(raw) = lookup("PKMAPPER_MAX_CONNECTIONS") {
            config.max_connections = parse_var("PKMAPPER_MAX_CONNECTIONS", &raw)?;
        }
        if let Some(raw) = lookup("PKMAPPER_CONNECT_TIMEOUT") {
            config.connect_timeout_secs = parse_var("PKMAPPER_CONNECT_TIMEOUT", &raw)?;
        }
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| OrmError::Config(format!("{name} must be a number, got {raw:?}")))
}
