//! Runtime configuration, read from environment variables.

use anyhow::{bail, Context, Result};

pub const DEFAULT_SCYLLA_NODE: &str = "127.0.0.1:9042";
pub const DEFAULT_KEYSPACE: &str = "orders_ks";
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Which collaborator stores the service runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Scylla,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            "scylla" | "scylladb" => Ok(StoreBackend::Scylla),
            other => bail!("unknown store backend: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub store_backend: StoreBackend,
    pub scylla_node: String,
    pub keyspace: String,
    /// `None` when the metrics server is disabled (`METRICS_PORT=0`)
    pub metrics_port: Option<u16>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            scylla_node: DEFAULT_SCYLLA_NODE.to_string(),
            keyspace: DEFAULT_KEYSPACE.to_string(),
            metrics_port: Some(DEFAULT_METRICS_PORT),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; unset keys fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(backend) = lookup("ORDER_STORE_BACKEND") {
            config.store_backend = backend.parse()?;
        }
        if let Some(node) = lookup("SCYLLA_NODE") {
            config.scylla_node = node;
        }
        if let Some(keyspace) = lookup("SCYLLA_KEYSPACE") {
            if keyspace.is_empty() || !keyspace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                bail!("invalid SCYLLA_KEYSPACE: {keyspace:?}");
            }
            config.keyspace = keyspace;
        }
        if let Some(port) = lookup("METRICS_PORT") {
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid METRICS_PORT: {port:?}"))?;
            config.metrics_port = (port != 0).then_some(port);
        }

        Ok(config)
    }
}
