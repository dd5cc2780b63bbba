//! Named connections built from one configuration.

use std::collections::BTreeMap;

use futures::future::join_all;

use crate::config::DbalConfig;
use crate::{Connection, Error, Result};

/// Every configured logical database, keyed by name.
#[derive(Debug, Clone)]
pub struct Connections {
    connections: BTreeMap<String, Connection>,
    default_name: String,
    default: Connection,
}

impl Connections {
    /// Builds one [`Connection`] per configured name. Nothing is opened yet.
    pub fn from_config(config: &DbalConfig) -> Result<Self> {
        let connections = config
            .connections()
            .iter()
            .map(|(name, cfg)| Ok((name.clone(), Connection::from_config(cfg)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let default_name = config.default_connection_name().to_string();
        let default = connections.get(&default_name).cloned().ok_or_else(|| {
            Error::Config(format!("default connection '{default_name}' is not configured"))
        })?;

        Ok(Self {
            connections,
            default_name,
            default,
        })
    }

    /// Verifies every connection in name order. Stops at the first failure.
    pub async fn connect_all(&self) -> Result<()> {
        for (name, connection) in &self.connections {
            if let Err(e) = connection.connect_and_verify().await {
                tracing::error!(connection = %name, error = %e, "Connection verification failed");
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Connection> {
        self.connections.get(name)
    }

    pub const fn default_connection(&self) -> &Connection {
        &self.default
    }

    pub fn default_connection_name(&self) -> &str {
        &self.default_name
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }

    /// Shuts every pool down concurrently.
    pub async fn shutdown(&self) {
        join_all(self.connections.values().map(Connection::shutdown)).await;
    }
}
