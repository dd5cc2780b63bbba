//! Configuration builder

use std::collections::BTreeMap;

use super::ConnectionConfig;
use crate::{Error, Result};

/// Name used for the connection defined by `DBAL_URL` and as the fallback
/// default.
pub const MAIN_CONNECTION: &str = "main";

/// Validated set of named connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbalConfig {
    connections: BTreeMap<String, ConnectionConfig>,
    default_connection: String,
}

impl DbalConfig {
    #[must_use]
    pub const fn builder() -> DbalConfigBuilder {
        DbalConfigBuilder::new()
    }

    #[must_use]
    pub const fn connections(&self) -> &BTreeMap<String, ConnectionConfig> {
        &self.connections
    }

    #[must_use]
    pub fn connection(&self, name: &str) -> Option<&ConnectionConfig> {
        self.connections.get(name)
    }

    #[must_use]
    pub fn default_connection_name(&self) -> &str {
        &self.default_connection
    }

    #[must_use]
    pub fn default_connection(&self) -> &ConnectionConfig {
        &self.connections[&self.default_connection]
    }
}

/// Accumulates file and environment settings before validation.
#[derive(Debug, Clone, Default)]
pub struct DbalConfigBuilder {
    connections: BTreeMap<String, ConnectionConfig>,
    default_connection: Option<String>,
}

impl DbalConfigBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connections: BTreeMap::new(),
            default_connection: None,
        }
    }

    /// Adds or replaces a named connection.
    #[must_use]
    pub fn connection(mut self, name: impl Into<String>, config: ConnectionConfig) -> Self {
        self.connections.insert(name.into(), config);
        self
    }

    #[must_use]
    pub fn default_connection(mut self, name: impl Into<String>) -> Self {
        self.default_connection = Some(name.into());
        self
    }

    /// Applies `f` to an existing connection; unknown names are ignored.
    #[must_use]
    pub fn update_connection(mut self, name: &str, f: impl FnOnce(&mut ConnectionConfig)) -> Self {
        if let Some(config) = self.connections.get_mut(name) {
            f(config);
        }
        self
    }

    pub fn connection_names(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }

    /// Validates every connection and resolves the default one: the explicit
    /// name, else `main`, else the only connection.
    pub fn build(self) -> Result<DbalConfig> {
        if self.connections.is_empty() {
            return Err(Error::Config("at least one connection is required".into()));
        }

        for (name, config) in &self.connections {
            config.validate(name)?;
        }

        let default_connection = match self.default_connection {
            Some(name) if self.connections.contains_key(&name) => name,
            Some(name) => {
                return Err(Error::Config(format!(
                    "default_connection '{name}' is not configured"
                )));
            }
            None if self.connections.contains_key(MAIN_CONNECTION) => MAIN_CONNECTION.to_string(),
            None if self.connections.len() == 1 => self
                .connections
                .keys()
                .next()
                .cloned()
                .unwrap_or_default(),
            None => {
                return Err(Error::Config(
                    "default_connection is required when several connections are configured"
                        .into(),
                ));
            }
        };

        Ok(DbalConfig {
            connections: self.connections,
            default_connection,
        })
    }
}
