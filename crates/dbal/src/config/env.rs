//! Environment variable loading for configuration

use std::env;

use super::builder::{DbalConfigBuilder, MAIN_CONNECTION};
use super::ConnectionConfig;
use crate::{Error, Result};

/// Environment variable names
mod vars {
    pub const DBAL_CONFIG: &str = "DBAL_CONFIG";
    pub const DBAL_URL: &str = "DBAL_URL";
    pub const DBAL_DEFAULT_CONNECTION: &str = "DBAL_DEFAULT_CONNECTION";
}

/// Explicit configuration file named by `DBAL_CONFIG`.
pub fn config_path() -> Option<std::path::PathBuf> {
    env::var_os(vars::DBAL_CONFIG)
        .filter(|v| !v.is_empty())
        .map(std::path::PathBuf::from)
}

/// Name of a per-connection variable, e.g. `DBAL_MAIN_HOST`.
fn connection_var(name: &str, field: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("DBAL_{name}_{field}")
}

/// Load configuration from environment variables
pub fn load_from_env(mut builder: DbalConfigBuilder) -> Result<DbalConfigBuilder> {
    // Connection URL replaces the main connection wholesale
    if let Ok(url) = env::var(vars::DBAL_URL) {
        let mut config = ConnectionConfig::from_url(&url)
            .map_err(|e| Error::Config(format!("Invalid {}: {e}", vars::DBAL_URL)))?;
        builder = builder.update_connection(MAIN_CONNECTION, |existing| {
            config.driver_version = existing.driver_version.take();
            config.number_of_connections = existing.number_of_connections;
            config.query_timeout_secs = existing.query_timeout_secs;
            config.wait_timeout_secs = existing.wait_timeout_secs;
            config.shutdown_timeout_secs = existing.shutdown_timeout_secs;
        });
        builder = builder.connection(MAIN_CONNECTION, config);
    }

    if let Ok(name) = env::var(vars::DBAL_DEFAULT_CONNECTION)
        && !name.trim().is_empty()
    {
        builder = builder.default_connection(name.trim());
    }

    let names: Vec<String> = builder.connection_names().map(str::to_string).collect();
    for name in names {
        builder = apply_connection_overrides(builder, &name)?;
    }

    Ok(builder)
}

fn apply_connection_overrides(builder: DbalConfigBuilder, name: &str) -> Result<DbalConfigBuilder> {
    let host = env::var(connection_var(name, "HOST")).ok();
    let user = env::var(connection_var(name, "USER")).ok();
    let password = env::var(connection_var(name, "PASSWORD")).ok();
    let dbname = env::var(connection_var(name, "DBNAME")).ok();
    let port = parse_var::<u16>(&connection_var(name, "PORT"))?;
    let pool_size = parse_var::<usize>(&connection_var(name, "NUMBER_OF_CONNECTIONS"))?;

    Ok(builder.update_connection(name, |config| {
        if let Some(host) = host {
            config.host = host;
        }
        if let Some(port) = port {
            config.port = port;
        }
        if let Some(user) = user {
            config.user = user;
        }
        if let Some(password) = password {
            config.password = Some(password);
        }
        if let Some(dbname) = dbname {
            config.dbname = dbname;
        }
        if let Some(size) = pool_size {
            config.number_of_connections = size;
        }
    }))
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid {key}: '{raw}'"))),
        Err(_) => Ok(None),
    }
}
