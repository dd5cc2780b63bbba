//! Configuration management
//!
//! Supports configuration loading with precedence: env > file > defaults

mod builder;
mod connection;
mod env;
mod file;

pub use builder::{DbalConfig, DbalConfigBuilder, MAIN_CONNECTION};
pub use connection::ConnectionConfig;

use crate::Result;

/// Load configuration with precedence: env > file > defaults
///
/// The file is the one named by `DBAL_CONFIG`, else the first of
/// `./dbal.toml`, `~/.config/dbal/config.toml`, `/etc/dbal/config.toml`.
pub fn load_config() -> Result<DbalConfigBuilder> {
    let mut builder = DbalConfigBuilder::new();

    let path = env::config_path().or_else(file::find_config_file);
    if let Some(path) = path {
        tracing::info!("Loading configuration from {}", path.display());
        builder = file::load_from_file(&path, builder)?;
    }

    // Override with environment variables
    builder = env::load_from_env(builder)?;

    Ok(builder)
}

/// Load configuration from a specific file path
pub fn load_config_from_path(path: &std::path::Path) -> Result<DbalConfigBuilder> {
    let mut builder = DbalConfigBuilder::new();

    // Load from specified file
    builder = file::load_from_file(path, builder)?;

    // Override with environment variables
    builder = env::load_from_env(builder)?;

    Ok(builder)
}
