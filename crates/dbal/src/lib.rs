//! Asynchronous pooled database abstraction layer for MySQL, PostgreSQL and
//! SQLite.
//!
//! A [`Connection`] pairs a bounded [`ConnectionPool`] with the [`Platform`]
//! of its engine and exposes a handful of portable operations. Engine errors
//! come back classified as [`Error`] variants.
//!
//! ```no_run
//! use dbal::{Connection, Credentials, Engine};
//!
//! # async fn demo() -> dbal::Result<()> {
//! let credentials = Credentials::builder("test")
//!     .host("127.0.0.1")
//!     .port(3306)
//!     .user("root")
//!     .password("root")
//!     .build(Engine::Mysql)?;
//! let conn = Connection::create_connected("mysql", credentials, 4, None).await?;
//!
//! match conn.create_table("test", [("id", "string")]).await {
//!     Ok(()) | Err(dbal::Error::TableAlreadyExists(_)) => {}
//!     Err(e) => return Err(e),
//! }
//! conn.insert("test", [("id", "1")]).await?;
//! let row = conn.find_one_by("test", [("id", "1")]).await?;
//! assert!(row.is_some());
//! conn.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod connection;
mod credentials;
pub mod driver;
mod engine;
mod error;
pub mod observability;
pub mod platform;
pub mod pool;
mod registry;
#[cfg(test)]
mod testing;
mod value;

pub use config::{ConnectionConfig, DbalConfig, DbalConfigBuilder};
pub use connection::Connection;
pub use credentials::{Credentials, CredentialsBuilder, SQLITE_MEMORY};
pub use engine::Engine;
pub use error::{Error, ErrorKind, NativeError, NativeErrorSource, Result};
pub use platform::{ColumnType, DialectVersion, Platform, Statement};
pub use pool::{ConnectionPool, PoolOptions, PoolStatus, PooledSlot, SlotOutcome, SlotState};
pub use registry::Connections;
pub use value::{QueryResult, Row, Value};
