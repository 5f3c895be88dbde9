//! Entry storage for Alcove.
//!
//! This crate provides the data plane:
//! - The [`store::SettingsStore`] trait with PostgreSQL and SQLite
//!   implementations
//! - The SQL query compiler that merges permission-derived visibility
//!   predicates with a caller's filter expression
//! - [`access::SettingsAccess`], the permission-checked layer every
//!   request goes through

pub mod access;
pub mod error;
pub mod postgres;
pub mod query;
pub mod sqlite;
pub mod store;

pub use access::SettingsAccess;
pub use error::{StoreError, StoreResult};
pub use postgres::PostgresStore;
pub use query::{CompiledQuery, ParamStyle};
pub use sqlite::SqliteStore;
pub use store::{ListEvent, SettingsStore};

use alcove_core::config::DatabaseConfig;
use std::sync::Arc;

/// Create a settings store from configuration.
pub async fn from_config(config: &DatabaseConfig) -> StoreResult<Arc<dyn SettingsStore>> {
    match config {
        DatabaseConfig::Postgres {
            url,
            max_connections,
            statement_timeout_ms,
        } => {
            tracing::info!("Connecting to PostgreSQL settings database");
            let store = PostgresStore::connect(url, *max_connections, *statement_timeout_ms).await?;
            Ok(Arc::new(store) as Arc<dyn SettingsStore>)
        }
        DatabaseConfig::Sqlite { path } => {
            let store = SqliteStore::open(path).await?;
            Ok(Arc::new(store) as Arc<dyn SettingsStore>)
        }
    }
}
