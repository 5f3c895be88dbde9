//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes for point writes (create/update).
    /// Bulk upload bodies are streamed and not subject to this limit.
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
    /// Default page size for listings when the caller gives no limit.
    #[serde(default = "default_list_limit")]
    pub default_list_limit: u32,
    /// Tenants whose storage is provisioned at startup.
    #[serde(default)]
    pub tenants: Vec<String>,
}

/// Settings database configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    /// PostgreSQL, the production backend.
    Postgres {
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Per-statement timeout; unset means the server default.
        statement_timeout_ms: Option<u64>,
    },
    /// SQLite, for development and tests.
    Sqlite { path: PathBuf },
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_body_limit() -> usize {
    65536 // 64 KiB, plenty for a single settings entry
}

fn default_list_limit() -> u32 {
    10
}

fn default_max_connections() -> u32 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            body_limit: default_body_limit(),
            default_list_limit: default_list_limit(),
            tenants: Vec::new(),
        }
    }
}
