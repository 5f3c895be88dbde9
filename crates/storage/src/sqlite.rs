//! SQLite-based settings store implementation.
//!
//! Intended for single-node deployments and tests. Tenants map to tables,
//! `settings_<tenant>`, in one database file; the SQL shapes mirror the
//! PostgreSQL store with `?` placeholders.

use crate::error::{StoreError, StoreResult, is_unique_violation};
use crate::query::{BindValue, CompiledQuery, ParamStyle};
use crate::store::{ListEvent, SettingsStore};
use alcove_core::{Entry, Tenant};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::types::Json;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// SQLite-based settings store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (and create if missing) the database file.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        // A single writer connection sidesteps SQLITE_BUSY under
        // concurrent writes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        tracing::info!(path = %path.as_ref().display(), "opened SQLite settings database");
        Ok(Self { pool })
    }

    fn table(tenant: &Tenant) -> String {
        format!("settings_{}", tenant.as_str())
    }
}

fn on_conflict_target(entry: &Entry) -> &'static str {
    if entry.owner.is_some() {
        "ON CONFLICT (scope, key, owner) WHERE owner IS NOT NULL"
    } else {
        "ON CONFLICT (scope, key) WHERE owner IS NULL"
    }
}

fn require_id(entry: &Entry) -> StoreResult<Uuid> {
    entry
        .id
        .ok_or_else(|| StoreError::User("entry must have an id".to_string()))
}

fn entry_from_row(row: &SqliteRow) -> Result<Entry, sqlx::Error> {
    Ok(Entry {
        id: Some(row.try_get("id")?),
        scope: row.try_get("scope")?,
        key: row.try_get("key")?,
        value: row.try_get::<Json<Value>, _>("value")?.0,
        owner: row.try_get("owner")?,
    })
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: BindValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        BindValue::Text(s) => query.bind(s),
        BindValue::Uuid(u) => query.bind(u),
        BindValue::Int(i) => query.bind(i),
    }
}

#[async_trait]
impl SettingsStore for SqliteStore {
    fn param_style(&self) -> ParamStyle {
        ParamStyle::Question
    }

    async fn init_tenant(&self, tenant: &Tenant) -> StoreResult<()> {
        let table = Self::table(tenant);
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 id BLOB NOT NULL PRIMARY KEY, \
                 scope TEXT NOT NULL, \
                 key TEXT NOT NULL, \
                 value TEXT NOT NULL, \
                 owner BLOB)"
            ),
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {table}_scope_key_owner \
                 ON {table} (scope, key, owner) WHERE owner IS NOT NULL"
            ),
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {table}_scope_key_global \
                 ON {table} (scope, key) WHERE owner IS NULL"
            ),
        ];
        for statement in statements {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn insert(&self, tenant: &Tenant, entry: &Entry) -> StoreResult<()> {
        let id = require_id(entry)?;
        let sql = format!(
            "INSERT INTO {} (id, scope, key, value, owner) VALUES (?, ?, ?, ?, ?) \
             {} DO NOTHING",
            Self::table(tenant),
            on_conflict_target(entry)
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(&entry.scope)
            .bind(&entry.key)
            .bind(Json(&entry.value))
            .bind(entry.owner)
            .execute(&self.pool)
            .await;
        match result {
            Ok(done) if done.rows_affected() == 0 => Err(StoreError::Conflict(format!(
                "setting {}/{} already exists",
                entry.scope, entry.key
            ))),
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict(format!(
                "setting {}/{} already exists",
                entry.scope, entry.key
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch(&self, tenant: &Tenant, id: Uuid) -> StoreResult<Option<Entry>> {
        let sql = format!(
            "SELECT id, scope, key, value, owner FROM {} WHERE id = ?",
            Self::table(tenant)
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(entry_from_row).transpose().map_err(Into::into)
    }

    async fn update(&self, tenant: &Tenant, entry: &Entry) -> StoreResult<()> {
        let id = require_id(entry)?;
        let sql = format!(
            "UPDATE {} SET scope = ?2, key = ?3, value = ?4, owner = ?5 WHERE id = ?1",
            Self::table(tenant)
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(&entry.scope)
            .bind(&entry.key)
            .bind(Json(&entry.value))
            .bind(entry.owner)
            .execute(&self.pool)
            .await;
        match result {
            Ok(done) if done.rows_affected() == 0 => Err(StoreError::NotFound),
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict(format!(
                "setting {}/{} already exists",
                entry.scope, entry.key
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, tenant: &Tenant, id: Uuid) -> StoreResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", Self::table(tenant));
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn upsert(&self, tenant: &Tenant, entry: &Entry) -> StoreResult<bool> {
        let id = require_id(entry)?;
        let sql = format!(
            "INSERT INTO {} (id, scope, key, value, owner) VALUES (?, ?, ?, ?, ?) \
             {} DO UPDATE SET value = excluded.value RETURNING id",
            Self::table(tenant),
            on_conflict_target(entry)
        );
        let returned: Uuid = sqlx::query_scalar(&sql)
            .bind(id)
            .bind(&entry.scope)
            .bind(&entry.key)
            .bind(Json(&entry.value))
            .bind(entry.owner)
            .fetch_one(&self.pool)
            .await?;
        Ok(returned == id)
    }

    async fn stream_entries(
        &self,
        tenant: &Tenant,
        query: CompiledQuery,
        events: mpsc::Sender<ListEvent>,
    ) {
        let table = Self::table(tenant);
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "failed to acquire connection for listing");
                let _ = events
                    .send(ListEvent::Failed {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let select = query.select_sql(&table);
        tracing::debug!(sql = %select, "listing settings");
        {
            let mut sql_query = sqlx::query(&select);
            for bind in query.page_binds() {
                sql_query = bind_value(sql_query, bind);
            }
            let mut rows = sql_query.fetch(&mut *conn);
            while let Some(row) = rows.next().await {
                let entry = match row.and_then(|r| entry_from_row(&r)) {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::error!(error = %e, "listing stream error");
                        let _ = events
                            .send(ListEvent::Failed {
                                message: e.to_string(),
                            })
                            .await;
                        return;
                    }
                };
                if events.send(ListEvent::Row(entry)).await.is_err() {
                    return;
                }
            }
        }

        let count_sql = query.count_sql(&table);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for bind in query.binds().iter().cloned() {
            count_query = match bind {
                BindValue::Text(s) => count_query.bind(s),
                BindValue::Uuid(u) => count_query.bind(u),
                BindValue::Int(i) => count_query.bind(i),
            };
        }
        match count_query.fetch_one(&mut *conn).await {
            Ok(total) => {
                let _ = events
                    .send(ListEvent::End {
                        total_records: total as u64,
                    })
                    .await;
            }
            Err(e) => {
                tracing::error!(error = %e, "total records query failed");
                let _ = events
                    .send(ListEvent::Failed {
                        message: e.to_string(),
                    })
                    .await;
            }
        }
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
