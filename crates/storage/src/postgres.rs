//! PostgreSQL-based settings store implementation.

use crate::error::{StoreError, StoreResult, is_unique_violation};
use crate::query::{BindValue, CompiledQuery, ParamStyle};
use crate::store::{ListEvent, SettingsStore};
use alcove_core::{Entry, Tenant};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use std::str::FromStr;
use tokio::sync::mpsc;
use uuid::Uuid;

/// PostgreSQL-based settings store.
///
/// Each tenant gets its own schema, `alcove_<tenant>`, holding a single
/// `settings` table. Tenant names are validated identifiers, so the
/// schema-qualified table name is safe to interpolate.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect to PostgreSQL.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> StoreResult<Self> {
        let mut opts = PgConnectOptions::from_str(url)?;
        // Bound statement runtime so a stuck count or scan cannot pin a
        // pooled connection indefinitely.
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!("PostgreSQL statement_timeout set to {timeout_ms}ms");
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        Ok(Self { pool })
    }

    fn table(tenant: &Tenant) -> String {
        format!("alcove_{}.settings", tenant.as_str())
    }
}

/// The conflict target matching the partial unique index the entry's owner
/// field falls under. Two indexes are needed because NULL owners would
/// otherwise never collide with each other.
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

fn entry_from_row(row: &PgRow) -> Result<Entry, sqlx::Error> {
    Ok(Entry {
        id: Some(row.try_get("id")?),
        scope: row.try_get("scope")?,
        key: row.try_get("key")?,
        value: row.try_get::<Json<Value>, _>("value")?.0,
        owner: row.try_get("owner")?,
    })
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: BindValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        BindValue::Text(s) => query.bind(s),
        BindValue::Uuid(u) => query.bind(u),
        BindValue::Int(i) => query.bind(i),
    }
}

#[async_trait]
impl SettingsStore for PostgresStore {
    fn param_style(&self) -> ParamStyle {
        ParamStyle::Dollar
    }

    async fn init_tenant(&self, tenant: &Tenant) -> StoreResult<()> {
        let schema = format!("alcove_{}", tenant.as_str());
        let table = Self::table(tenant);
        let statements = [
            format!("CREATE SCHEMA IF NOT EXISTS {schema}"),
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 id uuid NOT NULL PRIMARY KEY, \
                 scope text NOT NULL, \
                 key text NOT NULL, \
                 value jsonb NOT NULL, \
                 owner uuid)"
            ),
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS settings_scope_key_owner \
                 ON {table} (scope, key, owner) WHERE owner IS NOT NULL"
            ),
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS settings_scope_key_global \
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
            "INSERT INTO {} (id, scope, key, value, owner) VALUES ($1, $2, $3, $4, $5) \
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
            "SELECT id, scope, key, value, owner FROM {} WHERE id = $1",
            Self::table(tenant)
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(entry_from_row).transpose().map_err(Into::into)
    }

    async fn update(&self, tenant: &Tenant, entry: &Entry) -> StoreResult<()> {
        let id = require_id(entry)?;
        let sql = format!(
            "UPDATE {} SET scope = $2, key = $3, value = $4, owner = $5 WHERE id = $1",
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
        let sql = format!("DELETE FROM {} WHERE id = $1", Self::table(tenant));
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn upsert(&self, tenant: &Tenant, entry: &Entry) -> StoreResult<bool> {
        let id = require_id(entry)?;
        let sql = format!(
            "INSERT INTO {} (id, scope, key, value, owner) VALUES ($1, $2, $3, $4, $5) \
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
        // On conflict the row keeps its original id, so a changed id means
        // the insert lost to an existing row and the value was updated.
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
                    // Receiver gone: client disconnected. Drop the cursor and
                    // release the connection.
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
