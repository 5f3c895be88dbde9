//! The settings store trait.

use crate::error::StoreResult;
use crate::query::{CompiledQuery, ParamStyle};
use alcove_core::{Entry, Tenant};
use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

/// One event on a listing stream.
///
/// A well-behaved producer sends zero or more `Row`s followed by exactly one
/// terminal event: `End` with the total count on success, `Failed` with a
/// diagnostic otherwise. A consumer that drops the receiver cancels the
/// stream; the producer notices the failed send and releases its connection.
#[derive(Debug)]
pub enum ListEvent {
    Row(Entry),
    End { total_records: u64 },
    Failed { message: String },
}

/// Storage backend for settings entries.
///
/// Implementations perform no permission checking; that is
/// [`crate::access::SettingsAccess`]'s job. Uniqueness of
/// `(scope, key, owner)` is enforced by database constraints so concurrent
/// writers race safely.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Placeholder style for queries compiled against this backend.
    fn param_style(&self) -> ParamStyle;

    /// Provision the settings table for a tenant. Idempotent.
    async fn init_tenant(&self, tenant: &Tenant) -> StoreResult<()>;

    /// Insert a new entry; `Conflict` if `(scope, key, owner)` exists.
    async fn insert(&self, tenant: &Tenant, entry: &Entry) -> StoreResult<()>;

    /// Point lookup by id.
    async fn fetch(&self, tenant: &Tenant, id: Uuid) -> StoreResult<Option<Entry>>;

    /// Full replace of an entry's fields; `NotFound` if the id is absent,
    /// `Conflict` if the new `(scope, key, owner)` collides.
    async fn update(&self, tenant: &Tenant, entry: &Entry) -> StoreResult<()>;

    /// Delete by id; `NotFound` if absent.
    async fn delete(&self, tenant: &Tenant, id: Uuid) -> StoreResult<()>;

    /// Insert-or-update on `(scope, key, owner)`. The entry's id must
    /// already be set (freshly generated by the caller); returns `true`
    /// when a new row was inserted, `false` when an existing row's value
    /// was replaced.
    async fn upsert(&self, tenant: &Tenant, entry: &Entry) -> StoreResult<bool>;

    /// Execute a compiled listing query, sending rows and a terminal event
    /// into `events`. Never returns an error: failures are reported on the
    /// channel so the consumer can close an already-started document.
    async fn stream_entries(
        &self,
        tenant: &Tenant,
        query: CompiledQuery,
        events: mpsc::Sender<ListEvent>,
    );

    /// Check database connectivity.
    async fn health_check(&self) -> StoreResult<()>;
}
