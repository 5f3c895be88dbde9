//! Permission-checked access to a tenant's settings.

use crate::error::{StoreError, StoreResult};
use crate::query::{self, CompiledQuery};
use crate::store::{ListEvent, SettingsStore};
use alcove_core::filter::{Filter, OrderSpec};
use alcove_core::permission::{Operation, PermissionSet};
use alcove_core::{Entry, Tenant};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// One caller's view of one tenant's settings.
///
/// Built per request from the identity headers, this is the only path
/// handlers use to reach the store. Every operation authorizes against the
/// caller's permission set before touching a row, and point lookups answer
/// `NotFound` for rows the caller may not read so that existence does not
/// leak.
#[derive(Clone)]
pub struct SettingsAccess {
    store: Arc<dyn SettingsStore>,
    tenant: Tenant,
    caller: Option<Uuid>,
    permissions: PermissionSet,
}

impl SettingsAccess {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        tenant: Tenant,
        caller: Option<Uuid>,
        permissions: PermissionSet,
    ) -> Self {
        Self {
            store,
            tenant,
            caller,
            permissions,
        }
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    fn authorize(&self, operation: Operation, entry: &Entry) -> bool {
        self.permissions
            .authorize(operation, &entry.scope, entry.owner, self.caller)
    }

    /// Create a new entry. The caller supplies the id.
    pub async fn create(&self, entry: Entry) -> StoreResult<Entry> {
        entry.require_id()?;
        if !self.authorize(Operation::Write, &entry) {
            return Err(StoreError::Forbidden);
        }
        self.store.insert(&self.tenant, &entry).await?;
        Ok(entry)
    }

    /// Fetch an entry by id. Unreadable and absent are both `NotFound`.
    pub async fn get(&self, id: Uuid) -> StoreResult<Entry> {
        let entry = self
            .store
            .fetch(&self.tenant, id)
            .await?
            .ok_or(StoreError::NotFound)?;
        if !self.authorize(Operation::Read, &entry) {
            return Err(StoreError::NotFound);
        }
        Ok(entry)
    }

    /// Replace an entry. Write rights are needed on the stored entry and on
    /// the replacement, so a caller cannot move an entry into or out of a
    /// scope they cannot write. The two checks fail differently on purpose:
    /// an unwritable stored entry is `NotFound` (its existence must not
    /// leak, same as `get`), while an unwritable replacement is `Forbidden`
    /// (the caller already knows the entry they are sending).
    pub async fn update(&self, entry: Entry) -> StoreResult<()> {
        let id = entry.require_id()?;
        let existing = self
            .store
            .fetch(&self.tenant, id)
            .await?
            .ok_or(StoreError::NotFound)?;
        if !self.authorize(Operation::Write, &existing) {
            return Err(StoreError::NotFound);
        }
        if !self.authorize(Operation::Write, &entry) {
            return Err(StoreError::Forbidden);
        }
        self.store.update(&self.tenant, &entry).await
    }

    /// Delete an entry by id.
    pub async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let existing = self
            .store
            .fetch(&self.tenant, id)
            .await?
            .ok_or(StoreError::NotFound)?;
        if !self.authorize(Operation::Write, &existing) {
            return Err(StoreError::NotFound);
        }
        self.store.delete(&self.tenant, id).await
    }

    /// Insert-or-update on `(scope, key, owner)` for bulk ingestion.
    /// Returns `true` when a new row was created.
    pub async fn upsert(&self, mut entry: Entry) -> StoreResult<bool> {
        if entry.id.is_some() {
            return Err(StoreError::User(
                "id must not be supplied on upload".to_string(),
            ));
        }
        entry.validate()?;
        if !self.authorize(Operation::Write, &entry) {
            return Err(StoreError::Forbidden);
        }
        entry.id = Some(Uuid::new_v4());
        self.store.upsert(&self.tenant, &entry).await
    }

    /// Compile a listing query scoped to what this caller may see.
    /// `Forbidden` when the caller holds no read grants at all.
    pub fn list_query(
        &self,
        filter: Option<&Filter>,
        order: Option<OrderSpec>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<CompiledQuery> {
        let visibility = self.permissions.derive_read_predicates(self.caller);
        if visibility.is_empty() {
            return Err(StoreError::Forbidden);
        }
        query::compile(
            self.store.param_style(),
            &visibility,
            filter,
            order,
            limit,
            offset,
        )
    }

    /// Run a compiled listing query, sending events into `events`.
    pub async fn stream(&self, query: CompiledQuery, events: mpsc::Sender<ListEvent>) {
        self.store.stream_entries(&self.tenant, query, events).await;
    }
}
