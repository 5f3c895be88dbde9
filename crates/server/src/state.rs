//! Application state shared across handlers.

use crate::identity::Identity;
use alcove_core::config::AppConfig;
use alcove_storage::{SettingsAccess, SettingsStore};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn SettingsStore>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn SettingsStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }

    /// The store scoped to one request's tenant and permissions.
    pub fn access(&self, identity: Identity) -> SettingsAccess {
        SettingsAccess::new(
            self.store.clone(),
            identity.tenant,
            identity.caller,
            identity.permissions,
        )
    }
}
