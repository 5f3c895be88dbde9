//! The stored settings unit.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single settings entry.
///
/// `(scope, key, owner)` is unique per tenant; an absent `owner` means the
/// entry is global to the scope. `value` is opaque JSON the store never
/// interprets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entry {
    /// Stable identifier. Required on create/update, must be absent on
    /// bulk upsert (the store assigns one).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Namespace grouping related keys.
    pub scope: String,
    /// Key, unique within `(scope, owner)`.
    pub key: String,
    /// Opaque JSON value.
    pub value: Value,
    /// Owning user for a personal entry; `None` means global.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Uuid>,
}

impl Entry {
    /// Validate the fields every stored entry must carry.
    pub fn validate(&self) -> crate::Result<()> {
        if self.scope.is_empty() {
            return Err(crate::Error::InvalidEntry("scope must not be empty".into()));
        }
        if self.key.is_empty() {
            return Err(crate::Error::InvalidEntry("key must not be empty".into()));
        }
        Ok(())
    }

    /// Validate an entry for point create: an id is required.
    pub fn require_id(&self) -> crate::Result<Uuid> {
        self.validate()?;
        self.id
            .ok_or_else(|| crate::Error::InvalidEntry("entry must have an id".into()))
    }
}
