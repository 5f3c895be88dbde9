//! Tenant identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum tenant identifier length.
const MAX_TENANT_LEN: usize = 31;

/// A validated tenant identifier.
///
/// Tenant names select the per-tenant settings table, so they are restricted
/// to a strict identifier alphabet before they get anywhere near SQL text:
/// lowercase ASCII letter first, then lowercase letters, digits, or
/// underscores, at most 31 characters total.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tenant(String);

impl Tenant {
    /// Parse and validate a tenant identifier.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let mut chars = s.chars();
        let valid = match chars.next() {
            Some(first) if first.is_ascii_lowercase() => {
                chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            }
            _ => false,
        };
        if !valid || s.len() > MAX_TENANT_LEN {
            return Err(crate::Error::InvalidTenant(format!(
                "'{s}' is not a valid tenant identifier"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Tenant {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::parse(&s)
    }
}

impl From<Tenant> for String {
    fn from(t: Tenant) -> Self {
        t.0
    }
}
