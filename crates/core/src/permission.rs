//! Permission tokens and row-visibility derivation.
//!
//! A permission token is a four-field dot-separated string,
//! `<namespace>.<right>.<operation>.<scope>`, e.g. `alcove.owner.read.ui`.
//! The namespace must be [`crate::PERMISSION_NAMESPACE`]; the scope is
//! everything after the third dot and may itself contain dots. Tokens that
//! do not parse simply contribute no rights — callers send whatever their
//! gateway handed them, and an unrelated token is not an error.

use crate::PERMISSION_NAMESPACE;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// The operation a token grants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

/// The population a token's grant applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RightKind {
    /// Only the scope's ownerless entries.
    Global,
    /// Every owner's entries in the scope (superset of `Global` for listing).
    Users,
    /// Entries owned by the caller themselves.
    Owner,
}

/// A parsed permission token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Permission {
    pub right: RightKind,
    pub operation: Operation,
    pub scope: String,
}

impl Permission {
    /// Parse a token string; `None` for anything malformed or foreign.
    pub fn parse(token: &str) -> Option<Self> {
        let rest = token.strip_prefix(PERMISSION_NAMESPACE)?.strip_prefix('.')?;
        let (right, rest) = rest.split_once('.')?;
        let (operation, scope) = rest.split_once('.')?;
        if scope.is_empty() {
            return None;
        }
        let right = match right {
            "global" => RightKind::Global,
            "users" => RightKind::Users,
            "owner" => RightKind::Owner,
            _ => return None,
        };
        let operation = match operation {
            "read" => Operation::Read,
            "write" => Operation::Write,
            _ => return None,
        };
        Some(Self {
            right,
            operation,
            scope: scope.to_string(),
        })
    }
}

/// The set of permission tokens carried on one request.
///
/// Authorization is recomputed per call; nothing here is persisted.
#[derive(Clone, Debug, Default)]
pub struct PermissionSet {
    tokens: Vec<Permission>,
}

impl PermissionSet {
    /// Build from raw token strings, silently dropping malformed ones.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .filter_map(|t| Permission::parse(t.as_ref()))
                .collect(),
        }
    }

    fn grants(&self, right: RightKind, operation: Operation, scope: &str) -> bool {
        self.tokens
            .iter()
            .any(|p| p.right == right && p.operation == operation && p.scope == scope)
    }

    /// Decide single-entry access.
    ///
    /// Global entries need a `global` grant for the scope. Owned entries are
    /// reachable through a `users` grant, or through an `owner` grant when
    /// the caller is the entry's owner.
    pub fn authorize(
        &self,
        operation: Operation,
        scope: &str,
        entry_owner: Option<Uuid>,
        caller: Option<Uuid>,
    ) -> bool {
        match entry_owner {
            None => self.grants(RightKind::Global, operation, scope),
            Some(owner) => {
                self.grants(RightKind::Users, operation, scope)
                    || (self.grants(RightKind::Owner, operation, scope) && caller == Some(owner))
            }
        }
    }

    /// Derive the per-scope row-visibility predicates for listing.
    ///
    /// One OR-term per scope with at least one read grant; the term shape
    /// depends on which right kinds were seen for that scope. An empty
    /// result means the caller may list nothing.
    pub fn derive_read_predicates(&self, caller: Option<Uuid>) -> Vec<ScopePredicate> {
        let mut by_scope: BTreeMap<&str, BTreeSet<RightKind>> = BTreeMap::new();
        for p in &self.tokens {
            if p.operation == Operation::Read {
                by_scope.entry(&p.scope).or_default().insert(p.right);
            }
        }

        let mut predicates = Vec::new();
        for (scope, rights) in by_scope {
            let owner = if rights.contains(&RightKind::Users) {
                OwnerConstraint::Any
            } else if rights.contains(&RightKind::Global) {
                match (rights.contains(&RightKind::Owner), caller) {
                    (true, Some(caller)) => OwnerConstraint::GlobalOrOwner(caller),
                    _ => OwnerConstraint::GlobalOnly,
                }
            } else {
                // Owner-only rights: without a caller id there is no way to
                // identify the caller's rows, so the scope contributes nothing.
                match caller {
                    Some(caller) => OwnerConstraint::OwnerOnly(caller),
                    None => continue,
                }
            };
            predicates.push(ScopePredicate {
                scope: scope.to_string(),
                owner,
            });
        }
        predicates
    }
}

/// Row filter for one scope, derived from the caller's read grants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopePredicate {
    pub scope: String,
    pub owner: OwnerConstraint,
}

/// The owner restriction attached to a [`ScopePredicate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnerConstraint {
    /// No restriction: every row in the scope.
    Any,
    /// Only ownerless rows.
    GlobalOnly,
    /// Only rows owned by this caller.
    OwnerOnly(Uuid),
    /// Ownerless rows plus the caller's own rows.
    GlobalOrOwner(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn set(tokens: &[&str]) -> PermissionSet {
        PermissionSet::from_tokens(tokens.iter().copied())
    }

    #[test]
    fn parses_well_formed_tokens() {
        let p = Permission::parse("alcove.users.read.ui").unwrap();
        assert_eq!(p.right, RightKind::Users);
        assert_eq!(p.operation, Operation::Read);
        assert_eq!(p.scope, "ui");
    }

    #[test]
    fn scope_may_contain_dots() {
        let p = Permission::parse("alcove.global.write.circulation.checkout").unwrap();
        assert_eq!(p.scope, "circulation.checkout");
    }

    #[test]
    fn malformed_tokens_are_ignored() {
        for bad in [
            "",
            "alcove",
            "alcove.global.read.",
            "alcove.global.peek.ui",
            "alcove.everyone.read.ui",
            "other.global.read.ui",
            "alcoveX.global.read.ui",
        ] {
            assert!(Permission::parse(bad).is_none(), "parsed {bad:?}");
        }
    }

    #[test]
    fn global_entry_needs_global_grant() {
        let caller = Some(Uuid::new_v4());
        let perms = set(&["alcove.global.read.ui"]);
        assert!(perms.authorize(Operation::Read, "ui", None, caller));
        assert!(!perms.authorize(Operation::Write, "ui", None, caller));
        assert!(!perms.authorize(Operation::Read, "other", None, caller));

        // Owner and users rights never reach global entries.
        let perms = set(&["alcove.owner.read.ui", "alcove.users.read.ui"]);
        assert!(!perms.authorize(Operation::Read, "ui", None, caller));
    }

    #[test]
    fn owned_entry_via_users_or_matching_owner() {
        let owner = Uuid::new_v4();
        let users = set(&["alcove.users.write.ui"]);
        assert!(users.authorize(Operation::Write, "ui", Some(owner), None));

        let own = set(&["alcove.owner.write.ui"]);
        assert!(own.authorize(Operation::Write, "ui", Some(owner), Some(owner)));
        assert!(!own.authorize(Operation::Write, "ui", Some(owner), Some(Uuid::new_v4())));
        assert!(!own.authorize(Operation::Write, "ui", Some(owner), None));
    }

    #[test]
    fn authorize_is_monotonic_in_the_token_set() {
        let owner = Uuid::new_v4();
        let caller = Some(owner);
        let base = vec!["alcove.owner.read.ui"];
        let extra = [
            "alcove.global.read.ui",
            "alcove.users.write.other",
            "garbage-token",
        ];
        let before = set(&base).authorize(Operation::Read, "ui", Some(owner), caller);
        assert!(before);
        for add in extra {
            let mut tokens = base.clone();
            tokens.push(add);
            assert!(set(&tokens).authorize(Operation::Read, "ui", Some(owner), caller));
        }
    }

    fn predicate_set(perms: &PermissionSet, caller: Option<Uuid>) -> HashSet<(String, String)> {
        perms
            .derive_read_predicates(caller)
            .into_iter()
            .map(|p| (p.scope, format!("{:?}", p.owner)))
            .collect()
    }

    #[test]
    fn predicates_are_order_independent() {
        let caller = Some(Uuid::new_v4());
        let forward = set(&[
            "alcove.global.read.ui",
            "alcove.owner.read.ui",
            "alcove.users.read.cat",
        ]);
        let reversed = set(&[
            "alcove.users.read.cat",
            "alcove.owner.read.ui",
            "alcove.global.read.ui",
        ]);
        assert_eq!(
            predicate_set(&forward, caller),
            predicate_set(&reversed, caller)
        );
    }

    #[test]
    fn users_right_subsumes_the_rest() {
        let caller = Some(Uuid::new_v4());
        let perms = set(&[
            "alcove.global.read.ui",
            "alcove.owner.read.ui",
            "alcove.users.read.ui",
        ]);
        let preds = perms.derive_read_predicates(caller);
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].owner, OwnerConstraint::Any);
    }

    #[test]
    fn global_only_and_global_plus_owner() {
        let caller = Uuid::new_v4();
        let perms = set(&["alcove.global.read.ui"]);
        assert_eq!(
            perms.derive_read_predicates(Some(caller))[0].owner,
            OwnerConstraint::GlobalOnly
        );

        let perms = set(&["alcove.global.read.ui", "alcove.owner.read.ui"]);
        assert_eq!(
            perms.derive_read_predicates(Some(caller))[0].owner,
            OwnerConstraint::GlobalOrOwner(caller)
        );
        // Without a caller id the owner half falls away.
        assert_eq!(
            perms.derive_read_predicates(None)[0].owner,
            OwnerConstraint::GlobalOnly
        );
    }

    #[test]
    fn owner_only_without_caller_contributes_nothing() {
        let perms = set(&["alcove.owner.read.ui"]);
        assert!(perms.derive_read_predicates(None).is_empty());
        let caller = Uuid::new_v4();
        assert_eq!(
            perms.derive_read_predicates(Some(caller)),
            vec![ScopePredicate {
                scope: "ui".into(),
                owner: OwnerConstraint::OwnerOnly(caller),
            }]
        );
    }

    #[test]
    fn write_tokens_contribute_no_read_predicates() {
        let perms = set(&["alcove.global.write.ui", "alcove.users.write.ui"]);
        assert!(perms.derive_read_predicates(None).is_empty());
    }
}
