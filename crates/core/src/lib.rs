//! Core types for the Alcove settings store.
//!
//! This crate holds the pieces that do not touch a database or a socket:
//! - The [`entry::Entry`] unit of storage
//! - Permission tokens, single-entry authorization, and the derivation of
//!   row-visibility predicates for listings
//! - The filter-expression language used on listing requests
//! - Tenant identifiers and shared configuration types

pub mod config;
pub mod entry;
pub mod error;
pub mod filter;
pub mod permission;
pub mod tenant;

pub use entry::Entry;
pub use error::{Error, Result};
pub use tenant::Tenant;

/// Fixed namespace prefix of every permission token this store recognizes.
pub const PERMISSION_NAMESPACE: &str = "alcove";
