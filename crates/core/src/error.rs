//! Core error type.

use thiserror::Error;

/// Errors produced by domain-level validation and parsing.
///
/// Storage and transport layers define their own error enums and convert
/// from this one; everything here is attributable to the caller's input.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid tenant: {0}")]
    InvalidTenant(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid entry: {0}")]
    InvalidEntry(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
