//! Canonical error kinds shared by every Backbone-backed component.
//!
//! Every component that stores state through [`crate::backbone::Cache`] surfaces
//! failures through this enum rather than letting a backing driver's error type
//! (a Redis error, a SQL error, ...) leak across the component boundary.

use thiserror::Error;

/// Stable, transport-mappable error kind for Backbone operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackboneError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

pub type BackboneResult<T> = std::result::Result<T, BackboneError>;
