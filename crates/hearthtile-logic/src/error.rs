//! Error types for storage backends, catalog loading and collaborators.
//!
//! Per-action failures (missing items, depleted resource, ...) are not errors;
//! they are [`crate::resolution::Resolution`] values. These types cover the
//! failures that abort a whole sweep iteration or a load.

use thiserror::Error;

/// Failure of the storage layer. Propagated out of a sweep so the caller can
/// log it and retry on the next tick.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("row not found in {table}: {key}")]
    NotFound { table: &'static str, key: String },
}

/// Failure while loading or validating the static catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate {kind} id `{id}`")]
    DuplicateId { kind: &'static str, id: String },
    #[error("resource `{resource}` lists `{item}` with quantity 0")]
    ZeroQuantity { resource: String, item: String },
    #[error("resource `{resource}` references unknown item `{item}`")]
    UnknownItem { resource: String, item: String },
    #[error("placement at ({x}, {y}) references unknown resource `{resource}`")]
    UnknownPlacement { x: i32, y: i32, resource: String },
    #[error("finite resource `{resource}` has amount 0")]
    EmptyFiniteResource { resource: String },
    #[error("item `{item}` has max_stack 0")]
    ZeroStack { item: String },
}

/// Failure reported by the quest-progress collaborator. Logged, never fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("quest hook failed: {0}")]
pub struct QuestError(pub String);
