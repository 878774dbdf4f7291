//! Error types for Mondial operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The store failed to execute a statement. Fails the whole batch.
    #[error("Fetch failed: {reason}")]
    FetchFailure { reason: String },

    #[error("Connection to the store failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("{entity} not found: {name}")]
    NotFound { entity: String, name: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Errors raised while turning a filter into a query plan.
///
/// All of these are detected before any statement reaches the store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Required filter missing: {field}")]
    MissingRequiredFilter { field: String },

    #[error("Invalid filter {field}: {reason}")]
    InvalidFilter { field: String, reason: String },

    #[error("Placeholder/bind mismatch: {placeholders} placeholders, {binds} bind values")]
    ParamBindingMismatch { placeholders: usize, binds: usize },
}

/// Row mapping errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("Unknown place variant: {discriminator}")]
    UnknownVariant { discriminator: String },

    #[error("Missing column: {column}")]
    MissingColumn { column: String },

    #[error("Type mismatch on column {column}: expected {expected}")]
    TypeMismatch { column: String, expected: String },

    #[error("Unsupported column type {type_name} on column {column}")]
    UnsupportedColumnType { column: String, type_name: String },
}

/// Loader orchestration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoaderError {
    #[error("No loader registered for relation {relation}")]
    UnknownRelation { relation: String },

    #[error("Loader for relation {relation} does not produce {expected}")]
    RelationTypeMismatch { relation: String, expected: String },

    #[error("Batch for {relation} returned {got} results for {expected} keys")]
    ResultLengthMismatch {
        relation: String,
        expected: usize,
        got: usize,
    },

    #[error("Load of key {key} was abandoned before its batch completed")]
    Abandoned { key: String },
}

/// Validation errors for value types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unable to parse surface from {input}")]
    InvalidSurface { input: String },

    #[error("Unknown continent: {input}")]
    InvalidContinent { input: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Mondial errors.
///
/// `Clone` so that a single batch failure can be handed to every caller
/// waiting on that batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MondialError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl MondialError {
    /// Wrap an opaque store failure.
    pub fn fetch_failure(reason: impl Into<String>) -> Self {
        Self::Storage(StorageError::FetchFailure {
            reason: reason.into(),
        })
    }

    /// Returns true if this error is a store-level fetch failure.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::Storage(StorageError::FetchFailure { .. }))
    }
}

/// Result type alias for Mondial operations.
pub type MondialResult<T> = Result<T, MondialError>;

// =============================================================================
// TESTS
// =============================================================================
