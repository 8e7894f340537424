//! Error types for the processor domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`DomainError`] - Schema, query and mutation rule violations
//! - [`StorageError`] - Database/repository errors
//! - [`ChainError`] - Block source errors
//! - [`IndexerError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

use crate::schema::SemanticType;

// =============================================================================
// Domain Errors
// =============================================================================

/// Schema, query and mutation rule violations.
///
/// Every variant except [`DomainError::Storage`] is raised before the store
/// is touched, so a failed call never leaves a partial write behind.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A schema with the same name is already registered with other fields.
    #[error("Schema conflict for entity {entity}: {reason}")]
    SchemaConflict { entity: String, reason: String },

    /// No schema is registered under this name.
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// The entity has no field with this name.
    #[error("Unknown field {field} on entity {entity}")]
    UnknownField { entity: String, field: String },

    /// The field exists but does not support the operator.
    #[error("Operator {operator} is not supported by {entity}.{field}")]
    InvalidOperator {
        entity: String,
        field: String,
        operator: String,
    },

    /// A literal could not be converted to the field's semantic type.
    #[error("Type mismatch for {field}: expected {expected}, got {value}")]
    TypeMismatch {
        field: String,
        expected: SemanticType,
        value: String,
    },

    /// An order-by token is not of the form `field_ASC` / `field_DESC`.
    #[error("Invalid order-by term: {0}")]
    InvalidOrder(String),

    /// Requested page size exceeds the configured ceiling.
    #[error("Page too large: requested {requested}, maximum is {max}")]
    PageTooLarge { requested: u32, max: u32 },

    /// Pagination arguments are malformed (e.g. zero limit).
    #[error("Invalid page arguments: {0}")]
    InvalidPage(String),

    /// A required field is absent from a create payload.
    #[error("Missing required field {field} on entity {entity}")]
    MissingField { entity: String, field: String },

    /// The payload tries to write a system-managed audit field.
    #[error("Field {field} on entity {entity} is managed by the processor")]
    ReadOnlyField { entity: String, field: String },

    /// No live entity with this id.
    #[error("{entity} with id {id} not found")]
    NotFound { entity: String, id: String },

    /// Event or payload data could not be decoded.
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// Mapping logic rejected the input.
    #[error("Handler error: {0}")]
    Handler(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl DomainError {
    /// Whether this error was raised by local validation, before any I/O.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            DomainError::Storage(_) | DomainError::Handler(_) | DomainError::DecodingError(_)
        )
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Database and repository errors.
///
/// These errors originate from storage operations like queries,
/// transactions, and data serialization.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Database constraint was violated (unique, foreign key, etc.).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Transaction commit/rollback failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Data serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// Chain Errors
// =============================================================================

/// Block source errors.
///
/// These errors occur when talking to the indexer endpoint, either the
/// HTTP indexer gateway or a Substrate node over WebSocket.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Connection could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// RPC or HTTP request failed.
    #[error("RPC error: {0}")]
    RpcError(String),

    /// The endpoint answered with data we could not interpret.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Block could not be fetched.
    #[error("Block fetch error at height {height}: {message}")]
    BlockFetchError {
        /// Height that failed to fetch.
        height: u64,
        /// Error details.
        message: String,
    },
}

// =============================================================================
// Indexer Errors
// =============================================================================

/// Top-level processor orchestration errors.
///
/// This is the main error type returned by the services in
/// [`crate::services`]. It wraps all lower-level errors and adds the
/// pipeline-specific failure modes.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Domain logic error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Storage/database error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Block source error.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Cursor advancement skipped or repeated a block.
    ///
    /// This is a programming error in the caller of the cursor manager and
    /// is never retried.
    #[error("Out of order commit: expected block {expected}, got {got}")]
    OutOfOrderCommit { expected: i64, got: u64 },

    /// A mapping handler failed; the block was rolled back.
    #[error("Mapping handler {module}.{name} failed at block {block}: {source}")]
    MappingHandlerFailure {
        block: u64,
        module: String,
        name: String,
        source: DomainError,
    },

    /// The block source kept failing after all retries.
    #[error("Indexer endpoint unavailable at block {height} after {attempts} attempts: {source}")]
    EndpointUnavailable {
        height: u64,
        attempts: u32,
        source: ChainError,
    },

    /// Operation not permitted in the cursor manager's current state.
    #[error("Cannot {operation} while cursor manager is {state}")]
    InvalidState {
        state: String,
        operation: &'static str,
    },

    /// Graceful shutdown was requested.
    ///
    /// This is not really an error but uses the error type for control flow.
    #[error("Processor shutdown requested")]
    ShutdownRequested,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for processor operations.
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
