use thiserror::Error;

// ---------------------------------------------------------------------------
// ConfigurationError
// ---------------------------------------------------------------------------

/// A domain type was used without a registered resolver mapping.
///
/// Raised before any backend access — an operation that fails with this
/// error has performed zero physical I/O.
#[derive(Debug, Clone, Error)]
#[error(
    "No type mapping registered for {type_name}. \
     The store was not affected by this operation, \
     register a mapping for this type on the store builder."
)]
pub struct ConfigurationError {
    pub type_name: &'static str,
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// A required descriptor field is missing or empty.
///
/// Raised before any backend access.
#[derive(Debug, Clone, Error)]
#[error("Validation failed for \"{field}\": {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

/// A failure surfaced by the backend or a resolver during execution,
/// wrapped with a description of the operation that failed.
#[derive(Debug, Error)]
#[error("Error during {operation}")]
pub struct StorageError {
    pub operation: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl StorageError {
    pub fn new(
        operation: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            operation: operation.into(),
            source: source.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// RippleDbError — top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RippleDbError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias — the default error type is `RippleDbError`.
pub type Result<T, E = RippleDbError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
