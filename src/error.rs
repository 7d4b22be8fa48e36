//! Error types for symdb.
//!
//! Only index *construction* can fail. Lookups report "nothing found" as an
//! empty, fully exhausted result stream, never as an error.
//!
//! Error codes are organized by category:
//!
//! - **SYM-E001 to SYM-E099**: Store and database location errors
//! - **SYM-E100 to SYM-E199**: Store library and format errors
//! - **SYM-E300 to SYM-E399**: Argument validation errors
//! - **SYM-E900 to SYM-E999**: Internal and miscellaneous errors

use thiserror::Error;

/// Main error type for symdb operations.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The symbol store does not exist at the given path.
    #[error("Store not found: {path}")]
    StoreNotFound { path: String },

    /// The index database directory does not exist (readonly open).
    #[error("Database not found: {path}")]
    DatabaseNotFound { path: String },

    /// The library provider had no store library for the path.
    #[error("No store library available for: {path}")]
    LibraryUnavailable { path: String },

    /// The store exists but no built-in library can read its format.
    #[error("Unsupported store format at {path}: {reason}")]
    UnsupportedStore { path: String, reason: String },

    /// The store was written with a schema version this build cannot read.
    #[error("Store schema version {found} is not supported (expected {expected})")]
    SchemaMismatch { expected: String, found: String },

    /// The store is missing required tables or holds invalid rows.
    #[error("Store corrupted: {reason}")]
    StoreCorrupted { reason: String },

    /// An argument could not be used (for example a non UTF-8 path).
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// SQLite error occurred.
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl IndexError {
    /// Returns the error code for this error.
    pub const fn error_code(&self) -> &'static str {
        match self {
            IndexError::StoreNotFound { .. } => "SYM-E001",
            IndexError::DatabaseNotFound { .. } => "SYM-E002",
            IndexError::LibraryUnavailable { .. } => "SYM-E101",
            IndexError::UnsupportedStore { .. } => "SYM-E102",
            IndexError::SchemaMismatch { .. } => "SYM-E103",
            IndexError::StoreCorrupted { .. } => "SYM-E104",
            IndexError::InvalidArgument { .. } => "SYM-E301",
            IndexError::IoError(_) => "SYM-E901",
            IndexError::SqliteError(_) => "SYM-E902",
            IndexError::JsonError(_) => "SYM-E903",
        }
    }

    /// Returns the severity level for this error.
    pub const fn severity(&self) -> &'static str {
        match self {
            IndexError::InvalidArgument { .. } => "warning",
            _ => "error",
        }
    }

    /// Returns remediation hints for this error, if available.
    pub const fn remediation(&self) -> Option<&'static str> {
        match self {
            IndexError::StoreNotFound { .. } => {
                Some("Ensure the store path is correct and the indexer has produced it.")
            }
            IndexError::DatabaseNotFound { .. } => {
                Some("Open the index once without --readonly to create the database directory.")
            }
            IndexError::LibraryUnavailable { .. } => {
                Some("The library provider returned nothing for this store path.")
            }
            IndexError::UnsupportedStore { .. } => {
                Some("Only SQLite symbol stores are readable by the built-in library.")
            }
            IndexError::SchemaMismatch { .. } => {
                Some("Rebuild the store with an indexer matching this symdb version.")
            }
            IndexError::StoreCorrupted { .. } => {
                Some("The store may be truncated or partially written. Try re-indexing.")
            }
            IndexError::InvalidArgument { .. } => None,
            IndexError::IoError(_) => Some("Check file permissions and disk space."),
            IndexError::SqliteError(_) => {
                Some("The store may be locked or corrupted. Try reopening the index.")
            }
            IndexError::JsonError(_) => None,
        }
    }
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;
