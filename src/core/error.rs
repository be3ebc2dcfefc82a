/// Rowmap Error Module
///
/// This module defines the error taxonomy shared by the registry, the
/// statement builder and the query executor. Every failure is returned to the
/// caller; nothing in this crate retries or panics on a database error.
use thiserror::Error;

/// Boxed error produced by a [`Transport`](crate::core::db::Transport).
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for every fallible operation in rowmap.
///
/// The variants separate programmer mistakes in record declarations
/// (`Mapping`) from connectivity problems (`Connection`) and data problems
/// (`NotFound`, `Decode`, `Execution`), so the message alone tells which one
/// to go and fix.
#[derive(Error, Debug)]
pub enum OrmError {
    /// A handle could not be created or looked up. `dsn` is empty when the
    /// failure is not tied to a data source.
    #[error("Connection error{}: {reason}", for_dsn(.dsn))]
    Connection { dsn: String, reason: String },

    /// Record metadata is unusable: missing or duplicated key/table, no columns
    #[error("Mapping error in `{record}`: {message}")]
    Mapping { record: String, message: String },

    /// A single-row query matched nothing
    #[error("No rows returned for query: {sql}")]
    NotFound { sql: String },

    /// The transport rejected a statement
    #[error("Execution error for `{sql}`: {source}")]
    Execution {
        sql: String,
        #[source]
        source: TransportError,
    },

    /// A result column could not be converted into the field's type
    #[error("Decode error for column `{column}`: expected {expected}, found {found}")]
    Decode {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrmError {
    pub(crate) fn mapping(record: &str, message: impl Into<String>) -> Self {
        OrmError::Mapping {
            record: record.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn connection(dsn: &str, reason: impl ToString) -> Self {
        OrmError::Connection {
            dsn: dsn.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn for_dsn(dsn: &str) -> String {
    if dsn.is_empty() {
        String::new()
    } else {
        format!(" for `{}`", dsn)
    }
}

/// Type alias for Result to use OrmError as the error type.
pub type Result<T> = std::result::Result<T, OrmError>;
