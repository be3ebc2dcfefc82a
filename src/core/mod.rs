/// Core Module for rowmap
///
/// This module contains the record metadata, statement builder, query
/// executor and connection registry, plus the error type they share.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{OrmError, Result, TransportError};
