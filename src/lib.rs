// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod config;

pub use crate::core::db::{
    build_delete, build_insert, build_select_by_key, build_update, delete, execute, execute_sql,
    find_by_key, insert, query_many, query_single, update, ColumnValue, ConnectionOptions,
    Descriptor, Dsn, ExecResult, FieldSpec, Handle, Record, Registry, Rows, SqliteTransport,
    Statement, Transport, Value,
};
pub use crate::core::{OrmError, Result, TransportError};

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::OnceCell;
}
