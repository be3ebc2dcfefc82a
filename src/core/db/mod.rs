/// Database Module
///
/// This module provides the mapping layer between records and SQL,
/// organized into focused submodules.
///
/// ## Architecture
///
/// - **Values** (`value.rs`): SQL values and field type conversions
/// - **Record Metadata** (`record.rs`): tag parsing and per-type descriptors
/// - **Statement Builder** (`statement.rs`): INSERT/UPDATE/DELETE/SELECT generation
/// - **Connection Management** (`connection.rs`): transports, DSNs and the handle registry
/// - **Query Execution** (`query.rs`): running statements and binding rows into records
///
/// ## Error Handling
///
/// All operations return the shared `OrmError` type.
pub mod connection;
pub mod query;
pub mod record;
pub mod statement;
pub mod value;

pub use connection::*;
pub use query::*;
pub use record::*;
pub use statement::*;
pub use value::*;
