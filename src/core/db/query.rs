/// Query Execution Module
///
/// Runs statements on a [`Handle`] and maps result rows into records using
/// the same descriptors the statement builder reads.

use super::connection::{ExecResult, Handle, Rows};
use super::record::Record;
use super::statement::{build_delete, build_insert, build_select_by_key, build_update, Statement};
use super::value::{ColumnValue, Value};
use crate::core::{OrmError, Result};
use tracing::debug;

/// Executes a mutating statement.
///
/// # Errors
///
/// Returns `OrmError::Execution` wrapping the transport failure.
pub fn execute(handle: &Handle, statement: &Statement) -> Result<ExecResult> {
    execute_sql(handle, statement.sql(), statement.args())
}

/// Executes raw SQL with positional arguments
pub fn execute_sql(handle: &Handle, sql: &str, args: &[Value]) -> Result<ExecResult> {
    debug!(handle = handle.name(), sql, args = args.len(), "executing statement");
    let result = handle
        .transport()
        .exec(sql, args)
        .map_err(|source| OrmError::Execution {
            sql: sql.to_string(),
            source,
        })?;
    debug!(
        handle = handle.name(),
        last_insert_id = result.last_insert_id,
        rows_affected = result.rows_affected,
        "statement executed"
    );
    Ok(result)
}

/// Runs a query and maps the first row into `T`.
///
/// # Errors
///
/// `OrmError::NotFound` when no row matches, `OrmError::Execution` for
/// transport failures, and `OrmError::Decode` when a column does not fit its
/// field.
pub fn query_single<T: Record>(handle: &Handle, sql: &str, args: &[Value]) -> Result<T> {
    let rows = fetch(handle, sql, args)?;
    map_rows::<T>(rows, Some(1))?
        .pop()
        .ok_or_else(|| OrmError::NotFound {
            sql: sql.to_string(),
        })
}

/// Runs a query and maps every row into `T`. No match yields an empty vector.
pub fn query_many<T: Record>(handle: &Handle, sql: &str, args: &[Value]) -> Result<Vec<T>> {
    let rows = fetch(handle, sql, args)?;
    map_rows::<T>(rows, None)
}

/// Builds and executes the INSERT for `record`
pub fn insert<R: Record>(handle: &Handle, record: &R) -> Result<ExecResult> {
    execute(handle, &build_insert(record)?)
}

/// Builds and executes the UPDATE for `record`
pub fn update<R: Record>(handle: &Handle, record: &R) -> Result<ExecResult> {
    execute(handle, &build_update(record)?)
}

/// Builds and executes the DELETE for `record`
pub fn delete<R: Record>(handle: &Handle, record: &R) -> Result<ExecResult> {
    execute(handle, &build_delete(record)?)
}

/// Loads the record of type `R` whose primary key equals `key`
pub fn find_by_key<R: Record, K: ColumnValue>(handle: &Handle, key: &K) -> Result<R> {
    let statement = build_select_by_key::<R, K>(key)?;
    query_single(handle, statement.sql(), statement.args())
}

fn fetch(handle: &Handle, sql: &str, args: &[Value]) -> Result<Rows> {
    debug!(handle = handle.name(), sql, args = args.len(), "running query");
    let rows = handle
        .transport()
        .query(sql, args)
        .map_err(|source| OrmError::Execution {
            sql: sql.to_string(),
            source,
        })?;
    debug!(handle = handle.name(), rows = rows.rows.len(), "query returned");
    Ok(rows)
}

/// Binds result rows into records.
///
/// Result columns are matched to declared columns ignoring case; columns with
/// no matching field are skipped and fields with no matching column keep
/// their default value.
fn map_rows<T: Record>(rows: Rows, limit: Option<usize>) -> Result<Vec<T>> {
    let descriptor = T::descriptor();
    descriptor.check_columns()?;
    let targets: Vec<Option<usize>> = rows
        .columns
        .iter()
        .map(|column| descriptor.position_of(column))
        .collect();

    let take = limit.unwrap_or(usize::MAX);
    let mut records = Vec::with_capacity(rows.rows.len().min(take));
    for row in rows.rows.into_iter().take(take) {
        let mut record = T::default();
        for (target, value) in targets.iter().zip(row) {
            if let Some(index) = target {
                record.bind(*index, value)?;
            }
        }
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::connection::{Registry, Transport};
    use crate::core::TransportError;
    use std::error::Error as _;

    crate::record! {
        #[derive(Debug, Default, PartialEq)]
        struct ExampleSelect {
            id: i64 => "column=id primarykey=yes table=Users",
            name: String => "column=name",
            status: Option<i32> => "column=status",
            missing: String => "column=not_in_table",
        }
    }

    /// Transport that rejects everything
    struct FailingTransport;

    impl Transport for FailingTransport {
        fn exec(&self, _sql: &str, _args: &[Value]) -> std::result::Result<ExecResult, TransportError> {
            Err("connection reset by peer".into())
        }

        fn query(&self, _sql: &str, _args: &[Value]) -> std::result::Result<Rows, TransportError> {
            Err("connection reset by peer".into())
        }
    }

    fn seeded_handle() -> Handle {
        let mut registry = Registry::new();
        let handle = registry.open("test", ":memory:").unwrap();
        execute_sql(
            &handle,
            "CREATE TABLE Users (ID INTEGER PRIMARY KEY, NAME TEXT NOT NULL, status INTEGER, extra TEXT)",
            &[],
        )
        .unwrap();
        for (id, name, status) in [(5, "Ann", Some(1)), (6, "Bob", None)] {
            execute_sql(
                &handle,
                "INSERT INTO Users (ID, NAME, status, extra) VALUES (?, ?, ?, 'x')",
                &[Value::from(id), Value::from(name), Value::from(status)],
            )
            .unwrap();
        }
        handle
    }

    #[test]
    fn test_query_single_maps_case_insensitively() {
        let handle = seeded_handle();
        let row: ExampleSelect =
            query_single(&handle, "SELECT * FROM Users WHERE id=?", &[Value::Int(5)]).unwrap();
        assert_eq!(
            row,
            ExampleSelect {
                id: 5,
                name: "Ann".to_string(),
                status: Some(1),
                missing: String::new(),
            }
        );
    }

    #[test]
    fn test_query_single_not_found() {
        let handle = seeded_handle();
        let result: Result<ExampleSelect> =
            query_single(&handle, "SELECT * FROM Users WHERE id=?", &[Value::Int(404)]);
        match result {
            Err(OrmError::NotFound { sql }) => assert_eq!(sql, "SELECT * FROM Users WHERE id=?"),
            other => panic!("Expected NotFound error, got {other:?}"),
        }
    }

    #[test]
    fn test_query_many() {
        let handle = seeded_handle();
        let rows: Vec<ExampleSelect> =
            query_many(&handle, "SELECT * FROM Users ORDER BY id", &[]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].name, "Bob");
        assert_eq!(rows[1].status, None);

        let none: Vec<ExampleSelect> =
            query_many(&handle, "SELECT * FROM Users WHERE id > ?", &[Value::Int(100)]).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_decode_error_names_column() {
        let handle = seeded_handle();
        let result: Result<Vec<ExampleSelect>> =
            query_many(&handle, "SELECT name AS id FROM Users", &[]);
        match result {
            Err(OrmError::Decode { column, expected, found }) => {
                assert_eq!(column, "id");
                assert_eq!(expected, "INTEGER");
                assert_eq!(found, "TEXT");
            }
            other => panic!("Expected Decode error, got {other:?}"),
        }
    }

    crate::record! {
        #[derive(Debug, Default)]
        struct SharedColumn {
            id: i64 => "column=id primarykey=yes table=Users",
            a: String => "column=name",
            b: String => "column=NAME",
        }
    }

    #[test]
    fn test_duplicate_columns_fail_instead_of_misbinding() {
        let handle = seeded_handle();
        let result: Result<Vec<SharedColumn>> =
            query_many(&handle, "SELECT id, name, 'y' AS NAME FROM Users", &[]);
        match result {
            Err(OrmError::Mapping { record, message }) => {
                assert_eq!(record, "SharedColumn");
                assert!(message.contains("duplicate column"));
            }
            other => panic!("Expected Mapping error, got {other:?}"),
        }
    }

    #[test]
    fn test_execution_errors_are_wrapped() {
        let handle = Handle::new("down", "mysql://db", Box::new(FailingTransport));

        let err = execute_sql(&handle, "DELETE FROM Users", &[]).unwrap_err();
        match &err {
            OrmError::Execution { sql, .. } => assert_eq!(sql, "DELETE FROM Users"),
            other => panic!("Expected Execution error, got {other:?}"),
        }
        assert_eq!(err.source().unwrap().to_string(), "connection reset by peer");

        let result: Result<Vec<ExampleSelect>> = query_many(&handle, "SELECT * FROM Users", &[]);
        assert!(matches!(result, Err(OrmError::Execution { .. })));
    }

    #[test]
    fn test_sql_error_is_execution_error() {
        let handle = seeded_handle();
        let result: Result<ExampleSelect> = query_single(&handle, "SELECT * FROM nowhere", &[]);
        match result {
            Err(OrmError::Execution { source, .. }) => {
                assert!(source.to_string().contains("no such table"))
            }
            other => panic!("Expected Execution error, got {other:?}"),
        }
    }
}
