/// Statement Builder Module
///
/// Generates `INSERT`, `UPDATE`, `DELETE` and select-by-key statements from
/// record descriptors. Placeholders are positional `?` markers and the
/// argument list always follows placeholder order.

use super::record::{Descriptor, Record};
use super::value::{ColumnValue, Value};
use crate::core::{OrmError, Result};
use std::fmt;
use tracing::debug;

/// SQL text plus its ordered parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    args: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Statement {
            sql: sql.into(),
            args,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.args)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Builds `INSERT INTO <table> (<columns>) VALUES (<placeholders>)` for `record`.
///
/// Every non-omitted field is included, in declaration order.
///
/// # Errors
///
/// `OrmError::Mapping` if the record has no primary key, no table, an
/// ambiguous table, a column declared twice, or no insertable column.
pub fn build_insert<R: Record>(record: &R) -> Result<Statement> {
    insert_statement(R::descriptor(), record.values())
}

/// Builds `UPDATE <table> SET <col>=?,... WHERE <pk>=?` for `record`.
///
/// The key is excluded from `SET` and its argument comes last.
///
/// # Errors
///
/// `OrmError::Mapping` on broken metadata or when no column remains to set.
pub fn build_update<R: Record>(record: &R) -> Result<Statement> {
    update_statement(R::descriptor(), record.values())
}

/// Builds `DELETE FROM <table> WHERE <pk>=?` for `record`.
pub fn build_delete<R: Record>(record: &R) -> Result<Statement> {
    delete_statement(R::descriptor(), record.values())
}

/// Builds `SELECT <columns> FROM <table> WHERE <pk>=?` for the record type `R`.
pub fn build_select_by_key<R: Record, K: ColumnValue>(key: &K) -> Result<Statement> {
    select_by_key_statement(R::descriptor(), key.to_value())
}

/// Descriptor-level form of [`build_insert`].
pub fn insert_statement(descriptor: &Descriptor, values: Vec<Value>) -> Result<Statement> {
    let values = checked_values(descriptor, values)?;
    let table = descriptor.table()?;
    descriptor.primary_key()?;
    descriptor.check_columns()?;

    let mut columns = Vec::new();
    let mut args = Vec::new();
    for (field, value) in descriptor.fields().iter().zip(values) {
        if field.omit {
            continue;
        }
        columns.push(field.column.as_str());
        args.push(value);
    }

    if columns.is_empty() {
        return Err(OrmError::mapping(
            descriptor.record(),
            format!("no insertable columns for table `{}`", table),
        ));
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(","),
        placeholders(columns.len())
    );
    debug!(record = descriptor.record(), %sql, args = args.len(), "built insert");
    Ok(Statement::new(sql, args))
}

/// Descriptor-level form of [`build_update`].
pub fn update_statement(descriptor: &Descriptor, values: Vec<Value>) -> Result<Statement> {
    let mut values = checked_values(descriptor, values)?;
    let table = descriptor.table()?;
    let (key_index, key) = descriptor.primary_key()?;
    descriptor.check_columns()?;
    let key_value = std::mem::replace(&mut values[key_index], Value::Null);

    let mut assignments = Vec::new();
    let mut args = Vec::new();
    for (index, (field, value)) in descriptor.fields().iter().zip(values).enumerate() {
        if field.omit || index == key_index {
            continue;
        }
        assignments.push(format!("{}=?", field.column));
        args.push(value);
    }

    if assignments.is_empty() {
        return Err(OrmError::mapping(
            descriptor.record(),
            format!(
                "no updatable columns for table `{}` besides key `{}`",
                table, key.column
            ),
        ));
    }
    args.push(key_value);

    let sql = format!(
        "UPDATE {} SET {} WHERE {}=?",
        table,
        assignments.join(","),
        key.column
    );
    debug!(record = descriptor.record(), %sql, args = args.len(), "built update");
    Ok(Statement::new(sql, args))
}

/// Descriptor-level form of [`build_delete`].
pub fn delete_statement(descriptor: &Descriptor, values: Vec<Value>) -> Result<Statement> {
    let mut values = checked_values(descriptor, values)?;
    let table = descriptor.table()?;
    let (key_index, key) = descriptor.primary_key()?;
    descriptor.check_columns()?;

    let sql = format!("DELETE FROM {} WHERE {}=?", table, key.column);
    debug!(record = descriptor.record(), %sql, "built delete");
    Ok(Statement::new(sql, vec![values.swap_remove(key_index)]))
}

/// Descriptor-level form of [`build_select_by_key`].
///
/// Selects every non-omitted column plus the key.
pub fn select_by_key_statement(descriptor: &Descriptor, key_value: Value) -> Result<Statement> {
    let table = descriptor.table()?;
    let (_, key) = descriptor.primary_key()?;
    descriptor.check_columns()?;

    let columns: Vec<&str> = descriptor
        .fields()
        .iter()
        .filter(|f| !f.omit || f.primary_key)
        .map(|f| f.column.as_str())
        .collect();

    let sql = format!(
        "SELECT {} FROM {} WHERE {}=?",
        columns.join(","),
        table,
        key.column
    );
    debug!(record = descriptor.record(), %sql, "built select by key");
    Ok(Statement::new(sql, vec![key_value]))
}

fn checked_values(descriptor: &Descriptor, values: Vec<Value>) -> Result<Vec<Value>> {
    if values.len() != descriptor.len() {
        return Err(OrmError::mapping(
            descriptor.record(),
            format!(
                "record produced {} values for {} declared fields",
                values.len(),
                descriptor.len()
            ),
        ));
    }
    Ok(values)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}
