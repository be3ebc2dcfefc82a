/// Value Module
///
/// Dynamically typed SQL values used both as bound statement parameters and
/// as decoded result cells, plus the conversions between record field types
/// and those values.

use chrono::NaiveDateTime;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

/// Text layout used to store and read back timestamps (MySQL `DATETIME` style).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single SQL value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Short name of the value's kind, used in decode errors
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
            Value::Timestamp(_) => "DATETIME",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Int(i),
            ValueRef::Real(f) => Value::Float(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Int(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(t) => ToSqlOutput::Borrowed(ValueRef::Text(t.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Timestamp(ts) => ToSqlOutput::Owned(rusqlite::types::Value::Text(
                ts.format(TIMESTAMP_FORMAT).to_string(),
            )),
        })
    }
}

/// Conversion between a record field type and [`Value`].
///
/// `from_value` returns `None` when the value cannot represent the type; the
/// caller turns that into a decode error naming the column.
pub trait ColumnValue: Sized {
    /// Name of the expected SQL kind, reported in decode errors
    const SQL_TYPE: &'static str;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Option<Self>;
}

impl ColumnValue for i64 {
    const SQL_TYPE: &'static str = "INTEGER";

    fn to_value(&self) -> Value {
        Value::Int(*self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }
}

macro_rules! narrow_int_column {
    ($($ty:ty),*) => {
        $(
            impl ColumnValue for $ty {
                const SQL_TYPE: &'static str = "INTEGER";

                fn to_value(&self) -> Value {
                    Value::Int(i64::from(*self))
                }

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::Int(i) => <$ty>::try_from(i).ok(),
                        _ => None,
                    }
                }
            }
        )*
    };
}

narrow_int_column!(i32, i16, u32, u16, u8);

impl ColumnValue for bool {
    const SQL_TYPE: &'static str = "INTEGER";

    fn to_value(&self) -> Value {
        Value::Int(i64::from(*self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(i != 0),
            _ => None,
        }
    }
}

impl ColumnValue for f64 {
    const SQL_TYPE: &'static str = "REAL";

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(f),
            Value::Int(i) => Some(i as f64),
            _ => None,
        }
    }
}

impl ColumnValue for String {
    const SQL_TYPE: &'static str = "TEXT";

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Text(t) => Some(t),
            _ => None,
        }
    }
}

impl ColumnValue for Vec<u8> {
    const SQL_TYPE: &'static str = "BLOB";

    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bytes(b) => Some(b),
            Value::Text(t) => Some(t.into_bytes()),
            _ => None,
        }
    }
}

impl ColumnValue for NaiveDateTime {
    const SQL_TYPE: &'static str = "DATETIME";

    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Timestamp(ts) => Some(ts),
            Value::Text(t) => parse_timestamp(&t),
            _ => None,
        }
    }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    const SQL_TYPE: &'static str = T::SQL_TYPE;

    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

macro_rules! value_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    value.to_value()
                }
            }
        )*
    };
}

value_from!(i64, i32, i16, u32, u16, u8, bool, f64, String, Vec<u8>, NaiveDateTime);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl<T: ColumnValue> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.to_value()
    }
}
