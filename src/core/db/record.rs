/// Record Metadata Module
///
/// Field descriptors for records mapped to table rows. A descriptor is built
/// once per record type from tag strings such as
/// `"column=id primarykey=yes table=Users"` and then drives statement
/// generation and row binding.
///
/// ## Tag grammar
///
/// Whitespace separated `key=value` pairs:
/// - `column=<name>`: target column (defaults to the field name)
/// - `primarykey=yes`: marks the key field
/// - `table=<name>`: owning table, declared once per record
/// - `omit=yes`: excludes the field from generated statements
///
/// Unrecognised keys and tokens without `=` are ignored.

use super::value::{ColumnValue, Value};
use crate::core::{OrmError, Result};

/// Metadata for one record field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Rust field name
    pub field: String,
    /// Target column name
    pub column: String,
    /// Whether this field is the primary key
    pub primary_key: bool,
    /// Table declared on this field, if any
    pub table: Option<String>,
    /// Whether the field is left out of INSERT/UPDATE statements
    pub omit: bool,
}

impl FieldSpec {
    /// Parses a tag string for the field named `field`
    pub fn parse(field: &str, tag: &str) -> Self {
        let mut spec = FieldSpec {
            field: field.to_string(),
            column: field.to_string(),
            primary_key: false,
            table: None,
            omit: false,
        };

        for token in tag.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            match key.to_ascii_lowercase().as_str() {
                "column" if !value.is_empty() => spec.column = value.to_string(),
                "primarykey" => spec.primary_key = is_affirmative(value),
                "table" if !value.is_empty() => spec.table = Some(value.to_string()),
                "omit" => spec.omit = is_affirmative(value),
                _ => {}
            }
        }

        spec
    }
}

fn is_affirmative(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "yes" | "true" | "1")
}

/// Per-type field descriptor table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    record: String,
    fields: Vec<FieldSpec>,
}

impl Descriptor {
    /// Builds a descriptor from `(field, tag)` pairs in declaration order
    pub fn new(record: &str, tags: &[(&str, &str)]) -> Self {
        Descriptor {
            record: record.to_string(),
            fields: tags
                .iter()
                .map(|(field, tag)| FieldSpec::parse(field, tag))
                .collect(),
        }
    }

    /// Name of the record type, used in error messages
    pub fn record(&self) -> &str {
        &self.record
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the single declared table name.
    ///
    /// # Errors
    ///
    /// `OrmError::Mapping` when no field declares a table or when more than
    /// one does.
    pub fn table(&self) -> Result<&str> {
        let mut declared = self
            .fields
            .iter()
            .filter_map(|f| f.table.as_deref().map(|t| (f, t)));

        let Some((_, table)) = declared.next() else {
            return Err(OrmError::mapping(&self.record, "no table declared"));
        };
        if let Some((other, second)) = declared.next() {
            return Err(OrmError::mapping(
                &self.record,
                format!(
                    "ambiguous table: `{}` also declared as `{}` on field `{}`",
                    table, second, other.field
                ),
            ));
        }
        Ok(table)
    }

    /// Returns the index and spec of the single primary-key field.
    ///
    /// # Errors
    ///
    /// `OrmError::Mapping` when there is no key field or more than one.
    pub fn primary_key(&self) -> Result<(usize, &FieldSpec)> {
        let mut keys = self.fields.iter().enumerate().filter(|(_, f)| f.primary_key);

        let Some(key) = keys.next() else {
            return Err(OrmError::mapping(&self.record, "no primary key declared"));
        };
        if let Some((_, other)) = keys.next() {
            return Err(OrmError::mapping(
                &self.record,
                format!(
                    "multiple primary keys: `{}` and `{}`",
                    key.1.column, other.column
                ),
            ));
        }
        Ok(key)
    }

    /// Finds the field bound to `column`, ignoring ASCII case
    pub fn position_of(&self, column: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.column.eq_ignore_ascii_case(column))
    }

    /// Fails when two fields map to the same column, ignoring ASCII case
    pub fn check_columns(&self) -> Result<()> {
        for (index, field) in self.fields.iter().enumerate() {
            let earlier = self.fields[..index]
                .iter()
                .find(|f| f.column.eq_ignore_ascii_case(&field.column));
            if let Some(other) = earlier {
                return Err(OrmError::mapping(
                    &self.record,
                    format!(
                        "duplicate column `{}` on fields `{}` and `{}`",
                        field.column, other.field, field.field
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Converts `value` into the type of the field at `index`
    pub fn decode<T: ColumnValue>(&self, index: usize, value: Value) -> Result<T> {
        let found = value.kind();
        T::from_value(value).ok_or_else(|| OrmError::Decode {
            column: self
                .fields
                .get(index)
                .map(|f| f.column.clone())
                .unwrap_or_default(),
            expected: T::SQL_TYPE,
            found,
        })
    }
}

/// A type that maps to and from one table row.
///
/// Implement by hand or with the [`record!`](crate::record) macro.
pub trait Record: Default {
    /// The descriptor table for this type, built once and cached
    fn descriptor() -> &'static Descriptor;

    /// Field values in declaration order, one per descriptor entry
    fn values(&self) -> Vec<Value>;

    /// Stores `value` into the field at descriptor position `index`
    fn bind(&mut self, index: usize, value: Value) -> Result<()>;
}

/// Declares a struct whose fields carry mapping tags and implements
/// [`Record`] for it.
///
/// ```
/// use chrono::NaiveDateTime;
///
/// rowmap::record! {
///     #[derive(Debug, Default)]
///     pub struct InsertPerson {
///         pub id: i64 => "column=id primarykey=yes table=Users",
///         pub name: String => "column=name",
///         pub dtadded: NaiveDateTime => "column=dtadded",
///         pub ignored: i64 => "column=ignored omit=yes",
///     }
/// }
/// ```
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $ty:ty => $tag:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $ty,
            )*
        }

        impl $crate::Record for $name {
            fn descriptor() -> &'static $crate::Descriptor {
                static DESCRIPTOR: $crate::__private::OnceCell<$crate::Descriptor> =
                    $crate::__private::OnceCell::new();
                DESCRIPTOR.get_or_init(|| {
                    $crate::Descriptor::new(
                        stringify!($name),
                        &[$((stringify!($field), $tag)),*],
                    )
                })
            }

            fn values(&self) -> ::std::vec::Vec<$crate::Value> {
                ::std::vec![$($crate::ColumnValue::to_value(&self.$field)),*]
            }

            #[allow(unused_assignments)]
            fn bind(&mut self, index: usize, value: $crate::Value) -> $crate::Result<()> {
                let descriptor = <Self as $crate::Record>::descriptor();
                let mut position = 0usize;
                $(
                    if index == position {
                        self.$field = descriptor.decode(index, value)?;
                        return Ok(());
                    }
                    position += 1;
                )*
                Err($crate::OrmError::Mapping {
                    record: stringify!($name).to_string(),
                    message: format!("no field at position {}", index),
                })
            }
        }
    };
}
