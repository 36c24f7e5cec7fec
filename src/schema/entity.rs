//! Declarative entity schema.
//!
//! An entity describes itself once through [`Entity::schema`]; no runtime
//! introspection is involved. `#[derive(DataEntity)]` writes these impls.

use super::catalog::Catalog;
use super::column::ColumnDescriptor;
use super::table::TableDescriptor;
use crate::dialect::{active_dialect, Dialect};
use crate::error::OrmError;
use crate::value::Record;
use sea_query::Value;
use std::sync::Arc;

/// Static mapping of one entity type onto one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    /// Rust type name, used in error messages
    pub entity: &'static str,
    /// Connection key the entity is routed to
    pub key: &'static str,
    /// Table name
    pub table: &'static str,
    /// Sequence that generates primary key values, if any
    pub sequence: Option<&'static str>,
    /// Mapped columns in declaration order
    pub columns: Vec<ColumnDescriptor>,
}

/// A typed record persisted to one table.
///
/// `to_values` and `from_record` work in the column order of
/// [`schema`](Entity::schema).
///
/// # Example
///
/// ```
/// use pingorm::{DataEntity, Entity};
///
/// #[derive(Debug, Default, Clone, PartialEq, DataEntity)]
/// #[connection_key = "tests"]
/// #[table_name = "users"]
/// #[sequence_name = "seq_users"]
/// pub struct User {
///     #[primary_key]
///     pub id: i64,
///     #[column_name = "first_name"]
///     pub first_name: String,
///     pub num_logins: i32,
/// }
///
/// let schema = User::schema();
/// assert_eq!(schema.table, "users");
/// assert_eq!(schema.columns.len(), 3);
/// ```
pub trait Entity: Default + Sized + 'static {
    /// Declarative mapping for this type
    fn schema() -> EntitySchema;

    /// Column values in schema order
    fn to_values(&self) -> Vec<Value>;

    /// Build an entity from a row; NULL and missing columns keep their defaults
    ///
    /// # Errors
    ///
    /// Returns `OrmError::ParseError` if a column holds an incompatible value.
    fn from_record(record: &Record) -> Result<Self, OrmError>;

    /// Assign one mapped property from a value (used to write back generated keys)
    ///
    /// # Errors
    ///
    /// Returns `OrmError::UnmappedProperty` if no such property exists.
    fn set_property(
        &mut self,
        parent: Option<&str>,
        property: &str,
        value: &Value,
    ) -> Result<(), OrmError>;

    /// Table descriptor for the active dialect
    ///
    /// # Errors
    ///
    /// Returns a mapping error if the schema is invalid.
    fn descriptor() -> Result<Arc<TableDescriptor>, OrmError> {
        Catalog::global().describe::<Self>(active_dialect())
    }

    /// Table descriptor for an explicit dialect
    ///
    /// # Errors
    ///
    /// Returns a mapping error if the schema is invalid.
    fn descriptor_for(dialect: Dialect) -> Result<Arc<TableDescriptor>, OrmError> {
        Catalog::global().describe::<Self>(dialect)
    }
}

/// A struct whose fields map onto columns of the entity that embeds it
/// (one level of nesting).
pub trait ColumnGroup: Default + Sized {
    /// Column descriptors with `parent` set to the embedding field
    fn columns(parent: &'static str) -> Vec<ColumnDescriptor>;

    /// Append values in `columns` order
    fn push_values(&self, out: &mut Vec<Value>);

    /// Fill fields from a row
    ///
    /// # Errors
    ///
    /// Returns `OrmError::ParseError` if a column holds an incompatible value.
    fn read_record(&mut self, record: &Record) -> Result<(), OrmError>;

    /// Assign a property, returning `false` if the group has no such property
    ///
    /// # Errors
    ///
    /// Returns `OrmError::ParseError` if the value does not convert.
    fn set_property(&mut self, property: &str, value: &Value) -> Result<bool, OrmError>;
}
