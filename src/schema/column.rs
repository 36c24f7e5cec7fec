//! Column descriptors: how one entity field maps onto one table column.

use crate::value::ValueKind;

/// Column metadata for one mapped entity field
///
/// Generated by `#[derive(DataEntity)]` / `#[derive(ColumnGroup)]`, or built
/// by hand with the chained constructors below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Field identifier on the entity (`num_logins`)
    pub property: &'static str,
    /// SQL column name (`num_logins`)
    pub column: &'static str,
    /// Value kind used for parameter typing
    pub kind: ValueKind,
    /// Part of the primary key
    pub primary_key: bool,
    /// The partition key of a partitioned table
    pub partition_key: bool,
    /// Filled in by the database on insert
    pub auto_generated: bool,
    /// Field holding the nested group this column belongs to
    pub parent: Option<&'static str>,
}

impl ColumnDescriptor {
    pub const fn new(property: &'static str, column: &'static str, kind: ValueKind) -> Self {
        Self {
            property,
            column,
            kind,
            primary_key: false,
            partition_key: false,
            auto_generated: false,
            parent: None,
        }
    }

    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    #[must_use]
    pub const fn partition_key(mut self) -> Self {
        self.partition_key = true;
        self
    }

    #[must_use]
    pub const fn auto_generated(mut self) -> Self {
        self.auto_generated = true;
        self
    }

    #[must_use]
    pub const fn nested_in(mut self, parent: &'static str) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Key columns appear in the WHERE clause of update and delete templates
    pub fn is_key(&self) -> bool {
        self.primary_key || self.partition_key
    }

    /// Matches `property`, optionally scoped to a nested group
    pub fn matches(&self, parent: Option<&str>, property: &str) -> bool {
        self.property == property && self.parent == parent
    }
}
