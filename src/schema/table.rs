//! Table descriptors and their precomputed statement templates.

use super::column::ColumnDescriptor;
use super::entity::EntitySchema;
use crate::dialect::{Dialect, IdentityFetch};
use crate::error::OrmError;

/// A statement template plus the parameter names it expects.
///
/// Each binding pairs a parameter name with the column index whose value
/// fills it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub sql: String,
    pub bindings: Vec<(String, usize)>,
}

/// Table metadata for one entity type in one dialect.
///
/// Built once per (type, dialect) by the [`Catalog`](super::Catalog) and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub entity: &'static str,
    pub key: &'static str,
    pub table: &'static str,
    pub sequence: Option<&'static str>,
    pub columns: Vec<ColumnDescriptor>,
    pub dialect: Dialect,
    is_partitioned: bool,
    insert: Template,
    /// Columns whose values come back from the insert
    generated: Vec<usize>,
    update: Option<Template>,
    delete: Option<Template>,
    select: String,
    get: Option<Template>,
}

impl TableDescriptor {
    /// Validate a schema and precompute its templates.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::InvalidSchema` if the entity has no columns or more
    /// than one partition key.
    pub fn build(schema: EntitySchema, dialect: Dialect) -> Result<Self, OrmError> {
        if schema.columns.is_empty() {
            return Err(OrmError::InvalidSchema(format!(
                "'{}' has no mapped columns",
                schema.entity
            )));
        }
        let partition_keys = schema.columns.iter().filter(|c| c.partition_key).count();
        if partition_keys > 1 {
            return Err(OrmError::InvalidSchema(format!(
                "'{}' declares {partition_keys} partition keys; at most one is allowed",
                schema.entity
            )));
        }

        let mut descriptor = Self {
            entity: schema.entity,
            key: schema.key,
            table: schema.table,
            sequence: schema.sequence,
            columns: schema.columns,
            dialect,
            is_partitioned: partition_keys == 1,
            insert: Template {
                sql: String::new(),
                bindings: Vec::new(),
            },
            generated: Vec::new(),
            update: None,
            delete: None,
            select: String::new(),
            get: None,
        };
        descriptor.select = descriptor.build_select();
        descriptor.insert = descriptor.build_insert();
        descriptor.update = descriptor.build_update();
        descriptor.delete = descriptor.build_delete();
        descriptor.get = descriptor.build_get();
        Ok(descriptor)
    }

    fn quote(&self, name: &str) -> String {
        self.dialect.escape_identifier(name)
    }

    fn token(&self, index: usize) -> (String, String) {
        let name = Dialect::parameter_name(&index.to_string(), false);
        let token = self.dialect.token_for(&name);
        (name, token)
    }

    pub fn quoted_table(&self) -> String {
        self.quote(self.table)
    }

    pub fn is_partitioned(&self) -> bool {
        self.is_partitioned
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = (usize, &ColumnDescriptor)> {
        self.columns.iter().enumerate().filter(|(_, c)| c.primary_key)
    }

    pub fn partition_key(&self) -> Option<(usize, &ColumnDescriptor)> {
        self.columns.iter().enumerate().find(|(_, c)| c.partition_key)
    }

    /// Whether the insert leaves this column to the database
    fn is_generated(&self, column: &ColumnDescriptor) -> bool {
        column.auto_generated && !(column.primary_key && self.sequence.is_some())
    }

    fn build_select(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| self.quote(c.column)).collect();
        format!("SELECT {} FROM {}", columns.join(","), self.quoted_table())
    }

    fn build_insert(&mut self) -> Template {
        let mut names = Vec::new();
        let mut tokens = Vec::new();
        let mut bindings = Vec::new();
        let mut generated = Vec::new();
        for (i, column) in self.columns.iter().enumerate() {
            if self.is_generated(column) {
                generated.push(i);
                continue;
            }
            let (name, token) = self.token(i);
            names.push(self.quote(column.column));
            tokens.push(token);
            bindings.push((name, i));
        }

        let fetched: Vec<String> = generated
            .iter()
            .map(|&i| self.quote(self.columns[i].column))
            .collect();
        let output = match self.dialect.identity_fetch() {
            IdentityFetch::OutputInserted if !fetched.is_empty() => {
                let inserted: Vec<String> = fetched.iter().map(|c| format!("INSERTED.{c}")).collect();
                format!(" OUTPUT {}", inserted.join(","))
            }
            _ => String::new(),
        };

        let mut sql = if names.is_empty() {
            match self.dialect {
                Dialect::MySql => format!("INSERT INTO {} () VALUES ()", self.quoted_table()),
                _ => format!("INSERT INTO {}{output} DEFAULT VALUES", self.quoted_table()),
            }
        } else {
            format!(
                "INSERT INTO {} ({}){output} VALUES ({})",
                self.quoted_table(),
                names.join(","),
                tokens.join(",")
            )
        };
        if self.dialect.identity_fetch() == IdentityFetch::Returning && !fetched.is_empty() {
            sql.push_str(&format!(" RETURNING {}", fetched.join(",")));
        }

        self.generated = generated;
        Template { sql, bindings }
    }

    fn key_predicate(&self, bindings: &mut Vec<(String, usize)>) -> Option<String> {
        let keys: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_key())
            .map(|(i, c)| {
                let (name, token) = self.token(i);
                bindings.push((name, i));
                format!("{} = {token}", self.quote(c.column))
            })
            .collect();
        if keys.is_empty() {
            None
        } else {
            Some(keys.join(" AND "))
        }
    }

    fn build_update(&self) -> Option<Template> {
        let mut bindings = Vec::new();
        let assignments: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_key() && !c.auto_generated)
            .map(|(i, c)| {
                let (name, token) = self.token(i);
                bindings.push((name, i));
                format!("{} = {token}", self.quote(c.column))
            })
            .collect();
        if assignments.is_empty() {
            return None;
        }
        let predicate = self.key_predicate(&mut bindings)?;
        Some(Template {
            sql: format!(
                "UPDATE {} SET {} WHERE {predicate}",
                self.quoted_table(),
                assignments.join(",")
            ),
            bindings,
        })
    }

    fn build_delete(&self) -> Option<Template> {
        let mut bindings = Vec::new();
        let predicate = self.key_predicate(&mut bindings)?;
        Some(Template {
            sql: format!("DELETE FROM {} WHERE {predicate}", self.quoted_table()),
            bindings,
        })
    }

    fn build_get(&self) -> Option<Template> {
        let mut keys = self.primary_keys();
        let (pk_index, pk) = keys.next()?;
        if keys.next().is_some() {
            return None;
        }
        let id_name = Dialect::parameter_name("_id0", false);
        let mut sql = format!(
            "{} WHERE {} = {}",
            self.select,
            self.quote(pk.column),
            self.dialect.token_for(&id_name)
        );
        let mut bindings = vec![(id_name, pk_index)];
        if let Some((part_index, part)) = self.partition_key() {
            let part_name = Dialect::parameter_name("_ts", false);
            sql.push_str(&format!(
                " AND {} = {}",
                self.quote(part.column),
                self.dialect.token_for(&part_name)
            ));
            bindings.push((part_name, part_index));
        }
        Some(Template { sql, bindings })
    }

    pub fn select_sql(&self) -> &str {
        &self.select
    }

    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM {}", self.quoted_table())
    }

    pub fn insert_template(&self) -> &Template {
        &self.insert
    }

    /// Indexes of columns whose values are produced by the insert itself
    pub fn generated_columns(&self) -> &[usize] {
        &self.generated
    }

    /// # Errors
    ///
    /// Returns `OrmError::InvalidSchema` if the table has no key or nothing to update.
    pub fn update_template(&self) -> Result<&Template, OrmError> {
        self.update.as_ref().ok_or_else(|| {
            OrmError::InvalidSchema(format!(
                "'{}' needs a key column and an updatable column to be updated",
                self.entity
            ))
        })
    }

    /// # Errors
    ///
    /// Returns `OrmError::InvalidSchema` if the table has no key column.
    pub fn delete_template(&self) -> Result<&Template, OrmError> {
        self.delete.as_ref().ok_or_else(|| {
            OrmError::InvalidSchema(format!("'{}' has no key column to delete by", self.entity))
        })
    }

    /// Template for a lookup by primary key.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::CompositeKey` for multi-column keys and
    /// `OrmError::InvalidSchema` when there is no primary key.
    pub fn get_template(&self) -> Result<&Template, OrmError> {
        match self.primary_keys().count() {
            0 => Err(OrmError::InvalidSchema(format!(
                "'{}' has no primary key",
                self.entity
            ))),
            1 => self
                .get
                .as_ref()
                .ok_or_else(|| OrmError::CompositeKey(self.entity.to_string())),
            _ => Err(OrmError::CompositeKey(self.entity.to_string())),
        }
    }

    /// Resolve a top-level property to its column.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::UnmappedProperty` when the property has no column.
    pub fn resolve_column(&self, property: &str) -> Result<&ColumnDescriptor, OrmError> {
        self.resolve(None, property)
    }

    /// Resolve a property of a nested group.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::UnmappedProperty` when the property has no column.
    pub fn resolve_nested(
        &self,
        parent: &str,
        property: &str,
    ) -> Result<&ColumnDescriptor, OrmError> {
        self.resolve(Some(parent), property)
    }

    pub(crate) fn resolve(
        &self,
        parent: Option<&str>,
        property: &str,
    ) -> Result<&ColumnDescriptor, OrmError> {
        self.columns
            .iter()
            .find(|c| c.matches(parent, property))
            .ok_or_else(|| OrmError::UnmappedProperty {
                entity: self.entity.to_string(),
                property: match parent {
                    Some(parent) => format!("{parent}.{property}"),
                    None => property.to_string(),
                },
            })
    }

    /// Quoted column name for a property
    ///
    /// # Errors
    ///
    /// Returns `OrmError::UnmappedProperty` when the property has no column.
    pub fn quoted_column(&self, parent: Option<&str>, property: &str) -> Result<String, OrmError> {
        self.resolve(parent, property).map(|c| self.quote(c.column))
    }
}
