//! Process-wide registry of table descriptors.
//!
//! Descriptors are built lazily on first use of an entity type and cached
//! for the life of the process. Population goes through `DashMap`'s entry
//! API, so concurrent first use resolves to a single cached descriptor.

use super::column::ColumnDescriptor;
use super::entity::Entity;
use super::table::TableDescriptor;
use crate::dialect::Dialect;
use crate::error::OrmError;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::sync::Arc;

static CATALOG: Lazy<Catalog> = Lazy::new(Catalog::new);

/// Registry of [`TableDescriptor`]s keyed by entity type and dialect
#[derive(Debug, Default)]
pub struct Catalog {
    tables: DashMap<(TypeId, Dialect), Arc<TableDescriptor>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared process-wide catalog
    pub fn global() -> &'static Catalog {
        &CATALOG
    }

    /// Descriptor for `E`, building and caching it on first request.
    ///
    /// Construction happens outside the map lock; if two threads race, the
    /// first insert wins and both callers receive that descriptor.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::InvalidSchema` if the entity's schema is invalid.
    pub fn describe<E: Entity>(&self, dialect: Dialect) -> Result<Arc<TableDescriptor>, OrmError> {
        let key = (TypeId::of::<E>(), dialect);
        if let Some(existing) = self.tables.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }
        let built = Arc::new(TableDescriptor::build(E::schema(), dialect)?);
        log::debug!(
            "Registered table mapping {} -> {} ({dialect})",
            built.entity,
            built.table
        );
        let entry = self.tables.entry(key).or_insert(built);
        Ok(Arc::clone(entry.value()))
    }

    /// Build the descriptor for `E` ahead of first use.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::InvalidSchema` if the entity's schema is invalid.
    pub fn preload<E: Entity>(&self, dialect: Dialect) -> Result<(), OrmError> {
        self.describe::<E>(dialect).map(|_| ())
    }

    /// Column lookup by entity type and property name.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::UnmappedProperty` if the property is not mapped.
    pub fn resolve_column<E: Entity>(
        &self,
        dialect: Dialect,
        property: &str,
    ) -> Result<ColumnDescriptor, OrmError> {
        let table = self.describe::<E>(dialect)?;
        table.resolve_column(property).cloned()
    }

    /// Whether `E` already has a descriptor for `dialect`
    pub fn is_registered<E: Entity>(&self, dialect: Dialect) -> bool {
        self.tables.contains_key(&(TypeId::of::<E>(), dialect))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
