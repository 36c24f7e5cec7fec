//! Column catalog: declarative entity schemas, table descriptors and the
//! process-wide descriptor registry.

pub mod catalog;
pub mod column;
pub mod entity;
pub mod table;

pub use catalog::Catalog;
pub use column::ColumnDescriptor;
pub use entity::{ColumnGroup, Entity, EntitySchema};
pub use table::{TableDescriptor, Template};
