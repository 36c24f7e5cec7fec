//! Procedural macros for pingorm
//!
//! This crate provides the `DataEntity` and `ColumnGroup` derives. Generated
//! code refers to items through `::pingorm`, so the derives are meant to be
//! used through the `pingorm` re-exports.

mod attributes;
mod macros;
mod utils;

use proc_macro::TokenStream;

/// Derive macro for `DataEntity` - maps a struct onto one table
///
/// This macro generates:
/// - `Entity` implementation (schema, row conversion, property assignment)
/// - One `Field` constant per mapped field (`User::FIRST_NAME`)
///
/// Struct attributes: `connection_key`, `table_name`, `sequence_name`.
/// Field attributes: `column_name`, `primary_key`, `partition_key`,
/// `auto_increment`, `nested`, `skip`.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Default, Clone, DataEntity)]
/// #[connection_key = "main"]
/// #[table_name = "users"]
/// #[sequence_name = "seq_users"]
/// pub struct User {
///     #[primary_key]
///     pub id: i64,
///     #[column_name = "first_name"]
///     pub first_name: String,
/// }
/// ```
#[proc_macro_derive(
    DataEntity,
    attributes(
        connection_key,
        table_name,
        sequence_name,
        column_name,
        primary_key,
        partition_key,
        auto_increment,
        nested,
        skip
    )
)]
pub fn derive_data_entity(input: TokenStream) -> TokenStream {
    macros::derive_data_entity(input)
}

/// Derive macro for `ColumnGroup` - a struct whose fields are columns of the
/// entity that embeds it with `#[nested]`
#[proc_macro_derive(
    ColumnGroup,
    attributes(column_name, primary_key, partition_key, auto_increment, skip)
)]
pub fn derive_column_group(input: TokenStream) -> TokenStream {
    macros::derive_column_group(input)
}
