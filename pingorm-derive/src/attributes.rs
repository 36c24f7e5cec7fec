//! Attribute parsing utilities

use syn::{Attribute, Expr, ExprLit, Field, Lit};

/// Value of a `#[name = "value"]` attribute
///
/// Returns an error if the attribute is present but is not a string
/// name-value pair.
fn string_attribute(attrs: &[Attribute], name: &str) -> syn::Result<Option<String>> {
    for attr in attrs {
        if attr.path().is_ident(name) {
            let meta = attr.meta.require_name_value()?;
            if let Expr::Lit(ExprLit {
                lit: Lit::Str(s), ..
            }) = &meta.value
            {
                let value = s.value();
                if value.trim().is_empty() {
                    return Err(syn::Error::new_spanned(
                        s,
                        format!("`{name}` cannot be empty"),
                    ));
                }
                return Ok(Some(value));
            }
            return Err(syn::Error::new_spanned(
                &meta.value,
                format!("expected `#[{name} = \"...\"]`"),
            ));
        }
    }
    Ok(None)
}

fn has_attribute(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}

/// Struct-level attributes of a `DataEntity`
pub struct EntityAttributes {
    pub connection_key: Option<String>,
    pub table_name: Option<String>,
    pub sequence_name: Option<String>,
}

pub fn parse_entity_attributes(attrs: &[Attribute]) -> syn::Result<EntityAttributes> {
    Ok(EntityAttributes {
        connection_key: string_attribute(attrs, "connection_key")?,
        table_name: string_attribute(attrs, "table_name")?,
        sequence_name: string_attribute(attrs, "sequence_name")?,
    })
}

/// Field-level attributes
#[derive(Default)]
pub struct ColumnAttributes {
    pub column_name: Option<String>,
    pub is_primary_key: bool,
    pub is_partition_key: bool,
    pub is_auto_increment: bool,
    pub is_nested: bool,
    pub is_skipped: bool,
}

/// Parse all column attributes from a field
///
/// Rejects combinations that cannot map: a skipped key, a nested key, or a
/// nested field with its own column name.
pub fn parse_column_attributes(field: &Field) -> syn::Result<ColumnAttributes> {
    let attrs = ColumnAttributes {
        column_name: string_attribute(&field.attrs, "column_name")?,
        is_primary_key: has_attribute(&field.attrs, "primary_key"),
        is_partition_key: has_attribute(&field.attrs, "partition_key"),
        is_auto_increment: has_attribute(&field.attrs, "auto_increment"),
        is_nested: has_attribute(&field.attrs, "nested"),
        is_skipped: has_attribute(&field.attrs, "skip"),
    };

    let is_key = attrs.is_primary_key || attrs.is_partition_key;
    if attrs.is_skipped && is_key {
        return Err(syn::Error::new_spanned(
            field,
            "a key field cannot be `#[skip]`ped",
        ));
    }
    if attrs.is_nested && (is_key || attrs.is_auto_increment) {
        return Err(syn::Error::new_spanned(
            field,
            "`#[nested]` fields cannot carry key attributes; mark the group's fields instead",
        ));
    }
    if attrs.is_nested && attrs.column_name.is_some() {
        return Err(syn::Error::new_spanned(
            field,
            "`#[nested]` fields map through the group's own column names",
        ));
    }
    Ok(attrs)
}
