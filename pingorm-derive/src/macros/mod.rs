//! Macro implementations

mod column_group;
mod data_entity;

pub use column_group::derive_column_group;
pub use data_entity::derive_data_entity;

use crate::attributes::{self, ColumnAttributes};
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Type};

/// One non-skipped field of a derived struct
pub(crate) struct MappedField<'a> {
    pub ident: &'a Ident,
    pub ty: &'a Type,
    /// Field name without any raw identifier prefix
    pub property: String,
    pub column: String,
    pub attrs: ColumnAttributes,
}

/// Named fields of `input` with their parsed attributes, skipping `#[skip]`
pub(crate) fn mapped_fields<'a>(
    input: &'a DeriveInput,
    derive: &str,
) -> syn::Result<Vec<MappedField<'a>>> {
    let fields = match &input.data {
        Data::Struct(syn::DataStruct {
            fields: Fields::Named(fields),
            ..
        }) => &fields.named,
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                format!("{derive} can only be derived for structs with named fields"),
            ));
        }
    };

    let mut mapped = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let attrs = attributes::parse_column_attributes(field)?;
        if attrs.is_skipped {
            continue;
        }
        let property = ident.to_string().trim_start_matches("r#").to_string();
        let column = attrs.column_name.clone().unwrap_or_else(|| property.clone());
        mapped.push(MappedField {
            ident,
            ty: &field.ty,
            property,
            column,
            attrs,
        });
    }
    Ok(mapped)
}

/// `ColumnDescriptor` expression for a plain column
pub(crate) fn descriptor(field: &MappedField<'_>) -> TokenStream2 {
    let ty = field.ty;
    let property = LitStr::new(&field.property, field.ident.span());
    let column = LitStr::new(&field.column, field.ident.span());
    let mut tokens = quote! {
        ::pingorm::schema::ColumnDescriptor::new(
            #property,
            #column,
            <#ty as ::pingorm::value::ColumnValue>::KIND,
        )
    };
    if field.attrs.is_primary_key {
        tokens = quote! { #tokens.primary_key() };
    }
    if field.attrs.is_partition_key {
        tokens = quote! { #tokens.partition_key() };
    }
    if field.attrs.is_auto_increment {
        tokens = quote! { #tokens.auto_generated() };
    }
    tokens
}

/// Statement reading `field` from `record` into `target.field`
///
/// NULL and missing columns leave the current value alone.
pub(crate) fn read_column(field: &MappedField<'_>, target: &TokenStream2) -> TokenStream2 {
    let ident = field.ident;
    let ty = field.ty;
    let column = LitStr::new(&field.column, field.ident.span());
    quote! {
        if let ::std::option::Option::Some(value) = record.get(#column) {
            if !::pingorm::value::is_null(value) {
                #target.#ident = <#ty as ::pingorm::value::ColumnValue>::from_value(value)?;
            }
        }
    }
}

/// Match arm assigning `field` from `value`
pub(crate) fn assign_arm(field: &MappedField<'_>, done: &TokenStream2) -> TokenStream2 {
    let ident = field.ident;
    let ty = field.ty;
    let property = LitStr::new(&field.property, field.ident.span());
    quote! {
        #property => {
            self.#ident = <#ty as ::pingorm::value::ColumnValue>::from_value(value)?;
            #done
        }
    }
}

pub(crate) fn push_value(field: &MappedField<'_>, out: &TokenStream2) -> TokenStream2 {
    let ident = field.ident;
    let ty = field.ty;
    quote! {
        #out.push(<#ty as ::pingorm::value::ColumnValue>::to_value(&self.#ident));
    }
}

pub(crate) fn into_stream(result: syn::Result<TokenStream2>) -> proc_macro::TokenStream {
    match result {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
