//! Derive macro for `DataEntity`
//!
//! Generates the `Entity` implementation and one typed `Field` constant per
//! mapped field. Nested groups contribute their columns through
//! `ColumnGroup`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, DeriveInput, LitStr};

use super::{assign_arm, descriptor, into_stream, mapped_fields, push_value, read_column};
use crate::attributes;
use crate::utils;

pub fn derive_data_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    into_stream(expand(&input))
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let entity_attrs = attributes::parse_entity_attributes(&input.attrs)?;
    let fields = mapped_fields(input, "DataEntity")?;

    let span = name.span();
    let entity_name = LitStr::new(&name.to_string(), span);
    let key = LitStr::new(
        entity_attrs.connection_key.as_deref().unwrap_or("default"),
        span,
    );
    let table = LitStr::new(
        &entity_attrs
            .table_name
            .unwrap_or_else(|| utils::snake_case(&name.to_string())),
        span,
    );
    let sequence = match entity_attrs.sequence_name {
        Some(sequence) => {
            let sequence = LitStr::new(&sequence, span);
            quote! { ::std::option::Option::Some(#sequence) }
        }
        None => quote! { ::std::option::Option::None },
    };

    let mut constants = Vec::new();
    let mut columns = Vec::new();
    let mut pushes = Vec::new();
    let mut reads = Vec::new();
    let mut arms = Vec::new();
    let mut nested_assigns = Vec::new();

    let values = quote! { values };
    let target = quote! { entity };
    let done = quote! { return ::std::result::Result::Ok(()); };

    for field in &fields {
        let ident = field.ident;
        let ty = field.ty;
        let property = LitStr::new(&field.property, ident.span());

        if field.attrs.is_nested {
            columns.push(quote! {
                columns.extend(<#ty as ::pingorm::schema::ColumnGroup>::columns(#property));
            });
            pushes.push(quote! {
                ::pingorm::schema::ColumnGroup::push_values(&self.#ident, &mut values);
            });
            reads.push(quote! {
                ::pingorm::schema::ColumnGroup::read_record(&mut entity.#ident, record)?;
            });
            nested_assigns.push(quote! {
                ::std::option::Option::Some(#property) => {
                    if ::pingorm::schema::ColumnGroup::set_property(&mut self.#ident, property, value)? {
                        return ::std::result::Result::Ok(());
                    }
                }
            });
            continue;
        }

        let constant = format_ident!("{}", field.property.to_uppercase(), span = ident.span());
        let inner = utils::option_inner(ty);
        constants.push(quote! {
            pub const #constant: ::pingorm::Field<Self, #inner> = ::pingorm::Field::new(#property);
        });
        let column = descriptor(field);
        columns.push(quote! { columns.push(#column); });
        pushes.push(push_value(field, &values));
        reads.push(read_column(field, &target));
        arms.push(assign_arm(field, &done));
    }

    let capacity = fields.len();

    Ok(quote! {
        impl #impl_generics #name #ty_generics #where_clause {
            #(#constants)*
        }

        impl #impl_generics ::pingorm::schema::Entity for #name #ty_generics #where_clause {
            fn schema() -> ::pingorm::schema::EntitySchema {
                let mut columns = ::std::vec::Vec::with_capacity(#capacity);
                #(#columns)*
                ::pingorm::schema::EntitySchema {
                    entity: #entity_name,
                    key: #key,
                    table: #table,
                    sequence: #sequence,
                    columns,
                }
            }

            fn to_values(&self) -> ::std::vec::Vec<::pingorm::Value> {
                let mut values = ::std::vec::Vec::with_capacity(#capacity);
                #(#pushes)*
                values
            }

            fn from_record(
                record: &::pingorm::value::Record,
            ) -> ::std::result::Result<Self, ::pingorm::OrmError> {
                let mut entity = <Self as ::std::default::Default>::default();
                #(#reads)*
                ::std::result::Result::Ok(entity)
            }

            fn set_property(
                &mut self,
                parent: ::std::option::Option<&str>,
                property: &str,
                value: &::pingorm::Value,
            ) -> ::std::result::Result<(), ::pingorm::OrmError> {
                match parent {
                    ::std::option::Option::None => match property {
                        #(#arms)*
                        _ => {}
                    },
                    #(#nested_assigns)*
                    _ => {}
                }
                ::std::result::Result::Err(::pingorm::OrmError::UnmappedProperty {
                    entity: ::std::string::String::from(#entity_name),
                    property: match parent {
                        ::std::option::Option::Some(parent) => ::std::format!("{}.{}", parent, property),
                        ::std::option::Option::None => ::std::string::String::from(property),
                    },
                })
            }
        }
    })
}
