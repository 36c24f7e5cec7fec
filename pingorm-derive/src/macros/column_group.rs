//! Derive macro for `ColumnGroup`

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

use super::{assign_arm, descriptor, into_stream, mapped_fields, push_value, read_column};

pub fn derive_column_group(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    into_stream(expand(&input))
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let fields = mapped_fields(input, "ColumnGroup")?;

    if let Some(nested) = fields.iter().find(|f| f.attrs.is_nested) {
        return Err(syn::Error::new_spanned(
            nested.ident,
            "column groups nest one level only",
        ));
    }

    let descriptors = fields.iter().map(|f| {
        let column = descriptor(f);
        quote! { #column.nested_in(parent) }
    });
    let out = quote! { out };
    let pushes = fields.iter().map(|f| push_value(f, &out));
    let target = quote! { self };
    let reads = fields.iter().map(|f| read_column(f, &target));
    let done = quote! { ::std::result::Result::Ok(true) };
    let arms = fields.iter().map(|f| assign_arm(f, &done));

    Ok(quote! {
        impl #impl_generics ::pingorm::schema::ColumnGroup for #name #ty_generics #where_clause {
            fn columns(parent: &'static str) -> ::std::vec::Vec<::pingorm::schema::ColumnDescriptor> {
                ::std::vec![#(#descriptors),*]
            }

            fn push_values(&self, out: &mut ::std::vec::Vec<::pingorm::Value>) {
                #(#pushes)*
            }

            fn read_record(
                &mut self,
                record: &::pingorm::value::Record,
            ) -> ::std::result::Result<(), ::pingorm::OrmError> {
                #(#reads)*
                ::std::result::Result::Ok(())
            }

            fn set_property(
                &mut self,
                property: &str,
                value: &::pingorm::Value,
            ) -> ::std::result::Result<bool, ::pingorm::OrmError> {
                match property {
                    #(#arms)*
                    _ => ::std::result::Result::Ok(false),
                }
            }
        }
    })
}
