//! Utility functions for code generation

use syn::{GenericArgument, PathArguments, Type};

/// Convert string to snake_case
pub fn snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            result.push('_');
        }
        result.extend(c.to_lowercase());
    }
    result
}

/// Inner type of `Option<T>`, or the type itself
pub fn option_inner(ty: &Type) -> &Type {
    if let Type::Path(path) = ty {
        if path.qself.is_none() {
            if let Some(segment) = path.path.segments.last() {
                if segment.ident == "Option" {
                    if let PathArguments::AngleBracketed(args) = &segment.arguments {
                        if let Some(GenericArgument::Type(inner)) = args.args.first() {
                            return inner;
                        }
                    }
                }
            }
        }
    }
    ty
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::ToTokens;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("UserId"), "user_id");
        assert_eq!(snake_case("user_id"), "user_id");
        assert_eq!(snake_case("User"), "user");
    }

    #[test]
    fn test_option_inner() {
        let ty: Type = syn::parse_quote!(Option<String>);
        assert_eq!(option_inner(&ty).to_token_stream().to_string(), "String");

        let ty: Type = syn::parse_quote!(std::option::Option<i64>);
        assert_eq!(option_inner(&ty).to_token_stream().to_string(), "i64");

        let ty: Type = syn::parse_quote!(Vec<u8>);
        assert_eq!(option_inner(&ty).to_token_stream().to_string(), "Vec < u8 >");
    }
}
