//! SQL type inference from Rust field types.

use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::{GenericArgument, PathArguments, Type};

/// Infer the `SqlType` of a field from its Rust type, unwrapping `Option<T>`.
///
/// Unknown types fall back to `Text`.
pub fn infer_sql_type(ty: &Type) -> TokenStream {
    let inner = unwrap_option_type(ty);
    let type_str = inner.to_token_stream().to_string().replace(' ', "");

    match type_str.as_str() {
        "bool" => quote! { rowkeep_core::SqlType::Boolean },

        "i8" => quote! { rowkeep_core::SqlType::TinyInt },
        "i16" => quote! { rowkeep_core::SqlType::SmallInt },
        "i32" => quote! { rowkeep_core::SqlType::Integer },
        "i64" | "u32" => quote! { rowkeep_core::SqlType::BigInt },

        "f32" => quote! { rowkeep_core::SqlType::Real },
        "f64" => quote! { rowkeep_core::SqlType::Double },

        "Vec<u8>" => quote! { rowkeep_core::SqlType::Blob },

        "serde_json::Value" => quote! { rowkeep_core::SqlType::Json },

        _ => quote! { rowkeep_core::SqlType::Text },
    }
}

/// Parse an explicit `sql_type = "..."` attribute into a `SqlType`.
pub fn parse_sql_type_attr(sql_type: &str) -> Option<TokenStream> {
    let upper = sql_type.trim().to_uppercase();
    let ts = match upper.as_str() {
        "TINYINT" => quote! { rowkeep_core::SqlType::TinyInt },
        "SMALLINT" => quote! { rowkeep_core::SqlType::SmallInt },
        "INT" | "INTEGER" => quote! { rowkeep_core::SqlType::Integer },
        "BIGINT" => quote! { rowkeep_core::SqlType::BigInt },
        "REAL" | "FLOAT" => quote! { rowkeep_core::SqlType::Real },
        "DOUBLE" | "DOUBLE PRECISION" => quote! { rowkeep_core::SqlType::Double },
        "BOOL" | "BOOLEAN" => quote! { rowkeep_core::SqlType::Boolean },
        "TEXT" | "VARCHAR" => quote! { rowkeep_core::SqlType::Text },
        "BLOB" => quote! { rowkeep_core::SqlType::Blob },
        "JSON" => quote! { rowkeep_core::SqlType::Json },
        _ => return None,
    };
    Some(ts)
}

fn unwrap_option_type(ty: &Type) -> &Type {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if segment.ident == "Option" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return inner;
                    }
                }
            }
        }
    }
    ty
}
