//! Procedural macros for Rowkeep.
//!
//! `rowkeep-macros` is the **compile-time codegen layer**. `#[derive(Entity)]`
//! turns a struct with named fields into an `Entity` implementation: static
//! field metadata plus the conversions to and from `FieldValues`.
//!
//! Generated code refers to `rowkeep_core`, so the deriving crate must depend
//! on it (directly, or through the `rowkeep` facade plus `rowkeep-core`).

use proc_macro::TokenStream;

mod infer;
mod parse;

use parse::{EntityDef, Generation, parse_entity};

/// Derive macro for the `Entity` trait.
///
/// # Attributes
///
/// - `#[rowkeep(table = "name")]` - Override the table name (defaults to the
///   lower-cased struct name)
/// - `#[rowkeep(id)]` - Mark the identifier field (exactly one)
/// - `#[rowkeep(id, generated)]` / `generated = "identity"` - Store-assigned
///   identifier, left out of INSERT
/// - `#[rowkeep(id, generated = "assigned")]` - Caller-assigned identifier
///   (the default)
/// - `#[rowkeep(column = "name")]` - Override the column name
/// - `#[rowkeep(nullable)]` - Mark the field nullable (implied by `Option<T>`)
/// - `#[rowkeep(sql_type = "BIGINT")]` - Override the inferred SQL type
///
/// # Example
///
/// ```ignore
/// use rowkeep::Entity;
///
/// #[derive(Entity)]
/// #[rowkeep(table = "person")]
/// struct Person {
///     #[rowkeep(id, generated = "identity")]
///     id: i64,
///     first_name: String,
///     last_name: String,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(rowkeep))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let entity = match parse_entity(&input) {
        Ok(e) => e,
        Err(e) => return e.to_compile_error().into(),
    };

    if let Err(e) = validate_entity(&entity) {
        return e.to_compile_error().into();
    }

    match generate_entity_impl(&entity) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

/// Reject definitions the resolver could never accept.
fn validate_entity(entity: &EntityDef) -> syn::Result<()> {
    let mut ids = entity.fields.iter().filter(|f| f.identifier);
    if let (Some(_), Some(second)) = (ids.next(), ids.next()) {
        return Err(syn::Error::new_spanned(
            &second.name,
            "only one field may be marked #[rowkeep(id)]",
        ));
    }
    Ok(())
}

fn generate_entity_impl(entity: &EntityDef) -> syn::Result<proc_macro2::TokenStream> {
    let name = &entity.name;
    let type_name = name.to_string();
    let (impl_generics, ty_generics, where_clause) = entity.generics.split_for_impl();

    let table_fn = entity.table.as_ref().map(|table| {
        quote::quote! {
            fn table_name() -> ::core::option::Option<&'static str> {
                ::core::option::Option::Some(#table)
            }
        }
    });

    let field_infos = generate_field_infos(entity)?;
    let field_count = entity.fields.len();

    let pushes = entity.fields.iter().map(|field| {
        let ident = &field.name;
        let field_name = field.field_name();
        quote::quote! {
            values.push(#field_name, ::core::clone::Clone::clone(&self.#ident));
        }
    });

    let extractions = entity.fields.iter().map(|field| {
        let ident = &field.name;
        let field_name = field.field_name();
        quote::quote! {
            #ident: values.get_as(#type_name, #field_name)?
        }
    });

    Ok(quote::quote! {
        impl #impl_generics rowkeep_core::Entity for #name #ty_generics #where_clause {
            const TYPE_NAME: &'static str = #type_name;

            #table_fn

            fn fields() -> &'static [rowkeep_core::FieldInfo] {
                const FIELDS: &[rowkeep_core::FieldInfo] = &[#(#field_infos),*];
                FIELDS
            }

            fn field_values(&self) -> rowkeep_core::FieldValues {
                let mut values = rowkeep_core::FieldValues::with_capacity(#field_count);
                #(#pushes)*
                values
            }

            fn from_fields(values: &rowkeep_core::FieldValues) -> rowkeep_core::Result<Self> {
                ::core::result::Result::Ok(Self {
                    #(#extractions),*
                })
            }
        }
    })
}

/// Build one `FieldInfo` constructor expression per field.
fn generate_field_infos(entity: &EntityDef) -> syn::Result<Vec<proc_macro2::TokenStream>> {
    entity
        .fields
        .iter()
        .map(|field| {
            let field_name = field.field_name();
            let sql_type = match &field.sql_type {
                Some(declared) => infer::parse_sql_type_attr(declared).ok_or_else(|| {
                    syn::Error::new_spanned(
                        &field.name,
                        format!("unsupported sql_type \"{declared}\""),
                    )
                })?,
                None => infer::infer_sql_type(&field.ty),
            };

            let mut ts = quote::quote! {
                rowkeep_core::FieldInfo::new(#field_name, #sql_type)
            };
            if let Some(column) = &field.column {
                ts = quote::quote! { #ts.column(#column) };
            }
            if field.nullable {
                ts = quote::quote! { #ts.nullable(true) };
            }
            if field.identifier {
                ts = quote::quote! { #ts.identifier(true) };
            }
            if field.generation == Some(Generation::Identity) {
                ts = quote::quote! {
                    #ts.generation(rowkeep_core::GenerationStrategy::Identity)
                };
            }
            Ok(ts)
        })
        .collect()
}
