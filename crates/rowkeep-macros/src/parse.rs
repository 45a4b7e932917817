//! Parsing logic for the Entity derive macro.
//!
//! Extracts struct-level and field-level `#[rowkeep(...)]` attributes from the
//! derive input into `EntityDef` / `FieldDef` for code generation.

use proc_macro2::Span;
use syn::ext::IdentExt;
use syn::{Attribute, Data, DeriveInput, Error, Field, Fields, Generics, Ident, Lit, Result, Type};

/// Parsed entity definition from a struct with `#[derive(Entity)]`.
#[derive(Debug)]
pub struct EntityDef {
    /// The struct name (e.g., `Person`).
    pub name: Ident,
    /// Declared table override; `None` leaves the default to the resolver.
    pub table: Option<String>,
    pub fields: Vec<FieldDef>,
    pub generics: Generics,
}

impl EntityDef {
    /// The field marked `#[rowkeep(id)]`.
    pub fn identifier(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.identifier)
    }
}

/// How the identifier is generated, as written in the attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    Identity,
    Assigned,
}

/// Parsed field definition from a struct field.
#[derive(Debug)]
pub struct FieldDef {
    /// The Rust field name as written (may be a raw identifier).
    pub name: Ident,
    /// Column override from `#[rowkeep(column = "...")]`.
    pub column: Option<String>,
    pub ty: Type,
    /// SQL type override from `#[rowkeep(sql_type = "...")]`.
    pub sql_type: Option<String>,
    pub nullable: bool,
    pub identifier: bool,
    pub generation: Option<Generation>,
}

impl FieldDef {
    /// Field name without a raw-identifier prefix.
    pub fn field_name(&self) -> String {
        self.name.unraw().to_string()
    }
}

/// Parse a `DeriveInput` into an `EntityDef`.
pub fn parse_entity(input: &DeriveInput) -> Result<EntityDef> {
    let name = input.ident.clone();
    let generics = input.generics.clone();
    let table = parse_struct_attrs(&input.attrs)?;

    let fields = match &input.data {
        Data::Struct(data) => parse_fields(&data.fields)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not unions",
            ));
        }
    };

    Ok(EntityDef {
        name,
        table,
        fields,
        generics,
    })
}

/// Parse struct-level `#[rowkeep(...)]` attributes.
///
/// Supported keys:
/// - `table = "name"` (overrides the lower-cased type name)
fn parse_struct_attrs(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut table = None;

    for attr in attrs {
        if !attr.path().is_ident("rowkeep") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                table = Some(string_value(&meta, "table name")?);
                Ok(())
            } else {
                Err(meta.error("unknown rowkeep struct attribute, expected `table`"))
            }
        })?;
    }

    Ok(table)
}

fn parse_fields(fields: &Fields) -> Result<Vec<FieldDef>> {
    match fields {
        Fields::Named(named) => named.named.iter().map(parse_field).collect(),
        Fields::Unnamed(_) => Err(Error::new(
            Span::call_site(),
            "Entity requires a struct with named fields, not a tuple struct",
        )),
        Fields::Unit => Err(Error::new(
            Span::call_site(),
            "Entity requires a struct with fields, not a unit struct",
        )),
    }
}

/// Parse a single field and its attributes.
fn parse_field(field: &Field) -> Result<FieldDef> {
    let name = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;
    let ty = field.ty.clone();

    let mut def = FieldDef {
        name,
        column: None,
        nullable: is_option_type(&ty),
        ty,
        sql_type: None,
        identifier: false,
        generation: None,
    };

    for attr in &field.attrs {
        if !attr.path().is_ident("rowkeep") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("id") {
                def.identifier = true;
            } else if path.is_ident("nullable") {
                def.nullable = true;
            } else if path.is_ident("column") {
                def.column = Some(string_value(&meta, "column name")?);
            } else if path.is_ident("sql_type") {
                def.sql_type = Some(string_value(&meta, "sql_type")?);
            } else if path.is_ident("generated") {
                // A bare `generated` means the store assigns the identifier.
                if meta.input.peek(syn::Token![=]) {
                    let value = string_value(&meta, "generation strategy")?;
                    def.generation = Some(match value.as_str() {
                        "identity" => Generation::Identity,
                        "assigned" => Generation::Assigned,
                        _ => {
                            return Err(meta.error(
                                "unknown generation strategy, expected \"identity\" or \"assigned\"",
                            ));
                        }
                    });
                } else {
                    def.generation = Some(Generation::Identity);
                }
            } else {
                return Err(meta.error(
                    "unknown rowkeep field attribute, expected one of \
                     `id`, `generated`, `column`, `nullable`, `sql_type`",
                ));
            }
            Ok(())
        })?;
    }

    if def.generation.is_some() && !def.identifier {
        return Err(Error::new_spanned(
            &def.name,
            "`generated` is only valid on the field marked `#[rowkeep(id)]`",
        ));
    }

    Ok(def)
}

fn string_value(meta: &syn::meta::ParseNestedMeta<'_>, what: &str) -> Result<String> {
    let value: Lit = meta.value()?.parse()?;
    match value {
        Lit::Str(lit) => Ok(lit.value()),
        other => Err(Error::new_spanned(
            other,
            format!("expected string literal for {what}"),
        )),
    }
}

/// Check if a type is `Option<T>`.
pub fn is_option_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Option";
        }
    }
    false
}
