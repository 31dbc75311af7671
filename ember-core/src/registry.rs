//! Struct and enum registries.
//!
//! Structs come from `struct` declarations, from instantiating generic
//! struct templates, and from closure lowering. Declaration order is kept
//! because the C emitter defines structs in that order, and a struct only
//! ever holds structs registered before it.

use tracing::debug;

use crate::ast::{EnumDef, Field, StructDef};
use crate::error::CoreError;
use crate::splitter::{find_matching, is_identifier, split_arguments, split_top_level};
use crate::types::{Inferred, Type, TypeResolver, parse_type};

/// A `struct Name<T, ..> { .. }` declaration whose field types are kept as
/// text until the struct is instantiated.
#[derive(Debug, Clone)]
struct GenericStruct {
    name: String,
    params: Vec<String>,
    fields: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    structs: Vec<StructDef>,
    generics: Vec<GenericStruct>,
    enums: Vec<EnumDef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.iter().find(|def| def.name == name)
    }

    pub fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        self.enums.iter().find(|def| def.name == name)
    }

    pub fn is_generic(&self, name: &str) -> bool {
        self.generics.iter().any(|generic| generic.name == name)
    }

    fn is_type_name(&self, name: &str) -> bool {
        self.struct_def(name).is_some() || self.enum_def(name).is_some() || self.is_generic(name)
    }

    /// Registers `struct Name { field : Type, .. }`, generic or not.
    pub fn declare_struct(&mut self, text: &str) -> Result<String, CoreError> {
        let (header, body) = split_declaration(text, "struct")?;
        let (name, params) = match header.find('<') {
            Some(open) if header.ends_with('>') => {
                let params = split_arguments(&header[open + 1..header.len() - 1])?;
                (header[..open].trim(), params)
            }
            _ => (header, Vec::new()),
        };
        if !is_identifier(name) {
            return Err(CoreError::structural(format!("invalid struct name '{name}'")));
        }
        if self.is_type_name(name) {
            return Err(CoreError::duplicate("type", name));
        }

        let mut fields: Vec<(String, String)> = Vec::new();
        for piece in split_top_level(body, b',')? {
            for piece in split_top_level(piece, b';')? {
                if piece.is_empty() {
                    continue;
                }
                let (field, ty) = piece.split_once(':').ok_or_else(|| {
                    CoreError::structural(format!("field '{piece}' of '{name}' needs a type"))
                })?;
                let field = field.trim();
                if !is_identifier(field) {
                    return Err(CoreError::structural(format!("invalid field name '{field}'")));
                }
                if fields.iter().any(|(existing, _)| existing == field) {
                    return Err(CoreError::duplicate("field", format!("{name}.{field}")));
                }
                fields.push((field.to_string(), ty.trim().to_string()));
            }
        }

        if !params.is_empty() {
            let mut seen: Vec<&str> = Vec::new();
            for &param in &params {
                if !is_identifier(param) {
                    return Err(CoreError::structural(format!("invalid type parameter '{param}'")));
                }
                if seen.contains(&param) {
                    return Err(CoreError::duplicate("type parameter", param));
                }
                seen.push(param);
            }
            debug!(name, params = params.len(), "registered generic struct");
            self.generics.push(GenericStruct {
                name: name.to_string(),
                params: params.iter().map(|param| param.to_string()).collect(),
                fields,
            });
            return Ok(name.to_string());
        }

        self.define_struct(name.to_string(), &fields, &[])?;
        Ok(name.to_string())
    }

    /// Adds a struct whose fields are parsed with `bindings` substituted for
    /// type parameters. The name is registered before the fields are parsed
    /// so that a struct can point to itself.
    fn define_struct(
        &mut self,
        name: String,
        fields: &[(String, String)],
        bindings: &[(String, Type)],
    ) -> Result<(), CoreError> {
        let index = self.structs.len();
        self.structs.push(StructDef {
            name: name.clone(),
            fields: Vec::new(),
        });

        let mut parsed = Vec::with_capacity(fields.len());
        for (field, text) in fields {
            let mut resolver = Substitution {
                registry: self,
                bindings,
            };
            let ty = parse_type(text, &mut resolver)?;
            if ty == Type::Struct(name.clone()) {
                return Err(CoreError::structural(format!(
                    "struct '{name}' cannot contain itself; use a pointer"
                )));
            }
            parsed.push(Field {
                name: field.clone(),
                ty,
            });
        }

        // instantiating field types may have appended structs after ours;
        // move ours behind them so definitions stay in dependency order
        let mut def = self.structs.remove(index);
        def.fields = parsed;
        debug!(name = %def.name, fields = def.fields.len(), "registered struct");
        self.structs.push(def);
        Ok(())
    }

    /// Registers a struct built by the compiler itself.
    pub fn register(&mut self, def: StructDef) -> Result<(), CoreError> {
        if self.is_type_name(&def.name) {
            return Err(CoreError::duplicate("type", def.name));
        }
        debug!(name = %def.name, fields = def.fields.len(), "registered struct");
        self.structs.push(def);
        Ok(())
    }

    /// Instantiates a generic struct, returning the concrete struct name.
    pub fn instantiate(&mut self, name: &str, args: Vec<Type>) -> Result<String, CoreError> {
        let generic = self
            .generics
            .iter()
            .find(|generic| generic.name == name)
            .cloned()
            .ok_or_else(|| CoreError::undefined(name))?;
        if generic.params.len() != args.len() {
            return Err(CoreError::mismatch(format!(
                "'{name}' expects {} type arguments but received {}",
                generic.params.len(),
                args.len()
            )));
        }
        let mangled = format!(
            "{}_{}",
            name,
            args.iter().map(Type::mangle).collect::<Vec<_>>().join("_")
        );
        if self.struct_def(&mangled).is_none() {
            let bindings: Vec<(String, Type)> = generic.params.iter().cloned().zip(args).collect();
            self.define_struct(mangled.clone(), &generic.fields, &bindings)?;
        }
        Ok(mangled)
    }

    /// Instantiates a generic struct from the values of a literal, taking
    /// each type parameter from a field declared with exactly that type.
    pub fn instantiate_from_values(
        &mut self,
        name: &str,
        values: &[Inferred],
    ) -> Result<String, CoreError> {
        let generic = self
            .generics
            .iter()
            .find(|generic| generic.name == name)
            .cloned()
            .ok_or_else(|| CoreError::undefined(name))?;
        if generic.fields.len() != values.len() {
            return Err(CoreError::mismatch(format!(
                "struct '{name}' has {} fields but {} values were given",
                generic.fields.len(),
                values.len()
            )));
        }
        let mut args = Vec::with_capacity(generic.params.len());
        for param in &generic.params {
            let position = generic
                .fields
                .iter()
                .position(|(_, ty)| ty == param)
                .ok_or_else(|| {
                    CoreError::mismatch(format!(
                        "cannot infer type parameter '{param}' of '{name}'; write {name}<..> explicitly"
                    ))
                })?;
            args.push(values[position].resolve()?);
        }
        self.instantiate(name, args)
    }

    /// Registers `enum Name { A, B }`.
    pub fn declare_enum(&mut self, text: &str) -> Result<String, CoreError> {
        let (name, body) = split_declaration(text, "enum")?;
        if !is_identifier(name) {
            return Err(CoreError::structural(format!("invalid enum name '{name}'")));
        }
        if self.is_type_name(name) {
            return Err(CoreError::duplicate("type", name));
        }
        let mut variants: Vec<String> = Vec::new();
        for variant in split_arguments(body)? {
            if !is_identifier(variant) {
                return Err(CoreError::structural(format!("invalid enum variant '{variant}'")));
            }
            if variants.iter().any(|existing| existing == variant) {
                return Err(CoreError::duplicate("variant", format!("{name}.{variant}")));
            }
            variants.push(variant.to_string());
        }
        if variants.is_empty() {
            return Err(CoreError::structural(format!("enum '{name}' has no variants")));
        }
        debug!(name, variants = variants.len(), "registered enum");
        self.enums.push(EnumDef {
            name: name.to_string(),
            variants,
        });
        Ok(name.to_string())
    }

    pub fn into_parts(self) -> (Vec<StructDef>, Vec<EnumDef>) {
        (self.structs, self.enums)
    }
}

impl TypeResolver for TypeRegistry {
    fn resolve_named(&mut self, name: &str, args: Vec<Type>) -> Result<Type, CoreError> {
        if self.is_generic(name) {
            return Ok(Type::Struct(self.instantiate(name, args)?));
        }
        if !args.is_empty() {
            return Err(CoreError::mismatch(format!("'{name}' takes no type arguments")));
        }
        if self.struct_def(name).is_some() {
            Ok(Type::Struct(name.to_string()))
        } else if self.enum_def(name).is_some() {
            Ok(Type::Enum(name.to_string()))
        } else {
            Err(CoreError::undefined(name))
        }
    }
}

/// Resolves type parameters of a generic struct before named types.
struct Substitution<'r> {
    registry: &'r mut TypeRegistry,
    bindings: &'r [(String, Type)],
}

impl TypeResolver for Substitution<'_> {
    fn resolve_named(&mut self, name: &str, args: Vec<Type>) -> Result<Type, CoreError> {
        if args.is_empty() {
            if let Some((_, ty)) = self.bindings.iter().find(|(param, _)| param == name) {
                return Ok(ty.clone());
            }
        }
        self.registry.resolve_named(name, args)
    }
}

/// Splits `keyword Header { body }` into header and body.
fn split_declaration<'a>(text: &'a str, keyword: &str) -> Result<(&'a str, &'a str), CoreError> {
    let rest = text
        .trim()
        .strip_prefix(keyword)
        .ok_or_else(|| CoreError::structural(format!("expected '{keyword}'")))?
        .trim_start();
    let open = rest.find('{').ok_or_else(|| {
        CoreError::structural(format!("{keyword} declaration '{}' has no body", text.trim()))
    })?;
    let close = find_matching(rest, open)?;
    if close + 1 != rest.len() {
        return Err(CoreError::structural(format!(
            "unexpected text after {keyword} declaration: '{}'",
            &rest[close + 1..]
        )));
    }
    Ok((rest[..open].trim(), &rest[open + 1..close]))
}
