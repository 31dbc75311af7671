//! Type descriptors for Ember values and the literal-aware inference
//! results the validators work with.
//!
//! Types are written in source syntax (`I32`, `*mut U8`, `[I32; 2, 3]`,
//! `(I32, I32) => Bool`, `Point`, `Wrapper<I32>`) and parsed here. Named
//! types are resolved through a [`TypeResolver`] so that this module does
//! not depend on the struct and enum registries.

use std::fmt;

use crate::error::CoreError;
use crate::splitter::{find_matching, is_identifier, split_arguments, split_top_level, starts_with_word};

/// Represents the type of a binding, field, parameter or expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    /// Result type of functions that produce no value.
    Void,
    Pointer {
        pointee: Box<Type>,
        mutable: bool,
    },
    /// Fixed-size array. `dims` is never empty and the element is never an
    /// array itself; `[[I32; 3]; 2]` is normalized to `[I32; 2, 3]`.
    Array {
        element: Box<Type>,
        dims: Vec<usize>,
    },
    Function {
        params: Vec<Type>,
        result: Box<Type>,
    },
    Struct(String),
    Enum(String),
}

impl Type {
    pub fn pointer(pointee: Type, mutable: bool) -> Type {
        Type::Pointer {
            pointee: Box::new(pointee),
            mutable,
        }
    }

    /// Construct an array type, folding nested arrays into one dimension list.
    pub fn array(element: Type, mut dims: Vec<usize>) -> Type {
        match element {
            Type::Array {
                element: inner,
                dims: inner_dims,
            } => {
                dims.extend(inner_dims);
                Type::Array { element: inner, dims }
            }
            element => Type::Array {
                element: Box::new(element),
                dims,
            },
        }
    }

    pub fn function(params: Vec<Type>, result: Type) -> Type {
        Type::Function {
            params,
            result: Box::new(result),
        }
    }

    pub fn is_integer(&self) -> bool {
        self.integer_bounds().is_some()
    }

    /// Integers narrower than 32 bits. C computes on them as `int`, so
    /// emitters wrap arithmetic results back to their width.
    pub fn is_narrow_integer(&self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::U8 | Type::U16)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Types that can be compared with `==` and used as a program result.
    pub fn is_scalar(&self) -> bool {
        self.is_numeric() || matches!(self, Type::Bool | Type::Enum(_) | Type::Pointer { .. })
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Inclusive value range of an integer type.
    pub fn integer_bounds(&self) -> Option<(i128, i128)> {
        let bounds = match self {
            Type::I8 => (i8::MIN as i128, i8::MAX as i128),
            Type::I16 => (i16::MIN as i128, i16::MAX as i128),
            Type::I32 => (i32::MIN as i128, i32::MAX as i128),
            Type::I64 => (i64::MIN as i128, i64::MAX as i128),
            Type::U8 => (0, u8::MAX as i128),
            Type::U16 => (0, u16::MAX as i128),
            Type::U32 => (0, u32::MAX as i128),
            Type::U64 => (0, u64::MAX as i128),
            _ => return None,
        };
        Some(bounds)
    }

    /// The type produced by indexing once into an array.
    pub fn indexed(&self) -> Option<Type> {
        match self {
            Type::Array { element, dims } if dims.len() > 1 => Some(Type::Array {
                element: element.clone(),
                dims: dims[1..].to_vec(),
            }),
            Type::Array { element, .. } => Some((**element).clone()),
            _ => None,
        }
    }

    /// Identifier-safe spelling used to name generic instantiations.
    pub fn mangle(&self) -> String {
        match self {
            Type::Pointer { pointee, mutable } => {
                format!("{}{}", if *mutable { "MutPtr" } else { "Ptr" }, pointee.mangle())
            }
            Type::Array { element, dims } => {
                let dims: Vec<String> = dims.iter().map(|dim| dim.to_string()).collect();
                format!("Arr{}x{}", element.mangle(), dims.join("x"))
            }
            Type::Function { params, result } => {
                let params: Vec<String> = params.iter().map(Type::mangle).collect();
                format!("Fn{}To{}", params.join(""), result.mangle())
            }
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::I8 => write!(f, "I8"),
            Type::I16 => write!(f, "I16"),
            Type::I32 => write!(f, "I32"),
            Type::I64 => write!(f, "I64"),
            Type::U8 => write!(f, "U8"),
            Type::U16 => write!(f, "U16"),
            Type::U32 => write!(f, "U32"),
            Type::U64 => write!(f, "U64"),
            Type::F32 => write!(f, "F32"),
            Type::F64 => write!(f, "F64"),
            Type::Bool => write!(f, "Bool"),
            Type::Void => write!(f, "Void"),
            Type::Pointer { pointee, mutable } => {
                write!(f, "*{}{}", if *mutable { "mut " } else { "" }, pointee)
            }
            Type::Array { element, dims } => {
                let dims: Vec<String> = dims.iter().map(|dim| dim.to_string()).collect();
                write!(f, "[{}; {}]", element, dims.join(", "))
            }
            Type::Function { params, result } => {
                let params: Vec<String> = params.iter().map(Type::to_string).collect();
                write!(f, "({}) => {}", params.join(", "), result)
            }
            Type::Struct(name) | Type::Enum(name) => write!(f, "{name}"),
        }
    }
}

/// Primitive type for a name or literal suffix such as `U8`.
pub fn primitive(name: &str) -> Option<Type> {
    let ty = match name {
        "I8" => Type::I8,
        "I16" => Type::I16,
        "I32" => Type::I32,
        "I64" => Type::I64,
        "U8" => Type::U8,
        "U16" => Type::U16,
        "U32" => Type::U32,
        "U64" => Type::U64,
        "F32" => Type::F32,
        "F64" => Type::F64,
        "Bool" => Type::Bool,
        "Void" => Type::Void,
        _ => return None,
    };
    Some(ty)
}

/// Resolves user-defined type names, instantiating generic structs on
/// demand.
pub trait TypeResolver {
    fn resolve_named(&mut self, name: &str, args: Vec<Type>) -> Result<Type, CoreError>;
}

/// Parse a type written in source syntax.
pub fn parse_type(text: &str, resolver: &mut dyn TypeResolver) -> Result<Type, CoreError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CoreError::structural("expected a type"));
    }
    if let Some(ty) = primitive(text) {
        return Ok(ty);
    }

    if let Some(rest) = text.strip_prefix('*') {
        let rest = rest.trim_start();
        return if starts_with_word(rest, "mut") {
            Ok(Type::pointer(parse_type(&rest[3..], resolver)?, true))
        } else {
            Ok(Type::pointer(parse_type(rest, resolver)?, false))
        };
    }

    if text.starts_with('[') {
        let close = find_matching(text, 0)?;
        if close + 1 != text.len() {
            return Err(CoreError::structural(format!("invalid array type '{text}'")));
        }
        let parts = split_top_level(&text[1..close], b';')?;
        let [element, dims] = parts.as_slice() else {
            return Err(CoreError::structural(format!(
                "array type '{text}' must be written as [T; N]"
            )));
        };
        let element = parse_type(element, resolver)?;
        let dims = split_arguments(dims)?
            .into_iter()
            .map(parse_dimension)
            .collect::<Result<Vec<_>, _>>()?;
        if dims.is_empty() {
            return Err(CoreError::structural(format!("array type '{text}' has no size")));
        }
        return Ok(Type::array(element, dims));
    }

    if text.starts_with('(') {
        let close = find_matching(text, 0)?;
        let rest = text[close + 1..].trim_start();
        if let Some(result) = rest.strip_prefix("=>") {
            let params = split_arguments(&text[1..close])?
                .into_iter()
                .map(|param| parse_type(param, resolver))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Type::function(params, parse_type(result, resolver)?));
        }
        if rest.is_empty() {
            return parse_type(&text[1..close], resolver);
        }
        return Err(CoreError::structural(format!("invalid type '{text}'")));
    }

    let (name, args) = match text.find('<') {
        Some(open) if text.ends_with('>') => {
            let args = split_arguments(&text[open + 1..text.len() - 1])?
                .into_iter()
                .map(|arg| parse_type(arg, resolver))
                .collect::<Result<Vec<_>, _>>()?;
            (text[..open].trim(), args)
        }
        _ => (text, Vec::new()),
    };
    if !is_identifier(name) {
        return Err(CoreError::structural(format!("invalid type '{text}'")));
    }
    resolver.resolve_named(name, args)
}

fn parse_dimension(text: &str) -> Result<usize, CoreError> {
    let value: i64 = text
        .parse()
        .map_err(|_| CoreError::structural(format!("invalid array dimension '{text}'")))?;
    if value <= 0 {
        return Err(CoreError::structural(format!(
            "array dimension must be positive, found {value}"
        )));
    }
    Ok(value as usize)
}

/// Type information for an expression whose literals may still adapt to
/// the context they are used in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inferred {
    Known(Type),
    /// Unsuffixed integer literal, or arithmetic over such literals. Holds the
    /// value when it is a single literal so ranges can be checked.
    IntLiteral(Option<i128>),
    FloatLiteral,
    /// Array literal whose elements are still open.
    Array { element: Box<Inferred>, len: usize },
}

impl Inferred {
    /// Settle open literals on their default types (`I32`, `F64`).
    pub fn resolve(&self) -> Result<Type, CoreError> {
        match self {
            Inferred::Known(ty) => Ok(ty.clone()),
            Inferred::IntLiteral(value) => {
                check_assignable(self, &Type::I32).map_err(|_| {
                    CoreError::mismatch(format!(
                        "integer literal {} does not fit in I32",
                        value.unwrap_or_default()
                    ))
                })?;
                Ok(Type::I32)
            }
            Inferred::FloatLiteral => Ok(Type::F64),
            Inferred::Array { element, len } => Ok(Type::array(element.resolve()?, vec![*len])),
        }
    }

    pub fn known(&self) -> Option<&Type> {
        match self {
            Inferred::Known(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        match self {
            Inferred::Known(ty) => ty.is_numeric(),
            Inferred::IntLiteral(_) | Inferred::FloatLiteral => true,
            Inferred::Array { .. } => false,
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Inferred::Known(Type::Bool))
    }
}

impl fmt::Display for Inferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inferred::Known(ty) => write!(f, "{ty}"),
            Inferred::IntLiteral(_) => write!(f, "integer literal"),
            Inferred::FloatLiteral => write!(f, "float literal"),
            Inferred::Array { element, len } => write!(f, "[{element}; {len}]"),
        }
    }
}

/// Checks that a value of type `value` can be stored in a `target` slot.
pub fn check_assignable(value: &Inferred, target: &Type) -> Result<(), CoreError> {
    match value {
        Inferred::Known(ty) if ty == target => Ok(()),
        Inferred::IntLiteral(literal) if target.is_integer() => {
            if let (Some(literal), Some((min, max))) = (literal, target.integer_bounds()) {
                if *literal < min || *literal > max {
                    return Err(CoreError::mismatch(format!(
                        "integer literal {literal} does not fit in {target}"
                    )));
                }
            }
            Ok(())
        }
        Inferred::IntLiteral(_) | Inferred::FloatLiteral if target.is_float() => Ok(()),
        Inferred::Array { element, len } => match target {
            Type::Array { dims, .. } if dims[0] == *len => {
                let inner = target.indexed().unwrap_or(Type::Void);
                check_assignable(element, &inner)
            }
            _ => Err(CoreError::mismatch(format!(
                "array literal of {len} elements cannot be used as {target}"
            ))),
        },
        other => Err(CoreError::mismatch(format!("expected {target}, found {other}"))),
    }
}

/// The type two operands agree on, for operator `op`.
pub fn common_type(left: &Inferred, right: &Inferred, op: &str) -> Result<Inferred, CoreError> {
    use Inferred::*;

    match (left, right) {
        (Known(a), Known(b)) if a == b => Ok(left.clone()),
        (Known(a), Known(b)) => Err(CoreError::mismatch(format!(
            "operator '{op}' cannot combine {a} and {b}"
        ))),
        (Known(ty), literal) | (literal, Known(ty)) => {
            check_assignable(literal, ty).map_err(|_| {
                CoreError::mismatch(format!("operator '{op}' cannot combine {ty} and {literal}"))
            })?;
            Ok(Known(ty.clone()))
        }
        (IntLiteral(_), IntLiteral(_)) => Ok(IntLiteral(None)),
        (FloatLiteral | IntLiteral(_), FloatLiteral | IntLiteral(_)) => Ok(FloatLiteral),
        (a, b) => Err(CoreError::mismatch(format!(
            "operator '{op}' cannot combine {a} and {b}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoNamedTypes;

    impl TypeResolver for NoNamedTypes {
        fn resolve_named(&mut self, name: &str, args: Vec<Type>) -> Result<Type, CoreError> {
            if name == "Point" && args.is_empty() {
                Ok(Type::Struct(name.to_string()))
            } else {
                Err(CoreError::undefined(name))
            }
        }
    }

    fn parse(text: &str) -> Result<Type, CoreError> {
        parse_type(text, &mut NoNamedTypes)
    }

    #[test]
    fn parses_primitive_and_composite_types() {
        assert_eq!(parse("I32").expect("type"), Type::I32);
        assert_eq!(parse("*mut U8").expect("type"), Type::pointer(Type::U8, true));
        assert_eq!(parse("[I32; 2, 3]").expect("type"), Type::array(Type::I32, vec![2, 3]));
        assert_eq!(
            parse("(I32, Point) => Bool").expect("type"),
            Type::function(vec![Type::I32, Type::Struct("Point".into())], Type::Bool)
        );
    }

    #[test]
    fn folds_nested_array_types() {
        assert_eq!(parse("[[I32; 3]; 2]").expect("type"), Type::array(Type::I32, vec![2, 3]));
    }

    #[test]
    fn rejects_bad_dimensions_and_unknown_names() {
        assert!(matches!(parse("[I32; -1]"), Err(CoreError::Structural(_))));
        assert!(matches!(parse("[I32; 0]"), Err(CoreError::Structural(_))));
        assert!(matches!(parse("Missing"), Err(CoreError::UndefinedSymbol(_))));
    }

    #[test]
    fn displays_in_source_syntax() {
        assert_eq!(Type::array(Type::I32, vec![2, 3]).to_string(), "[I32; 2, 3]");
        assert_eq!(Type::pointer(Type::I64, false).to_string(), "*I64");
        assert_eq!(Type::function(vec![Type::I32], Type::Void).to_string(), "(I32) => Void");
    }

    #[test]
    fn literals_adapt_to_known_operands() {
        let combined = common_type(&Inferred::Known(Type::U8), &Inferred::IntLiteral(Some(3)), "+")
            .expect("combine");
        assert_eq!(combined, Inferred::Known(Type::U8));
        assert!(common_type(&Inferred::Known(Type::U8), &Inferred::IntLiteral(Some(300)), "+").is_err());
        assert!(common_type(&Inferred::Known(Type::I32), &Inferred::Known(Type::I64), "+").is_err());
    }

    #[test]
    fn checks_array_literal_shapes() {
        let literal = Inferred::Array {
            element: Box::new(Inferred::IntLiteral(None)),
            len: 3,
        };
        assert!(check_assignable(&literal, &Type::array(Type::I32, vec![3])).is_ok());
        assert!(check_assignable(&literal, &Type::array(Type::I32, vec![2])).is_err());
    }

    #[test]
    fn resolves_literal_defaults() {
        assert_eq!(Inferred::IntLiteral(Some(5)).resolve().expect("resolve"), Type::I32);
        assert_eq!(Inferred::FloatLiteral.resolve().expect("resolve"), Type::F64);
        assert!(Inferred::IntLiteral(Some(1 << 40)).resolve().is_err());
    }
}
