//! Type inference and validation of expressions.
//!
//! [`TypeEnv::infer`] walks an expression bottom-up and returns its
//! [`Inferred`] type. On the way it fills in the annotations the emitters
//! rely on: call signatures, binary operand types, cast sources, and the
//! concrete names of generic struct literals.

use crate::ast::{BinaryOp, Expr, Function, UnaryOp};
use crate::error::CoreError;
use crate::registry::TypeRegistry;
use crate::symbols::SymbolTable;
use crate::types::{Inferred, Type, check_assignable, common_type};

/// Read access to the names in scope plus the type registry, which may
/// still grow when a generic struct is instantiated.
pub struct TypeEnv<'e> {
    symbols: &'e SymbolTable,
    registry: &'e mut TypeRegistry,
    functions: &'e [Function],
}

impl<'e> TypeEnv<'e> {
    pub fn new(
        symbols: &'e SymbolTable,
        registry: &'e mut TypeRegistry,
        functions: &'e [Function],
    ) -> Self {
        TypeEnv {
            symbols,
            registry,
            functions,
        }
    }

    pub fn infer(&mut self, expr: &mut Expr) -> Result<Inferred, CoreError> {
        match expr {
            Expr::Int { value, suffix } => match suffix {
                Some(ty) => {
                    check_assignable(&Inferred::IntLiteral(Some(*value)), ty)?;
                    Ok(Inferred::Known(ty.clone()))
                }
                None => Ok(Inferred::IntLiteral(Some(*value))),
            },
            Expr::Float { suffix, .. } => Ok(suffix
                .clone()
                .map_or(Inferred::FloatLiteral, Inferred::Known)),
            Expr::Bool(_) => Ok(Inferred::Known(Type::Bool)),
            Expr::Char(_) => Ok(Inferred::Known(Type::U8)),
            Expr::Str(_) => Ok(Inferred::Known(Type::pointer(Type::U8, false))),
            Expr::Input { .. } | Expr::ReadInt => Ok(Inferred::Known(Type::I32)),
            Expr::Var(name)
            | Expr::Captured(name)
            | Expr::CapturedRef(name)
            | Expr::FunctionRef { binding: name, .. } => self
                .symbols
                .lookup(name)
                .map(|symbol| Inferred::Known(symbol.ty.clone()))
                .ok_or_else(|| CoreError::undefined(name.as_str())),
            Expr::Closure { symbol, .. } => self
                .functions
                .iter()
                .find(|function| function.symbol == *symbol)
                .map(|function| Inferred::Known(function.signature()))
                .ok_or_else(|| CoreError::undefined(symbol.as_str())),
            Expr::Call {
                callee,
                args,
                signature,
            } => self.call(callee, args, signature),
            Expr::Field { base, field } => self.field(base, field),
            Expr::Index { base, index } => self.index(base, index),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                self.condition(cond)?;
                let then = self.infer(then)?;
                let otherwise = self.infer(otherwise)?;
                let unified = unify(&then, &otherwise, "if")?;
                if matches!(unified, Inferred::Array { .. } | Inferred::Known(Type::Array { .. })) {
                    return Err(CoreError::mismatch("conditional expressions cannot produce arrays"));
                }
                Ok(unified)
            }
            Expr::Binary {
                op,
                lhs,
                rhs,
                operand,
            } => {
                let lhs = self.infer(lhs)?;
                let rhs = self.infer(rhs)?;
                let (result, operand_type) = binary(*op, &lhs, &rhs)?;
                *operand = Some(operand_type);
                Ok(result)
            }
            Expr::Unary { op, operand } => self.unary(*op, operand),
            Expr::Cast { expr, ty, from } => {
                let source = match self.infer(expr)? {
                    literal @ (Inferred::IntLiteral(_) | Inferred::FloatLiteral)
                        if ty.is_numeric() && check_assignable(&literal, ty).is_ok() =>
                    {
                        ty.clone()
                    }
                    inferred => inferred.resolve()?,
                };
                if !castable(&source, ty) {
                    return Err(CoreError::mismatch(format!("cannot cast {source} to {ty}")));
                }
                *from = Some(source);
                Ok(Inferred::Known(ty.clone()))
            }
            Expr::Paren(inner) => self.infer(inner),
            Expr::StructLit { name, values } => self.struct_literal(name, values),
            Expr::ArrayLit(items) => {
                let mut element: Option<Inferred> = None;
                for item in items.iter_mut() {
                    let inferred = self.infer(item)?;
                    element = Some(match element {
                        None => inferred,
                        Some(previous) => unify(&previous, &inferred, "array literal")?,
                    });
                }
                let element = element.ok_or_else(|| CoreError::structural("array literal has no elements"))?;
                if matches!(element, Inferred::Known(Type::Void)) {
                    return Err(CoreError::mismatch("array elements cannot be Void"));
                }
                Ok(Inferred::Array {
                    element: Box::new(element),
                    len: items.len(),
                })
            }
            Expr::EnumVariant { name, .. } => Ok(Inferred::Known(Type::Enum(name.clone()))),
            Expr::This => Err(CoreError::structural(
                "'this' is only allowed as the final expression of a function body",
            )),
        }
    }

    /// Infers a condition, which must be `Bool`.
    pub fn condition(&mut self, expr: &mut Expr) -> Result<(), CoreError> {
        let inferred = self.infer(expr)?;
        if !inferred.is_bool() {
            return Err(CoreError::mismatch(format!("condition must be Bool, found {inferred}")));
        }
        Ok(())
    }

    /// Whether a place expression may be written to.
    pub fn is_mutable_place(&mut self, expr: &Expr) -> Result<bool, CoreError> {
        match expr {
            Expr::Var(name) | Expr::CapturedRef(name) => {
                Ok(self.symbols.lookup(name).is_some_and(|symbol| symbol.mutable))
            }
            Expr::Field { base, .. } | Expr::Index { base, .. } => self.is_mutable_place(base),
            Expr::Paren(inner) => self.is_mutable_place(inner),
            Expr::Unary {
                op: UnaryOp::Deref,
                operand,
            } => match self.infer(&mut operand.as_ref().clone())? {
                Inferred::Known(Type::Pointer { mutable, .. }) => Ok(mutable),
                _ => Ok(false),
            },
            _ => Ok(false),
        }
    }

    fn call(
        &mut self,
        callee: &mut Expr,
        args: &mut [Expr],
        signature: &mut Option<Type>,
    ) -> Result<Inferred, CoreError> {
        let callee_type = self.infer(callee)?;
        let Inferred::Known(Type::Function { params, result }) = &callee_type else {
            return Err(CoreError::mismatch(format!(
                "{} is not a function, found {callee_type}",
                describe(callee)
            )));
        };
        if params.len() != args.len() {
            return Err(CoreError::mismatch(format!(
                "{} expects {} arguments but received {}",
                describe(callee),
                params.len(),
                args.len()
            )));
        }
        for (position, (arg, param)) in args.iter_mut().zip(params).enumerate() {
            if matches!(arg, Expr::ArrayLit(_)) {
                return Err(CoreError::mismatch(
                    "array literals cannot be passed directly; bind them with let first",
                ));
            }
            let inferred = self.infer(arg)?;
            check_assignable(&inferred, param).map_err(|err| {
                CoreError::mismatch(format!("argument {} of {}: {err}", position + 1, describe(callee)))
            })?;
        }
        let result = Inferred::Known((**result).clone());
        *signature = callee_type.known().cloned();
        Ok(result)
    }

    fn field(&mut self, base: &mut Expr, field: &str) -> Result<Inferred, CoreError> {
        match self.infer(base)? {
            Inferred::Known(Type::Struct(name)) => {
                let def = self
                    .registry
                    .struct_def(&name)
                    .ok_or_else(|| CoreError::undefined(name.as_str()))?;
                def.field(field)
                    .map(|found| Inferred::Known(found.ty.clone()))
                    .ok_or_else(|| CoreError::undefined(format!("{name}.{field}")))
            }
            other => Err(CoreError::mismatch(format!("{other} has no field '{field}'"))),
        }
    }

    fn index(&mut self, base: &mut Expr, index: &mut Expr) -> Result<Inferred, CoreError> {
        let base_type = self.infer(base)?;
        let Some(Type::Array { dims, .. }) = base_type.known() else {
            return Err(CoreError::mismatch(format!("cannot index into {base_type}")));
        };
        let length = dims[0];
        let element = base_type
            .known()
            .and_then(Type::indexed)
            .ok_or_else(|| CoreError::mismatch(format!("cannot index into {base_type}")))?;
        match self.infer(index)? {
            Inferred::IntLiteral(Some(value)) if value < 0 || value >= length as i128 => {
                Err(CoreError::mismatch(format!(
                    "index {value} is out of bounds for {base_type}"
                )))
            }
            Inferred::IntLiteral(_) => Ok(Inferred::Known(element)),
            Inferred::Known(ty) if ty.is_integer() => Ok(Inferred::Known(element)),
            other => Err(CoreError::mismatch(format!("array index must be an integer, found {other}"))),
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: &mut Expr) -> Result<Inferred, CoreError> {
        let inferred = self.infer(operand)?;
        match op {
            UnaryOp::Not if inferred.is_bool() => Ok(inferred),
            UnaryOp::Not => Err(CoreError::mismatch(format!("operator '!' requires Bool, found {inferred}"))),
            UnaryOp::Neg => match inferred {
                Inferred::IntLiteral(value) => Ok(Inferred::IntLiteral(value.map(|value| -value))),
                numeric if numeric.is_numeric() => Ok(numeric),
                other => Err(CoreError::mismatch(format!("operator '-' requires a number, found {other}"))),
            },
            UnaryOp::Deref => match inferred {
                Inferred::Known(Type::Pointer { pointee, .. }) => Ok(Inferred::Known(*pointee)),
                other => Err(CoreError::mismatch(format!("cannot dereference {other}"))),
            },
            UnaryOp::AddrOf { mutable } => {
                if !operand.is_place() {
                    return Err(CoreError::mismatch("cannot take the address of a temporary value"));
                }
                if let Some(symbol) = operand.root_binding().and_then(|name| self.symbols.lookup(name)) {
                    if symbol.alias.is_some() {
                        return Err(CoreError::mismatch(format!(
                            "cannot take the address of function '{}'",
                            symbol.name
                        )));
                    }
                }
                if mutable && !self.is_mutable_place(operand)? {
                    return Err(CoreError::mutability(
                        "'&mut' requires a mutable place".to_string(),
                    ));
                }
                Ok(Inferred::Known(Type::pointer(inferred.resolve()?, mutable)))
            }
        }
    }

    fn struct_literal(&mut self, name: &mut String, values: &mut [Expr]) -> Result<Inferred, CoreError> {
        let inferred = values
            .iter_mut()
            .map(|value| self.infer(value))
            .collect::<Result<Vec<_>, _>>()?;
        if self.registry.is_generic(name) {
            *name = self.registry.instantiate_from_values(name, &inferred)?;
        }
        let def = self
            .registry
            .struct_def(name)
            .ok_or_else(|| CoreError::undefined(name.as_str()))?;
        if def.fields.len() != values.len() {
            return Err(CoreError::mismatch(format!(
                "struct '{name}' has {} fields but {} values were given",
                def.fields.len(),
                values.len()
            )));
        }
        for (field, value) in def.fields.iter().zip(&inferred) {
            check_assignable(value, &field.ty).map_err(|err| {
                CoreError::mismatch(format!("field '{}' of '{name}': {err}", field.name))
            })?;
        }
        Ok(Inferred::Known(Type::Struct(name.clone())))
    }
}

/// Result type and operand type of a binary operation.
fn binary(op: BinaryOp, lhs: &Inferred, rhs: &Inferred) -> Result<(Inferred, Type), CoreError> {
    let symbol = op.symbol();
    if op.is_logical() {
        if !lhs.is_bool() || !rhs.is_bool() {
            return Err(CoreError::mismatch(format!(
                "operator '{symbol}' requires Bool operands, found {lhs} and {rhs}"
            )));
        }
        return Ok((Inferred::Known(Type::Bool), Type::Bool));
    }
    if op.is_equality() {
        let common = common_type(lhs, rhs, symbol)?;
        let operand = common.resolve()?;
        if !operand.is_scalar() {
            return Err(CoreError::mismatch(format!("cannot compare {operand} values with '{symbol}'")));
        }
        return Ok((Inferred::Known(Type::Bool), operand));
    }
    if !lhs.is_numeric() || !rhs.is_numeric() {
        return Err(CoreError::mismatch(format!(
            "operator '{symbol}' requires numeric operands, found {lhs} and {rhs}"
        )));
    }
    let common = common_type(lhs, rhs, symbol)?;
    let operand = common.resolve()?;
    if op == BinaryOp::Rem && operand.is_float() {
        return Err(CoreError::mismatch("operator '%' requires integer operands"));
    }
    if op.is_ordering() {
        return Ok((Inferred::Known(Type::Bool), operand));
    }
    Ok((common, operand))
}

/// Like [`common_type`], but also reconciles array literals element-wise.
fn unify(left: &Inferred, right: &Inferred, op: &str) -> Result<Inferred, CoreError> {
    match (left, right) {
        (
            Inferred::Array { element: a, len: n },
            Inferred::Array { element: b, len: m },
        ) if n == m => Ok(Inferred::Array {
            element: Box::new(unify(a, b, op)?),
            len: *n,
        }),
        (Inferred::Known(ty @ Type::Array { .. }), literal @ Inferred::Array { .. })
        | (literal @ Inferred::Array { .. }, Inferred::Known(ty @ Type::Array { .. })) => {
            check_assignable(literal, ty)?;
            Ok(Inferred::Known(ty.clone()))
        }
        _ => common_type(left, right, op),
    }
}

fn castable(from: &Type, to: &Type) -> bool {
    from == to
        || (from.is_numeric() && to.is_numeric())
        || (matches!(from, Type::Bool | Type::Enum(_)) && to.is_integer())
}

fn describe(callee: &Expr) -> String {
    match callee {
        Expr::Var(name)
        | Expr::Captured(name)
        | Expr::CapturedRef(name)
        | Expr::FunctionRef { binding: name, .. } => format!("'{name}'"),
        Expr::Field { field, .. } => format!("field '{field}'"),
        Expr::Paren(inner) => describe(inner),
        _ => "expression".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{FunctionFrame, Symbol};

    fn env_with(symbols: &[(&str, Type, bool)]) -> (SymbolTable, TypeRegistry) {
        let mut table = SymbolTable::new();
        table.push_function(FunctionFrame::default());
        for (name, ty, mutable) in symbols {
            table
                .insert(Symbol::binding(*name, ty.clone(), *mutable, true), "binding")
                .expect("insert");
        }
        (table, TypeRegistry::new())
    }

    fn int(value: i128) -> Box<Expr> {
        Box::new(Expr::Int { value, suffix: None })
    }

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Var(name.to_string()))
    }

    #[test]
    fn literals_take_the_type_of_the_other_operand() {
        let (symbols, mut registry) = env_with(&[("small", Type::U8, false)]);
        let mut env = TypeEnv::new(&symbols, &mut registry, &[]);
        let mut expr = Expr::Binary {
            op: BinaryOp::Add,
            lhs: var("small"),
            rhs: int(1),
            operand: None,
        };
        assert_eq!(env.infer(&mut expr).expect("infer"), Inferred::Known(Type::U8));
        assert!(matches!(expr, Expr::Binary { operand: Some(Type::U8), .. }));
    }

    #[test]
    fn rejects_mixed_integer_widths() {
        let (symbols, mut registry) = env_with(&[("a", Type::I32, false), ("b", Type::I64, false)]);
        let mut env = TypeEnv::new(&symbols, &mut registry, &[]);
        let mut expr = Expr::Binary {
            op: BinaryOp::Add,
            lhs: var("a"),
            rhs: var("b"),
            operand: None,
        };
        assert!(matches!(env.infer(&mut expr), Err(CoreError::TypeMismatch(_))));
    }

    #[test]
    fn logical_operators_require_bool() {
        let (symbols, mut registry) = env_with(&[("n", Type::I32, false)]);
        let mut env = TypeEnv::new(&symbols, &mut registry, &[]);
        let mut expr = Expr::Binary {
            op: BinaryOp::And,
            lhs: var("n"),
            rhs: Box::new(Expr::Bool(true)),
            operand: None,
        };
        assert!(matches!(env.infer(&mut expr), Err(CoreError::TypeMismatch(_))));
    }

    #[test]
    fn checks_call_arity_and_records_signature() {
        let signature = Type::function(vec![Type::I32], Type::Bool);
        let (symbols, mut registry) = env_with(&[("check", signature.clone(), false)]);
        let mut env = TypeEnv::new(&symbols, &mut registry, &[]);
        let mut call = Expr::Call {
            callee: var("check"),
            args: vec![Expr::Int { value: 1, suffix: None }],
            signature: None,
        };
        assert_eq!(env.infer(&mut call).expect("infer"), Inferred::Known(Type::Bool));
        assert!(matches!(&call, Expr::Call { signature: Some(ty), .. } if *ty == signature));

        let mut wrong = Expr::Call {
            callee: var("check"),
            args: vec![],
            signature: None,
        };
        assert!(matches!(env.infer(&mut wrong), Err(CoreError::TypeMismatch(_))));
    }

    #[test]
    fn mutable_references_need_mutable_places() {
        let (symbols, mut registry) = env_with(&[("fixed", Type::I32, false), ("open", Type::I32, true)]);
        let mut env = TypeEnv::new(&symbols, &mut registry, &[]);
        let mut fixed = Expr::Unary {
            op: UnaryOp::AddrOf { mutable: true },
            operand: var("fixed"),
        };
        assert!(matches!(env.infer(&mut fixed), Err(CoreError::Mutability(_))));
        let mut open = Expr::Unary {
            op: UnaryOp::AddrOf { mutable: true },
            operand: var("open"),
        };
        assert_eq!(
            env.infer(&mut open).expect("infer"),
            Inferred::Known(Type::pointer(Type::I32, true))
        );
    }

    #[test]
    fn captured_references_are_writable_places() {
        let (symbols, mut registry) = env_with(&[("fixed", Type::I32, false), ("open", Type::U8, true)]);
        let mut env = TypeEnv::new(&symbols, &mut registry, &[]);
        let mut open = Expr::CapturedRef("open".into());
        assert_eq!(env.infer(&mut open).expect("infer"), Inferred::Known(Type::U8));
        assert!(env.is_mutable_place(&open).expect("place"));
        assert!(!env.is_mutable_place(&Expr::Captured("fixed".into())).expect("place"));
    }

    #[test]
    fn rejects_constant_out_of_bounds_index() {
        let (symbols, mut registry) = env_with(&[("values", Type::array(Type::I32, vec![3]), false)]);
        let mut env = TypeEnv::new(&symbols, &mut registry, &[]);
        let mut inside = Expr::Index {
            base: var("values"),
            index: int(2),
        };
        assert_eq!(env.infer(&mut inside).expect("infer"), Inferred::Known(Type::I32));
        let mut outside = Expr::Index {
            base: var("values"),
            index: int(3),
        };
        assert!(matches!(env.infer(&mut outside), Err(CoreError::TypeMismatch(_))));
    }

    #[test]
    fn unifies_nested_array_literals() {
        let (symbols, mut registry) = env_with(&[]);
        let mut env = TypeEnv::new(&symbols, &mut registry, &[]);
        let row = || Expr::ArrayLit(vec![Expr::Int { value: 1, suffix: None }, Expr::Int { value: 2, suffix: None }]);
        let mut grid = Expr::ArrayLit(vec![row(), row()]);
        let inferred = env.infer(&mut grid).expect("infer");
        assert_eq!(inferred.resolve().expect("resolve"), Type::array(Type::I32, vec![2, 2]));
    }

    #[test]
    fn validates_casts() {
        let (symbols, mut registry) = env_with(&[("flag", Type::Bool, false)]);
        let mut env = TypeEnv::new(&symbols, &mut registry, &[]);
        let mut widen = Expr::Cast {
            expr: var("flag"),
            ty: Type::I32,
            from: None,
        };
        env.infer(&mut widen).expect("infer");
        assert!(matches!(widen, Expr::Cast { from: Some(Type::Bool), .. }));
        let mut invalid = Expr::Cast {
            expr: int(1),
            ty: Type::Bool,
            from: None,
        };
        assert!(matches!(env.infer(&mut invalid), Err(CoreError::TypeMismatch(_))));
    }
}
