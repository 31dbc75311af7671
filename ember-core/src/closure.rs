//! Lowering of `this`.
//!
//! A function body that ends in a bare `this` returns its scope as a value:
//! a fresh anonymous struct with one field per visible `let` of the
//! enclosing functions followed by the function's own parameters and local
//! bindings, in declaration order. Enclosing values are read through the
//! closure environment, so they become captures of the function. Local
//! functions become function-typed fields, so `make().get()` calls a
//! function defined inside `make`.

use tracing::debug;

use crate::ast::{Expr, Field, ParseResult, StructDef};
use crate::compiler::CompilationContext;
use crate::error::CoreError;
use crate::types::Type;

/// Replaces a trailing `this` in `body`. Must run while the function's own
/// symbols are still in scope.
pub fn lower_this(ctx: &mut CompilationContext, body: &mut ParseResult) -> Result<(), CoreError> {
    if !matches!(body.tail, Some(Expr::This)) {
        return Ok(());
    }
    let name = ctx.next_anon_struct_name();
    let mut fields = Vec::new();
    let mut values = Vec::new();

    // enclosing function names are reachable without a field
    let enclosing: Vec<(String, Type, bool)> = ctx
        .symbols
        .enclosing_symbols()
        .into_iter()
        .filter(|symbol| symbol.alias.is_none() && symbol.initialized)
        .map(|symbol| (symbol.name.clone(), symbol.ty.clone(), symbol.mutable))
        .collect();
    for (field, ty, mutable) in enclosing {
        ctx.symbols.resolve(&field);
        values.push(if mutable {
            Expr::CapturedRef(field.clone())
        } else {
            Expr::Captured(field.clone())
        });
        fields.push(Field { name: field, ty });
    }

    for symbol in ctx.symbols.own_symbols() {
        fields.push(Field {
            name: symbol.name.clone(),
            ty: symbol.ty.clone(),
        });
        values.push(match &symbol.alias {
            Some(target) => Expr::FunctionRef {
                binding: symbol.name.clone(),
                symbol: target.clone(),
            },
            None => Expr::Var(symbol.name.clone()),
        });
    }
    debug!(name = %name, fields = fields.len(), "lowered 'this'");
    ctx.registry.register(StructDef {
        name: name.clone(),
        fields,
    })?;
    body.tail = Some(Expr::StructLit { name, values });
    Ok(())
}
