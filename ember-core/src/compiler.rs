//! Compiler orchestration.
//!
//! [`compile_program`] turns source text into a target-neutral [`Program`]:
//! comments and the intrinsic prelude are stripped, the top level is split
//! into statements and each statement is dispatched on its leading keyword.
//! Function literals are compiled as soon as they are met and lifted into
//! [`Program::functions`]. [`Compiler`] then hands the program to the
//! emitter of the requested target.

use tracing::{debug, info};

use crate::ast::{AssignOp, BinaryOp, Binding, Capture, Expr, Function, Item, Param, ParseResult, Program, Stmt};
use crate::builtins::{IntrinsicDescriptor, strip_prelude};
use crate::closure::lower_this;
use crate::codegen::{Target, emit};
use crate::control::{braced_body, find_assignment, is_statement_form, parse_if, parse_while};
use crate::error::CoreError;
use crate::parser::{ExpressionParser, LambdaHeader, lambda_header};
use crate::registry::TypeRegistry;
use crate::splitter::{find_matching, is_identifier, split_statements, starts_with_word, strip_comments};
use crate::symbols::{FunctionFrame, Symbol, SymbolTable};
use crate::typecheck::TypeEnv;
use crate::types::{Inferred, Type, check_assignable, common_type, parse_type};

/// All mutable state of one compilation.
#[derive(Debug)]
pub struct CompilationContext {
    pub(crate) registry: TypeRegistry,
    pub(crate) symbols: SymbolTable,
    pub(crate) functions: Vec<Function>,
    intrinsics_enabled: bool,
    next_input_slot: usize,
    next_anon_struct: usize,
    next_lambda: usize,
    reserved_symbols: Vec<String>,
    /// Intrinsic name and the lifted function standing for it as a value.
    intrinsic_functions: Vec<(&'static str, String)>,
}

impl CompilationContext {
    pub fn new(intrinsics_enabled: bool) -> Self {
        CompilationContext {
            registry: TypeRegistry::new(),
            symbols: SymbolTable::new(),
            functions: Vec::new(),
            intrinsics_enabled,
            next_input_slot: 0,
            next_anon_struct: 0,
            next_lambda: 0,
            reserved_symbols: Vec::new(),
            intrinsic_functions: Vec::new(),
        }
    }

    pub fn intrinsics_enabled(&self) -> bool {
        self.intrinsics_enabled
    }

    pub fn next_input_slot(&mut self) -> usize {
        let slot = self.next_input_slot;
        self.next_input_slot += 1;
        slot
    }

    pub fn next_anon_struct_name(&mut self) -> String {
        let name = format!("AnonStruct{}", self.next_anon_struct);
        self.next_anon_struct += 1;
        name
    }

    /// A program-wide unique symbol for a function literal. Named literals
    /// inside another function are prefixed with the enclosing symbol.
    pub fn function_symbol(&mut self, name: Option<&str>) -> String {
        let base = match (name, self.symbols.current_function().symbol.as_deref()) {
            (Some(name), Some(outer)) => format!("{outer}_{name}"),
            (Some(name), None) => name.to_string(),
            (None, _) => {
                let index = self.next_lambda;
                self.next_lambda += 1;
                format!("lambda_{index}")
            }
        };
        self.reserve_symbol(&base)
    }

    fn reserve_symbol(&mut self, base: &str) -> String {
        let mut symbol = base.to_string();
        let mut suffix = 1;
        while self.reserved_symbols.contains(&symbol) {
            symbol = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.reserved_symbols.push(symbol.clone());
        symbol
    }

    /// The lifted function that stands for an intrinsic used as a value,
    /// created on first use. Each call reads input at run time.
    pub fn intrinsic_function(&mut self, intrinsic: &IntrinsicDescriptor) -> String {
        if let Some((_, symbol)) = self
            .intrinsic_functions
            .iter()
            .find(|(name, _)| *name == intrinsic.name)
        {
            return symbol.clone();
        }
        let symbol = self.reserve_symbol(intrinsic.name);
        debug!(name = intrinsic.name, symbol = %symbol, "lifted intrinsic wrapper");
        self.functions.push(Function {
            name: intrinsic.name.to_string(),
            symbol: symbol.clone(),
            params: Vec::new(),
            result: intrinsic.result(),
            body: ParseResult {
                tail: Some(Expr::ReadInt),
                ..ParseResult::default()
            },
            captures: Vec::new(),
        });
        self.intrinsic_functions.push((intrinsic.name, symbol.clone()));
        symbol
    }

    pub fn type_env(&mut self) -> TypeEnv<'_> {
        TypeEnv::new(&self.symbols, &mut self.registry, &self.functions)
    }

    fn parse_type(&mut self, text: &str) -> Result<Type, CoreError> {
        parse_type(text, &mut self.registry)
    }

    fn parse(&mut self, text: &str) -> Result<Expr, CoreError> {
        ExpressionParser::new(self).parse(text)
    }
}

/// Signature of a function literal about to be compiled.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionHeader {
    pub name: String,
    pub symbol: String,
    pub params: Vec<Param>,
    pub result: Option<Type>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeRole {
    Main,
    Function,
    Block,
    /// A block whose tail is the value of a `let` or `return`.
    Value,
}

/// Compiles source text for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compiler {
    target: Target,
}

impl Compiler {
    pub fn new(target: Target) -> Self {
        Compiler { target }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn compile(&self, source: &str) -> Result<String, CoreError> {
        let program = compile_program(source)?;
        emit(self.target, &program)
    }
}

pub fn compile(source: &str, target: Target) -> Result<String, CoreError> {
    Compiler::new(target).compile(source)
}

/// Parses and checks a whole program.
pub fn compile_program(source: &str) -> Result<Program, CoreError> {
    let source = strip_comments(source)?;
    let (intrinsics_enabled, body) = strip_prelude(&source);
    let mut ctx = CompilationContext::new(intrinsics_enabled);
    ctx.symbols.push_function(FunctionFrame::default());

    let mut main = compile_scope(&mut ctx, body, ScopeRole::Main)?;
    let result = match main.tail.as_mut() {
        Some(tail) => Some(program_result(&mut ctx, tail)?),
        None => None,
    };
    ctx.symbols.pop_function()?;

    let (structs, enums) = ctx.registry.into_parts();
    info!(
        functions = ctx.functions.len(),
        structs = structs.len(),
        inputs = main.input_slots,
        "compiled program"
    );
    Ok(Program {
        structs,
        enums,
        functions: ctx.functions,
        main,
        result,
    })
}

fn program_result(ctx: &mut CompilationContext, tail: &mut Expr) -> Result<Type, CoreError> {
    let ty = ctx.type_env().infer(tail)?.resolve()?;
    if ty.is_numeric() || matches!(ty, Type::Bool | Type::Enum(_)) {
        Ok(ty)
    } else {
        Err(CoreError::mismatch(format!(
            "program result must be a number, Bool or enum value, found {ty}"
        )))
    }
}

fn compile_scope(
    ctx: &mut CompilationContext,
    text: &str,
    role: ScopeRole,
) -> Result<ParseResult, CoreError> {
    let mut result = ParseResult::default();
    compile_segments(ctx, text, role, &mut result)?;
    result.input_slots = ctx.next_input_slot;
    Ok(result)
}

fn compile_segments(
    ctx: &mut CompilationContext,
    text: &str,
    role: ScopeRole,
    result: &mut ParseResult,
) -> Result<(), CoreError> {
    let segments = split_statements(text)?;
    let last = segments.len().saturating_sub(1);
    for (position, segment) in segments.iter().enumerate() {
        let open_end = position == last && !segment.terminated && role != ScopeRole::Block;
        if open_end {
            // a trailing block gives the scope its value; nothing follows
            // it, so its statements join the enclosing scope
            if let Some(inner) = block_contents(segment.text)? {
                compile_segments(ctx, inner, role, result)?;
                continue;
            }
        }
        if open_end && !is_statement_form(segment.text)? {
            result.tail = Some(tail_expression(ctx, segment.text, role)?);
        } else {
            compile_statement(ctx, segment.text, &mut result.items)?;
        }
    }
    Ok(())
}

fn tail_expression(ctx: &mut CompilationContext, text: &str, role: ScopeRole) -> Result<Expr, CoreError> {
    if text == "this" && role == ScopeRole::Function {
        return Ok(Expr::This);
    }
    ctx.parse(text)
}

fn compile_block(ctx: &mut CompilationContext, text: &str, is_loop: bool) -> Result<ParseResult, CoreError> {
    ctx.symbols.push_block(is_loop);
    let body = compile_scope(ctx, text, ScopeRole::Block)?;
    ctx.symbols.pop_block()?;
    Ok(body)
}

/// Inside of `{ .. }` when `text` is a block that holds statements before
/// its value.
fn statement_block(text: &str) -> Result<Option<&str>, CoreError> {
    let Some(inner) = block_contents(text)? else {
        return Ok(None);
    };
    let segments = split_statements(inner)?;
    let single_value = match segments.as_slice() {
        [only] => !only.terminated && !is_statement_form(only.text)?,
        _ => false,
    };
    Ok((!single_value).then_some(inner))
}

/// Compiles `{ statements; value }` in its own scope. The value is checked
/// while the block's names are still visible.
fn block_value(ctx: &mut CompilationContext, inner: &str) -> Result<(Vec<Item>, Expr, Inferred), CoreError> {
    ctx.symbols.push_block(false);
    let mut body = compile_scope(ctx, inner, ScopeRole::Value)?;
    let Some(mut value) = body.tail.take() else {
        return Err(CoreError::mismatch("block used as a value must end in an expression"));
    };
    let inferred = ctx.type_env().infer(&mut value)?;
    ctx.symbols.pop_block()?;
    Ok((body.items, value, inferred))
}

/// Wraps the statements of a value block together with the statement that
/// consumes its value.
fn value_block_stmt(mut items: Vec<Item>, consumer: Stmt, input_slots: usize) -> Stmt {
    items.push(Item::Stmt(consumer));
    Stmt::Block(ParseResult {
        items,
        tail: None,
        input_slots,
    })
}

fn compile_statement(
    ctx: &mut CompilationContext,
    text: &str,
    items: &mut Vec<Item>,
) -> Result<(), CoreError> {
    if starts_with_word(text, "let") {
        return let_binding(ctx, &text[3..], items);
    }
    if starts_with_word(text, "fn") {
        return function_declaration(ctx, text, items);
    }
    if starts_with_word(text, "struct") {
        ctx.registry.declare_struct(text)?;
        return Ok(());
    }
    if starts_with_word(text, "enum") {
        ctx.registry.declare_enum(text)?;
        return Ok(());
    }

    let stmt = if starts_with_word(text, "if") {
        if_statement(ctx, text)?
    } else if starts_with_word(text, "while") {
        let (cond, body) = parse_while(text)?;
        let cond = condition(ctx, cond)?;
        Stmt::While {
            cond,
            body: compile_block(ctx, body, true)?,
        }
    } else if text.starts_with('{') {
        Stmt::Block(compile_block(ctx, braced_body(text, "block")?, false)?)
    } else if starts_with_word(text, "return") {
        return_statement(ctx, text["return".len()..].trim())?
    } else if starts_with_word(text, "break") || starts_with_word(text, "continue") {
        loop_jump(ctx, text)?
    } else if let Some(stmt) = assignment(ctx, text)? {
        stmt
    } else {
        let mut expr = ctx.parse(text)?;
        ctx.type_env().infer(&mut expr)?;
        Stmt::Expr(expr)
    };
    items.push(Item::Stmt(stmt));
    Ok(())
}

/// `let [mut] name [: T] [= init]`, with `rest` starting after `let`.
fn let_binding(ctx: &mut CompilationContext, rest: &str, items: &mut Vec<Item>) -> Result<(), CoreError> {
    let rest = rest.trim();
    let (mutable, rest) = if starts_with_word(rest, "mut") {
        (true, rest[3..].trim_start())
    } else {
        (false, rest)
    };
    let (head, init_text) = match find_assignment(rest)? {
        Some((at, AssignOp::Set)) => (rest[..at].trim(), Some(rest[at + 1..].trim())),
        Some(_) => {
            return Err(CoreError::structural(format!("invalid binding 'let {rest}'")));
        }
        None => (rest, None),
    };
    let (name, declared_text) = match head.split_once(':') {
        Some((name, ty)) => (name.trim(), Some(ty)),
        None => (head, None),
    };
    if !is_identifier(name) {
        return Err(CoreError::structural(format!("invalid binding name '{name}'")));
    }
    if init_text == Some("") {
        return Err(CoreError::structural(format!("binding '{name}' has an empty initializer")));
    }
    let declared = declared_text.map(|text| ctx.parse_type(text)).transpose()?;
    if declared.as_ref().is_some_and(Type::is_void) {
        return Err(CoreError::mismatch(format!("binding '{name}' cannot have type Void")));
    }

    let Some(init_text) = init_text else {
        let ty = declared.ok_or_else(|| {
            CoreError::structural(format!("binding '{name}' needs a type or an initializer"))
        })?;
        ctx.symbols
            .insert(Symbol::binding(name, ty.clone(), mutable, false), "binding")?;
        debug!(name, ty = %ty, "declared deferred binding");
        items.push(Item::Binding(Binding {
            name: name.to_string(),
            declared: Some(ty.clone()),
            ty,
            init: None,
            mutable,
            alias: None,
        }));
        return Ok(());
    };
    if let Some(inner) = statement_block(init_text)? {
        return block_binding(ctx, name, declared, mutable, inner, items);
    }

    // function literals are named after their binding, and a declared
    // result type makes the name callable from inside the body
    let header = lambda_header(init_text, &mut ctx.registry)?;
    let symbol = header.as_ref().map(|_| ctx.function_symbol(Some(name)));
    let seeded = match (&header, &symbol) {
        (
            Some(LambdaHeader {
                params,
                result: Some(result),
                ..
            }),
            Some(symbol),
        ) if !mutable => {
            let signature = Type::function(
                params.iter().map(|param| param.ty.clone()).collect(),
                result.clone(),
            );
            if let Some(declared) = declared.as_ref().filter(|declared| **declared != signature) {
                return Err(CoreError::mismatch(format!(
                    "binding '{name}': expected {declared}, found {signature}"
                )));
            }
            ctx.symbols
                .insert(Symbol::alias(name, signature, symbol.as_str()), "binding")?;
            true
        }
        _ => false,
    };

    let mut parser = ExpressionParser::new(ctx);
    if let Some(symbol) = &symbol {
        parser = parser.with_function_name(name, symbol);
    }
    let mut init = parser.parse(init_text)?;
    let inferred = ctx.type_env().infer(&mut init)?;
    let ty = match &declared {
        Some(declared) => {
            check_assignable(&inferred, declared)
                .map_err(|err| CoreError::mismatch(format!("binding '{name}': {err}")))?;
            declared.clone()
        }
        None => inferred.resolve()?,
    };
    if ty.is_void() {
        return Err(CoreError::mismatch(format!("binding '{name}' cannot hold a Void value")));
    }

    let alias = match &init {
        _ if mutable => None,
        Expr::FunctionRef { symbol, .. } => Some(symbol.clone()),
        Expr::Closure { symbol, captures } if captures.is_empty() => Some(symbol.clone()),
        _ => None,
    };
    if seeded {
        if let Some(entry) = ctx.symbols.lookup_mut(name) {
            entry.alias = alias.clone();
        }
    } else {
        ctx.symbols.insert(
            Symbol {
                name: name.to_string(),
                ty: ty.clone(),
                mutable,
                initialized: true,
                alias: alias.clone(),
            },
            "binding",
        )?;
    }
    debug!(name, ty = %ty, mutable, alias = ?alias, "recorded binding");
    items.push(Item::Binding(Binding {
        name: name.to_string(),
        declared,
        ty,
        init: Some(init),
        mutable,
        alias,
    }));
    Ok(())
}

/// `let name = { statements; value }`. The binding is declared before the
/// block and assigned its value at the end of it.
fn block_binding(
    ctx: &mut CompilationContext,
    name: &str,
    declared: Option<Type>,
    mutable: bool,
    inner: &str,
    items: &mut Vec<Item>,
) -> Result<(), CoreError> {
    let (block_items, value, inferred) = block_value(ctx, inner)?;
    let ty = match &declared {
        Some(declared) => {
            check_assignable(&inferred, declared)
                .map_err(|err| CoreError::mismatch(format!("binding '{name}': {err}")))?;
            declared.clone()
        }
        None => inferred.resolve()?,
    };
    if ty.is_void() {
        return Err(CoreError::mismatch(format!("binding '{name}' cannot hold a Void value")));
    }
    if block_items
        .iter()
        .any(|item| matches!(item, Item::Binding(binding) if binding.name == name))
    {
        return Err(CoreError::duplicate("binding", name));
    }
    ctx.symbols
        .insert(Symbol::binding(name, ty.clone(), mutable, true), "binding")?;
    debug!(name, ty = %ty, mutable, "recorded binding of a block value");
    items.push(Item::Binding(Binding {
        name: name.to_string(),
        declared,
        ty: ty.clone(),
        init: None,
        mutable,
        alias: None,
    }));
    let assign = Stmt::Assign {
        target: Expr::Var(name.to_string()),
        op: AssignOp::Set,
        value,
        ty,
    };
    items.push(Item::Stmt(value_block_stmt(block_items, assign, ctx.next_input_slot)));
    Ok(())
}

/// `fn name(params) [: R] => body` is `let name = (params) [: R] => body`.
fn function_declaration(
    ctx: &mut CompilationContext,
    text: &str,
    items: &mut Vec<Item>,
) -> Result<(), CoreError> {
    let rest = text["fn".len()..].trim_start();
    let name_end = rest
        .bytes()
        .position(|byte| !(byte.is_ascii_alphanumeric() || byte == b'_'))
        .unwrap_or(rest.len());
    let name = &rest[..name_end];
    if !is_identifier(name) {
        return Err(CoreError::structural(format!("invalid function name '{name}'")));
    }
    let signature = rest[name_end..].trim_start();
    if signature.starts_with('<') {
        return Err(CoreError::structural(format!(
            "generic function '{name}' is not supported"
        )));
    }
    if !signature.starts_with('(') {
        return Err(CoreError::structural(format!("function '{name}' needs a parameter list")));
    }
    let close = find_matching(signature, 0)?;
    if !signature[close + 1..].contains("=>") {
        return Err(CoreError::structural(format!("function '{name}' is missing '=>'")));
    }
    let_binding(ctx, &format!("{name} = {signature}"), items)
}

fn if_statement(ctx: &mut CompilationContext, text: &str) -> Result<Stmt, CoreError> {
    let chain = parse_if(text)?;
    let cond = condition(ctx, chain.cond)?;
    let then = compile_block(ctx, braced_body(chain.then, "if")?, false)?;
    let otherwise = match chain.otherwise {
        None => None,
        Some(rest) if starts_with_word(rest, "if") => {
            let nested = if_statement(ctx, rest)?;
            Some(ParseResult {
                items: vec![Item::Stmt(nested)],
                tail: None,
                input_slots: ctx.next_input_slot,
            })
        }
        Some(rest) => Some(compile_block(ctx, braced_body(rest, "else")?, false)?),
    };
    Ok(Stmt::If {
        cond,
        then,
        otherwise,
    })
}

fn condition(ctx: &mut CompilationContext, text: &str) -> Result<Expr, CoreError> {
    let mut expr = ctx.parse(text)?;
    ctx.type_env().condition(&mut expr)?;
    Ok(expr)
}

fn return_statement(ctx: &mut CompilationContext, value: &str) -> Result<Stmt, CoreError> {
    if !ctx.symbols.in_function() {
        return Err(CoreError::structural("'return' is only allowed inside a function"));
    }
    let expected = ctx.symbols.current_function().return_type.clone();
    if value.is_empty() {
        match expected {
            Some(ty) if !ty.is_void() => {
                return Err(CoreError::mismatch(format!(
                    "'return' needs a {ty} value"
                )));
            }
            Some(_) => {}
            None => ctx.symbols.set_return_type(Type::Void),
        }
        return Ok(Stmt::Return(None));
    }

    if let Some(inner) = statement_block(value)? {
        let (items, expr, inferred) = block_value(ctx, inner)?;
        check_return_value(ctx, expected, &inferred)?;
        return Ok(value_block_stmt(items, Stmt::Return(Some(expr)), ctx.next_input_slot));
    }
    let mut expr = ctx.parse(value)?;
    let inferred = ctx.type_env().infer(&mut expr)?;
    check_return_value(ctx, expected, &inferred)?;
    Ok(Stmt::Return(Some(expr)))
}

fn check_return_value(
    ctx: &mut CompilationContext,
    expected: Option<Type>,
    inferred: &Inferred,
) -> Result<(), CoreError> {
    if matches!(inferred, Inferred::Known(Type::Void)) {
        return Err(CoreError::mismatch("cannot return a Void value"));
    }
    match expected {
        Some(ty) => check_assignable(inferred, &ty)
            .map_err(|err| CoreError::mismatch(format!("return value: {err}")))?,
        None => ctx.symbols.set_return_type(inferred.resolve()?),
    }
    Ok(())
}

fn loop_jump(ctx: &mut CompilationContext, text: &str) -> Result<Stmt, CoreError> {
    let stmt = match text {
        "break" => Stmt::Break,
        "continue" => Stmt::Continue,
        _ => return Err(CoreError::structural(format!("unexpected text after '{text}'"))),
    };
    if !ctx.symbols.in_loop() {
        return Err(CoreError::structural(format!("'{text}' outside of a loop")));
    }
    Ok(stmt)
}

/// Plain, compound and `++`/`--` assignments.
fn assignment(ctx: &mut CompilationContext, text: &str) -> Result<Option<Stmt>, CoreError> {
    let (target_text, op, value_text) = if let Some(target) = text.strip_suffix("++") {
        (target.trim(), AssignOp::Add, None)
    } else if let Some(target) = text.strip_suffix("--") {
        (target.trim(), AssignOp::Sub, None)
    } else {
        match find_assignment(text)? {
            Some((at, op)) => (
                text[..at].trim(),
                op,
                Some(text[at + op.symbol().len()..].trim()),
            ),
            None => return Ok(None),
        }
    };
    if target_text.is_empty() || value_text == Some("") {
        return Err(CoreError::structural(format!("incomplete assignment '{text}'")));
    }

    let (target, ty, deferred) = if is_identifier(target_text) {
        binding_target(ctx, target_text, op)?
    } else {
        place_target(ctx, target_text)?
    };

    let mut value = match value_text {
        Some(value_text) => ctx.parse(value_text)?,
        None => Expr::Int {
            value: 1,
            suffix: None,
        },
    };
    let inferred = ctx.type_env().infer(&mut value)?;
    match op.binary() {
        None => check_assignable(&inferred, &ty)
            .map_err(|err| CoreError::mismatch(format!("assignment to '{target_text}': {err}")))?,
        Some(binary) => {
            if !ty.is_numeric() || !inferred.is_numeric() {
                return Err(CoreError::mismatch(format!(
                    "operator '{}' requires numeric operands, found {ty} and {inferred}",
                    op.symbol()
                )));
            }
            common_type(&Inferred::Known(ty.clone()), &inferred, op.symbol())?;
            if binary == BinaryOp::Rem && ty.is_float() {
                return Err(CoreError::mismatch("operator '%=' requires an integer target"));
            }
        }
    }
    if deferred {
        if let Some(symbol) = ctx.symbols.lookup_mut(target_text) {
            symbol.initialized = true;
        }
    }
    Ok(Some(Stmt::Assign {
        target,
        op,
        value,
        ty,
    }))
}

/// Assignment to a plain name: reassigning a mutable binding or the single
/// deferred initialization of an immutable one.
fn binding_target(
    ctx: &mut CompilationContext,
    name: &str,
    op: AssignOp,
) -> Result<(Expr, Type, bool), CoreError> {
    let symbol = ctx
        .symbols
        .lookup(name)
        .cloned()
        .ok_or_else(|| CoreError::undefined(name))?;
    if symbol.alias.is_some() {
        return Err(CoreError::mutability(format!("cannot assign to function '{name}'")));
    }
    if !ctx.symbols.is_local(name) {
        // enclosing bindings are written through the captured address
        if !(symbol.mutable && symbol.initialized) {
            return Err(CoreError::mutability(format!(
                "cannot assign to immutable '{name}' from an inner function"
            )));
        }
        ctx.symbols.resolve(name);
        return Ok((Expr::CapturedRef(name.to_string()), symbol.ty, false));
    }
    if !symbol.initialized {
        if op != AssignOp::Set {
            return Err(CoreError::mutability(format!(
                "binding '{name}' is read before it is initialized"
            )));
        }
    } else if !symbol.mutable {
        return Err(CoreError::mutability(format!(
            "cannot assign twice to immutable binding '{name}'"
        )));
    }
    Ok((Expr::Var(name.to_string()), symbol.ty, !symbol.initialized))
}

/// Assignment to a field, an element, or through a pointer.
fn place_target(ctx: &mut CompilationContext, text: &str) -> Result<(Expr, Type, bool), CoreError> {
    let mut target = ctx.parse(text)?;
    if !target.is_place() {
        return Err(CoreError::structural(format!("cannot assign to '{text}'")));
    }
    let mut env = ctx.type_env();
    let ty = env.infer(&mut target)?.resolve()?;
    if !env.is_mutable_place(&target)? {
        return Err(CoreError::mutability(format!(
            "cannot assign through immutable place '{text}'"
        )));
    }
    Ok((target, ty, false))
}

/// Compiles the body of a function literal and lifts it into the context.
/// Returns the bindings of enclosing functions that the body uses.
pub fn compile_function(
    ctx: &mut CompilationContext,
    header: FunctionHeader,
    body: &str,
) -> Result<Vec<Capture>, CoreError> {
    let FunctionHeader {
        name,
        symbol,
        params,
        result,
    } = header;
    ctx.symbols.push_function(FunctionFrame {
        symbol: Some(symbol.clone()),
        return_type: result.clone(),
        declared_return: result.is_some(),
        captures: Vec::new(),
    });
    for param in &params {
        ctx.symbols.insert(
            Symbol::binding(param.name.as_str(), param.ty.clone(), false, true),
            "parameter",
        )?;
    }

    let mut compiled = match block_contents(body)? {
        Some(inner) => compile_scope(ctx, inner, ScopeRole::Function)?,
        None => match assignment(ctx, body)? {
            Some(stmt) => ParseResult {
                items: vec![Item::Stmt(stmt)],
                tail: None,
                input_slots: ctx.next_input_slot,
            },
            None => ParseResult {
                tail: Some(tail_expression(ctx, body, ScopeRole::Function)?),
                ..ParseResult::default()
            },
        },
    };
    lower_this(ctx, &mut compiled)?;
    if let Some(tail) = compiled.tail.as_mut() {
        let inferred = ctx.type_env().infer(tail)?;
        match ctx.symbols.current_function().return_type.clone() {
            Some(expected) => check_assignable(&inferred, &expected)
                .map_err(|err| CoreError::mismatch(format!("result of '{name}': {err}")))?,
            None => ctx.symbols.set_return_type(inferred.resolve()?),
        }
    }

    let frame = ctx.symbols.pop_function()?;
    let result = frame.return_type.unwrap_or(Type::Void);
    if matches!(result, Type::Array { .. }) {
        return Err(CoreError::mismatch(format!("function '{name}' cannot return an array")));
    }
    if !result.is_void() && compiled.tail.is_none() && !always_returns(&compiled.items) {
        return Err(CoreError::mismatch(format!(
            "function '{name}' must produce a {result} value"
        )));
    }
    debug!(
        name = %name,
        symbol = %symbol,
        result = %result,
        captures = frame.captures.len(),
        "lifted function"
    );
    ctx.functions.push(Function {
        name,
        symbol,
        params,
        result,
        body: compiled,
        captures: frame.captures.clone(),
    });
    Ok(frame.captures)
}

/// Inside of a `{ .. }` body that spans all of `text`.
fn block_contents(text: &str) -> Result<Option<&str>, CoreError> {
    if text.starts_with('{') && find_matching(text, 0)? + 1 == text.len() {
        Ok(Some(&text[1..text.len() - 1]))
    } else {
        Ok(None)
    }
}

fn always_returns(items: &[Item]) -> bool {
    match items.last() {
        Some(Item::Stmt(Stmt::Return(_))) => true,
        Some(Item::Stmt(Stmt::Block(body))) => always_returns(&body.items),
        Some(Item::Stmt(Stmt::If {
            then,
            otherwise: Some(otherwise),
            ..
        })) => always_returns(&then.items) && always_returns(&otherwise.items),
        _ => false,
    }
}
