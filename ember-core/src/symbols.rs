//! Ordered symbol table with function and block scopes.
//!
//! Entries are kept in declaration order in one vector, the way a `let`
//! chain introduces them. A scope is a mark into that vector; popping a
//! scope truncates back to its mark. Function scopes additionally record
//! the bindings of enclosing functions that their body uses, which become
//! the captures of the lifted function.

use crate::ast::Capture;
use crate::error::CoreError;
use crate::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
    pub initialized: bool,
    /// Lifted function this name is an alias for.
    pub alias: Option<String>,
}

impl Symbol {
    pub fn binding(name: impl Into<String>, ty: Type, mutable: bool, initialized: bool) -> Self {
        Symbol {
            name: name.into(),
            ty,
            mutable,
            initialized,
            alias: None,
        }
    }

    pub fn alias(name: impl Into<String>, ty: Type, symbol: impl Into<String>) -> Self {
        Symbol {
            name: name.into(),
            ty,
            mutable: false,
            initialized: true,
            alias: Some(symbol.into()),
        }
    }
}

/// State of the function whose body is being compiled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionFrame {
    /// Lifted symbol, `None` for the program's main scope.
    pub symbol: Option<String>,
    /// Declared result type, or the one inferred from the first `return`.
    pub return_type: Option<Type>,
    pub declared_return: bool,
    pub captures: Vec<Capture>,
}

#[derive(Debug)]
enum ScopeKind {
    Function(FunctionFrame),
    Block { is_loop: bool },
}

#[derive(Debug)]
struct Scope {
    base: usize,
    kind: ScopeKind,
}

/// A name lookup result.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub symbol: Symbol,
    /// The binding belongs to an enclosing function.
    pub captured: bool,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: Vec<Symbol>,
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn push_function(&mut self, frame: FunctionFrame) {
        self.scopes.push(Scope {
            base: self.entries.len(),
            kind: ScopeKind::Function(frame),
        });
    }

    pub fn push_block(&mut self, is_loop: bool) {
        self.scopes.push(Scope {
            base: self.entries.len(),
            kind: ScopeKind::Block { is_loop },
        });
    }

    pub fn pop_function(&mut self) -> Result<FunctionFrame, CoreError> {
        match self.pop()? {
            ScopeKind::Function(frame) => Ok(frame),
            ScopeKind::Block { .. } => Err(CoreError::structural("unbalanced scope: expected a function")),
        }
    }

    pub fn pop_block(&mut self) -> Result<(), CoreError> {
        match self.pop()? {
            ScopeKind::Block { .. } => Ok(()),
            ScopeKind::Function(_) => Err(CoreError::structural("unbalanced scope: expected a block")),
        }
    }

    /// Leaves the innermost scope. Every binding it declared must have been
    /// initialized by then.
    fn pop(&mut self) -> Result<ScopeKind, CoreError> {
        let scope = self
            .scopes
            .pop()
            .ok_or_else(|| CoreError::structural("no scope to leave"))?;
        if let Some(symbol) = self.entries[scope.base..]
            .iter()
            .find(|symbol| !symbol.initialized)
        {
            return Err(CoreError::mutability(format!(
                "binding '{}' is never initialized",
                symbol.name
            )));
        }
        self.entries.truncate(scope.base);
        Ok(scope.kind)
    }

    /// Adds a name to the current scope. Names must be unique among the
    /// visible names of the current function.
    pub fn insert(&mut self, symbol: Symbol, kind: &'static str) -> Result<(), CoreError> {
        if self.entries[self.function_base()..]
            .iter()
            .any(|existing| existing.name == symbol.name)
        {
            return Err(CoreError::duplicate(kind, symbol.name));
        }
        tracing::trace!(name = %symbol.name, ty = %symbol.ty, "declared symbol");
        self.entries.push(symbol);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.entries.iter().rev().find(|symbol| symbol.name == name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.entries.iter_mut().rev().find(|symbol| symbol.name == name)
    }

    /// Looks a name up for use. Bindings of enclosing functions are
    /// recorded as captures of the current function; mutable ones by
    /// reference.
    pub fn resolve(&mut self, name: &str) -> Option<Resolved> {
        let position = self.entries.iter().rposition(|symbol| symbol.name == name)?;
        let symbol = self.entries[position].clone();
        let captured = position < self.function_base() && symbol.alias.is_none();
        if let (true, Some(frame)) = (captured, self.current_function_mut()) {
            if !frame.captures.iter().any(|capture| capture.name == name) {
                frame.captures.push(Capture {
                    name: name.to_string(),
                    ty: symbol.ty.clone(),
                    by_reference: symbol.mutable,
                });
            }
        }
        Some(Resolved { symbol, captured })
    }

    /// True when `name` is declared by the current function (parameters and
    /// bindings of its open blocks).
    pub fn is_local(&self, name: &str) -> bool {
        self.entries[self.function_base()..]
            .iter()
            .any(|symbol| symbol.name == name)
    }

    /// Parameters and bindings declared so far by the current function.
    pub fn own_symbols(&self) -> &[Symbol] {
        &self.entries[self.function_base()..]
    }

    /// Names of enclosing functions visible from the current one, in
    /// declaration order. Shadowed entries are left out.
    pub fn enclosing_symbols(&self) -> Vec<&Symbol> {
        let base = self.function_base();
        let enclosing = &self.entries[..base];
        enclosing
            .iter()
            .enumerate()
            .filter(|(position, symbol)| {
                !enclosing[position + 1..].iter().any(|later| later.name == symbol.name)
                    && !self.entries[base..].iter().any(|own| own.name == symbol.name)
            })
            .map(|(_, symbol)| symbol)
            .collect()
    }

    pub fn current_function(&self) -> &FunctionFrame {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| match &scope.kind {
                ScopeKind::Function(frame) => Some(frame),
                ScopeKind::Block { .. } => None,
            })
            .unwrap_or(&MAIN_FRAME)
    }

    fn current_function_mut(&mut self) -> Option<&mut FunctionFrame> {
        self.scopes.iter_mut().rev().find_map(|scope| match &mut scope.kind {
            ScopeKind::Function(frame) => Some(frame),
            ScopeKind::Block { .. } => None,
        })
    }

    pub fn set_return_type(&mut self, ty: Type) {
        if let Some(frame) = self.current_function_mut() {
            frame.return_type = Some(ty);
        }
    }

    pub fn in_function(&self) -> bool {
        self.current_function().symbol.is_some()
    }

    /// True inside a `while` body of the current function.
    pub fn in_loop(&self) -> bool {
        for scope in self.scopes.iter().rev() {
            match scope.kind {
                ScopeKind::Block { is_loop: true } => return true,
                ScopeKind::Block { is_loop: false } => {}
                ScopeKind::Function(_) => return false,
            }
        }
        false
    }

    fn function_base(&self) -> usize {
        self.scopes
            .iter()
            .rev()
            .find(|scope| matches!(scope.kind, ScopeKind::Function(_)))
            .map_or(0, |scope| scope.base)
    }
}

static MAIN_FRAME: FunctionFrame = FunctionFrame {
    symbol: None,
    return_type: None,
    declared_return: false,
    captures: Vec::new(),
};
