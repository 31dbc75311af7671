//! Target-neutral program representation shared by both emitters.

use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::Or | BinaryOp::And)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Ne)
    }

    pub fn is_ordering(self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Deref,
    AddrOf { mutable: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int {
        value: i128,
        suffix: Option<Type>,
    },
    Float {
        text: String,
        suffix: Option<Type>,
    },
    Bool(bool),
    Char(u8),
    /// String literal, kept with its escapes as written.
    Str(String),
    /// A `readInt()` call site, satisfied by the numbered input slot.
    Input {
        slot: usize,
    },
    /// A read performed when evaluated, after every input slot was filled.
    ReadInt,
    Var(String),
    /// A binding of an enclosing function, read through the closure
    /// environment.
    Captured(String),
    /// A mutable binding of an enclosing function, reached through the
    /// address held in the closure environment.
    CapturedRef(String),
    /// Reference to a lifted function through one of its alias names.
    FunctionRef {
        binding: String,
        symbol: String,
    },
    /// A function literal; `captures` are evaluated where the literal appears.
    Closure {
        symbol: String,
        captures: Vec<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        /// Function type of the callee, filled in by the type checker.
        signature: Option<Type>,
    },
    Field {
        base: Box<Expr>,
        field: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        /// Operand type, filled in by the type checker.
        operand: Option<Type>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        ty: Type,
        from: Option<Type>,
    },
    Paren(Box<Expr>),
    StructLit {
        name: String,
        values: Vec<Expr>,
    },
    ArrayLit(Vec<Expr>),
    EnumVariant {
        name: String,
        variant: String,
        index: usize,
    },
    /// Bare `this` at the end of a function body, replaced by closure lowering.
    This,
}

impl Expr {
    /// True for expressions that denote a storage location.
    pub fn is_place(&self) -> bool {
        match self {
            Expr::Var(_) | Expr::Captured(_) | Expr::CapturedRef(_) => true,
            Expr::Field { base, .. } | Expr::Index { base, .. } => base.is_place(),
            Expr::Unary {
                op: UnaryOp::Deref, ..
            } => true,
            Expr::Paren(inner) => inner.is_place(),
            _ => false,
        }
    }

    /// The binding a place expression is rooted in, unless it goes through a
    /// pointer.
    pub fn root_binding(&self) -> Option<&str> {
        match self {
            Expr::Var(name) | Expr::Captured(name) | Expr::CapturedRef(name) => Some(name),
            Expr::Field { base, .. } | Expr::Index { base, .. } => base.root_binding(),
            Expr::Paren(inner) => inner.root_binding(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Set => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Rem => "%=",
        }
    }

    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Rem => Some(BinaryOp::Rem),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Assign {
        target: Expr,
        op: AssignOp,
        value: Expr,
        /// Type of the target place.
        ty: Type,
    },
    If {
        cond: Expr,
        then: ParseResult,
        otherwise: Option<ParseResult>,
    },
    While {
        cond: Expr,
        body: ParseResult,
    },
    Block(ParseResult),
    Return(Option<Expr>),
    Break,
    Continue,
}

/// A `let` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub declared: Option<Type>,
    pub ty: Type,
    pub init: Option<Expr>,
    pub mutable: bool,
    /// Lifted function this name stands for; such bindings need no storage.
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Binding(Binding),
    Stmt(Stmt),
}

/// The compiled contents of one lexical scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseResult {
    pub items: Vec<Item>,
    pub tail: Option<Expr>,
    /// Input slots handed out once this scope was compiled.
    pub input_slots: usize,
}

impl ParseResult {
    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.items.iter().filter_map(|item| match item {
            Item::Binding(binding) => Some(binding),
            Item::Stmt(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub name: String,
    pub ty: Type,
    /// Mutable bindings are captured by address, so writes from the lifted
    /// function reach the enclosing one.
    pub by_reference: bool,
}

impl Capture {
    /// Type of the environment slot holding this capture.
    pub fn slot_type(&self) -> Type {
        if self.by_reference {
            Type::pointer(self.ty.clone(), true)
        } else {
            self.ty.clone()
        }
    }
}

/// A function literal lifted out of the expression it appeared in.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Source name, or `lambda_N` for anonymous literals.
    pub name: String,
    /// Unique name across the program.
    pub symbol: String,
    pub params: Vec<Param>,
    pub result: Type,
    pub body: ParseResult,
    /// Bindings of enclosing functions used by the body, in first-use order.
    pub captures: Vec<Capture>,
}

impl Function {
    pub fn signature(&self) -> Type {
        Type::function(
            self.params.iter().map(|param| param.ty.clone()).collect(),
            self.result.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Field>,
}

impl StructDef {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub variants: Vec<String>,
}

/// Everything an emitter needs to produce a program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub structs: Vec<StructDef>,
    pub enums: Vec<EnumDef>,
    pub functions: Vec<Function>,
    pub main: ParseResult,
    /// Type of the main tail expression, if there is one.
    pub result: Option<Type>,
}

impl Program {
    pub fn function(&self, symbol: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.symbol == symbol)
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.iter().find(|def| def.name == name)
    }

    pub fn input_slots(&self) -> usize {
        self.main.input_slots
    }

    /// True when `readInt` is used as a function value, whose calls read
    /// input at run time.
    pub fn reads_at_runtime(&self) -> bool {
        self.functions
            .iter()
            .any(|function| matches!(function.body.tail, Some(Expr::ReadInt)))
    }
}
