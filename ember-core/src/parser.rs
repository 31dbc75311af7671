//! Expression parsing.
//!
//! An expression is recognized by trying a fixed list of matchers in order.
//! The first one that accepts the text wins; a matcher that recognizes its
//! form but finds it malformed reports an error instead of letting a later
//! matcher guess. Operators are located by scanning the top-level mask from
//! the right, so each precedence level splits at its rightmost occurrence
//! and left associativity falls out of the recursion.

use tracing::trace;

use crate::ast::{BinaryOp, Expr, Param, UnaryOp};
use crate::builtins::{READ_INT, find_intrinsic};
use crate::compiler::{CompilationContext, FunctionHeader, compile_function};
use crate::control::parse_if;
use crate::error::CoreError;
use crate::splitter::{
    BalancedScanner, KEYWORDS, find_matching, find_top_level, is_ident_byte, is_identifier,
    rfind_top_level_word, split_arguments, split_top_level, starts_with_word, top_level_mask,
    trailing_group,
};
use crate::types::{Type, TypeResolver, parse_type, primitive};

type Matcher<'c> = fn(&mut ExpressionParser<'c>, &str) -> Result<Option<Expr>, CoreError>;

/// Binary operators from the loosest to the tightest binding level.
const LEVELS: &[&[(&str, BinaryOp)]] = &[
    &[("||", BinaryOp::Or)],
    &[("&&", BinaryOp::And)],
    &[("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)],
    &[
        ("<=", BinaryOp::Le),
        (">=", BinaryOp::Ge),
        ("<", BinaryOp::Lt),
        (">", BinaryOp::Gt),
    ],
    &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
    &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
];

pub struct ExpressionParser<'c> {
    ctx: &'c mut CompilationContext,
    depth: usize,
    /// Binding name and lifted symbol for a function literal that makes up
    /// the whole expression.
    function_name: Option<(String, String)>,
}

impl<'c> ExpressionParser<'c> {
    pub fn new(ctx: &'c mut CompilationContext) -> Self {
        ExpressionParser {
            ctx,
            depth: 0,
            function_name: None,
        }
    }

    pub fn with_function_name(mut self, name: &str, symbol: &str) -> Self {
        self.function_name = Some((name.to_string(), symbol.to_string()));
        self
    }

    pub fn parse(&mut self, text: &str) -> Result<Expr, CoreError> {
        self.depth += 1;
        let result = self.parse_expression(text.trim());
        self.depth -= 1;
        result
    }

    fn parse_expression(&mut self, text: &str) -> Result<Expr, CoreError> {
        if text.is_empty() {
            return Err(CoreError::structural("expected an expression"));
        }
        let matchers: [(&str, Matcher<'c>); 15] = [
            ("literal", Self::literal),
            ("aggregate", Self::aggregate),
            ("intrinsic", Self::intrinsic),
            ("symbol", Self::symbol),
            ("lambda", Self::lambda),
            ("invocation", Self::invocation),
            ("index", Self::index),
            ("field", Self::field),
            ("ternary", Self::ternary),
            ("numeric", Self::numeric),
            ("paren", Self::paren),
            ("binary", Self::binary),
            ("unary", Self::unary),
            ("path", Self::path),
            ("cast", Self::cast),
        ];
        for (name, matcher) in matchers {
            if let Some(expr) = matcher(self, text)? {
                trace!(matcher = name, text, "matched expression");
                return Ok(expr);
            }
        }
        Err(CoreError::structural(format!("unrecognized expression '{text}'")))
    }

    fn parse_all(&mut self, texts: &[&str]) -> Result<Vec<Expr>, CoreError> {
        texts.iter().map(|text| self.parse(text)).collect()
    }

    fn literal(&mut self, text: &str) -> Result<Option<Expr>, CoreError> {
        match text {
            "true" => return Ok(Some(Expr::Bool(true))),
            "false" => return Ok(Some(Expr::Bool(false))),
            _ => {}
        }
        let quote = text.as_bytes()[0];
        if quote != b'"' && quote != b'\'' {
            return Ok(None);
        }
        let Some(end) = literal_end(text)? else {
            return Ok(None);
        };
        if end + 1 != text.len() {
            return Ok(None);
        }
        let content = &text[1..end];
        if quote == b'"' {
            return Ok(Some(Expr::Str(content.to_string())));
        }
        char_value(content).map(|value| Some(Expr::Char(value)))
    }

    /// Array literals, single-expression blocks and struct literals.
    fn aggregate(&mut self, text: &str) -> Result<Option<Expr>, CoreError> {
        if !text.ends_with(']') && !text.ends_with('}') {
            return Ok(None);
        }
        let Some(open) = trailing_group(text)? else {
            return Ok(None);
        };
        let head = text[..open].trim();
        let inner = &text[open + 1..text.len() - 1];
        match text.as_bytes()[open] {
            b'[' if head.is_empty() => {
                let items = split_arguments(inner)?;
                if items.is_empty() {
                    return Err(CoreError::structural("array literal has no elements"));
                }
                Ok(Some(Expr::ArrayLit(self.parse_all(&items)?)))
            }
            b'{' if head.is_empty() => {
                if split_top_level(inner, b';')?.len() > 1 {
                    return Err(CoreError::structural(format!(
                        "block '{text}' holds statements; such a block can only be a final expression, a 'let' initializer or a returned value"
                    )));
                }
                self.parse(inner).map(Some)
            }
            b'{' => self.struct_literal(head, inner),
            _ => Ok(None),
        }
    }

    fn struct_literal(&mut self, head: &str, inner: &str) -> Result<Option<Expr>, CoreError> {
        let base = head.split('<').next().unwrap_or(head).trim();
        if !is_identifier(base) {
            return Ok(None);
        }
        let name = if head.contains('<') {
            match parse_type(head, &mut self.ctx.registry)? {
                Type::Struct(name) => name,
                other => {
                    return Err(CoreError::mismatch(format!("'{other}' is not a struct")));
                }
            }
        } else if self.ctx.registry.struct_def(base).is_some() || self.ctx.registry.is_generic(base) {
            base.to_string()
        } else if self.ctx.registry.enum_def(base).is_some() {
            return Err(CoreError::mismatch(format!(
                "enum '{base}' cannot be built with a struct literal"
            )));
        } else {
            return Err(CoreError::undefined(base));
        };
        let values = self.parse_all(&split_arguments(inner)?)?;
        Ok(Some(Expr::StructLit { name, values }))
    }

    fn intrinsic(&mut self, text: &str) -> Result<Option<Expr>, CoreError> {
        let Some(rest) = text.strip_prefix(READ_INT) else {
            return Ok(None);
        };
        let rest = rest.trim_start();
        if !rest.starts_with('(') || find_matching(rest, 0)? + 1 != rest.len() {
            return Ok(None);
        }
        if self.ctx.symbols.lookup(READ_INT).is_some() {
            return Ok(None);
        }
        if !self.ctx.intrinsics_enabled() {
            return Err(CoreError::structural(
                "readInt needs the prelude 'extern fn readInt() : I32;'",
            ));
        }
        if !rest[1..rest.len() - 1].trim().is_empty() {
            return Err(CoreError::Intrinsic("readInt takes no arguments".into()));
        }
        let slot = self.ctx.next_input_slot();
        Ok(Some(Expr::Input { slot }))
    }

    fn symbol(&mut self, text: &str) -> Result<Option<Expr>, CoreError> {
        if text == "this" {
            return Err(CoreError::structural(
                "'this' is only allowed as the final expression of a function body",
            ));
        }
        if !is_identifier(text) {
            return Ok(None);
        }
        self.reference(text).map(Some)
    }

    /// Reads a binding by name.
    pub(crate) fn reference(&mut self, name: &str) -> Result<Expr, CoreError> {
        let Some(resolved) = self.ctx.symbols.resolve(name) else {
            return match find_intrinsic(name) {
                Some(intrinsic) if self.ctx.intrinsics_enabled() => Ok(Expr::Closure {
                    symbol: self.ctx.intrinsic_function(intrinsic),
                    captures: Vec::new(),
                }),
                _ => Err(CoreError::undefined(name)),
            };
        };
        let symbol = resolved.symbol;
        if let Some(target) = symbol.alias {
            return Ok(Expr::FunctionRef {
                binding: name.to_string(),
                symbol: target,
            });
        }
        if !symbol.initialized {
            return Err(CoreError::mutability(format!(
                "binding '{name}' is read before it is initialized"
            )));
        }
        match (resolved.captured, symbol.mutable) {
            (true, true) => return Ok(Expr::CapturedRef(name.to_string())),
            (true, false) => return Ok(Expr::Captured(name.to_string())),
            _ => {}
        }
        Ok(Expr::Var(name.to_string()))
    }

    fn lambda(&mut self, text: &str) -> Result<Option<Expr>, CoreError> {
        let Some(header) = lambda_header(text, &mut self.ctx.registry)? else {
            return Ok(None);
        };
        let (name, symbol) = match self.function_name.take().filter(|_| self.depth == 1) {
            Some((name, symbol)) => (name, symbol),
            None => {
                let symbol = self.ctx.function_symbol(None);
                (symbol.clone(), symbol)
            }
        };
        let captures = compile_function(
            self.ctx,
            FunctionHeader {
                name,
                symbol: symbol.clone(),
                params: header.params,
                result: header.result,
            },
            header.body,
        )?;
        // the enclosing function reads captured values itself, possibly
        // capturing them in turn
        let mut values = Vec::new();
        for capture in &captures {
            let value = self.reference(&capture.name)?;
            values.push(if capture.by_reference {
                Expr::Unary {
                    op: UnaryOp::AddrOf { mutable: true },
                    operand: Box::new(value),
                }
            } else {
                value
            });
        }
        let captures = values;
        Ok(Some(Expr::Closure { symbol, captures }))
    }

    fn invocation(&mut self, text: &str) -> Result<Option<Expr>, CoreError> {
        if !text.ends_with(')') {
            return Ok(None);
        }
        let Some(open) = trailing_group(text)? else {
            return Ok(None);
        };
        let callee_text = text[..open].trim_end();
        if callee_text.is_empty() || !is_postfix_chain(callee_text)? {
            return Ok(None);
        }
        let callee = self.parse(callee_text)?;
        let args = self.parse_all(&split_arguments(&text[open + 1..text.len() - 1])?)?;
        Ok(Some(Expr::Call {
            callee: Box::new(callee),
            args,
            signature: None,
        }))
    }

    fn index(&mut self, text: &str) -> Result<Option<Expr>, CoreError> {
        if !text.ends_with(']') {
            return Ok(None);
        }
        let Some(open) = trailing_group(text)? else {
            return Ok(None);
        };
        let base_text = text[..open].trim_end();
        if base_text.is_empty() || !is_postfix_chain(base_text)? {
            return Ok(None);
        }
        let indices = split_arguments(&text[open + 1..text.len() - 1])?;
        if indices.is_empty() {
            return Err(CoreError::structural(format!("missing index in '{text}'")));
        }
        let mut expr = self.parse(base_text)?;
        for index in indices {
            expr = Expr::Index {
                base: Box::new(expr),
                index: Box::new(self.parse(index)?),
            };
        }
        Ok(Some(expr))
    }

    fn field(&mut self, text: &str) -> Result<Option<Expr>, CoreError> {
        let mask = top_level_mask(text)?;
        let bytes = text.as_bytes();
        let Some(dot) = (0..bytes.len()).rev().find(|&i| mask[i] && bytes[i] == b'.') else {
            return Ok(None);
        };
        let base_text = text[..dot].trim_end();
        let field = text[dot + 1..].trim_start();
        if !is_identifier(field) || base_text.is_empty() || !is_postfix_chain(base_text)? {
            return Ok(None);
        }
        self.member(base_text, field).map(Some)
    }

    /// `base.field`, or `Enum.Variant` when the base names an enum.
    fn member(&mut self, base_text: &str, field: &str) -> Result<Expr, CoreError> {
        if self.ctx.symbols.lookup(base_text).is_none() {
            if let Some(def) = self.ctx.registry.enum_def(base_text) {
                let index = def
                    .variants
                    .iter()
                    .position(|variant| variant == field)
                    .ok_or_else(|| CoreError::undefined(format!("{base_text}.{field}")))?;
                return Ok(Expr::EnumVariant {
                    name: base_text.to_string(),
                    variant: field.to_string(),
                    index,
                });
            }
        }
        Ok(Expr::Field {
            base: Box::new(self.parse(base_text)?),
            field: field.to_string(),
        })
    }

    fn ternary(&mut self, text: &str) -> Result<Option<Expr>, CoreError> {
        if starts_with_word(text, "if") {
            let chain = parse_if(text)?;
            let Some(otherwise) = chain.otherwise else {
                return Err(CoreError::structural(format!(
                    "'if' used as a value needs an else branch: '{text}'"
                )));
            };
            let cond = self.parse(chain.cond)?;
            let then = self.parse(chain.then)?;
            let otherwise = self.parse(otherwise)?;
            return Ok(Some(Expr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            }));
        }

        let mask = top_level_mask(text)?;
        let bytes = text.as_bytes();
        let Some(question) = (0..bytes.len()).find(|&i| mask[i] && bytes[i] == b'?') else {
            return Ok(None);
        };
        let mut nested = 0usize;
        let mut colon = None;
        for index in question + 1..bytes.len() {
            if !mask[index] {
                continue;
            }
            match bytes[index] {
                b'?' => nested += 1,
                b':' if bytes.get(index + 1) == Some(&b':') || bytes[index - 1] == b':' => {}
                b':' if nested == 0 => {
                    colon = Some(index);
                    break;
                }
                b':' => nested -= 1,
                _ => {}
            }
        }
        let Some(colon) = colon else {
            return Err(CoreError::structural(format!("'?' without ':' in '{text}'")));
        };
        let parts = [
            text[..question].trim(),
            text[question + 1..colon].trim(),
            text[colon + 1..].trim(),
        ];
        if parts.iter().any(|part| part.is_empty()) {
            return Err(CoreError::structural(format!("incomplete conditional '{text}'")));
        }
        let [cond, then, otherwise] = parts.map(|part| self.parse(part));
        Ok(Some(Expr::Ternary {
            cond: Box::new(cond?),
            then: Box::new(then?),
            otherwise: Box::new(otherwise?),
        }))
    }

    fn numeric(&mut self, text: &str) -> Result<Option<Expr>, CoreError> {
        let negative = text.starts_with('-');
        let body = if negative { &text[1..] } else { text };
        if !body.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(None);
        }
        let end = body
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(body.len());
        let (number, suffix) = body.split_at(end);
        let suffix = match suffix {
            "" => None,
            name => match primitive(name) {
                Some(ty) if ty.is_numeric() => Some(ty),
                _ => return Ok(None),
            },
        };
        if number.matches('.').count() > 1 || number.ends_with('.') {
            return Ok(None);
        }
        let sign = if negative { "-" } else { "" };
        if number.contains('.') || suffix.as_ref().is_some_and(Type::is_float) {
            if let Some(ty) = suffix.as_ref().filter(|ty| ty.is_integer()) {
                return Err(CoreError::mismatch(format!(
                    "float literal '{text}' cannot have suffix {ty}"
                )));
            }
            return Ok(Some(Expr::Float {
                text: format!("{sign}{number}"),
                suffix,
            }));
        }
        let magnitude: i128 = number
            .parse()
            .map_err(|_| CoreError::structural(format!("integer literal '{text}' is too large")))?;
        Ok(Some(Expr::Int {
            value: if negative { -magnitude } else { magnitude },
            suffix,
        }))
    }

    fn paren(&mut self, text: &str) -> Result<Option<Expr>, CoreError> {
        if !text.starts_with('(') || find_matching(text, 0)? + 1 != text.len() {
            return Ok(None);
        }
        let inner = self.parse(&text[1..text.len() - 1])?;
        Ok(Some(Expr::Paren(Box::new(inner))))
    }

    fn binary(&mut self, text: &str) -> Result<Option<Expr>, CoreError> {
        let mask = top_level_mask(text)?;
        for level in LEVELS {
            let Some((at, token, op)) = rightmost_operator(text.as_bytes(), &mask, level) else {
                continue;
            };
            let lhs_text = text[..at].trim();
            let rhs_text = text[at + token.len()..].trim();
            if rhs_text.is_empty() {
                return Err(CoreError::structural(format!(
                    "operator '{token}' is missing its right operand in '{text}'"
                )));
            }
            let lhs = self.parse(lhs_text)?;
            let rhs = self.parse(rhs_text)?;
            return Ok(Some(Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                operand: None,
            }));
        }
        Ok(None)
    }

    fn unary(&mut self, text: &str) -> Result<Option<Expr>, CoreError> {
        let (op, operand) = match text.as_bytes()[0] {
            b'!' => (UnaryOp::Not, &text[1..]),
            b'-' => (UnaryOp::Neg, &text[1..]),
            b'*' => (UnaryOp::Deref, &text[1..]),
            b'&' => {
                let rest = text[1..].trim_start();
                if starts_with_word(rest, "mut") {
                    (UnaryOp::AddrOf { mutable: true }, &rest[3..])
                } else {
                    (UnaryOp::AddrOf { mutable: false }, rest)
                }
            }
            _ => return Ok(None),
        };
        // `-x as I64` casts the negation
        if rfind_top_level_word(operand, "as")?.is_some() {
            return Ok(None);
        }
        let operand = self.parse(operand)?;
        Ok(Some(Expr::Unary {
            op,
            operand: Box::new(operand),
        }))
    }

    /// `Enum::Variant` and `value::field`.
    fn path(&mut self, text: &str) -> Result<Option<Expr>, CoreError> {
        let mask = top_level_mask(text)?;
        let bytes = text.as_bytes();
        let Some(at) = (0..bytes.len().saturating_sub(1))
            .rev()
            .find(|&i| mask[i] && bytes[i] == b':' && bytes[i + 1] == b':')
        else {
            return Ok(None);
        };
        let base_text = text[..at].trim_end();
        let member = text[at + 2..].trim_start();
        if !is_identifier(member) || base_text.is_empty() || !is_postfix_chain(base_text)? {
            return Ok(None);
        }
        self.member(base_text, member).map(Some)
    }

    fn cast(&mut self, text: &str) -> Result<Option<Expr>, CoreError> {
        let Some(at) = rfind_top_level_word(text, "as")? else {
            return Ok(None);
        };
        let value = text[..at].trim();
        let target = text[at + 2..].trim();
        if value.is_empty() {
            return Err(CoreError::structural(format!("cast '{text}' has no value")));
        }
        let expr = self.parse(value)?;
        let ty = parse_type(target, &mut self.ctx.registry)?;
        Ok(Some(Expr::Cast {
            expr: Box::new(expr),
            ty,
            from: None,
        }))
    }
}

/// Parameter list, optional result type and body of `(params) [: R] => body`.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaHeader<'t> {
    pub params: Vec<Param>,
    pub result: Option<Type>,
    pub body: &'t str,
}

/// Splits a function literal into its parts, or returns `None` when `text`
/// is not shaped like one.
pub fn lambda_header<'t>(
    text: &'t str,
    resolver: &mut dyn TypeResolver,
) -> Result<Option<LambdaHeader<'t>>, CoreError> {
    if !text.starts_with('(') {
        return Ok(None);
    }
    let close = find_matching(text, 0)?;
    let rest = text[close + 1..].trim_start();
    let (result, body) = if let Some(body) = rest.strip_prefix("=>") {
        (None, body)
    } else if let Some(typed) = rest.strip_prefix(':') {
        let Some(arrow) = find_top_level(typed, "=>")? else {
            return Ok(None);
        };
        (Some(parse_type(&typed[..arrow], resolver)?), &typed[arrow + 2..])
    } else {
        return Ok(None);
    };

    let mut params: Vec<Param> = Vec::new();
    for param in split_arguments(&text[1..close])? {
        let (name, ty) = param.split_once(':').ok_or_else(|| {
            CoreError::structural(format!("parameter '{param}' needs a type"))
        })?;
        let name = name.trim();
        if !is_identifier(name) {
            return Err(CoreError::structural(format!("invalid parameter name '{name}'")));
        }
        if params.iter().any(|existing| existing.name == name) {
            return Err(CoreError::duplicate("parameter", name));
        }
        params.push(Param {
            name: name.to_string(),
            ty: parse_type(ty, resolver)?,
        });
    }

    let body = body.trim();
    if body.is_empty() {
        return Err(CoreError::structural("function literal has an empty body"));
    }
    Ok(Some(LambdaHeader { params, result, body }))
}

/// True when `text` is a primary expression followed only by calls,
/// indexing and member accesses, so that a trailing `(..)`, `[..]` or `.x`
/// applies to all of it.
fn is_postfix_chain(text: &str) -> Result<bool, CoreError> {
    let mut rest = text.trim_end();
    loop {
        let Some(&last) = rest.as_bytes().last() else {
            return Ok(false);
        };
        if matches!(last, b')' | b']' | b'}') {
            let Some(open) = trailing_group(rest)? else {
                return Ok(false);
            };
            let before = &rest[..open];
            if before.trim().is_empty() {
                return Ok(last != b'}');
            }
            if last == b'}' {
                let head = before.trim_end();
                return Ok(is_identifier(head) || (head.contains('<') && head.ends_with('>')));
            }
            if before.ends_with(char::is_whitespace) {
                return Ok(false);
            }
            rest = before;
            continue;
        }
        if !is_ident_byte(last) {
            return Ok(false);
        }
        let start = rest
            .bytes()
            .rposition(|byte| !is_ident_byte(byte))
            .map_or(0, |index| index + 1);
        let word = &rest[start..];
        if word.as_bytes()[0].is_ascii_digit() || KEYWORDS.contains(&word) {
            return Ok(false);
        }
        let before = rest[..start].trim_end();
        if before.is_empty() {
            return Ok(true);
        }
        if let Some(base) = before.strip_suffix("::") {
            rest = base.trim_end();
        } else if let Some(base) = before.strip_suffix('.') {
            rest = base.trim_end();
        } else {
            return Ok(false);
        }
    }
}

fn rightmost_operator(
    bytes: &[u8],
    mask: &[bool],
    level: &[(&'static str, BinaryOp)],
) -> Option<(usize, &'static str, BinaryOp)> {
    (0..bytes.len()).rev().filter(|&at| mask[at]).find_map(|at| {
        level.iter().find_map(|&(token, op)| {
            let end = at + token.len();
            let matches = bytes[at..].starts_with(token.as_bytes())
                && mask[end - 1]
                && is_binary_operator(bytes, at, end);
            matches.then_some((at, token, op))
        })
    })
}

/// Rejects prefix uses and pieces of longer operators.
fn is_binary_operator(bytes: &[u8], start: usize, end: usize) -> bool {
    let Some(last) = bytes[..start].iter().rposition(|byte| !byte.is_ascii_whitespace()) else {
        return false;
    };
    let follows_operand = if is_ident_byte(bytes[last]) {
        let word_start = bytes[..last]
            .iter()
            .rposition(|byte| !is_ident_byte(*byte))
            .map_or(0, |index| index + 1);
        !matches!(&bytes[word_start..=last], b"as" | b"mut" | b"else" | b"return")
    } else {
        matches!(bytes[last], b')' | b']' | b'}' | b'\'' | b'"')
    };
    if !follows_operand {
        return false;
    }
    let previous = start.checked_sub(1).map(|index| bytes[index]);
    let next = bytes.get(end).copied();
    match &bytes[start..end] {
        b"<" => next != Some(b'=') && next != Some(b'<') && previous != Some(b'<'),
        b">" => next != Some(b'=') && next != Some(b'>') && !matches!(previous, Some(b'>' | b'=' | b'-')),
        b"<=" => previous != Some(b'<'),
        b">=" => previous != Some(b'>'),
        b"==" => previous != Some(b'=') && next != Some(b'='),
        b"&&" => previous != Some(b'&') && next != Some(b'&'),
        b"||" => previous != Some(b'|') && next != Some(b'|'),
        b"+" | b"-" | b"*" | b"/" | b"%" => next != Some(b'='),
        _ => true,
    }
}

/// Index of the quote closing the literal that opens `text`.
fn literal_end(text: &str) -> Result<Option<usize>, CoreError> {
    let mut scanner = BalancedScanner::new(text);
    while let Some(step) = scanner.next_step()? {
        if step.index > 0 && !scanner.in_literal() {
            return Ok(Some(step.index));
        }
    }
    Ok(None)
}

fn char_value(content: &str) -> Result<u8, CoreError> {
    let value = match content.as_bytes() {
        [b'\\', b'n'] => b'\n',
        [b'\\', b't'] => b'\t',
        [b'\\', b'r'] => b'\r',
        [b'\\', b'0'] => 0,
        [b'\\', escaped @ (b'\\' | b'\'' | b'"')] => *escaped,
        [byte] if byte.is_ascii() && *byte != b'\\' => *byte,
        _ => {
            return Err(CoreError::structural(format!("invalid char literal '{content}'")));
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{FunctionFrame, Symbol};

    fn context() -> CompilationContext {
        let mut ctx = CompilationContext::new(true);
        ctx.symbols.push_function(FunctionFrame::default());
        for (name, ty, mutable) in [
            ("x", Type::I32, false),
            ("y", Type::I32, true),
            ("flag", Type::Bool, false),
        ] {
            ctx.symbols
                .insert(Symbol::binding(name, ty, mutable, true), "binding")
                .expect("insert");
        }
        ctx
    }

    fn parse(ctx: &mut CompilationContext, text: &str) -> Result<Expr, CoreError> {
        ExpressionParser::new(ctx).parse(text)
    }

    #[test]
    fn binds_multiplication_tighter_than_addition() {
        let mut ctx = context();
        let expr = parse(&mut ctx, "x + y * 2").expect("parse");
        let Expr::Binary { op, rhs, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn subtraction_is_left_associative() {
        let mut ctx = context();
        let expr = parse(&mut ctx, "10 - 4 - 3").expect("parse");
        let Expr::Binary { lhs, rhs, .. } = expr else {
            panic!("expected binary expression");
        };
        assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Sub, .. }));
        assert!(matches!(*rhs, Expr::Int { value: 3, .. }));
    }

    #[test]
    fn distinguishes_prefix_operators() {
        let mut ctx = context();
        let expr = parse(&mut ctx, "x * -y").expect("parse");
        let Expr::Binary { op, rhs, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::Mul);
        assert!(matches!(*rhs, Expr::Unary { op: UnaryOp::Neg, .. }));
        assert!(matches!(
            parse(&mut ctx, "&mut y").expect("parse"),
            Expr::Unary { op: UnaryOp::AddrOf { mutable: true }, .. }
        ));
    }

    #[test]
    fn parses_literals_with_suffixes() {
        let mut ctx = context();
        assert_eq!(
            parse(&mut ctx, "100U8").expect("parse"),
            Expr::Int { value: 100, suffix: Some(Type::U8) }
        );
        assert_eq!(parse(&mut ctx, "-7").expect("parse"), Expr::Int { value: -7, suffix: None });
        assert!(matches!(parse(&mut ctx, "2.5F32").expect("parse"), Expr::Float { .. }));
        assert_eq!(parse(&mut ctx, "'a'").expect("parse"), Expr::Char(b'a'));
        assert_eq!(parse(&mut ctx, "'\\n'").expect("parse"), Expr::Char(b'\n'));
    }

    #[test]
    fn comparisons_bind_looser_than_arithmetic() {
        let mut ctx = context();
        let expr = parse(&mut ctx, "x + 1 < y && flag").expect("parse");
        let Expr::Binary { op, lhs, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::And);
        assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Lt, .. }));
    }

    #[test]
    fn parses_conditional_forms() {
        let mut ctx = context();
        assert!(matches!(parse(&mut ctx, "if (flag) 1 else 2").expect("parse"), Expr::Ternary { .. }));
        assert!(matches!(parse(&mut ctx, "flag ? x : y").expect("parse"), Expr::Ternary { .. }));
        assert!(matches!(
            parse(&mut ctx, "if (flag) 1"),
            Err(CoreError::Structural(_))
        ));
    }

    #[test]
    fn reports_undefined_names() {
        let mut ctx = context();
        assert!(matches!(parse(&mut ctx, "missing + 1"), Err(CoreError::UndefinedSymbol(_))));
        assert!(matches!(parse(&mut ctx, "this"), Err(CoreError::Structural(_))));
    }

    #[test]
    fn hands_out_input_slots_in_source_order() {
        let mut ctx = context();
        let expr = parse(&mut ctx, "readInt() - readInt()").expect("parse");
        let Expr::Binary { lhs, rhs, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(*lhs, Expr::Input { slot: 0 });
        assert_eq!(*rhs, Expr::Input { slot: 1 });
        assert!(matches!(parse(&mut ctx, "readInt(1)"), Err(CoreError::Intrinsic(_))));
    }

    #[test]
    fn bare_read_int_is_a_function_value() {
        let mut ctx = context();
        let first = parse(&mut ctx, "readInt").expect("parse");
        let second = parse(&mut ctx, "readInt").expect("parse");
        let Expr::Closure { symbol, captures } = first else {
            panic!("expected a function value");
        };
        assert!(captures.is_empty());
        assert_eq!(second, Expr::Closure { symbol: symbol.clone(), captures: Vec::new() });
        let function = ctx.functions.iter().find(|function| function.symbol == symbol).expect("wrapper");
        assert_eq!(function.signature(), Type::function(vec![], Type::I32));
        assert_eq!(function.body.tail, Some(Expr::ReadInt));
    }

    #[test]
    fn mutable_bindings_of_enclosing_functions_are_references() {
        let mut ctx = context();
        ctx.symbols.push_function(FunctionFrame {
            symbol: Some("inner".into()),
            ..FunctionFrame::default()
        });
        assert_eq!(parse(&mut ctx, "y").expect("parse"), Expr::CapturedRef("y".into()));
        assert_eq!(parse(&mut ctx, "x").expect("parse"), Expr::Captured("x".into()));
    }

    #[test]
    fn read_int_requires_the_prelude() {
        let mut ctx = CompilationContext::new(false);
        ctx.symbols.push_function(FunctionFrame::default());
        assert!(matches!(parse(&mut ctx, "readInt()"), Err(CoreError::Structural(_))));
    }

    #[test]
    fn parses_postfix_chains() {
        let mut ctx = context();
        let header = lambda_header("(a : I32) : I32 => a", &mut ctx.registry)
            .expect("header")
            .expect("lambda");
        assert_eq!(header.params.len(), 1);
        assert_eq!(header.result, Some(Type::I32));
        assert_eq!(header.body, "a");
        assert!(is_postfix_chain("make(1).inner[0]").expect("chain"));
        assert!(!is_postfix_chain("a + b").expect("chain"));
        assert!(!is_postfix_chain("if (c) f").expect("chain"));
    }

    #[test]
    fn casts_bind_loosest() {
        let mut ctx = context();
        let expr = parse(&mut ctx, "-x as I64").expect("parse");
        let Expr::Cast { expr, ty, .. } = expr else {
            panic!("expected cast");
        };
        assert_eq!(ty, Type::I64);
        assert!(matches!(*expr, Expr::Unary { op: UnaryOp::Neg, .. }));
    }
}
