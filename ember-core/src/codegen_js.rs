//! JavaScript emitter.
//!
//! Function literals stay inline as arrow functions, so captures need no
//! special treatment. Pointers become `{ get, set }` boxes over the place they
//! were taken from; a string literal is a read-only box over its first byte.
//! Integer division, narrow arithmetic and narrowing casts are spelled out
//! because every JavaScript number is a double.

use crate::ast::{AssignOp, BinaryOp, Binding, Expr, Function, Item, ParseResult, Program, Stmt, UnaryOp};
use crate::codegen::{Emitter, indentation, negate, push_line, target_name};
use crate::error::CoreError;
use crate::types::Type;

const JS_RESERVED: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield", "arguments",
    "eval", "undefined", "NaN", "Infinity", "require", "process", "input_slots", "Math",
    "Number", "Object", "structuredClone", "input_cursor",
];

const INPUT_SLOTS: &str = "const input_slots = require(\"fs\").readFileSync(0, \"utf8\").split(/\\s+/).filter((token) => token.length > 0).map(Number);\n";

fn js_name(name: &str) -> String {
    target_name(name, JS_RESERVED, &[])
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsEmitter;

impl Emitter for JsEmitter {
    fn emit(&mut self, program: &Program) -> Result<String, CoreError> {
        JsWriter { program }.finish()
    }
}

struct JsWriter<'p> {
    program: &'p Program,
}

impl JsWriter<'_> {
    fn finish(&self) -> Result<String, CoreError> {
        let program = self.program;
        let mut out = String::from("\"use strict\";\n");
        if program.input_slots() > 0 || program.reads_at_runtime() {
            out.push_str(INPUT_SLOTS);
        }
        if program.reads_at_runtime() {
            // run-time reads continue after the call-site slots
            out.push_str(&format!("let input_cursor = {};\n", program.input_slots()));
        }
        for def in &program.enums {
            let variants: Vec<String> = def
                .variants
                .iter()
                .enumerate()
                .map(|(index, variant)| format!("{variant}: {index}"))
                .collect();
            out.push_str(&format!(
                "const {} = Object.freeze({{ {} }});\n",
                js_name(&def.name),
                variants.join(", ")
            ));
        }
        out.push('\n');
        self.scope(&program.main, 0, &mut out)?;
        if let Some(tail) = &program.main.tail {
            let value = self.expr(tail, 0)?;
            push_line(&mut out, 0, &format!("process.exitCode = Number({value}) & 255;"));
        }
        Ok(out)
    }

    fn scope(&self, body: &ParseResult, level: usize, out: &mut String) -> Result<(), CoreError> {
        for item in &body.items {
            match item {
                Item::Binding(binding) => self.binding(binding, level, out)?,
                Item::Stmt(stmt) => self.statement(stmt, level, out)?,
            }
        }
        Ok(())
    }

    fn binding(&self, binding: &Binding, level: usize, out: &mut String) -> Result<(), CoreError> {
        let name = js_name(&binding.name);
        match &binding.init {
            None => push_line(out, level, &format!("let {name};")),
            Some(init) => {
                let keyword = if binding.mutable { "let" } else { "const" };
                let value = self.value(init, &binding.ty, level)?;
                push_line(out, level, &format!("{keyword} {name} = {value};"));
            }
        }
        Ok(())
    }

    /// An expression stored into a new place; aggregates are copied.
    fn value(&self, expr: &Expr, ty: &Type, level: usize) -> Result<String, CoreError> {
        let text = self.expr(expr, level)?;
        let copied = match (ty, expr) {
            (_, Expr::StructLit { .. } | Expr::ArrayLit(_)) => text,
            (Type::Array { .. }, _) => format!("structuredClone({text})"),
            (Type::Struct(_), _) => format!("{{ ...{text} }}"),
            _ => text,
        };
        Ok(copied)
    }

    fn statement(&self, stmt: &Stmt, level: usize, out: &mut String) -> Result<(), CoreError> {
        match stmt {
            Stmt::Expr(expr) => {
                let text = self.expr(expr, level)?;
                if text.starts_with('{') {
                    push_line(out, level, &format!("({text});"));
                } else {
                    push_line(out, level, &format!("{text};"));
                }
            }
            Stmt::Assign { target, op, value, ty } => {
                let line = self.assignment(target, *op, value, ty, level)?;
                push_line(out, level, &line);
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let text = self.if_chain(cond, then, otherwise.as_ref(), level)?;
                push_line(out, level, &text);
            }
            Stmt::While { cond, body } => {
                let cond = self.expr(cond, level)?;
                push_line(out, level, &format!("while ({cond}) {{"));
                self.scope(body, level + 1, out)?;
                push_line(out, level, "}");
            }
            Stmt::Block(body) => {
                push_line(out, level, "{");
                self.scope(body, level + 1, out)?;
                push_line(out, level, "}");
            }
            Stmt::Return(Some(value)) => {
                let value = self.expr(value, level)?;
                push_line(out, level, &format!("return {value};"));
            }
            Stmt::Return(None) => push_line(out, level, "return;"),
            Stmt::Break => push_line(out, level, "break;"),
            Stmt::Continue => push_line(out, level, "continue;"),
        }
        Ok(())
    }

    fn assignment(
        &self,
        target: &Expr,
        op: AssignOp,
        value: &Expr,
        ty: &Type,
        level: usize,
    ) -> Result<String, CoreError> {
        let value = match op {
            AssignOp::Set => self.value(value, ty, level)?,
            _ => format!("({})", self.expr(value, level)?),
        };
        if let Expr::Unary {
            op: UnaryOp::Deref,
            operand,
        } = target
        {
            let pointer = self.expr(operand, level)?;
            let stored = match op.binary() {
                None => value,
                Some(binary) => arithmetic(binary, ty, &format!("{pointer}.get()"), &value),
            };
            return Ok(format!("{pointer}.set({stored});"));
        }
        let place = self.expr(target, level)?;
        Ok(match op.binary() {
            Some(binary) if (binary == BinaryOp::Div && ty.is_integer()) || wraps(ty) => {
                format!("{place} = {};", arithmetic(binary, ty, &place, &value))
            }
            _ => format!("{place} {} {value};", op.symbol()),
        })
    }

    fn if_chain(
        &self,
        cond: &Expr,
        then: &ParseResult,
        otherwise: Option<&ParseResult>,
        level: usize,
    ) -> Result<String, CoreError> {
        let mut text = format!("if ({}) {{\n", self.expr(cond, level)?);
        self.scope(then, level + 1, &mut text)?;
        text.push_str(&indentation(level));
        text.push('}');
        if let Some(otherwise) = otherwise {
            if let [Item::Stmt(Stmt::If { cond, then, otherwise })] = otherwise.items.as_slice() {
                text.push_str(" else ");
                text.push_str(&self.if_chain(cond, then, otherwise.as_ref(), level)?);
            } else {
                text.push_str(" else {\n");
                self.scope(otherwise, level + 1, &mut text)?;
                text.push_str(&indentation(level));
                text.push('}');
            }
        }
        Ok(text)
    }

    fn expr(&self, expr: &Expr, level: usize) -> Result<String, CoreError> {
        let text = match expr {
            Expr::Int { value, .. } => value.to_string(),
            Expr::Float { text, .. } => text.clone(),
            Expr::Bool(value) => value.to_string(),
            Expr::Char(value) => value.to_string(),
            Expr::Str(text) => format!("({{ get: () => \"{text}\".charCodeAt(0) | 0 }})"),
            Expr::Input { slot } => format!("(input_slots[{slot}] | 0)"),
            Expr::ReadInt => "(input_slots[input_cursor++] | 0)".to_string(),
            Expr::Var(name) | Expr::Captured(name) | Expr::CapturedRef(name) => js_name(name),
            Expr::FunctionRef { binding, .. } => js_name(binding),
            Expr::Closure { symbol, .. } => {
                let function = self
                    .program
                    .function(symbol)
                    .ok_or_else(|| CoreError::undefined(symbol.as_str()))?;
                self.lambda(function, level)?
            }
            Expr::Call { callee, args, .. } => {
                let callee_text = self.expr(callee, level)?;
                let callee_text = match **callee {
                    Expr::Closure { .. } | Expr::StructLit { .. } => format!("({callee_text})"),
                    _ => callee_text,
                };
                let args: Result<Vec<String>, CoreError> = args.iter().map(|arg| self.expr(arg, level)).collect();
                format!("{callee_text}({})", args?.join(", "))
            }
            Expr::Field { base, field } => {
                let base_text = self.expr(base, level)?;
                match **base {
                    Expr::StructLit { .. } => format!("({base_text}).{}", js_name(field)),
                    _ => format!("{base_text}.{}", js_name(field)),
                }
            }
            Expr::Index { base, index } => {
                format!("{}[{}]", self.expr(base, level)?, self.expr(index, level)?)
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => format!(
                "({} ? {} : {})",
                self.expr(cond, level)?,
                self.expr(then, level)?,
                self.expr(otherwise, level)?
            ),
            Expr::Binary {
                op,
                lhs,
                rhs,
                operand,
            } => {
                let lhs = self.expr(lhs, level)?;
                let rhs = self.expr(rhs, level)?;
                match op {
                    BinaryOp::Eq => format!("{lhs} === {rhs}"),
                    BinaryOp::Ne => format!("{lhs} !== {rhs}"),
                    _ => arithmetic(*op, operand.as_ref().unwrap_or(&Type::F64), &lhs, &rhs),
                }
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => format!("!{}", self.expr(operand, level)?),
                UnaryOp::Neg => negate(&self.expr(operand, level)?),
                UnaryOp::Deref => format!("{}.get()", self.expr(operand, level)?),
                UnaryOp::AddrOf { .. } => self.address_of(operand, level)?,
            },
            Expr::Cast { expr, ty, from } => {
                let value = self.expr(expr, level)?;
                cast(&value, from.as_ref(), ty)
            }
            Expr::Paren(inner) => format!("({})", self.expr(inner, level)?),
            Expr::StructLit { name, values } => {
                let def = self
                    .program
                    .struct_def(name)
                    .ok_or_else(|| CoreError::undefined(name.as_str()))?;
                if def.fields.is_empty() {
                    "{}".to_string()
                } else {
                    let mut fields = Vec::new();
                    for (field, value) in def.fields.iter().zip(values) {
                        fields.push(format!("{}: {}", js_name(&field.name), self.value(value, &field.ty, level)?));
                    }
                    format!("{{ {} }}", fields.join(", "))
                }
            }
            Expr::ArrayLit(items) => {
                let items: Result<Vec<String>, CoreError> = items.iter().map(|item| self.expr(item, level)).collect();
                format!("[{}]", items?.join(", "))
            }
            Expr::EnumVariant { name, variant, .. } => format!("{}.{variant}", js_name(name)),
            Expr::This => {
                return Err(CoreError::structural("'this' reached the JavaScript emitter"));
            }
        };
        Ok(text)
    }

    /// A `{ get, set }` box over a place, or the pointer itself for `&*p`.
    fn address_of(&self, operand: &Expr, level: usize) -> Result<String, CoreError> {
        if let Expr::Unary {
            op: UnaryOp::Deref,
            operand: pointer,
        } = operand
        {
            return self.expr(pointer, level);
        }
        let place = self.expr(operand, level)?;
        Ok(format!(
            "({{ get: () => {place}, set: ($value) => {{ {place} = $value; }} }})"
        ))
    }

    fn lambda(&self, function: &Function, level: usize) -> Result<String, CoreError> {
        let params: Vec<String> = function.params.iter().map(|param| js_name(&param.name)).collect();
        let params = params.join(", ");
        if function.body.items.is_empty() {
            if let Some(tail) = &function.body.tail {
                let body = self.value(tail, &function.result, level)?;
                if body.starts_with('{') {
                    return Ok(format!("({params}) => ({body})"));
                }
                return Ok(format!("({params}) => {body}"));
            }
        }
        let mut out = format!("({params}) => {{\n");
        self.scope(&function.body, level + 1, &mut out)?;
        if let Some(tail) = &function.body.tail {
            let value = self.value(tail, &function.result, level + 1)?;
            if function.result.is_void() {
                push_line(&mut out, level + 1, &format!("{value};"));
            } else {
                push_line(&mut out, level + 1, &format!("return {value};"));
            }
        }
        out.push_str(&indentation(level));
        out.push('}');
        Ok(out)
    }
}

fn arithmetic(op: BinaryOp, operand: &Type, lhs: &str, rhs: &str) -> String {
    let text = match op {
        BinaryOp::Div if operand.is_integer() => format!("Math.trunc({lhs} / {rhs})"),
        _ => format!("{lhs} {} {rhs}", op.symbol()),
    };
    if op.is_arithmetic() && wraps(operand) {
        wrap(&format!("({text})"), operand)
    } else {
        text
    }
}

/// Integer types whose arithmetic results are wrapped to their width.
fn wraps(ty: &Type) -> bool {
    ty.is_narrow_integer() || *ty == Type::U32
}

/// Reduces a whole number to the range of integer type `ty`.
fn wrap(whole: &str, ty: &Type) -> String {
    match ty {
        Type::I8 => format!("({whole} << 24 >> 24)"),
        Type::I16 => format!("({whole} << 16 >> 16)"),
        Type::I32 => format!("({whole} | 0)"),
        Type::U8 => format!("({whole} & 0xFF)"),
        Type::U16 => format!("({whole} & 0xFFFF)"),
        Type::U32 => format!("({whole} >>> 0)"),
        _ => whole.to_string(),
    }
}

fn cast(value: &str, from: Option<&Type>, to: &Type) -> String {
    if !to.is_integer() {
        return match from {
            Some(Type::Bool) => format!("Number({value})"),
            _ => value.to_string(),
        };
    }
    let whole = match from {
        Some(ty) if ty.is_float() => format!("Math.trunc({value})"),
        Some(Type::Bool) => format!("Number({value})"),
        _ => format!("({value})"),
    };
    wrap(&whole, to)
}

#[cfg(test)]
mod tests {
    use crate::codegen::Target;
    use crate::compiler::compile;

    fn js(source: &str) -> String {
        compile(source, Target::Js).expect("compile should succeed")
    }

    #[test]
    fn sets_the_exit_code_from_the_tail() {
        let output = js("let x = 3; let mut y = x * 2; y + 1");
        assert!(output.starts_with("\"use strict\";\n"));
        assert!(output.contains("const x = 3;\nlet y = x * 2;\n"));
        assert!(output.contains("process.exitCode = Number(y + 1) & 255;"));
    }

    #[test]
    fn reads_input_from_stdin() {
        let output = js("extern fn readInt() : I32; readInt() + readInt()");
        assert!(output.contains("readFileSync(0, \"utf8\")"));
        assert!(output.contains("(input_slots[0] | 0) + (input_slots[1] | 0)"));
    }

    #[test]
    fn functions_are_arrows() {
        let output = js("fn get(x : I32) : I32 => x; get(7)");
        assert!(output.contains("const get = (x) => x;"));
        assert!(output.contains("Number(get(7))"));
    }

    #[test]
    fn block_bodies_return_their_tail() {
        let output = js("fn twice(x : I32) : I32 => { let y = x * 2; y }; twice(3)");
        assert!(output.contains("const twice = (x) => {\n    const y = x * 2;\n    return y;\n};"));
    }

    #[test]
    fn integer_division_truncates() {
        let output = js("let a = 7; let b = 2; a / b");
        assert!(output.contains("Math.trunc(a / b)"));
        let output = js("let a = 7.0; let b = 2.0; a / b");
        assert!(output.contains("a / b"));
        assert!(!output.contains("Math.trunc"));
    }

    #[test]
    fn equality_is_strict() {
        let output = js("let a = 1; a == 1");
        assert!(output.contains("a === 1"));
    }

    #[test]
    fn pointers_are_boxes() {
        let output = js("let mut x = 1; let p = &mut x; *p = 5; x");
        assert!(output.contains("const p = ({ get: () => x, set: ($value) => { x = $value; } });"));
        assert!(output.contains("p.set(5);"));
    }

    #[test]
    fn structs_are_object_literals() {
        let output = js("struct Point { x : I32, y : I32 } let p = Point { 1, 2 }; let q = p; q.y");
        assert!(output.contains("const p = { x: 1, y: 2 };"));
        assert!(output.contains("const q = { ...p };"));
    }

    #[test]
    fn enums_are_frozen_objects() {
        let output = js("enum State { Valid, Invalid } let s = State.Invalid; s == State.Valid");
        assert!(output.contains("const State = Object.freeze({ Valid: 0, Invalid: 1 });"));
        assert!(output.contains("s === State.Valid"));
    }

    #[test]
    fn casts_truncate() {
        let output = js("let f = 3.7; f as I32");
        assert!(output.contains("(Math.trunc(f) | 0)"));
    }

    #[test]
    fn escapes_reserved_names() {
        let output = js("let new = 3; new");
        assert!(output.contains("const _new = 3;"));
    }

    #[test]
    fn strings_dereference_to_their_first_byte() {
        let output = js("let s = \"abc\"; *s");
        assert!(output.contains("const s = ({ get: () => \"abc\".charCodeAt(0) | 0 });"));
        assert!(output.contains("process.exitCode = Number(s.get()) & 255;"));
    }

    #[test]
    fn narrow_arithmetic_wraps_to_its_width() {
        let output = js("let a = 200U8; let b = 100U8; (a + b) / 2");
        assert!(output.contains("((a + b) & 0xFF)"));
        assert!(output.contains("(Math.trunc((((a + b) & 0xFF)) / 2) & 0xFF)"));
        let output = js("let mut c = 250U8; c += 10U8; c");
        assert!(output.contains("c = ((c + (10)) & 0xFF);"));
    }

    #[test]
    fn compound_division_keeps_the_right_operand_together() {
        let output = js("let mut x = 20; let a = 2; x /= a + 3; x");
        assert!(output.contains("x = Math.trunc(x / (a + 3));"));
    }

    #[test]
    fn read_int_values_use_a_cursor() {
        let output = js("extern fn readInt() : I32; let first = readInt(); let f = readInt; first + f()");
        assert!(output.contains("let input_cursor = 1;"));
        assert!(output.contains("const f = () => (input_slots[input_cursor++] | 0);"));
    }

    #[test]
    fn inner_functions_assign_enclosing_bindings() {
        let output = js("extern fn readInt() : I32; let mut x = 0; fn inc() => x += readInt(); inc(); x");
        assert!(output.contains("let x = 0;"));
        assert!(output.contains("const inc = () => {\n    x += ((input_slots[0] | 0));\n};"));
    }

    #[test]
    fn block_values_assign_their_binding() {
        let output = js("let y = { let a = 1; a + 1 }; y");
        assert!(output.contains("let y;\n{\n    const a = 1;\n    y = a + 1;\n}\n"));
    }
}
