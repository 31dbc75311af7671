//! C emitter.
//!
//! Every function literal is lifted to a static C function taking an
//! environment pointer first. Function values are closures: a struct pairing
//! that pointer with the function, one typedef per distinct signature.
//! Literals that capture nothing use a null environment; capturing ones get
//! a heap-allocated environment built by a `make_` helper.
//!
//! Bindings are declared zero-initialized at the start of their scope and
//! assigned in source order. Arrays are copied with `memcpy`.

use crate::ast::{AssignOp, Expr, Function, Item, ParseResult, Program, Stmt, StructDef, UnaryOp};
use crate::codegen::{Emitter, indentation, negate, push_line, target_name};
use crate::error::CoreError;
use crate::types::Type;

const C_RESERVED: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while", "bool", "true", "false", "NULL", "main",
    "read_int", "scanf", "malloc", "memcpy", "env", "captured", "value",
];

/// Prefixes of names the emitter generates itself.
const C_RESERVED_PREFIXES: &[&str] = &[
    "input_slot_", "closure_", "invoke_", "make_", "env_", "build_", "int", "uint",
];

const READ_INT_HELPER: &str = "static int32_t read_int(void) {
    int32_t value = 0;
    if (scanf(\"%\" SCNd32, &value) != 1) {
        return 0;
    }
    return value;
}
";

fn c_name(name: &str) -> String {
    target_name(name, C_RESERVED, C_RESERVED_PREFIXES)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CEmitter;

impl Emitter for CEmitter {
    fn emit(&mut self, program: &Program) -> Result<String, CoreError> {
        CWriter {
            program,
            closures: Vec::new(),
            builders: Vec::new(),
            current: None,
        }
        .finish()
    }
}

/// A closure typedef and its call helper.
struct ClosureType {
    signature: Type,
    name: String,
    typedef: String,
    invoke: String,
}

struct CWriter<'p> {
    program: &'p Program,
    closures: Vec<ClosureType>,
    /// Structs built through a `build_` function because an array field is
    /// initialized from another array.
    builders: Vec<&'p StructDef>,
    /// Function whose body is being written, `None` inside `main`.
    current: Option<&'p Function>,
}

impl<'p> CWriter<'p> {
    fn finish(mut self) -> Result<String, CoreError> {
        let program = self.program;

        let mut structs = Vec::new();
        for def in &program.structs {
            structs.push(self.struct_definition(def));
        }
        let mut declarations = String::new();
        let mut definitions = String::new();
        for function in &program.functions {
            declarations.push_str(&self.function_declarations(function)?);
            definitions.push_str(&self.function_definition(function)?);
        }
        let main = self.main()?;
        let mut builders = Vec::new();
        for def in self.builders.clone() {
            builders.push(self.builder(def));
        }

        let mut out = String::new();
        for header in ["stdbool.h", "stdint.h", "inttypes.h", "stdio.h", "stdlib.h", "string.h"] {
            out.push_str(&format!("#include <{header}>\n"));
        }
        let slots = program.input_slots();
        if slots > 0 || program.reads_at_runtime() {
            out.push('\n');
            out.push_str(READ_INT_HELPER);
        }
        if !program.structs.is_empty() {
            out.push('\n');
            for def in &program.structs {
                let name = c_name(&def.name);
                out.push_str(&format!("typedef struct {name} {name};\n"));
            }
        }
        for def in &program.enums {
            out.push('\n');
            for (index, variant) in def.variants.iter().enumerate() {
                out.push_str(&format!("#define {}_{variant} {index}\n", c_name(&def.name)));
            }
        }
        for closure in &self.closures {
            out.push('\n');
            out.push_str(&closure.typedef);
        }
        for text in structs.iter().chain(&builders) {
            out.push('\n');
            out.push_str(text);
        }
        if slots > 0 {
            out.push('\n');
            for slot in 0..slots {
                out.push_str(&format!("static int32_t input_slot_{slot};\n"));
            }
        }
        for closure in &self.closures {
            out.push('\n');
            out.push_str(&closure.invoke);
        }
        if !declarations.is_empty() {
            out.push('\n');
            out.push_str(&declarations);
        }
        out.push_str(&definitions);
        out.push('\n');
        out.push_str(&main);
        Ok(out)
    }

    fn struct_definition(&mut self, def: &StructDef) -> String {
        let mut out = format!("struct {} {{\n", c_name(&def.name));
        if def.fields.is_empty() {
            push_line(&mut out, 1, "char unused;");
        }
        for field in &def.fields {
            let declaration = self.declare(&field.ty, &c_name(&field.name));
            push_line(&mut out, 1, &format!("{declaration};"));
        }
        out.push_str("};\n");
        out
    }

    /// `build_Name(fields..)`, for struct literals that copy arrays.
    fn builder(&mut self, def: &StructDef) -> String {
        let name = c_name(&def.name);
        let params: Vec<String> = def
            .fields
            .iter()
            .map(|field| self.declare(&field.ty, &c_name(&field.name)))
            .collect();
        let mut out = format!("static {name} build_{name}({}) {{\n", params.join(", "));
        push_line(&mut out, 1, &format!("{name} value;"));
        for field in &def.fields {
            let field_name = c_name(&field.name);
            let line = match field.ty {
                Type::Array { .. } => {
                    format!("memcpy(value.{field_name}, {field_name}, sizeof value.{field_name});")
                }
                _ => format!("value.{field_name} = {field_name};"),
            };
            push_line(&mut out, 1, &line);
        }
        push_line(&mut out, 1, "return value;");
        out.push_str("}\n");
        out
    }

    /// Environment struct, prototype and environment builder of a function.
    fn function_declarations(&mut self, function: &'p Function) -> Result<String, CoreError> {
        let symbol = c_name(&function.symbol);
        let mut out = String::new();
        if !function.captures.is_empty() {
            out.push_str("typedef struct {\n");
            for capture in &function.captures {
                let declaration = self.declare(&capture.slot_type(), &c_name(&capture.name));
                push_line(&mut out, 1, &format!("{declaration};"));
            }
            out.push_str(&format!("}} env_{symbol};\n"));
        }
        out.push_str(&format!("{};\n", self.function_head(function)));
        if !function.captures.is_empty() {
            let closure = self.closure_type(&function.signature());
            let params: Vec<String> = function
                .captures
                .iter()
                .map(|capture| self.declare(&capture.slot_type(), &c_name(&capture.name)))
                .collect();
            out.push_str(&format!(
                "static {closure} make_{symbol}({}) {{\n",
                params.join(", ")
            ));
            push_line(&mut out, 1, &format!("env_{symbol} *env = malloc(sizeof *env);"));
            for capture in &function.captures {
                let name = c_name(&capture.name);
                let line = match capture.slot_type() {
                    Type::Array { .. } => format!("memcpy(env->{name}, {name}, sizeof env->{name});"),
                    _ => format!("env->{name} = {name};"),
                };
                push_line(&mut out, 1, &line);
            }
            push_line(&mut out, 1, &format!("return ({closure}){{ env, {symbol} }};"));
            out.push_str("}\n");
        }
        out.push('\n');
        Ok(out)
    }

    fn function_head(&mut self, function: &Function) -> String {
        let mut params = vec!["void *env".to_string()];
        for param in &function.params {
            params.push(self.declare(&param.ty, &c_name(&param.name)));
        }
        let declarator = format!("{}({})", c_name(&function.symbol), params.join(", "));
        format!("static {}", self.declare(&function.result, &declarator))
    }

    fn function_definition(&mut self, function: &'p Function) -> Result<String, CoreError> {
        self.current = Some(function);
        let mut out = format!("{} {{\n", self.function_head(function));
        if !function.captures.is_empty() {
            push_line(
                &mut out,
                1,
                &format!("env_{} *captured = env;", c_name(&function.symbol)),
            );
        }
        self.scope(&function.body, 1, &mut out)?;
        if let Some(tail) = &function.body.tail {
            let value = self.expr(tail)?;
            if function.result.is_void() {
                push_line(&mut out, 1, &format!("{value};"));
            } else {
                push_line(&mut out, 1, &format!("return {value};"));
            }
        }
        out.push_str("}\n\n");
        self.current = None;
        Ok(out)
    }

    fn main(&mut self) -> Result<String, CoreError> {
        let program = self.program;
        let mut out = String::from("int main(void) {\n");
        for slot in 0..program.input_slots() {
            push_line(&mut out, 1, &format!("input_slot_{slot} = read_int();"));
        }
        self.scope(&program.main, 1, &mut out)?;
        match &program.main.tail {
            Some(tail) => {
                let value = self.expr(tail)?;
                push_line(&mut out, 1, &format!("return (int)(uint8_t)({value});"));
            }
            None => push_line(&mut out, 1, "return 0;"),
        }
        out.push_str("}\n");
        Ok(out)
    }

    fn scope(&mut self, body: &ParseResult, level: usize, out: &mut String) -> Result<(), CoreError> {
        for binding in body.bindings().filter(|binding| binding.alias.is_none()) {
            let declaration = self.declare(&binding.ty, &c_name(&binding.name));
            push_line(out, level, &format!("{declaration} = {};", zero_value(&binding.ty)));
        }
        for item in &body.items {
            match item {
                Item::Binding(binding) => {
                    if let (None, Some(init)) = (&binding.alias, &binding.init) {
                        let target = Expr::Var(binding.name.clone());
                        self.store(&target, &binding.ty, init, level, out)?;
                    }
                }
                Item::Stmt(stmt) => self.statement(stmt, level, out)?,
            }
        }
        Ok(())
    }

    fn store(
        &mut self,
        target: &Expr,
        ty: &Type,
        value: &Expr,
        level: usize,
        out: &mut String,
    ) -> Result<(), CoreError> {
        let place = self.expr(target)?;
        let line = match (ty, value) {
            (Type::Array { .. }, Expr::ArrayLit(_)) => format!(
                "memcpy({place}, ({}){}, sizeof({place}));",
                self.declare(ty, ""),
                self.expr(value)?
            ),
            (Type::Array { .. }, _) => format!("memcpy({place}, {}, sizeof({place}));", self.expr(value)?),
            _ => format!("{place} = {};", self.expr(value)?),
        };
        push_line(out, level, &line);
        Ok(())
    }

    fn statement(&mut self, stmt: &Stmt, level: usize, out: &mut String) -> Result<(), CoreError> {
        match stmt {
            Stmt::Expr(expr) => {
                let text = self.expr(expr)?;
                push_line(out, level, &format!("{text};"));
            }
            Stmt::Assign {
                target,
                op: AssignOp::Set,
                value,
                ty,
            } => self.store(target, ty, value, level, out)?,
            Stmt::Assign { target, op, value, .. } => {
                let line = format!("{} {} {};", self.expr(target)?, op.symbol(), self.expr(value)?);
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
                let cond = self.expr(cond)?;
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
                let value = self.expr(value)?;
                push_line(out, level, &format!("return {value};"));
            }
            Stmt::Return(None) => push_line(out, level, "return;"),
            Stmt::Break => push_line(out, level, "break;"),
            Stmt::Continue => push_line(out, level, "continue;"),
        }
        Ok(())
    }

    /// `if (..) { .. } else if (..) { .. } else { .. }` without the leading
    /// indentation and trailing newline.
    fn if_chain(
        &mut self,
        cond: &Expr,
        then: &ParseResult,
        otherwise: Option<&ParseResult>,
        level: usize,
    ) -> Result<String, CoreError> {
        let mut text = format!("if ({}) {{\n", self.expr(cond)?);
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

    fn expr(&mut self, expr: &Expr) -> Result<String, CoreError> {
        let text = match expr {
            Expr::Int { value, suffix } => int_literal(*value, suffix.as_ref()),
            Expr::Float { text, suffix } => float_literal(text, suffix.as_ref()),
            Expr::Bool(value) => value.to_string(),
            Expr::Char(value) => value.to_string(),
            Expr::Str(text) => format!("(uint8_t *)\"{text}\""),
            Expr::Input { slot } => format!("input_slot_{slot}"),
            Expr::ReadInt => "read_int()".to_string(),
            Expr::Var(name) => c_name(name),
            Expr::Captured(name) => format!("captured->{}", c_name(name)),
            Expr::CapturedRef(name) => format!("(*captured->{})", c_name(name)),
            Expr::FunctionRef { symbol, .. } => self.function_value(symbol)?,
            Expr::Closure { symbol, captures } if captures.is_empty() => self.function_value(symbol)?,
            Expr::Closure { symbol, captures } => {
                let values = self.exprs(captures)?;
                format!("make_{}({})", c_name(symbol), values.join(", "))
            }
            Expr::Call {
                callee,
                args,
                signature,
            } => self.call(callee, args, signature.as_ref())?,
            Expr::Field { base, field } => format!("{}.{}", self.expr(base)?, c_name(field)),
            Expr::Index { base, index } => format!("{}[{}]", self.expr(base)?, self.expr(index)?),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => format!(
                "({} ? {} : {})",
                self.expr(cond)?,
                self.expr(then)?,
                self.expr(otherwise)?
            ),
            Expr::Binary {
                op,
                lhs,
                rhs,
                operand,
            } => {
                let text = format!("{} {} {}", self.expr(lhs)?, op.symbol(), self.expr(rhs)?);
                match operand {
                    // narrow operands are promoted to int
                    Some(ty) if op.is_arithmetic() && ty.is_narrow_integer() => {
                        format!("(({})({text}))", self.declare(ty, ""))
                    }
                    _ => text,
                }
            }
            Expr::Unary { op, operand } => {
                let operand = self.expr(operand)?;
                match op {
                    UnaryOp::Not => format!("!{operand}"),
                    UnaryOp::Neg => negate(&operand),
                    UnaryOp::Deref => format!("*{operand}"),
                    UnaryOp::AddrOf { .. } => format!("&{operand}"),
                }
            }
            Expr::Cast { expr, ty, .. } => {
                format!("(({})({}))", self.declare(ty, ""), self.expr(expr)?)
            }
            Expr::Paren(inner) => format!("({})", self.expr(inner)?),
            Expr::StructLit { name, values } => self.struct_literal(name, values)?,
            Expr::ArrayLit(items) => format!("{{{}}}", self.exprs(items)?.join(", ")),
            Expr::EnumVariant { name, variant, .. } => format!("{}_{variant}", c_name(name)),
            Expr::This => {
                return Err(CoreError::structural("'this' reached the C emitter"));
            }
        };
        Ok(text)
    }

    fn exprs(&mut self, exprs: &[Expr]) -> Result<Vec<String>, CoreError> {
        exprs.iter().map(|expr| self.expr(expr)).collect()
    }

    fn lifted(&self, symbol: &str) -> Result<&'p Function, CoreError> {
        let program: &'p Program = self.program;
        program
            .function(symbol)
            .ok_or_else(|| CoreError::undefined(symbol))
    }

    /// Environment argument for a direct reference to a lifted function.
    fn environment(&self, function: &Function) -> Result<&'static str, CoreError> {
        if function.captures.is_empty() {
            Ok("NULL")
        } else if self
            .current
            .is_some_and(|current| current.symbol == function.symbol)
        {
            Ok("env")
        } else {
            Err(CoreError::structural(format!(
                "function '{}' needs its captured environment here",
                function.name
            )))
        }
    }

    fn function_value(&mut self, symbol: &str) -> Result<String, CoreError> {
        let function = self.lifted(symbol)?;
        let env = self.environment(function)?;
        let closure = self.closure_type(&function.signature());
        Ok(format!("(({closure}){{ {env}, {} }})", c_name(symbol)))
    }

    fn call(&mut self, callee: &Expr, args: &[Expr], signature: Option<&Type>) -> Result<String, CoreError> {
        let mut args = self.exprs(args)?;
        if let Expr::FunctionRef { symbol, .. } = callee {
            let function = self.lifted(symbol)?;
            args.insert(0, self.environment(function)?.to_string());
            return Ok(format!("{}({})", c_name(symbol), args.join(", ")));
        }
        let signature = signature.ok_or_else(|| CoreError::structural("call without a checked signature"))?;
        let closure = self.closure_type(signature);
        args.insert(0, self.expr(callee)?);
        Ok(format!("invoke_{closure}({})", args.join(", ")))
    }

    fn struct_literal(&mut self, name: &str, values: &[Expr]) -> Result<String, CoreError> {
        let program: &'p Program = self.program;
        let def = program
            .struct_def(name)
            .ok_or_else(|| CoreError::undefined(name))?;
        let type_name = c_name(name);
        if def.fields.is_empty() {
            return Ok(format!("(({type_name}){{ 0 }})"));
        }
        let copies_array = def
            .fields
            .iter()
            .zip(values)
            .any(|(field, value)| matches!(field.ty, Type::Array { .. }) && !matches!(value, Expr::ArrayLit(_)));
        if copies_array {
            if !self.builders.iter().any(|existing| existing.name == def.name) {
                self.builders.push(def);
            }
            let mut args = Vec::new();
            for (field, value) in def.fields.iter().zip(values) {
                args.push(match value {
                    Expr::ArrayLit(_) => format!("({}){}", self.declare(&field.ty, ""), self.expr(value)?),
                    _ => self.expr(value)?,
                });
            }
            return Ok(format!("build_{type_name}({})", args.join(", ")));
        }
        let mut fields = Vec::new();
        for (field, value) in def.fields.iter().zip(values) {
            fields.push(format!(".{} = {}", c_name(&field.name), self.expr(value)?));
        }
        Ok(format!("(({type_name}){{ {} }})", fields.join(", ")))
    }

    /// C declaration of `declarator` with type `ty`; an empty declarator
    /// gives the abstract type name.
    fn declare(&mut self, ty: &Type, declarator: &str) -> String {
        let base = match ty {
            Type::Pointer { pointee, .. } => {
                let inner = if matches!(**pointee, Type::Array { .. }) {
                    format!("(*{declarator})")
                } else {
                    format!("*{declarator}")
                };
                return self.declare(pointee, &inner);
            }
            Type::Array { element, dims } => {
                let suffix: String = dims.iter().map(|dim| format!("[{dim}]")).collect();
                return self.declare(element, &format!("{declarator}{suffix}"));
            }
            Type::Function { params, result } => self.closure_type_parts(params, result),
            Type::Struct(name) => c_name(name),
            Type::Enum(_) | Type::I32 => "int32_t".to_string(),
            Type::I8 => "int8_t".to_string(),
            Type::I16 => "int16_t".to_string(),
            Type::I64 => "int64_t".to_string(),
            Type::U8 => "uint8_t".to_string(),
            Type::U16 => "uint16_t".to_string(),
            Type::U32 => "uint32_t".to_string(),
            Type::U64 => "uint64_t".to_string(),
            Type::F32 => "float".to_string(),
            Type::F64 => "double".to_string(),
            Type::Bool => "bool".to_string(),
            Type::Void => "void".to_string(),
        };
        if declarator.is_empty() {
            base
        } else {
            format!("{base} {declarator}")
        }
    }

    fn closure_type(&mut self, signature: &Type) -> String {
        match signature {
            Type::Function { params, result } => self.closure_type_parts(params, result),
            other => self.declare(other, ""),
        }
    }

    /// Name of the closure typedef for a signature, creating it on first use.
    fn closure_type_parts(&mut self, params: &[Type], result: &Type) -> String {
        let signature = Type::function(params.to_vec(), result.clone());
        if let Some(existing) = self.closures.iter().find(|closure| closure.signature == signature) {
            return existing.name.clone();
        }

        let mut call_params = vec!["void *".to_string()];
        let mut helper_args = vec!["closure.env".to_string()];
        let mut helper_params = Vec::new();
        for (index, param) in params.iter().enumerate() {
            call_params.push(self.declare(param, ""));
            helper_params.push(self.declare(param, &format!("arg{index}")));
            helper_args.push(format!("arg{index}"));
        }
        let call = self.declare(result, &format!("(*call)({})", call_params.join(", ")));

        let name = format!("closure_{}", self.closures.len());
        let typedef = format!("typedef struct {{\n    void *env;\n    {call};\n}} {name};\n");
        helper_params.insert(0, format!("{name} closure"));
        let head = self.declare(result, &format!("invoke_{name}({})", helper_params.join(", ")));
        let call_expr = format!("closure.call({})", helper_args.join(", "));
        let body = if result.is_void() {
            format!("{call_expr};")
        } else {
            format!("return {call_expr};")
        };
        let invoke = format!("static {head} {{\n    {body}\n}}\n");

        self.closures.push(ClosureType {
            signature,
            name: name.clone(),
            typedef,
            invoke,
        });
        name
    }
}

fn zero_value(ty: &Type) -> &'static str {
    if ty.is_scalar() { "0" } else { "{0}" }
}

fn int_literal(value: i128, suffix: Option<&Type>) -> String {
    match suffix {
        Some(Type::I64) => format!("INT64_C({value})"),
        Some(Type::U64) => format!("UINT64_C({value})"),
        Some(Type::U32) => format!("{value}u"),
        _ => value.to_string(),
    }
}

fn float_literal(text: &str, suffix: Option<&Type>) -> String {
    let mut literal = text.to_string();
    if !literal.contains('.') {
        literal.push_str(".0");
    }
    if suffix == Some(&Type::F32) {
        literal.push('f');
    }
    literal
}

#[cfg(test)]
mod tests {
    use crate::codegen::Target;
    use crate::compiler::compile;

    fn c(source: &str) -> String {
        compile(source, Target::C).expect("compile should succeed")
    }

    #[test]
    fn returns_the_tail_truncated_to_a_byte() {
        let output = c("let x = 3; let y = x * 2; y + 1");
        assert!(output.contains("int main(void) {"));
        assert!(output.contains("    int32_t x = 0;\n    int32_t y = 0;\n    x = 3;\n    y = x * 2;"));
        assert!(output.contains("return (int)(uint8_t)(y + 1);"));
    }

    #[test]
    fn reads_input_slots_before_anything_else() {
        let output = c("extern fn readInt() : I32; readInt() + readInt()");
        assert!(output.contains("static int32_t read_int(void)"));
        assert!(output.contains("static int32_t input_slot_1;"));
        let first_read = output.find("input_slot_0 = read_int();").expect("first read");
        let second_read = output.find("input_slot_1 = read_int();").expect("second read");
        assert!(first_read < second_read);
        assert!(output.contains("return (int)(uint8_t)(input_slot_0 + input_slot_1);"));
    }

    #[test]
    fn lifts_functions_and_calls_them_directly() {
        let output = c("fn get(x : I32) : I32 => x; get(7)");
        assert!(output.contains("static int32_t get(void *env, int32_t x);"));
        assert!(output.contains("return x;"));
        assert!(output.contains("get(NULL, 7)"));
    }

    #[test]
    fn capturing_functions_get_an_environment() {
        let output = c("let base = 40; fn add(x : I32) => base + x; add(2)");
        assert!(output.contains("} env_add;"));
        assert!(output.contains("make_add(int32_t base)"));
        assert!(output.contains("env_add *captured = env;"));
        assert!(output.contains("return captured->base + x;"));
        assert!(output.contains("add = make_add(base);"));
        assert!(output.contains("invoke_closure_0(add, 2)"));
    }

    #[test]
    fn structs_become_typedefs_and_compound_literals() {
        let output = c("struct Point { x : I32, y : I32 } let p = Point { 1, 2 }; p.y");
        assert!(output.contains("typedef struct Point Point;"));
        assert!(output.contains("struct Point {\n    int32_t x;\n    int32_t y;\n};"));
        assert!(output.contains("p = ((Point){ .x = 1, .y = 2 });"));
    }

    #[test]
    fn arrays_are_copied_with_memcpy() {
        let output = c("let a = [1, 2, 3]; let b = a; b[1]");
        assert!(output.contains("int32_t a[3] = {0};"));
        assert!(output.contains("memcpy(a, (int32_t [3]){1, 2, 3}, sizeof(a));"));
        assert!(output.contains("memcpy(b, a, sizeof(b));"));
    }

    #[test]
    fn function_typed_parameters_use_closure_typedefs() {
        let output = c("fn apply(f : (I32) => I32, v : I32) : I32 => f(v); fn twice(x : I32) => x * 2; apply(twice, 4)");
        assert!(output.contains("typedef struct {\n    void *env;\n    int32_t (*call)(void *, int32_t);\n} closure_0;"));
        assert!(output.contains("static int32_t apply(void *env, closure_0 f, int32_t v);"));
        assert!(output.contains("apply(NULL, ((closure_0){ NULL, twice }), 4)"));
    }

    #[test]
    fn enums_are_defines() {
        let output = c("enum State { Valid, Invalid } let s = State.Invalid; s == State.Valid");
        assert!(output.contains("#define State_Valid 0\n#define State_Invalid 1"));
        assert!(output.contains("int32_t s = 0;"));
    }

    #[test]
    fn pointers_use_declarator_syntax() {
        let output = c("let mut x = 1; let p = &mut x; *p = 5; x");
        assert!(output.contains("int32_t *p = 0;"));
        assert!(output.contains("p = &x;"));
        assert!(output.contains("*p = 5;"));
    }

    #[test]
    fn renders_else_if_chains() {
        let output = c("let mut r = 0; if (r == 1) { r = 2; } else if (r == 0) { r = 3; } else { r = 4; } r");
        assert!(output.contains("if (r == 1) {\n        r = 2;\n    } else if (r == 0) {"));
    }

    #[test]
    fn escapes_reserved_names() {
        let output = c("let int = 3; int");
        assert!(output.contains("int32_t _int = 0;"));
    }

    #[test]
    fn mutable_captures_hold_addresses() {
        let output = c("extern fn readInt() : I32; let mut x = 0; fn inc() => x += readInt(); inc(); x");
        assert!(output.contains("    int32_t *x;\n} env_inc;"));
        assert!(output.contains("make_inc(int32_t *x)"));
        assert!(output.contains("static void inc(void *env) {"));
        assert!(output.contains("(*captured->x) += input_slot_0;"));
        assert!(output.contains("inc = make_inc(&x);"));
    }

    #[test]
    fn block_values_assign_their_binding() {
        let output = c("let y = { let a = 1; a + 1 }; y");
        assert!(output.contains("    int32_t y = 0;\n    {\n        int32_t a = 0;\n        a = 1;\n        y = a + 1;\n    }"));
        assert!(output.contains("return (int)(uint8_t)(y);"));
    }

    #[test]
    fn read_int_values_read_at_run_time() {
        let output = c("extern fn readInt() : I32; let func : () => I32 = readInt; func()");
        assert!(output.contains("static int32_t read_int(void)"));
        assert!(output.contains("static int32_t readInt(void *env) {\n    return read_int();\n}"));
        assert!(output.contains("return (int)(uint8_t)(readInt(NULL));"));
        assert!(!output.contains("input_slot_"));
    }

    #[test]
    fn narrow_arithmetic_wraps_to_its_width() {
        let output = c("let a = 200U8; let b = 100U8; (a + b) / 2");
        assert!(output.contains("((uint8_t)(a + b))"));
        assert!(output.contains("((uint8_t)((((uint8_t)(a + b))) / 2))"));
        let wide = c("let a = 7; let b = 2; a / b");
        assert!(wide.contains("return (int)(uint8_t)(a / b);"));
    }
}
