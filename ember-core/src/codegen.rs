//! Back-end selection and helpers shared by the emitters.

use std::fmt;

use crate::ast::Program;
use crate::codegen_c::CEmitter;
use crate::codegen_js::JsEmitter;
use crate::error::CoreError;

/// Output language of a compilation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Target {
    #[default]
    C,
    Js,
}

impl Target {
    pub fn name(self) -> &'static str {
        match self {
            Target::C => "c",
            Target::Js => "js",
        }
    }

    pub fn from_name(name: &str) -> Option<Target> {
        match name {
            "c" => Some(Target::C),
            "js" => Some(Target::Js),
            _ => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Renders a checked program as target source text.
pub trait Emitter {
    fn emit(&mut self, program: &Program) -> Result<String, CoreError>;
}

pub fn emit(target: Target, program: &Program) -> Result<String, CoreError> {
    match target {
        Target::C => CEmitter.emit(program),
        Target::Js => JsEmitter.emit(program),
    }
}

/// Maps an Ember name onto a target identifier, prefixing names that the
/// target reserves.
pub(crate) fn target_name(name: &str, reserved: &[&str], reserved_prefixes: &[&str]) -> String {
    if reserved.contains(&name) || reserved_prefixes.iter().any(|prefix| name.starts_with(prefix)) {
        format!("_{name}")
    } else {
        name.to_string()
    }
}

pub(crate) fn push_line(out: &mut String, level: usize, text: &str) {
    for _ in 0..level {
        out.push_str("    ");
    }
    out.push_str(text);
    out.push('\n');
}

pub(crate) fn indentation(level: usize) -> String {
    "    ".repeat(level)
}

/// `-` in front of an operand, keeping `- -x` from turning into `--x`.
pub(crate) fn negate(operand: &str) -> String {
    if operand.starts_with('-') {
        format!("-({operand})")
    } else {
        format!("-{operand}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_target_names() {
        assert_eq!(Target::from_name("c"), Some(Target::C));
        assert_eq!(Target::from_name("js"), Some(Target::Js));
        assert_eq!(Target::from_name("wasm"), None);
        assert_eq!(Target::Js.to_string(), "js");
    }

    #[test]
    fn prefixes_reserved_names() {
        assert_eq!(target_name("int", &["int"], &[]), "_int");
        assert_eq!(target_name("input_slot_0", &[], &["input_slot_"]), "_input_slot_0");
        assert_eq!(target_name("value", &["int"], &["input_slot_"]), "value");
    }
}
