//! Intrinsic functions and the prelude that enables them.
//!
//! The only intrinsic is `readInt`, which reads one integer from standard
//! input. It is available only when the program starts with its prelude
//! declaration; emitters map each call site to one input slot that is read
//! before any other code runs.

use crate::types::Type;

/// Metadata about a single intrinsic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrinsicDescriptor {
    /// Name at the Ember level.
    pub name: &'static str,
    /// Accepted declarations, compared with all whitespace removed.
    pub preludes: &'static [&'static str],
}

impl IntrinsicDescriptor {
    pub fn result(&self) -> Type {
        Type::I32
    }
}

pub const READ_INT: &str = "readInt";

/// The complete list of intrinsics known to the compiler.
pub const INTRINSICS: &[IntrinsicDescriptor] = &[IntrinsicDescriptor {
    name: READ_INT,
    preludes: &["externfnreadInt():I32;", "intrinsicfnreadInt():I32;"],
}];

/// Look up an intrinsic by name.
pub fn find_intrinsic(name: &str) -> Option<&'static IntrinsicDescriptor> {
    INTRINSICS.iter().find(|intrinsic| intrinsic.name == name)
}

/// Strips a leading intrinsic prelude.
///
/// Returns whether a prelude was found and the remaining source. Whitespace
/// inside the prelude is not significant.
pub fn strip_prelude(source: &str) -> (bool, &str) {
    let trimmed = source.trim_start();
    for intrinsic in INTRINSICS {
        for prelude in intrinsic.preludes {
            if let Some(rest) = strip_ignoring_whitespace(trimmed, prelude) {
                return (true, rest);
            }
        }
    }
    (false, source)
}

fn strip_ignoring_whitespace<'a>(text: &'a str, compact: &str) -> Option<&'a str> {
    let mut expected = compact.bytes().peekable();
    for (index, byte) in text.bytes().enumerate() {
        if expected.peek().is_none() {
            return Some(&text[index..]);
        }
        if byte.is_ascii_whitespace() {
            continue;
        }
        if expected.next() != Some(byte) {
            return None;
        }
    }
    expected.peek().is_none().then_some("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_both_prelude_spellings() {
        let (enabled, rest) = strip_prelude("extern fn readInt() : I32; readInt()");
        assert!(enabled);
        assert_eq!(rest.trim(), "readInt()");

        let (enabled, rest) = strip_prelude("intrinsic   fn readInt ( ) :I32 ;\nreadInt()");
        assert!(enabled);
        assert_eq!(rest.trim(), "readInt()");
    }

    #[test]
    fn leaves_source_without_prelude_untouched() {
        let (enabled, rest) = strip_prelude("let x = 5; x");
        assert!(!enabled);
        assert_eq!(rest, "let x = 5; x");
    }

    #[test]
    fn finds_read_int() {
        let intrinsic = find_intrinsic("readInt").expect("intrinsic");
        assert_eq!(intrinsic.result(), Type::I32);
        assert!(find_intrinsic("print").is_none());
    }
}
