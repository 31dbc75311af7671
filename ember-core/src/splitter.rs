//! Nesting-aware scanning shared by every routine that splits source text.
//!
//! Braces, parentheses, brackets, quoted literals and `//` comments are
//! opaque to splitting: a separator only counts when it appears in code at
//! nesting depth zero. Every statement, argument and operator search in the
//! compiler goes through [`BalancedScanner`] instead of keeping its own
//! counters.

use crate::error::CoreError;

/// Words that can never name a binding, field or type.
pub const KEYWORDS: &[&str] = &[
    "let", "mut", "fn", "struct", "enum", "if", "else", "while", "return", "break", "continue",
    "true", "false", "this", "as",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Code,
    Literal,
    Comment,
}

/// One byte as seen by the scanner.
///
/// `depth` is the nesting depth *before* the byte was consumed, so an
/// opener at the top level reports zero and its matching closer reports one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub index: usize,
    pub byte: u8,
    pub depth: usize,
    pub kind: StepKind,
}

impl Step {
    pub fn is_top_level(&self) -> bool {
        self.kind == StepKind::Code && self.depth == 0
    }

    /// True for the closer that brings nesting back to depth zero.
    pub fn closes_top_level(&self) -> bool {
        self.kind == StepKind::Code && self.depth == 1 && matches!(self.byte, b')' | b']' | b'}')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    Literal(u8),
    Comment,
}

/// Cursor over source bytes with a stack of open delimiters and a
/// literal/comment mode.
#[derive(Debug)]
pub struct BalancedScanner<'a> {
    bytes: &'a [u8],
    cursor: usize,
    openers: Vec<(u8, usize)>,
    mode: Mode,
    literal_start: usize,
}

impl<'a> BalancedScanner<'a> {
    pub fn new(text: &'a str) -> Self {
        BalancedScanner {
            bytes: text.as_bytes(),
            cursor: 0,
            openers: Vec::new(),
            mode: Mode::Code,
            literal_start: 0,
        }
    }

    /// Consume one byte. Fails on a closer that does not match the
    /// innermost open delimiter.
    pub fn next_step(&mut self) -> Result<Option<Step>, CoreError> {
        let Some(&byte) = self.bytes.get(self.cursor) else {
            return Ok(None);
        };
        let index = self.cursor;
        let depth = self.openers.len();
        self.cursor += 1;

        let kind = match self.mode {
            Mode::Comment => {
                if byte == b'\n' {
                    self.mode = Mode::Code;
                }
                StepKind::Comment
            }
            Mode::Literal(quote) => {
                if byte == b'\\' {
                    // the escaped byte never closes the literal
                    self.cursor += 1;
                } else if byte == quote {
                    self.mode = Mode::Code;
                }
                StepKind::Literal
            }
            Mode::Code => match byte {
                b'"' | b'\'' => {
                    self.mode = Mode::Literal(byte);
                    self.literal_start = index;
                    StepKind::Literal
                }
                b'/' if self.bytes.get(self.cursor) == Some(&b'/') => {
                    self.mode = Mode::Comment;
                    StepKind::Comment
                }
                b'(' | b'[' | b'{' => {
                    self.openers.push((byte, index));
                    StepKind::Code
                }
                b')' | b']' | b'}' => {
                    match self.openers.pop() {
                        Some((open, _)) if closer_of(open) == byte => {}
                        Some((open, at)) => {
                            return Err(CoreError::structural(format!(
                                "mismatched '{}' at byte {index}: '{}' opened at byte {at} expects '{}'",
                                byte as char,
                                open as char,
                                closer_of(open) as char,
                            )));
                        }
                        None => {
                            return Err(CoreError::structural(format!(
                                "unexpected '{}' at byte {index}",
                                byte as char
                            )));
                        }
                    }
                    StepKind::Code
                }
                _ => StepKind::Code,
            },
        };

        Ok(Some(Step {
            index,
            byte,
            depth,
            kind,
        }))
    }

    pub fn in_literal(&self) -> bool {
        matches!(self.mode, Mode::Literal(_))
    }

    /// Checks that every delimiter and literal opened so far was closed.
    pub fn finish(&self) -> Result<(), CoreError> {
        if let Mode::Literal(quote) = self.mode {
            return Err(CoreError::structural(format!(
                "unterminated {} literal starting at byte {}",
                if quote == b'"' { "string" } else { "char" },
                self.literal_start
            )));
        }
        if let Some((open, at)) = self.openers.last() {
            return Err(CoreError::structural(format!(
                "unclosed '{}' opened at byte {at}",
                *open as char
            )));
        }
        Ok(())
    }
}

fn closer_of(open: u8) -> u8 {
    match open {
        b'(' => b')',
        b'[' => b']',
        _ => b'}',
    }
}

/// A statement-level piece of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: &'a str,
    /// False only for a trailing piece that had no `;` and did not end a
    /// block statement.
    pub terminated: bool,
}

/// Splits a scope body into statements.
///
/// Besides `;`, a statement that starts with `fn`, `struct`, `enum`, `if`,
/// `while` or `{` ends at its top-level closing brace unless that brace is
/// followed by `;`, `else`, or the end of the text.
pub fn split_statements(text: &str) -> Result<Vec<Segment<'_>>, CoreError> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut scanner = BalancedScanner::new(text);

    while let Some(step) = scanner.next_step()? {
        if step.is_top_level() && step.byte == b';' {
            push_segment(&mut segments, &text[start..step.index], true);
            start = step.index + 1;
        } else if step.closes_top_level() && step.byte == b'}' {
            let head = text[start..step.index].trim_start();
            if starts_block_statement(head) && !continues_after_block(&text[step.index + 1..]) {
                push_segment(&mut segments, &text[start..=step.index], true);
                start = step.index + 1;
            }
        }
    }
    scanner.finish()?;
    push_segment(&mut segments, &text[start..], false);
    Ok(segments)
}

fn push_segment<'a>(segments: &mut Vec<Segment<'a>>, raw: &'a str, terminated: bool) {
    let text = raw.trim();
    if !text.is_empty() {
        segments.push(Segment { text, terminated });
    }
}

fn starts_block_statement(head: &str) -> bool {
    head.starts_with('{')
        || ["fn", "struct", "enum", "if", "while"]
            .iter()
            .any(|keyword| starts_with_word(head, keyword))
}

fn continues_after_block(rest: &str) -> bool {
    let rest = rest.trim_start();
    rest.is_empty() || rest.starts_with(';') || starts_with_word(rest, "else")
}

/// Marks the bytes that are code at nesting depth zero.
///
/// Type-argument lists such as `Wrapper<I32>` are masked out as well, so
/// their angle brackets and commas are never taken for operators.
pub fn top_level_mask(text: &str) -> Result<Vec<bool>, CoreError> {
    let bytes = text.as_bytes();
    let mut mask = vec![false; bytes.len()];
    let mut scanner = BalancedScanner::new(text);
    while let Some(step) = scanner.next_step()? {
        if step.is_top_level() {
            mask[step.index] = true;
        }
    }
    scanner.finish()?;

    let mut index = 0;
    while index < bytes.len() {
        if mask[index] && bytes[index] == b'<' && opens_type_arguments(bytes, index) {
            if let Some(close) = type_arguments_end(bytes, &mask, index) {
                mask[index..=close].iter_mut().for_each(|slot| *slot = false);
                index = close;
            }
        }
        index += 1;
    }
    Ok(mask)
}

fn opens_type_arguments(bytes: &[u8], index: usize) -> bool {
    index > 0
        && is_ident_byte(bytes[index - 1])
        && bytes
            .get(index + 1)
            .is_some_and(|next| next.is_ascii_uppercase() || matches!(next, b'*' | b'['))
}

fn type_arguments_end(bytes: &[u8], mask: &[bool], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for index in open..bytes.len() {
        if !mask[index] {
            continue;
        }
        match bytes[index] {
            b'<' => depth += 1,
            b'>' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            b';' | b'=' | b'|' | b'&' => return None,
            _ => {}
        }
    }
    None
}

/// Splits on a separator byte that appears at the top level. Pieces are
/// trimmed; the result always holds at least one (possibly empty) piece.
pub fn split_top_level(text: &str, separator: u8) -> Result<Vec<&str>, CoreError> {
    let mask = top_level_mask(text)?;
    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, byte) in text.bytes().enumerate() {
        if byte == separator && mask[index] {
            pieces.push(text[start..index].trim());
            start = index + 1;
        }
    }
    pieces.push(text[start..].trim());
    Ok(pieces)
}

/// Splits a call argument list or array element list on top-level commas.
/// A single trailing comma is accepted.
pub fn split_arguments(text: &str) -> Result<Vec<&str>, CoreError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut pieces = split_top_level(text, b',')?;
    if pieces.len() > 1 && pieces.last().is_some_and(|piece| piece.is_empty()) {
        pieces.pop();
    }
    if pieces.iter().any(|piece| piece.is_empty()) {
        return Err(CoreError::structural(format!("empty element in '{}'", text.trim())));
    }
    Ok(pieces)
}

/// Index of the delimiter closing the one at `open`.
pub fn find_matching(text: &str, open: usize) -> Result<usize, CoreError> {
    let mut scanner = BalancedScanner::new(&text[open..]);
    while let Some(step) = scanner.next_step()? {
        if step.closes_top_level() {
            return Ok(open + step.index);
        }
    }
    Err(CoreError::structural(format!(
        "unclosed '{}' in '{}'",
        text.as_bytes()[open] as char,
        text.trim()
    )))
}

/// Index of the opener whose group closes exactly at the end of `text`.
pub fn trailing_group(text: &str) -> Result<Option<usize>, CoreError> {
    let mut scanner = BalancedScanner::new(text);
    let mut opener = None;
    let mut group = None;
    while let Some(step) = scanner.next_step()? {
        if step.is_top_level() && matches!(step.byte, b'(' | b'[' | b'{') {
            opener = Some(step.index);
        }
        if step.closes_top_level() {
            group = if step.index + 1 == text.len() { opener } else { None };
        }
    }
    scanner.finish()?;
    Ok(group)
}

/// Position of the first top-level occurrence of `pattern`.
pub fn find_top_level(text: &str, pattern: &str) -> Result<Option<usize>, CoreError> {
    let mask = top_level_mask(text)?;
    let bytes = text.as_bytes();
    Ok((0..bytes.len()).find(|&index| mask[index] && bytes[index..].starts_with(pattern.as_bytes())))
}

/// Position of the last top-level occurrence of `word` as a whole word.
pub fn rfind_top_level_word(text: &str, word: &str) -> Result<Option<usize>, CoreError> {
    let mask = top_level_mask(text)?;
    let bytes = text.as_bytes();
    Ok((0..bytes.len()).rev().find(|&index| {
        mask[index]
            && (index == 0 || !is_ident_byte(bytes[index - 1]))
            && bytes[index..].starts_with(word.as_bytes())
            && bytes
                .get(index + word.len())
                .is_none_or(|next| !is_ident_byte(*next))
    }))
}

/// Removes `//` comments, keeping line breaks. Also rejects unbalanced
/// nesting and unterminated literals anywhere in the source.
pub fn strip_comments(text: &str) -> Result<String, CoreError> {
    let mut kept = Vec::with_capacity(text.len());
    let mut scanner = BalancedScanner::new(text);
    let mut last = 0;
    while let Some(step) = scanner.next_step()? {
        // escaped bytes inside literals are skipped by the scanner
        kept.extend_from_slice(&text.as_bytes()[last..step.index]);
        if step.kind != StepKind::Comment || step.byte == b'\n' {
            kept.push(step.byte);
        }
        last = step.index + 1;
    }
    scanner.finish()?;
    if last < text.len() {
        kept.extend_from_slice(&text.as_bytes()[last..]);
    }
    String::from_utf8(kept).map_err(|_| CoreError::structural("source is not valid UTF-8"))
}

pub fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// True for a non-keyword identifier.
pub fn is_identifier(text: &str) -> bool {
    let mut bytes = text.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_alphabetic() || first == b'_' => {}
        _ => return false,
    }
    bytes.all(is_ident_byte) && !KEYWORDS.contains(&text)
}

/// True when `text` starts with `word` followed by a non-identifier byte.
pub fn starts_with_word(text: &str, word: &str) -> bool {
    text.starts_with(word)
        && text
            .as_bytes()
            .get(word.len())
            .is_none_or(|next| !is_ident_byte(*next))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(source: &str) -> Vec<&str> {
        split_statements(source)
            .expect("split")
            .into_iter()
            .map(|segment| segment.text)
            .collect()
    }

    #[test]
    fn splits_on_top_level_terminators() {
        assert_eq!(texts("let x = 1; let y = { 2; 3 }; x"), vec!["let x = 1", "let y = { 2; 3 }", "x"]);
    }

    #[test]
    fn keeps_trailing_segment_unterminated() {
        let segments = split_statements("let x = 1; x + 1").expect("split");
        assert!(segments[0].terminated);
        assert!(!segments[1].terminated);
    }

    #[test]
    fn ends_block_statements_at_closing_brace() {
        assert_eq!(
            texts("struct Wrapper {field : I32} let w = Wrapper {1}; w.field"),
            vec!["struct Wrapper {field : I32}", "let w = Wrapper {1}", "w.field"]
        );
        assert_eq!(
            texts("if (true) { x = 1; } else { x = 2; } x"),
            vec!["if (true) { x = 1; } else { x = 2; }", "x"]
        );
    }

    #[test]
    fn final_block_stays_unterminated() {
        let segments = split_statements("fn get() => { 5 }").expect("split");
        assert_eq!(segments.len(), 1);
        assert!(!segments[0].terminated);
    }

    #[test]
    fn literals_and_comments_are_opaque() {
        assert_eq!(texts("let s = \"a;b\"; s"), vec!["let s = \"a;b\"", "s"]);
        assert_eq!(texts("let c = '\\''; c"), vec!["let c = '\\''", "c"]);
        let stripped = strip_comments("let x = 1; // trailing; comment\nx").expect("strip");
        assert_eq!(texts(&stripped), vec!["let x = 1", "x"]);
    }

    #[test]
    fn rejects_unbalanced_nesting() {
        assert!(matches!(split_statements("{ let x = 1;"), Err(CoreError::Structural(_))));
        assert!(matches!(split_statements("let x = (1]"), Err(CoreError::Structural(_))));
        assert!(matches!(split_statements("x }"), Err(CoreError::Structural(_))));
        assert!(matches!(split_statements("let s = \"open"), Err(CoreError::Structural(_))));
    }

    #[test]
    fn splits_arguments_around_nested_groups() {
        let args = split_arguments("a, f(b, c), [1, 2], Pair<I32, I32> { 1, 2 }").expect("split");
        assert_eq!(args, vec!["a", "f(b, c)", "[1, 2]", "Pair<I32, I32> { 1, 2 }"]);
        assert!(split_arguments("  ").expect("split").is_empty());
        assert!(split_arguments("a,,b").is_err());
    }

    #[test]
    fn masks_type_arguments_but_not_comparisons() {
        let mask = top_level_mask("a < b").expect("mask");
        assert!(mask[2]);
        let mask = top_level_mask("Wrapper<I32> { 1 }").expect("mask");
        assert!(!mask[7]);
    }

    #[test]
    fn finds_matching_and_trailing_groups() {
        assert_eq!(find_matching("(a, (b))", 0).expect("match"), 7);
        assert_eq!(trailing_group("f(a)(b)").expect("group"), Some(4));
        assert_eq!(trailing_group("(a) + b").expect("group"), None);
    }

    #[test]
    fn recognizes_identifiers() {
        assert!(is_identifier("value_1"));
        assert!(!is_identifier("1value"));
        assert!(!is_identifier("let"));
        assert!(starts_with_word("if (x)", "if"));
        assert!(!starts_with_word("iffy", "if"));
    }
}
