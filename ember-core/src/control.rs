//! Shapes of `if`, `while` and assignment statements.
//!
//! These helpers only cut text apart; the compiler decides what the pieces
//! mean.

use crate::ast::AssignOp;
use crate::error::CoreError;
use crate::splitter::{find_matching, is_ident_byte, split_statements, starts_with_word, top_level_mask};

/// `if (cond) then [else otherwise]`, where `otherwise` is either a braced
/// block or another `if`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfChain<'a> {
    pub cond: &'a str,
    pub then: &'a str,
    pub otherwise: Option<&'a str>,
}

pub fn parse_if(text: &str) -> Result<IfChain<'_>, CoreError> {
    let (cond, after) = parenthesized_condition(text, "if")?;
    let (then, otherwise) = match find_else(after)? {
        Some(at) => (after[..at].trim(), Some(after[at + 4..].trim())),
        None => (after.trim(), None),
    };
    if then.is_empty() {
        return Err(CoreError::structural(format!("'if' without a body: '{text}'")));
    }
    if otherwise == Some("") {
        return Err(CoreError::structural(format!("'else' without a body: '{text}'")));
    }
    Ok(IfChain { cond, then, otherwise })
}

/// Splits `while (cond) { body }` into the condition and the body inside
/// the braces.
pub fn parse_while(text: &str) -> Result<(&str, &str), CoreError> {
    let (cond, after) = parenthesized_condition(text, "while")?;
    Ok((cond, braced_body(after.trim(), "while")?))
}

/// Contents of a `{ .. }` body that must span all of `text`.
pub fn braced_body<'a>(text: &'a str, owner: &str) -> Result<&'a str, CoreError> {
    if !text.starts_with('{') {
        return Err(CoreError::structural(format!("'{owner}' body must be enclosed in braces")));
    }
    let close = find_matching(text, 0)?;
    if close + 1 != text.len() {
        return Err(CoreError::structural(format!(
            "unexpected '{}' after '{owner}' body",
            text[close + 1..].trim()
        )));
    }
    Ok(&text[1..close])
}

fn parenthesized_condition<'a>(text: &'a str, keyword: &str) -> Result<(&'a str, &'a str), CoreError> {
    let rest = text[keyword.len()..].trim_start();
    if !rest.starts_with('(') {
        return Err(CoreError::structural(format!(
            "'{keyword}' condition must be parenthesized"
        )));
    }
    let close = find_matching(rest, 0)?;
    let cond = rest[1..close].trim();
    if cond.is_empty() {
        return Err(CoreError::structural(format!("'{keyword}' has an empty condition")));
    }
    Ok((cond, rest[close + 1..].trim_start()))
}

/// Finds the `else` that belongs to the `if` whose condition precedes
/// `text`, skipping over the branches of unbraced nested conditionals.
fn find_else(text: &str) -> Result<Option<usize>, CoreError> {
    let mask = top_level_mask(text)?;
    let bytes = text.as_bytes();
    let mut nested = 0usize;
    for index in 0..bytes.len() {
        if !mask[index]
            || !text.is_char_boundary(index)
            || (index > 0 && is_ident_byte(bytes[index - 1]))
        {
            continue;
        }
        let rest = &text[index..];
        if starts_with_word(rest, "if") {
            nested += 1;
        } else if starts_with_word(rest, "else") {
            if nested == 0 {
                return Ok(Some(index));
            }
            nested -= 1;
        }
    }
    Ok(None)
}

/// True for an `if` that yields a value: every branch is a single
/// expression and there is a final `else`.
pub fn is_if_expression(text: &str) -> Result<bool, CoreError> {
    let chain = parse_if(text)?;
    let Some(otherwise) = chain.otherwise else {
        return Ok(false);
    };
    if !is_expression_branch(chain.then)? {
        return Ok(false);
    }
    if starts_with_word(otherwise, "if") {
        is_if_expression(otherwise)
    } else {
        is_expression_branch(otherwise)
    }
}

fn is_expression_branch(text: &str) -> Result<bool, CoreError> {
    let inner = if text.starts_with('{') && find_matching(text, 0)? + 1 == text.len() {
        text[1..text.len() - 1].trim()
    } else {
        text
    };
    if inner.is_empty() {
        return Ok(false);
    }
    let segments = split_statements(inner)?;
    match segments.as_slice() {
        [only] if !only.terminated => Ok(!is_statement_form(only.text)?),
        _ => Ok(false),
    }
}

/// True for text that can only be a statement, never a value.
pub fn is_statement_form(text: &str) -> Result<bool, CoreError> {
    const HEADS: &[&str] = &[
        "let", "fn", "struct", "enum", "while", "return", "break", "continue",
    ];
    if HEADS.iter().any(|head| starts_with_word(text, head)) || text.starts_with('{') {
        return Ok(true);
    }
    if starts_with_word(text, "if") {
        return Ok(!is_if_expression(text)?);
    }
    Ok(text.ends_with("++") || text.ends_with("--") || find_assignment(text)?.is_some())
}

/// Position and operator of a top-level `=` or compound assignment.
pub fn find_assignment(text: &str) -> Result<Option<(usize, AssignOp)>, CoreError> {
    let mask = top_level_mask(text)?;
    let bytes = text.as_bytes();
    for index in 0..bytes.len() {
        if !mask[index] || bytes[index] != b'=' {
            continue;
        }
        let next = bytes.get(index + 1).copied();
        if matches!(next, Some(b'=' | b'>')) {
            continue;
        }
        let previous = index.checked_sub(1).map(|at| bytes[at]);
        let op = match previous {
            Some(b'=' | b'!' | b'<' | b'>') => continue,
            Some(b'+') => AssignOp::Add,
            Some(b'-') => AssignOp::Sub,
            Some(b'*') => AssignOp::Mul,
            Some(b'/') => AssignOp::Div,
            Some(b'%') => AssignOp::Rem,
            _ => AssignOp::Set,
        };
        let start = if op == AssignOp::Set { index } else { index - 1 };
        return Ok(Some((start, op)));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_else_if_chains() {
        let chain = parse_if("if (a) { 1 } else if (b) { 2 } else { 3 }").expect("if");
        assert_eq!(chain.cond, "a");
        assert_eq!(chain.then, "{ 1 }");
        assert_eq!(chain.otherwise, Some("if (b) { 2 } else { 3 }"));
    }

    #[test]
    fn pairs_else_with_the_nearest_if() {
        let chain = parse_if("if (a) if (b) 1 else 2 else 3").expect("if");
        assert_eq!(chain.then, "if (b) 1 else 2");
        assert_eq!(chain.otherwise, Some("3"));
    }

    #[test]
    fn recognizes_value_producing_ifs() {
        assert!(is_if_expression("if (a) 1 else 2").expect("check"));
        assert!(is_if_expression("if (a) { 1 } else if (b) { 2 } else { 3 }").expect("check"));
        assert!(!is_if_expression("if (a) { x = 1; } else { x = 2; }").expect("check"));
        assert!(!is_if_expression("if (a) { 1 }").expect("check"));
    }

    #[test]
    fn requires_braced_loop_bodies() {
        let (cond, body) = parse_while("while (i < 10) { i += 1; }").expect("while");
        assert_eq!(cond, "i < 10");
        assert_eq!(body.trim(), "i += 1;");
        assert!(matches!(parse_while("while (true) i += 1"), Err(CoreError::Structural(_))));
        assert!(matches!(parse_while("while true { }"), Err(CoreError::Structural(_))));
    }

    #[test]
    fn finds_assignment_operators() {
        assert_eq!(find_assignment("x = 1").expect("find"), Some((2, AssignOp::Set)));
        assert_eq!(find_assignment("p.x += 2").expect("find"), Some((4, AssignOp::Add)));
        assert_eq!(find_assignment("a == b").expect("find"), None);
        assert_eq!(find_assignment("a <= b").expect("find"), None);
        assert_eq!(find_assignment("f((x : I32) => x)").expect("find"), None);
    }
}
