//! ReDoS-safety screening for user-authored regex patterns.
//!
//! This is a pure, side-effect-free predicate: it rejects patterns that fall
//! into a small set of catastrophic-backtracking shapes before a pattern is
//! ever compiled or evaluated. It does not attempt to reason about general
//! regex complexity; it screens the specific classes of the specification.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use thiserror::Error;

/// Maximum pattern length accepted by the screener.
pub const MAX_PATTERN_LEN: usize = 256;

/// Why a pattern was rejected by the screener.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnsafePattern {
    /// The pattern exceeds [`MAX_PATTERN_LEN`] characters.
    #[error("pattern length {len} exceeds the maximum of {max}")]
    TooLong {
        /// Actual pattern length, in characters.
        len: usize,
        /// The configured maximum.
        max: usize,
    },
    /// A group ending in a quantifier is itself quantified, e.g. `(a+)+`.
    #[error("nested quantifier on a group at byte offset {at}")]
    NestedQuantifier {
        /// Byte offset of the outer quantifier.
        at: usize,
    },
    /// Two quantifiers appear back to back with no atom between them,
    /// e.g. `a++`.
    #[error("adjacent quantifiers at byte offset {at}")]
    AdjacentQuantifier {
        /// Byte offset of the second quantifier.
        at: usize,
    },
    /// Two or more top-level alternatives both begin with `.*`, producing
    /// overlapping match attempts across the alternation.
    #[error("overlapping alternation (multiple branches start with `.*`)")]
    OverlappingAlternation,
}

impl UnsafePattern {
    /// Every unsafe-pattern variant maps to the load-time `RegexUnsafe`
    /// error kind; exposed for callers building their own error context.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        "RegexUnsafe"
    }
}

/// Returns `Ok(())` if `pattern` passes the ReDoS safety screen, or the
/// first violation found otherwise.
pub fn screen(pattern: &str) -> Result<(), UnsafePattern> {
    let len = pattern.chars().count();
    if len > MAX_PATTERN_LEN {
        return Err(UnsafePattern::TooLong { len, max: MAX_PATTERN_LEN });
    }
    check_adjacent_quantifiers(pattern)?;
    check_nested_group_quantifiers(pattern)?;
    check_overlapping_alternation(pattern)?;
    Ok(())
}

/// Convenience boolean form of [`screen`].
#[must_use]
pub fn is_safe(pattern: &str) -> bool {
    screen(pattern).is_ok()
}

fn is_quantifier_char(c: char) -> bool {
    matches!(c, '+' | '*' | '?')
}

/// Bytes are ASCII-only for quantifier/group syntax, so byte indexing is
/// safe to use directly as a reporting offset.
fn check_adjacent_quantifiers(pattern: &str) -> Result<(), UnsafePattern> {
    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == '\\' {
            i += 2;
            continue;
        }
        let quantifier_end = if is_quantifier_char(c) {
            Some(i + 1)
        } else if c == '{' {
            pattern[i..].find('}').map(|rel| i + rel + 1)
        } else {
            None
        };
        if let Some(end) = quantifier_end {
            if end < bytes.len() {
                let next = bytes[end] as char;
                if is_quantifier_char(next) || next == '{' {
                    return Err(UnsafePattern::AdjacentQuantifier { at: end });
                }
            }
            i = end;
        } else {
            i += 1;
        }
    }
    Ok(())
}

/// Detects a parenthesized group whose own trailing atom is quantified
/// (`a+`, `a*`) and which is itself immediately followed by a quantifier,
/// e.g. `(a+)+` or `(a*){2,}`.
fn check_nested_group_quantifiers(pattern: &str) -> Result<(), UnsafePattern> {
    let bytes = pattern.as_bytes();
    let mut stack: Vec<usize> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == '\\' {
            i += 2;
            continue;
        }
        match c {
            '(' => stack.push(i),
            ')' => {
                if let Some(open) = stack.pop() {
                    let inner = &pattern[open + 1..i];
                    let inner_quantified = inner
                        .chars()
                        .last()
                        .is_some_and(|last| is_quantifier_char(last))
                        || inner.ends_with('}');
                    if inner_quantified {
                        let after = i + 1;
                        if after < bytes.len() {
                            let next = bytes[after] as char;
                            let outer_quantified = is_quantifier_char(next)
                                || (next == '{' && pattern[after..].contains('}'));
                            if outer_quantified {
                                return Err(UnsafePattern::NestedQuantifier { at: after });
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    Ok(())
}

/// Splits on top-level `|` (ignoring `|` inside groups or escaped) and
/// flags patterns where two or more branches both start with `.*`.
fn check_overlapping_alternation(pattern: &str) -> Result<(), UnsafePattern> {
    let mut branches = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == '\\' {
            i += 2;
            continue;
        }
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            '|' if depth == 0 => {
                branches.push(&pattern[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    branches.push(&pattern[start..]);

    let wildcard_prefixed = branches.iter().filter(|b| b.starts_with(".*")).count();
    if wildcard_prefixed >= 2 {
        return Err(UnsafePattern::OverlappingAlternation);
    }
    Ok(())
}
