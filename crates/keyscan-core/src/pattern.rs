//! Glob detection for SCAN's MATCH option.
//!
//! A pattern containing an unescaped `*`, `?` or `[...]` class is a glob
//! and has to be answered by scanning. Anything else names exactly one key,
//! which can be looked up directly once its escapes are removed.
//!
//! Escaping follows the store's matcher: a backslash makes the next
//! character literal, so a metacharacter preceded by an odd number of
//! backslashes doesn't count.

use std::str::Chars;

use bytes::Bytes;

/// How a MATCH pattern will be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPattern {
    /// Needs scanning; sent to the store verbatim.
    Glob(String),
    /// Exact key name with escapes removed.
    Literal(Bytes),
}

impl MatchPattern {
    pub fn is_glob(&self) -> bool {
        matches!(self, MatchPattern::Glob(_))
    }
}

/// Classifies a MATCH pattern.
pub fn classify(pattern: &str) -> MatchPattern {
    if is_glob(pattern) {
        MatchPattern::Glob(pattern.to_string())
    } else {
        MatchPattern::Literal(Bytes::from(unescape(pattern)))
    }
}

/// Returns true if the pattern has an unescaped `*`, `?`, or a `[` that is
/// closed by a later unescaped `]`.
pub fn is_glob(pattern: &str) -> bool {
    let mut chars = pattern.chars();
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '*' | '?' => return true,
            '[' if closes_class(chars.clone()) => return true,
            _ => {}
        }
    }
    false
}

/// Looks for an unescaped `]` in what follows an opening `[`.
fn closes_class(rest: Chars<'_>) -> bool {
    let mut escaped = false;
    for c in rest {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ']' {
            return true;
        }
    }
    false
}

/// Removes the backslash in front of each escaped metacharacter
/// (`*`, `?`, `[`, `]` and `\` itself). Other backslashes are kept.
pub fn unescape(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, '*' | '?' | '[' | ']' | '\\') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}
