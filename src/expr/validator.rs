//! Allow-list validation for template expressions
//!
//! This is a character whitelist plus a keyword blacklist, not a parser.
//! What passes is limited to arithmetic, comparison, logical and ternary
//! operators over bindings, member access and calls. It rejects some
//! harmless expressions on purpose.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Longest accepted expression, in bytes after trimming
pub const MAX_EXPRESSION_BYTES: usize = 512;

static FORBIDDEN_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(function|return|new|this|while|for|do|switch|case|default|break|continue|if|else|try|catch|finally|throw|class|extends|super|import|export|delete|var|let|const|async|await|yield|with|debugger)\b",
    )
    .expect("keyword pattern is valid")
});

/// Why an expression was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("empty expression")]
    Empty,

    #[error("expression too long ({len} bytes, max {max})")]
    TooLong { len: usize, max: usize },

    #[error("braces and brackets are not allowed")]
    Container,

    #[error("quotes are not allowed")]
    Quote,

    #[error("semicolons, backslashes and line breaks are not allowed")]
    Separator,

    #[error("comments are not allowed")]
    Comment,

    #[error("forbidden character {0:?}")]
    ForbiddenCharacter(char),

    #[error("forbidden keyword {0:?}")]
    ForbiddenKeyword(String),
}

/// Check an expression against the allow-list.
///
/// Returns the trimmed expression on success.
pub fn validate(expr: &str) -> Result<&str, Rejection> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(Rejection::Empty);
    }
    if expr.len() > MAX_EXPRESSION_BYTES {
        return Err(Rejection::TooLong {
            len: expr.len(),
            max: MAX_EXPRESSION_BYTES,
        });
    }
    if expr.contains(['{', '}', '[', ']']) {
        return Err(Rejection::Container);
    }
    if expr.contains(['"', '\'', '`']) {
        return Err(Rejection::Quote);
    }
    if expr.contains([';', '\\', '\n', '\r']) {
        return Err(Rejection::Separator);
    }
    if expr.contains("/*") || expr.contains("*/") || expr.contains("//") {
        return Err(Rejection::Comment);
    }
    if let Some(c) = expr.chars().find(|&c| !is_allowed_char(c)) {
        return Err(Rejection::ForbiddenCharacter(c));
    }
    if let Some(m) = FORBIDDEN_KEYWORDS.find(expr) {
        return Err(Rejection::ForbiddenKeyword(m.as_str().to_string()));
    }
    Ok(expr)
}

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '_' | '$' | ' ' | '(' | ')' | '.' | '|' | '+' | '-' | '*' | '/' | '%' | '<' | '>'
                | '=' | '!' | '&' | '?' | ':' | ','
        )
}

/// Whether `name` can be installed as a top-level binding
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
