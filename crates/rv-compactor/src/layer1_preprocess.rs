//! Layer 1: Preprocess. Whitespace, comment and quote normalization.
//!
//! This pass is lossy and has no inverse: [`postprocess`] is the identity.
//! Comment stripping is a plain regex, not a lexer, so `//` or `/* */`
//! inside string literals (URLs included) is removed as well.

use regex::Regex;
use std::sync::LazyLock;

static RE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").unwrap());
static RE_HSPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static RE_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n)+").unwrap());

/// Strip `/* ... */` and `// ...` comments.
pub fn strip_comments(text: &str) -> String {
    RE_COMMENT.replace_all(text, "").into_owned()
}

/// Collapse runs of spaces and tabs to a single space.
pub fn collapse_spaces(text: &str) -> String {
    RE_HSPACE.replace_all(text, " ").into_owned()
}

/// Collapse runs of blank lines to a single newline.
pub fn collapse_blank_lines(text: &str) -> String {
    RE_BLANK_LINES.replace_all(text, "\n").into_owned()
}

/// Curly quotes to straight quotes.
pub fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect()
}

/// Apply all normalization passes.
pub fn preprocess(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut result = strip_comments(text);
    result = collapse_spaces(&result);
    result = collapse_blank_lines(&result);
    result = normalize_quotes(&result);
    result.trim().to_string()
}

/// Inverse of [`preprocess`]. Identity: normalization cannot be undone.
pub fn postprocess(text: String) -> String {
    text
}
