//! Plain-text views of rich block content.

use std::sync::LazyLock;

use regex::Regex;

static BREAK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|blockquote|pre)>").expect("valid break tag regex")
});

static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank run regex"));

/// Strip markup from block content.
///
/// Block-level closing tags and `<br>` become newlines, every other tag is
/// dropped, and the common HTML entities are decoded. Trailing whitespace on
/// each line and runs of blank lines are collapsed.
pub fn strip_markup(content: &str) -> String {
    let broken = BREAK_TAG.replace_all(content, "\n");
    let untagged = ANY_TAG.replace_all(&broken, "");
    let decoded = decode_entities(&untagged);

    let lines: Vec<&str> = decoded.lines().map(str::trim_end).collect();
    let joined = lines.join("\n");
    BLANK_RUN.replace_all(joined.trim(), "\n\n").into_owned()
}

/// First line with non-whitespace text, trimmed.
pub fn first_non_empty_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

fn decode_entities(text: &str) -> String {
    // &amp; last so "&amp;lt;" decodes to "&lt;" rather than "<"
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
