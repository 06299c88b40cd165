//! Markup-to-plain-text conversion for feed titles and summaries.
//!
//! Summaries keep their paragraph structure: line breaks and closing block
//! tags become newlines before the remaining tags are stripped.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_SCRIPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").unwrap());
static RE_STYLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").unwrap());
static RE_IMG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?img\b[^>]*>").unwrap());
static RE_BR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?\s*>").unwrap());
static RE_BLOCK_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</(p|div|li|ul|ol|h[1-6]|blockquote|tr|table|section|article)\s*>").unwrap()
});
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Convert an HTML fragment into readable plain text, keeping line breaks.
pub fn html_to_text(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let text = RE_SCRIPT.replace_all(input, "");
    let text = RE_STYLE.replace_all(&text, "");
    let text = RE_IMG.replace_all(&text, "");
    let text = RE_BR.replace_all(&text, "\n");
    let text = RE_BLOCK_END.replace_all(&text, "\n");
    let text = RE_TAG.replace_all(&text, "");
    let text = html_escape::decode_html_entities(&text)
        .replace('\u{a0}', " ")
        .replace("\r\n", "\n");

    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let joined = lines.join("\n");
    RE_BLANK_RUN.replace_all(&joined, "\n\n").trim().to_string()
}

/// Single-line variant for titles: markup stripped, whitespace collapsed.
pub fn inline_text(input: &str) -> String {
    let text = html_to_text(input);
    RE_WS.replace_all(&text, " ").into_owned()
}

/// Cap `text` at `max_chars` characters, marking the cut with an ellipsis.
/// A cap of 0 leaves the text untouched.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return text.to_string();
    }

    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.truncate(out.trim_end().len());
    out.push('…');
    out
}

/// Summary pipeline: sanitize first, then cap, so a cut never lands inside a tag.
pub fn summary(input: &str, max_chars: usize) -> String {
    truncate(&html_to_text(input), max_chars)
}
