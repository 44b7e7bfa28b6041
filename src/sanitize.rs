//! Cleanup of rich-text comment bodies before export

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Notification footers appended by Planner to comment posts
pub const FOOTER_PHRASES: &[&str] = &[
    "Reply in Microsoft Planner",
    "Reply to this message in Microsoft Planner",
];

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^<>]*>").unwrap());
static LINK_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^</?a(\s[^>]*)?>$").unwrap());
/// `<br>` and closing block tags, which end a line in the rendered text
static LINE_BREAK_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(<br\s*/?>|</(p|div|li|tr|h[1-6])\s*>)$").unwrap());

const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&amp;", "&"),
];

/// Remove markup tags, keeping `<a ...>` and `</a>`
///
/// `<br>` and closing block tags become `\n` so paragraphs stay on separate lines.
pub fn strip_tags(input: &str) -> String {
    TAG_REGEX
        .replace_all(input, |caps: &Captures| {
            let tag = &caps[0];
            if LINK_TAG_REGEX.is_match(tag) {
                tag.to_string()
            } else if LINE_BREAK_TAG_REGEX.is_match(tag) {
                "\n".to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    // &amp; goes last so "&amp;lt;" stays "&lt;"
    ENTITIES
        .iter()
        .fold(input.to_string(), |text, (entity, plain)| {
            text.replace(entity, plain)
        })
}

/// Cut the text before the earliest footer phrase, if any
pub fn truncate_at_footer(input: &str) -> &str {
    let cut = FOOTER_PHRASES
        .iter()
        .filter_map(|phrase| input.find(phrase))
        .min();

    match cut {
        Some(index) => &input[..index],
        None => input,
    }
}

/// Sanitize a comment body for export
///
/// Strips tags (hyperlinks survive), decodes common entities, truncates at the
/// first footer phrase, trims surrounding line breaks and ends with exactly one
/// `\n`. Inner whitespace and spaces at the edges are left alone.
pub fn sanitize_comment(input: &str) -> String {
    let stripped = decode_entities(&strip_tags(input));
    let body = truncate_at_footer(&stripped).trim_matches(['\r', '\n']);

    let mut out = String::with_capacity(body.len() + 1);
    out.push_str(body);
    out.push('\n');
    out
}
