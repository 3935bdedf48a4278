//! Manipulate text strings pulled from feeds and APIs.

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

/// Normalize unicode (NFC) and whitespace in a string.
///
/// Runs of whitespace collapse to a single space, except for characters in
/// `preserve`, which are kept as they are and swallow any collapsed spaces
/// next to them. With `trim`, leading and trailing whitespace is removed.
pub fn norm(s: &str, preserve: &[char], trim: bool) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.nfc() {
        if preserve.contains(&c) {
            pending_space = false;
            out.push(c);
        } else if c.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() && !ends_with_preserved(&out, preserve) {
                out.push(' ');
            } else if pending_space && out.is_empty() && !trim {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        }
    }
    if pending_space && !trim && !ends_with_preserved(&out, preserve) {
        out.push(' ');
    }
    if trim {
        out.trim().to_string()
    } else {
        out
    }
}

fn ends_with_preserved(s: &str, preserve: &[char]) -> bool {
    s.chars().last().map(|c| preserve.contains(&c)).unwrap_or(false)
}

fn tag_pattern() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"))
}

/// Strip markup from an HTML fragment, decode the common entities and
/// normalize the result.
pub fn strip_tags(html: &str) -> String {
    let spaced = html
        .replace("<br>", " ")
        .replace("<br/>", " ")
        .replace("<br />", " ")
        .replace("</p>", " ");
    let bare = tag_pattern().replace_all(&spaced, "");
    let decoded = bare
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    norm(&decoded, &[], true)
}

/// Keep at most `max` characters, ending in an ellipsis when shortened.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = s.chars().take(max - 1).collect();
    out = out.trim_end().to_string();
    out.push('…');
    out
}
