use std::sync::OnceLock;

use regex::Regex;

/// Letters, digits, `_`, hyphens, and the Japanese/CJK ranges used in post
/// titles. Combining marks and other connector punctuation are dropped.
const DISALLOWED: &str =
    r"[^\p{L}\p{N}_\-\x{3040}-\x{30FF}\x{3400}-\x{4DBF}\x{4E00}-\x{9FFF}]+";

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn disallowed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DISALLOWED).unwrap())
}

fn hyphens_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-{2,}").unwrap())
}

/// Normalize a human-readable title into a URL-safe slug.
///
/// Never fails: characters outside the allowed set are dropped, and missing
/// input or input with nothing left after normalization yields "".
pub fn slugify<'a>(text: impl Into<Option<&'a str>>) -> String {
    let text = match text.into() {
        Some(t) if !t.is_empty() => t,
        _ => return String::new(),
    };
    let lower = text.to_lowercase();
    let hyphenated = whitespace_re().replace_all(&lower, "-");
    let cleaned = disallowed_re().replace_all(&hyphenated, "");
    let collapsed = hyphens_re().replace_all(&cleaned, "-");
    collapsed.trim_matches('-').to_string()
}
