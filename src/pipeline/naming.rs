//! Folder-name derivation: model answer → filesystem-safe company name.
//!
//! The mapping is deterministic so the same company always lands in the same
//! folder, whatever small variations in article or legal suffix the model
//! produces ("The Acme Corp." and "Acme" both file under `Acme`).
//!
//! ## Rule Order
//!
//! Articles and suffixes are stripped before character replacement so their
//! regexes see the original spacing; the length cap runs last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest folder name we create, in characters.
pub const MAX_NAME_CHARS: usize = 50;

/// Longest file stem we keep, in bytes. Leaves room for `_NNNNN.pdf` under
/// the common 255-byte file-name limit.
pub const MAX_STEM_BYTES: usize = 244;

static RE_LEADING_ARTICLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:the|a)\s+").unwrap());

static RE_TRAILING_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i),?\s+(?:inc\.?|llc\.?|ltd\.?|corporation|corp\.?|company|co\.?)$").unwrap()
});

static RE_INVALID_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).unwrap());

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Clean a company name into a folder name.
///
/// Returns `None` when nothing usable remains, so callers can never create a
/// blank-named folder or escape the output root (`.`/`..`).
pub fn sanitize_company_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    let name = RE_LEADING_ARTICLE.replace(name, "");
    let name = RE_TRAILING_SUFFIX.replace(name.trim(), "");
    finish(&name)
}

/// Make an uploaded file stem safe to write, otherwise keeping it as given.
///
/// Only path separators, reserved characters and control characters are
/// replaced, and leading dots dropped. Spaces, case and punctuation survive;
/// the stem is cut on a char boundary at [`MAX_STEM_BYTES`].
pub fn sanitize_file_stem(raw: &str) -> Option<String> {
    let name = RE_INVALID_CHARS.replace_all(raw, "_");
    let name = name.trim().trim_start_matches('.').trim_start();

    let mut end = name.len().min(MAX_STEM_BYTES);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let capped = name[..end].trim_end();

    if capped.chars().all(|c| c == '_' || c == '.') {
        None
    } else {
        Some(capped.to_string())
    }
}

fn finish(name: &str) -> Option<String> {
    let name = RE_INVALID_CHARS.replace_all(name, "_");
    let name = RE_WHITESPACE.replace_all(name.trim(), "_");
    let name = name.trim_start_matches('.');
    let capped: String = name.chars().take(MAX_NAME_CHARS).collect();

    if capped.chars().all(|c| c == '_' || c == '.') {
        None
    } else {
        Some(capped)
    }
}
