//! Comment stripping and feature-import detection over raw PI bodies.
//!
//! Grounded in `katagami.py::PythonTokens.strip_comments` and
//! `get_first_tokens`, and in spec's "Feature-flag detection via
//! import-syntax" design note.

use super::value::FeatureMask;
use crate::log::log_trace;

/// The module name templates import engine feature flags from.
pub const ENGINE_MODULE_NAME: &str = "shibori";

/// Strips `#`-comments (outside of string literals) from each line of a PI
/// body, then joins the remaining text with single spaces and trims it.
///
/// Used for inline-expression PIs, where a comment may appear on its own
/// line inside `<?= ... ?>`.
pub fn strip_comments_and_join(raw: &str) -> String {
    let mut pieces = Vec::new();
    for line in raw.lines() {
        let stripped = strip_line_comment(line);
        let trimmed = stripped.trim();
        if !trimmed.is_empty() {
            pieces.push(trimmed.to_string());
        }
    }
    pieces.join(" ").trim().to_string()
}

fn strip_line_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_str: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = in_str {
            if c == b'\\' {
                i += 1;
            } else if c == q {
                in_str = None;
            }
        } else if c == b'\'' || c == b'"' {
            in_str = Some(c);
        } else if c == b'#' {
            return &line[..i];
        }
        i += 1;
    }
    line
}

/// Scans the first significant line of an embedded-script PI body for a
/// `from <engine> import <NAMES>` shape, skipping blank lines, comment-only
/// lines, and a leading docstring-only line. Returns the feature bits named
/// among the recognized set.
pub fn detect_feature_import(body: &str) -> FeatureMask {
    for raw_line in body.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if is_docstring_only(line) {
            continue;
        }
        let prefix = format!("from {ENGINE_MODULE_NAME} import");
        if let Some(rest) = line.strip_prefix(prefix.as_str()) {
            let mut mask = FeatureMask::NONE;
            for name in rest.split(',') {
                match name.trim() {
                    "cast_string" => mask |= FeatureMask::CAST_STRING,
                    "except_hook" => mask |= FeatureMask::EXCEPT_HOOK,
                    _ => {}
                }
            }
            log_trace!(mask = ?mask, "feature import detected on first executable PI");
            return mask;
        }
        return FeatureMask::NONE;
    }
    FeatureMask::NONE
}

fn is_docstring_only(line: &str) -> bool {
    (line.starts_with('"') && line.ends_with('"') && line.len() >= 2)
        || (line.starts_with('\'') && line.ends_with('\'') && line.len() >= 2)
}
