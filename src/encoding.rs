//! Encoding detection from raw template bytes.
//!
//! Grounded in `katagami.py::get_encodings_from_content`: scan for the three
//! well-known markup-declared charset preambles, case-insensitive and with
//! `.` matching newlines, and stop at the first match.

use crate::log::log_debug;
use regex::bytes::RegexSet;
use std::sync::OnceLock;

pub const DEFAULT_ENCODING: &str = "utf-8";

fn patterns() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new([
            r#"(?is)<\?xml[^>]*encoding=["']?([^"'>\s]+)"#,
            r#"(?is)<meta[^>]*charset=["']?([^"'>\s]+)"#,
            r#"(?is)<meta[^>]*http-equiv=["']?content-type["']?[^>]*content=["']?[^"'>]*charset=([^"'>\s]+)"#,
        ])
        .expect("encoding detector patterns are valid")
    })
}

// Single capturing regexes, one per preamble kind, run in the same order as
// the RegexSet above so the first matching kind wins.
fn capture_patterns() -> &'static [regex::bytes::Regex; 3] {
    static CAPS: OnceLock<[regex::bytes::Regex; 3]> = OnceLock::new();
    CAPS.get_or_init(|| {
        [
            regex::bytes::Regex::new(r#"(?is)<\?xml[^>]*encoding=["']?([^"'>\s]+)"#).unwrap(),
            regex::bytes::Regex::new(r#"(?is)<meta[^>]*charset=["']?([^"'>\s]+)"#).unwrap(),
            regex::bytes::Regex::new(
                r#"(?is)<meta[^>]*http-equiv=["']?content-type["']?[^>]*content=["']?[^"'>]*charset=([^"'>\s]+)"#,
            )
            .unwrap(),
        ]
    })
}

/// Detects a declared encoding from raw template bytes.
///
/// Falls back to [`DEFAULT_ENCODING`] if nothing is declared, or if the
/// declared charset is not one this crate recognizes. A declared-but-
/// unrecognized charset is logged at debug level, not surfaced as an error
/// (spec's `EncodingLookupFailure` is a silent fallback, not a raised error).
pub struct EncodingDetector;

impl EncodingDetector {
    pub fn detect(bytes: &[u8]) -> String {
        let matches = patterns().matches(bytes);
        for (idx, re) in capture_patterns().iter().enumerate() {
            if !matches.matched(idx) {
                continue;
            }
            if let Some(caps) = re.captures(bytes) {
                if let Some(m) = caps.get(1) {
                    let raw = String::from_utf8_lossy(m.as_bytes()).to_string();
                    return normalize_charset(&raw);
                }
            }
        }
        DEFAULT_ENCODING.to_string()
    }

    /// Same detection, over a `&str` input: the scanner needs uniform byte
    /// semantics, so text is re-encoded lossily to ASCII bytes first.
    pub fn detect_str(text: &str) -> String {
        Self::detect(text.as_bytes())
    }
}

fn codec(charset: &str) -> &'static encoding_rs::Encoding {
    encoding_rs::Encoding::for_label(charset.as_bytes()).unwrap_or(encoding_rs::UTF_8)
}

/// Decodes raw template bytes as `charset` (spec §4.9 step 0: "decode the
/// input using the detected encoding"). Malformed sequences are replaced,
/// never rejected — a template byte stream is never refused for encoding
/// reasons.
pub fn decode(bytes: &[u8], charset: &str) -> String {
    let (text, _, _) = codec(charset).decode(bytes);
    text.into_owned()
}

/// Encodes rendered output back to `charset` (spec §4.9 step 3: "encode the
/// string to the template's encoding"), for `returns_bytes` output.
pub fn encode(text: &str, charset: &str) -> Vec<u8> {
    let (bytes, _, _) = codec(charset).encode(text);
    bytes.into_owned()
}

fn normalize_charset(raw: &str) -> String {
    let lower = raw.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase();
    match lower.as_str() {
        "utf-8" | "utf8" => "utf-8".to_string(),
        "ascii" | "us-ascii" => "utf-8".to_string(),
        "shift-jis" | "shift_jis" | "sjis" => "shift-jis".to_string(),
        "" => {
            log_debug!("empty charset declaration, falling back to default");
            DEFAULT_ENCODING.to_string()
        }
        other if is_recognized(other) => other.to_string(),
        other => {
            log_debug!(charset = other, "unrecognized charset, falling back to default");
            DEFAULT_ENCODING.to_string()
        }
    }
}

fn is_recognized(name: &str) -> bool {
    matches!(
        name,
        "utf-8" | "utf-16" | "latin-1" | "iso-8859-1" | "windows-1252" | "shift-jis"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_with_no_declaration() {
        assert_eq!(EncodingDetector::detect_str("<p>hello</p>"), "utf-8");
    }

    #[test]
    fn detects_xml_preamble() {
        let input = r#"<?xml version="1.0" encoding="shift-jis"?><p/>"#;
        assert_eq!(EncodingDetector::detect_str(input), "shift-jis");
    }

    #[test]
    fn detects_meta_charset() {
        let input = r#"<meta charset="utf-8">"#;
        assert_eq!(EncodingDetector::detect_str(input), "utf-8");
    }

    #[test]
    fn detects_meta_http_equiv_content_type() {
        let input = r#"<meta http-equiv="Content-Type" content="text/html; charset=shift-jis">"#;
        assert_eq!(EncodingDetector::detect_str(input), "shift-jis");
    }

    #[test]
    fn unrecognized_charset_falls_back_silently() {
        let input = r#"<meta charset="totally-bogus">"#;
        assert_eq!(EncodingDetector::detect_str(input), "utf-8");
    }

    #[test]
    fn unquoted_attribute_value_is_tolerated() {
        let input = r#"<meta charset=shift-jis>"#;
        assert_eq!(EncodingDetector::detect_str(input), "shift-jis");
    }

    #[test]
    fn decodes_shift_jis_bytes() {
        let (bytes, _, had_errors) = encoding_rs::SHIFT_JIS.encode("日本語");
        assert!(!had_errors);
        assert_eq!(decode(&bytes, "shift-jis"), "日本語");
    }

    #[test]
    fn encode_decode_round_trips_through_shift_jis() {
        let text = "こんにちは";
        let bytes = encode(text, "shift-jis");
        assert_eq!(decode(&bytes, "shift-jis"), text);
    }

    #[test]
    fn unrecognized_charset_falls_back_to_utf8_codec() {
        assert_eq!(decode(b"hello", "totally-bogus"), "hello");
    }
}
