//! Splits a template body into literal and PI segments.
//!
//! Grounded in `katagami.py::Translator._makescript`'s PI-finding loop,
//! which repeatedly searches for the next `<?...?>` span and emits the
//! literal text preceding it before handling the PI itself.

use super::position::{position_at, TemplatePos};
use regex::Regex;
use std::sync::OnceLock;

fn pi_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<\?(?P<body>.*?)\?>").expect("PI pattern is valid"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Pi { body: &'a str, pos: TemplatePos },
}

/// Scans a decoded template body into an ordered list of segments.
///
/// Every byte of `body` appears in exactly one segment: literal chunks fill
/// the gaps between adjacent PI spans, with no overlap.
pub fn scan(body: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut last = 0usize;
    for m in pi_pattern().captures_iter(body) {
        let whole = m.get(0).expect("group 0 always matches");
        let (start, end) = (whole.start(), whole.end());
        if start > last {
            segments.push(Segment::Literal(&body[last..start]));
        }
        let pos = position_at(body, start);
        let pi_body = m.name("body").expect("named group always present").as_str();
        segments.push(Segment::Pi { body: pi_body, pos });
        last = end;
    }
    if last < body.len() {
        segments.push(Segment::Literal(&body[last..]));
    }
    segments
}
