//! Accumulates generated host-language lines, a block-indent stack, and
//! position markers (spec §4.8).
//!
//! Grounded in `katagami.py::Translator._appendline`/`_embedscript`: every
//! line is written at `TAB * (1 + len(indent_stack))` indentation (the
//! constant `1` is the `def __main__():` wrapper). `finish` dedents that one
//! wrapper level back out for `body_text`, which is parsed standalone as a
//! top-level statement list (see `runner::compile`) and never sees the
//! `def __main__():` line itself. Position markers are kept as a side-table
//! instead of literal embedded comments, per spec's design note
//! ("Implementations may prefer a side-table ... functionally equivalent,
//! and avoids scanning the generated source to translate errors").

use crate::error::ShiboriError;
use crate::host::value::FeatureMask;
use crate::template::TemplatePos;

pub const TAB: &str = "    ";

/// Number of textual header lines preceding the body in the assembled
/// script (`__file__`, `__encoding__`, `def __main__():`).
pub const HEADER_LINES: usize = 3;

pub struct CodeEmitter {
    name: String,
    encoding: String,
    body_lines: Vec<String>,
    indent_stack: Vec<TemplatePos>,
    first_executable_seen: bool,
    features: FeatureMask,
    markers: Vec<(usize, TemplatePos)>,
}

impl CodeEmitter {
    pub fn new(name: impl Into<String>, encoding: impl Into<String>) -> Self {
        CodeEmitter {
            name: name.into(),
            encoding: encoding.into(),
            body_lines: Vec::new(),
            indent_stack: Vec::new(),
            first_executable_seen: false,
            features: FeatureMask::NONE,
            markers: Vec::new(),
        }
    }

    pub fn current_indent(&self) -> String {
        TAB.repeat(1 + self.indent_stack.len())
    }

    /// Appends one line of generated host code at the current block depth.
    pub fn append_line(&mut self, text: &str) {
        self.body_lines.push(format!("{}{}", self.current_indent(), text));
    }

    /// Appends one line at one extra level of depth beyond the current
    /// block stack (used for try/except wrappers around a single yield).
    pub fn append_line_extra(&mut self, text: &str, extra: usize) {
        self.body_lines
            .push(format!("{}{}{}", self.current_indent(), TAB.repeat(extra), text));
    }

    /// Appends a line that has already been indented by the caller (used by
    /// the embedded-script handler, whose re-indented snippet carries its
    /// own leading whitespace).
    pub fn append_prepared_line(&mut self, line: &str) {
        self.body_lines.push(line.to_string());
    }

    /// Records a position marker immediately preceding the next emitted
    /// line(s). `mark` is idempotent at a given line index: only the latest
    /// call before the next `append_line` takes effect, matching "the
    /// active template position" semantics of spec §4.10.
    pub fn mark(&mut self, pos: TemplatePos) {
        self.markers.push((self.body_lines.len(), pos));
    }

    pub fn pop_indent(&mut self, pos: TemplatePos) -> Result<(), ShiboriError> {
        if self.indent_stack.pop().is_none() {
            return Err(ShiboriError::IndentationFailure {
                line: pos.line,
                column: pos.column,
                source_line: String::new(),
                reason: "closing brace has no matching opener".to_string(),
            });
        }
        Ok(())
    }

    pub fn push_indent(&mut self, pos: TemplatePos) {
        self.indent_stack.push(pos);
    }

    pub fn unclosed_indent(&self) -> Option<TemplatePos> {
        self.indent_stack.last().copied()
    }

    pub fn mark_first_executable_seen(&mut self) -> bool {
        let was_first = !self.first_executable_seen;
        self.first_executable_seen = true;
        was_first
    }

    pub fn add_features(&mut self, mask: FeatureMask) {
        self.features |= mask;
    }

    pub fn features(&self) -> FeatureMask {
        self.features
    }

    /// Finishes emission, producing the assembled script text, the
    /// host-line-to-template-position side-table, and the feature mask.
    pub fn finish(mut self) -> EmittedScript {
        if self.body_lines.is_empty() {
            self.body_lines.push(format!("{}pass", TAB));
        }
        let mut text = String::new();
        text.push_str(&format!("__file__ = {:?}\n", self.name));
        text.push_str(&format!("__encoding__ = {:?}\n", self.encoding));
        text.push_str("def __main__():\n");
        text.push_str(&self.body_lines.join("\n"));

        let markers = self
            .markers
            .into_iter()
            .map(|(body_idx, pos)| (body_idx + HEADER_LINES + 1, pos))
            .collect();

        // `text` keeps every body line nested one level under `def __main__():`
        // for display; `body_text` is parsed standalone (see runner::compile),
        // so it's dedented back to a top-level statement list here.
        let body_text = self
            .body_lines
            .iter()
            .map(|line| line.strip_prefix(TAB).unwrap_or(line))
            .collect::<Vec<_>>()
            .join("\n");

        EmittedScript {
            text,
            body_text,
            markers,
            encoding: self.encoding,
            features: self.features,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EmittedScript {
    pub text: String,
    pub body_text: String,
    /// `(full_script_line, template_pos)` pairs, sorted by ascending line.
    pub markers: Vec<(usize, TemplatePos)>,
    pub encoding: String,
    pub features: FeatureMask,
}

impl EmittedScript {
    /// Reverse position mapping (spec §4.10): walks the marker table for the
    /// most recently set active template position at or before `host_line`
    /// (a full-script line number, 1-based).
    pub fn map_position(&self, host_line: usize) -> TemplatePos {
        self.markers
            .iter()
            .rev()
            .find(|(line, _)| *line <= host_line)
            .map(|(_, pos)| *pos)
            .unwrap_or(TemplatePos::new(host_line, 0))
    }
}

/// Escapes `text` as a host string literal, safe to re-lex by
/// [`crate::host::lexer`].
pub fn literalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
