//! PI handlers: one function per handler kind in spec §4.4–4.7, each taking
//! a raw PI body (as returned by the scanner, delimiters stripped) and
//! writing generated lines into a [`CodeEmitter`].
//!
//! Grounded in `katagami.py::Translator._handleblock`/`_handleexpr`/
//! `_handlescript`/`_handleescape`.

use crate::emit::CodeEmitter;
use crate::error::ShiboriError;
use crate::host::indent;
use crate::host::text::{detect_feature_import, strip_comments_and_join};
use crate::host::value::FeatureMask;
use crate::template::TemplatePos;

const DEFINITION_KEYWORDS: &[&str] = &["def", "class"];

/// `<? STMT: {?>` / `<?} STMT: {?>` / `<?}?>` — the block/brace bridge.
pub fn handle_block(emitter: &mut CodeEmitter, body: &str, pos: TemplatePos) -> Result<(), ShiboriError> {
    let mut rest = body;
    if let Some(after) = rest.strip_prefix('}') {
        emitter.pop_indent(pos)?;
        rest = after;
    }
    let opens = rest.ends_with('{');
    if opens {
        rest = &rest[..rest.len() - 1];
    }
    let middle = rest.trim();
    if !middle.is_empty() {
        if let Some(first_token) = middle.split_whitespace().next() {
            if DEFINITION_KEYWORDS.contains(&first_token) {
                return Err(ShiboriError::GrammarFailure {
                    line: pos.line,
                    column: pos.column,
                    reason: format!("block bridge may not introduce a '{first_token}' definition"),
                });
            }
        }
        emitter.mark(pos);
        emitter.append_line(middle);
    }
    if opens {
        emitter.push_indent(pos);
    }
    Ok(())
}

/// `<?= EXPR ?>` — inline expression, optionally wrapped for `except_hook`.
pub fn handle_inline_expression(
    emitter: &mut CodeEmitter,
    body: &str,
    pos: TemplatePos,
    features: FeatureMask,
) -> Result<(), ShiboriError> {
    let expr = strip_comments_and_join(&body[1..]);
    emitter.mark(pos);
    if features.contains(FeatureMask::EXCEPT_HOOK) {
        emitter.append_line("try:");
        emitter.append_line_extra(&format!("yield {expr}"), 1);
        emitter.append_line("except:");
        emitter.append_line_extra("yield __dispatch_except_hook__()", 1);
    } else {
        emitter.append_line(&format!("yield {expr}"));
    }
    Ok(())
}

/// `<?py STMTS ?>` — embedded statements, re-indented to the current depth.
pub fn handle_embedded_script(emitter: &mut CodeEmitter, body: &str, pos: TemplatePos) -> Result<(), ShiboriError> {
    let rest = body.strip_prefix("py").unwrap_or(body);
    if emitter.mark_first_executable_seen() {
        emitter.add_features(detect_feature_import(rest));
    }
    let target = emitter.current_indent();
    let normalized = indent::normalize(rest, &target);
    for line in normalized.split('\n') {
        if line.trim().is_empty() {
            emitter.append_prepared_line("");
            continue;
        }
        emitter.mark(pos);
        emitter.append_prepared_line(line);
    }
    Ok(())
}

/// `<?\X?>` — escape: emit the literal text `<?X?>` without executing it.
pub fn handle_escape(emitter: &mut CodeEmitter, body: &str, pos: TemplatePos) {
    let unescaped = body.strip_prefix('\\').unwrap_or(body);
    let literal = format!("<?{unescaped}?>");
    emitter.mark(pos);
    emitter.append_line(&format!("yield {}", crate::emit::literalize(&literal)));
}

/// Any other `<?...?>`, passed through as the literal template text.
pub fn handle_pass_through(emitter: &mut CodeEmitter, raw_pi: &str, pos: TemplatePos) {
    emitter.mark(pos);
    emitter.append_line(&format!("yield {}", crate::emit::literalize(raw_pi)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_open_pushes_indent_and_emits_statement() {
        let mut e = CodeEmitter::new("t", "utf-8");
        handle_block(&mut e, " if x: {", TemplatePos::new(1, 1)).unwrap();
        let script = e.finish();
        assert!(script.body_text.contains("if x:"));
    }

    #[test]
    fn block_close_with_empty_stack_is_indentation_error() {
        let mut e = CodeEmitter::new("t", "utf-8");
        let err = handle_block(&mut e, "}", TemplatePos::new(3, 1));
        assert!(matches!(err, Err(ShiboriError::IndentationFailure { .. })));
    }

    #[test]
    fn block_rejects_definition_keyword() {
        let mut e = CodeEmitter::new("t", "utf-8");
        let err = handle_block(&mut e, " def f(): {", TemplatePos::new(1, 1));
        assert!(matches!(err, Err(ShiboriError::GrammarFailure { .. })));
    }

    #[test]
    fn inline_expression_without_except_hook() {
        let mut e = CodeEmitter::new("t", "utf-8");
        handle_inline_expression(&mut e, "=name", TemplatePos::new(1, 1), FeatureMask::NONE).unwrap();
        let script = e.finish();
        assert!(script.body_text.contains("yield name"));
        assert!(!script.body_text.contains("try:"));
    }

    #[test]
    fn inline_expression_with_except_hook_wraps_try() {
        let mut e = CodeEmitter::new("t", "utf-8");
        handle_inline_expression(&mut e, "=1", TemplatePos::new(1, 1), FeatureMask::EXCEPT_HOOK).unwrap();
        let script = e.finish();
        assert!(script.body_text.contains("try:"));
        assert!(script.body_text.contains("__dispatch_except_hook__()"));
    }

    #[test]
    fn escape_handler_strips_backslash_and_quotes_literal() {
        let mut e = CodeEmitter::new("t", "utf-8");
        handle_escape(&mut e, "\\py \"x\"", TemplatePos::new(1, 1));
        let script = e.finish();
        assert!(script.body_text.contains("<?py \\\"x\\\"?>"));
    }

    #[test]
    fn embedded_script_is_reindented_to_current_depth() {
        let mut e = CodeEmitter::new("t", "utf-8");
        handle_block(&mut e, " if x: {", TemplatePos::new(1, 1)).unwrap();
        handle_embedded_script(&mut e, "py\nx = 1\ny = 2", TemplatePos::new(2, 1)).unwrap();
        let script = e.finish();
        assert!(script.body_text.contains("    x = 1"));
    }

    #[test]
    fn first_embedded_script_detects_feature_import() {
        let mut e = CodeEmitter::new("t", "utf-8");
        handle_embedded_script(&mut e, "py from shibori import cast_string", TemplatePos::new(1, 1)).unwrap();
        assert!(e.features().contains(FeatureMask::CAST_STRING));
    }
}
