//! Orchestrates scanning, classification, and handler dispatch into a
//! [`CodeEmitter`], producing a finished [`EmittedScript`].
//!
//! Grounded in `katagami.py::Translator._makescript`'s main loop.

use crate::emit::{literalize, CodeEmitter, EmittedScript};
use crate::error::ShiboriError;
use crate::handlers;
use crate::template::{self, PiKind, Segment};

pub fn translate(name: &str, body: &str, encoding: &str) -> Result<EmittedScript, ShiboriError> {
    let mut emitter = CodeEmitter::new(name, encoding);

    for segment in template::scan(body) {
        match segment {
            Segment::Literal(text) => emit_literal(&mut emitter, body, text),
            Segment::Pi { body: pi_body, pos } => {
                let kind = template::classify(pi_body);
                let result = match kind {
                    PiKind::InlineExpression => {
                        let features = emitter.features();
                        handlers::handle_inline_expression(&mut emitter, pi_body, pos, features)
                    }
                    PiKind::EmbeddedScript => handlers::handle_embedded_script(&mut emitter, pi_body, pos),
                    PiKind::Block => handlers::handle_block(&mut emitter, pi_body, pos),
                    PiKind::Escape => {
                        handlers::handle_escape(&mut emitter, pi_body, pos);
                        Ok(())
                    }
                    PiKind::PassThrough => {
                        handlers::handle_pass_through(&mut emitter, &format!("<?{pi_body}?>"), pos);
                        Ok(())
                    }
                };
                result.map_err(|e| attach_source_line(e, body))?;
            }
        }
    }

    if let Some(open_pos) = emitter.unclosed_indent() {
        return Err(ShiboriError::IndentationFailure {
            line: open_pos.line,
            column: open_pos.column,
            source_line: source_line_text(body, open_pos.line),
            reason: "block bridge opened with '{?>' was never closed".to_string(),
        });
    }

    Ok(emitter.finish())
}

fn emit_literal(emitter: &mut CodeEmitter, body: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    let offset = text.as_ptr() as usize - body.as_ptr() as usize;
    let pos = template::position_at(body, offset);
    emitter.mark(pos);
    emitter.append_line(&format!("yield {}", literalize(text)));
}

fn source_line_text(body: &str, line: usize) -> String {
    body.split('\n').nth(line.saturating_sub(1)).unwrap_or("").to_string()
}

fn attach_source_line(err: ShiboriError, body: &str) -> ShiboriError {
    match err {
        ShiboriError::IndentationFailure { line, column, reason, .. } => ShiboriError::IndentationFailure {
            line,
            column,
            source_line: source_line_text(body, line),
            reason,
        },
        ShiboriError::SyntaxFailure { line, column, cause, .. } => ShiboriError::SyntaxFailure {
            line,
            column,
            source_line: source_line_text(body, line),
            cause,
        },
        other => other,
    }
}
