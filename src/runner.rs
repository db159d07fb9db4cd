//! Compiles an emitted script's body into host AST, then drives execution
//! through a [`RoutineHandle`], enforcing the string-yield contract and
//! performing reverse position mapping (spec §4.9, §4.10).
//!
//! Grounded in `katagami.py::Translator.__init__`/`_exectamplate`/
//! `_find_original_pos`.

use crate::emit::{EmittedScript, HEADER_LINES};
use crate::error::ShiboriError;
use crate::host::ast::Stmt;
use crate::host::lexer::tokenize;
use crate::host::parser::parse_program;
use crate::host::routine::{Produced, Resume, RoutineHandle, SharedEnv};
use crate::host::value::{FeatureMask, RuntimeError, Value};
use crate::log::log_debug;
use crate::template::source_line_at;
use std::sync::Arc;

/// A script compiled to host AST, ready to be run any number of times
/// against different contexts (spec.md's `CompiledRoutine`).
#[derive(Clone, Debug)]
pub struct CompiledRoutine {
    body: Arc<Vec<Stmt>>,
    pub features: FeatureMask,
    pub encoding: String,
}

/// Compiles `script`'s body text, reverse-mapping any syntax error back to
/// `template_text` coordinates through `script`'s marker table.
pub fn compile(script: &EmittedScript, template_text: &str) -> Result<CompiledRoutine, ShiboriError> {
    let tokens = tokenize(&script.body_text)
        .map_err(|e| map_compile_error(script, template_text, e.line, e.to_string()))?;
    let stmts = parse_program(tokens)
        .map_err(|e| map_compile_error(script, template_text, e.line, e.to_string()))?;
    Ok(CompiledRoutine {
        body: Arc::new(stmts),
        features: script.features,
        encoding: script.encoding.clone(),
    })
}

fn map_compile_error(script: &EmittedScript, template_text: &str, body_line: usize, message: String) -> ShiboriError {
    let full_line = body_line + HEADER_LINES;
    let pos = script.map_position(full_line);
    log_debug!(line = pos.line, column = pos.column, "compile error mapped to template position");
    ShiboriError::SyntaxFailure {
        line: pos.line,
        column: pos.column,
        source_line: source_line_at(template_text, pos.line),
        cause: message,
    }
}

/// One output fragment from a running routine.
#[derive(Debug)]
pub enum Chunk {
    Text(String),
    Bytes(Vec<u8>),
}

/// Drives a single render pass of a [`CompiledRoutine`] against a context.
#[derive(Debug)]
pub struct Runner {
    handle: RoutineHandle,
    encoding: String,
    features: FeatureMask,
}

impl Runner {
    pub fn start(compiled: &CompiledRoutine, context: SharedEnv) -> Self {
        Self::start_with_features(compiled, context, compiled.features)
    }

    /// Like [`Runner::start`], but with the feature mask overridden (used by
    /// the facade's `RenderFlags` escape hatch for hosts that can't rely on
    /// the in-template `import` detection — spec.md §3.3).
    pub fn start_with_features(compiled: &CompiledRoutine, context: SharedEnv, features: FeatureMask) -> Self {
        let handle = RoutineHandle::start(compiled.body.clone(), context, features);
        Runner {
            handle,
            encoding: compiled.encoding.clone(),
            features,
        }
    }

    /// Pulls the next fragment, applying the yield contract (spec §4.9):
    /// non-string yields are cast if `cast_string` is active (already done
    /// inside the interpreter), or thrown back as a `TypeError` at the
    /// suspension point otherwise, which an `except_hook` wrapper may
    /// recover from by yielding a replacement value.
    pub fn next(&mut self, script: &EmittedScript, template_text: &str, returns_bytes: bool) -> Result<Option<Chunk>, ShiboriError> {
        let mut produced = self.handle.advance(Resume::Next);
        loop {
            match produced {
                Produced::Done => return Ok(None),
                Produced::Error(err) => return Err(self.map_runtime_error(script, template_text, err)),
                Produced::Yielded(value) => match value {
                    Value::Str(text) => return Ok(Some(self.encode_chunk(text, returns_bytes)?)),
                    other => {
                        let type_name = other.type_name().to_string();
                        produced = self.handle.advance(Resume::Throw(RuntimeError::type_mismatch(&type_name)));
                    }
                },
            }
        }
    }

    fn encode_chunk(&self, text: String, returns_bytes: bool) -> Result<Chunk, ShiboriError> {
        if !returns_bytes {
            return Ok(Chunk::Text(text));
        }
        Ok(Chunk::Bytes(crate::encoding::encode(&text, &self.encoding)))
    }

    fn map_runtime_error(&self, script: &EmittedScript, template_text: &str, err: RuntimeError) -> ShiboriError {
        let body_line = err.host_line.unwrap_or(1);
        let full_line = body_line + HEADER_LINES;
        let pos = script.map_position(full_line);
        log_debug!(line = pos.line, column = pos.column, kind = %err.type_name, "runtime error mapped to template position");
        let _ = source_line_at(template_text, pos.line);
        ShiboriError::runtime_at(pos.line, pos.column, ShiboriError::Host(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::translate;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn context(vars: &[(&str, Value)]) -> SharedEnv {
        let mut map = HashMap::new();
        for (k, v) in vars {
            map.insert((*k).to_string(), v.clone());
        }
        Arc::new(Mutex::new(map))
    }

    fn drain(script: &EmittedScript, template_text: &str, compiled: &CompiledRoutine, ctx: SharedEnv) -> Result<String, ShiboriError> {
        let mut runner = Runner::start(compiled, ctx);
        let mut out = String::new();
        while let Some(chunk) = runner.next(script, template_text, false)? {
            match chunk {
                Chunk::Text(t) => out.push_str(&t),
                Chunk::Bytes(_) => unreachable!(),
            }
        }
        Ok(out)
    }

    #[test]
    fn renders_literal_and_expression() {
        let template = "hello, <?=name?>";
        let script = translate("t", template, "utf-8").unwrap();
        let compiled = compile(&script, template).unwrap();
        let ctx = context(&[("name", Value::Str("world".to_string()))]);
        let out = drain(&script, template, &compiled, ctx).unwrap();
        assert_eq!(out, "hello, world");
    }

    #[test]
    fn type_mismatch_without_except_hook_propagates_runtime_failure() {
        let template = "<?=1?>";
        let script = translate("t", template, "utf-8").unwrap();
        let compiled = compile(&script, template).unwrap();
        let ctx = context(&[]);
        let err = drain(&script, template, &compiled, ctx).unwrap_err();
        assert!(matches!(err, ShiboriError::RuntimeFailure { line: 1, .. }));
    }

    #[test]
    fn except_hook_recovers_from_type_mismatch() {
        let template = "<?py from shibori import except_hook ?><?=1?>";
        let script = translate("t", template, "utf-8").unwrap();
        let compiled = compile(&script, template).unwrap();
        let ctx = context(&[]);
        let out = drain(&script, template, &compiled, ctx).unwrap();
        assert!(out.contains("Can't convert 'int' object to str implicitly"));
    }

    #[test]
    fn cast_string_feature_stringifies_non_string_yields() {
        let template = "<?py from shibori import cast_string ?><?=1?>";
        let script = translate("t", template, "utf-8").unwrap();
        let compiled = compile(&script, template).unwrap();
        let ctx = context(&[]);
        let out = drain(&script, template, &compiled, ctx).unwrap();
        assert_eq!(out, "1");
    }

    #[test]
    fn empty_template_compiles_and_renders_empty_string() {
        let template = "";
        let script = translate("t", template, "utf-8").unwrap();
        let compiled = compile(&script, template).unwrap();
        let ctx = context(&[]);
        let out = drain(&script, template, &compiled, ctx).unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn returns_bytes_encodes_to_the_detected_charset() {
        let template = "<?=greeting?>";
        let script = translate("t", template, "shift-jis").unwrap();
        let compiled = compile(&script, template).unwrap();
        let ctx = context(&[("greeting", Value::Str("日本語".to_string()))]);
        let mut runner = Runner::start(&compiled, ctx);
        let mut out = Vec::new();
        while let Some(chunk) = runner.next(&script, template, true).unwrap() {
            match chunk {
                Chunk::Bytes(b) => out.extend(b),
                Chunk::Text(_) => unreachable!(),
            }
        }
        let (expected, _, had_errors) = encoding_rs::SHIFT_JIS.encode("日本語");
        assert!(!had_errors);
        assert_eq!(out, expected.into_owned());
    }
}
