//! shibori — an XML/HTML template engine that translates templates
//! interleaving literal markup with embedded host-language expressions and
//! statements into an executable streaming routine.
//!
//! Pipeline: [`encoding`] detects a charset from raw bytes, [`template`]
//! scans and classifies processing instructions, [`handlers`] and [`emit`]
//! turn each PI into generated host-language code (re-indented via
//! [`host::indent`]), [`translator`] drives that loop end to end, and
//! [`runner`] compiles the result against [`host`]'s tokenizer/parser/
//! interpreter and iterates it, translating host errors back to template
//! coordinates. This module is the façade tying the pipeline together.

mod emit;
mod encoding;
mod error;
mod handlers;
mod host;
mod log;
mod runner;
mod template;
mod translator;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub use error::ShiboriError;
pub use host::value::{RuntimeError, Value};

use encoding::EncodingDetector;
use host::value::FeatureMask;
use runner::{Chunk, CompiledRoutine};

/// A mapping from names to values, supplied per render call and merged over
/// an [`Engine`]'s default context (spec.md §3, §5: "configuration set at
/// startup" overlaid by per-call bindings).
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    vars: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.vars.insert(name.into(), value);
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Overlays `overlay`'s bindings on top of `self`'s, `overlay` winning
    /// on key collisions — the per-call-context-over-engine-defaults order
    /// from spec.md §5.
    fn merged_over(&self, overlay: &ExecutionContext) -> HashMap<String, Value> {
        let mut merged = self.vars.clone();
        merged.extend(overlay.vars.clone());
        merged
    }
}

/// Runtime flag bits (spec.md §6) plus two feature-flag overrides for hosts
/// that can't rely on the in-template `from shibori import ...` detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderFlags {
    pub returns_bytes: bool,
    pub returns_iter: bool,
    pub returns_renderer: bool,
    pub force_cast_string: bool,
    pub force_except_hook: bool,
}

impl RenderFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(mut self, value: bool) -> Self {
        self.returns_bytes = value;
        self
    }

    pub fn with_iter(mut self, value: bool) -> Self {
        self.returns_iter = value;
        self
    }

    pub fn with_renderer(mut self, value: bool) -> Self {
        self.returns_renderer = value;
        self
    }

    pub fn with_cast_string(mut self, value: bool) -> Self {
        self.force_cast_string = value;
        self
    }

    pub fn with_except_hook(mut self, value: bool) -> Self {
        self.force_except_hook = value;
        self
    }

    fn feature_overrides(&self) -> FeatureMask {
        let mut mask = FeatureMask::NONE;
        if self.force_cast_string {
            mask |= FeatureMask::CAST_STRING;
        }
        if self.force_except_hook {
            mask |= FeatureMask::EXCEPT_HOOK;
        }
        mask
    }
}

/// A rendered template. Bytes and iterator output can combine (spec.md §8's
/// "round-trip under flags"), so this isn't collapsed into a plain `String`.
#[derive(Debug)]
pub enum RenderOutput {
    Text(String),
    Bytes(Vec<u8>),
    Iter(ChunkIter),
    /// `returns_renderer`: the compiled artifact itself, unexecuted.
    Renderer(CompiledTemplate),
}

impl RenderOutput {
    pub fn into_text(self) -> Result<String, ShiboriError> {
        match self {
            RenderOutput::Text(s) => Ok(s),
            other => Err(type_mismatch_output(&other, "text")),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, ShiboriError> {
        match self {
            RenderOutput::Bytes(b) => Ok(b),
            other => Err(type_mismatch_output(&other, "bytes")),
        }
    }
}

fn type_mismatch_output(got: &RenderOutput, wanted: &str) -> ShiboriError {
    let got_name = match got {
        RenderOutput::Text(_) => "text",
        RenderOutput::Bytes(_) => "bytes",
        RenderOutput::Iter(_) => "iterator",
        RenderOutput::Renderer(_) => "renderer",
    };
    ShiboriError::InputTypeFailure {
        description: format!("expected {wanted} render output, got {got_name}"),
    }
}

/// Lazily pulls rendered fragments, one [`host::routine::RoutineHandle`]
/// advance at a time. Wraps a [`TextChunks`] or [`BytesChunks`] depending on
/// `returns_bytes`, matching spec.md §5.1's "both are provided" surface.
#[derive(Debug)]
pub enum ChunkIter {
    Text(TextChunks),
    Bytes(BytesChunks),
}

#[derive(Debug)]
struct ChunkSource {
    runner: runner::Runner,
    script: Arc<emit::EmittedScript>,
    template_text: Arc<String>,
    done: bool,
}

impl ChunkSource {
    fn advance(&mut self, returns_bytes: bool) -> Option<Result<Chunk, ShiboriError>> {
        if self.done {
            return None;
        }
        match self.runner.next(&self.script, &self.template_text, returns_bytes) {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[derive(Debug)]
pub struct TextChunks(ChunkSource);

impl Iterator for TextChunks {
    type Item = Result<String, ShiboriError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.advance(false).map(|r| {
            r.map(|chunk| match chunk {
                Chunk::Text(t) => t,
                Chunk::Bytes(_) => unreachable!("text chunk source never yields bytes"),
            })
        })
    }
}

#[derive(Debug)]
pub struct BytesChunks(ChunkSource);

impl Iterator for BytesChunks {
    type Item = Result<Vec<u8>, ShiboriError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.advance(true).map(|r| {
            r.map(|chunk| match chunk {
                Chunk::Bytes(b) => b,
                Chunk::Text(_) => unreachable!("bytes chunk source never yields text"),
            })
        })
    }
}

/// A template compiled once (spec.md's `CompiledRoutine`), renderable any
/// number of times against different contexts.
#[derive(Clone, Debug)]
pub struct CompiledTemplate {
    script: Arc<emit::EmittedScript>,
    compiled: CompiledRoutine,
    template_text: Arc<String>,
    default_context: ExecutionContext,
}

impl CompiledTemplate {
    /// The generated host-language source text, for debugging (spec_full.md
    /// §4: kept as a public accessor since `katagami.py`'s own doctest used
    /// it to show users what gets generated).
    pub fn script(&self) -> &str {
        &self.script.text
    }

    pub fn encoding(&self) -> &str {
        &self.compiled.encoding
    }

    pub fn render(&self, context: ExecutionContext, flags: RenderFlags) -> Result<RenderOutput, ShiboriError> {
        if flags.returns_renderer {
            if !context.is_empty() {
                return Err(ShiboriError::InputTypeFailure {
                    description: "returns_renderer cannot be combined with a non-empty context".to_string(),
                });
            }
            return Ok(RenderOutput::Renderer(self.clone()));
        }

        let merged = self.default_context.merged_over(&context);
        let shared: host::SharedEnv = Arc::new(Mutex::new(merged));
        let features = self.compiled.features | flags.feature_overrides();
        let mut exec = runner::Runner::start_with_features(&self.compiled, shared, features);

        if flags.returns_iter {
            let source = ChunkSource {
                runner: exec,
                script: self.script.clone(),
                template_text: self.template_text.clone(),
                done: false,
            };
            return Ok(RenderOutput::Iter(if flags.returns_bytes {
                ChunkIter::Bytes(BytesChunks(source))
            } else {
                ChunkIter::Text(TextChunks(source))
            }));
        }

        if flags.returns_bytes {
            let mut out = Vec::new();
            while let Some(chunk) = exec.next(&self.script, &self.template_text, true)? {
                match chunk {
                    Chunk::Bytes(b) => out.extend(b),
                    Chunk::Text(_) => unreachable!("bytes-flagged run never yields text"),
                }
            }
            Ok(RenderOutput::Bytes(out))
        } else {
            let mut out = String::new();
            while let Some(chunk) = exec.next(&self.script, &self.template_text, false)? {
                match chunk {
                    Chunk::Text(t) => out.push_str(&t),
                    Chunk::Bytes(_) => unreachable!("text-flagged run never yields bytes"),
                }
            }
            Ok(RenderOutput::Text(out))
        }
    }
}

/// Owns the process-wide default context and a synthetic-name counter,
/// replacing what would otherwise be hidden global state (spec.md §9:
/// "avoid hidden global state in the reimplementation") with a struct the
/// caller constructs and holds explicitly.
pub struct Engine {
    name_counter: u64,
    default_context: ExecutionContext,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            name_counter: 0,
            default_context: ExecutionContext::new(),
        }
    }

    /// A handle to the engine's shared default context, mutated at startup
    /// and overlaid by every call's per-render context thereafter.
    pub fn default_context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.default_context
    }

    pub fn compile_str(&mut self, template: &str) -> Result<CompiledTemplate, ShiboriError> {
        let name = self.next_name();
        let encoding = EncodingDetector::detect_str(template);
        self.compile_named(&name, template.to_string(), encoding)
    }

    pub fn compile_bytes(&mut self, template: &[u8]) -> Result<CompiledTemplate, ShiboriError> {
        let name = self.next_name();
        let encoding = EncodingDetector::detect(template);
        let text = encoding::decode(template, &encoding);
        self.compile_named(&name, text, encoding)
    }

    pub fn compile_file(&mut self, path: impl AsRef<Path>) -> Result<CompiledTemplate, ShiboriError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| ShiboriError::InputTypeFailure {
            description: format!("failed to read template file {}: {e}", path.display()),
        })?;
        let encoding = EncodingDetector::detect(&bytes);
        let text = encoding::decode(&bytes, &encoding);
        self.compile_named(&path.display().to_string(), text, encoding)
    }

    fn next_name(&mut self) -> String {
        self.name_counter += 1;
        format!("<template-script#{}>", self.name_counter)
    }

    fn compile_named(&self, name: &str, text: String, encoding: String) -> Result<CompiledTemplate, ShiboriError> {
        let script = translator::translate(name, &text, &encoding)?;
        let compiled = runner::compile(&script, &text)?;
        Ok(CompiledTemplate {
            script: Arc::new(script),
            compiled,
            template_text: Arc::new(text),
            default_context: self.default_context.clone(),
        })
    }
}

/// Renders a template string with a fresh, default-configured [`Engine`].
/// For reuse across many renders, build an [`Engine`] and call
/// [`Engine::compile_str`]/[`CompiledTemplate::render`] directly.
pub fn render_string(template: &str, context: ExecutionContext, flags: RenderFlags) -> Result<RenderOutput, ShiboriError> {
    Engine::new().compile_str(template)?.render(context, flags)
}

pub fn render_bytes(template: &[u8], context: ExecutionContext, flags: RenderFlags) -> Result<RenderOutput, ShiboriError> {
    Engine::new().compile_bytes(template)?.render(context, flags)
}

pub fn render_file(path: impl AsRef<Path>, context: ExecutionContext, flags: RenderFlags) -> Result<RenderOutput, ShiboriError> {
    Engine::new().compile_file(path)?.render(context, flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_string_substitutes_context_value() {
        let ctx = ExecutionContext::new().with("name", Value::Str("world".to_string()));
        let out = render_string("hello, <?=name?>", ctx, RenderFlags::new())
            .unwrap()
            .into_text()
            .unwrap();
        assert_eq!(out, "hello, world");
    }

    #[test]
    fn render_bytes_flag_produces_byte_output() {
        let out = render_string("plain text", ExecutionContext::new(), RenderFlags::new().with_bytes(true))
            .unwrap()
            .into_bytes()
            .unwrap();
        assert_eq!(out, b"plain text");
    }

    #[test]
    fn compiled_template_renders_repeatedly_with_different_contexts() {
        let mut engine = Engine::new();
        let compiled = engine.compile_str("hi <?=name?>").unwrap();
        let a = compiled
            .render(ExecutionContext::new().with("name", Value::Str("a".into())), RenderFlags::new())
            .unwrap()
            .into_text()
            .unwrap();
        let b = compiled
            .render(ExecutionContext::new().with("name", Value::Str("b".into())), RenderFlags::new())
            .unwrap()
            .into_text()
            .unwrap();
        assert_eq!(a, "hi a");
        assert_eq!(b, "hi b");
    }

    #[test]
    fn engine_default_context_is_overlaid_by_per_call_context() {
        let mut engine = Engine::new();
        engine.default_context_mut().insert("name", Value::Str("default".into()));
        let compiled = engine.compile_str("hi <?=name?>").unwrap();

        let default_out = compiled.render(ExecutionContext::new(), RenderFlags::new()).unwrap().into_text().unwrap();
        assert_eq!(default_out, "hi default");

        let overridden = compiled
            .render(ExecutionContext::new().with("name", Value::Str("override".into())), RenderFlags::new())
            .unwrap()
            .into_text()
            .unwrap();
        assert_eq!(overridden, "hi override");
    }

    #[test]
    fn returns_iter_yields_chunks_lazily() {
        let ctx = ExecutionContext::new().with(
            "ns",
            Value::List(vec![Value::Str("a".into()), Value::Str("b".into())]),
        );
        let out = render_string(
            "<? for n in ns: {?>[<?=n?>]<?}?>",
            ctx,
            RenderFlags::new().with_iter(true),
        )
        .unwrap();
        match out {
            RenderOutput::Iter(ChunkIter::Text(it)) => {
                let chunks: Vec<String> = it.map(|r| r.unwrap()).collect();
                assert_eq!(chunks, vec!["[", "a", "]", "[", "b", "]"]);
            }
            _ => panic!("expected a text chunk iterator"),
        }
    }

    #[test]
    fn returns_renderer_yields_compiled_artifact_without_executing() {
        let out = render_string("hello", ExecutionContext::new(), RenderFlags::new().with_renderer(true)).unwrap();
        match out {
            RenderOutput::Renderer(compiled) => {
                assert!(compiled.script().contains("def __main__"));
            }
            _ => panic!("expected a renderer"),
        }
    }

    #[test]
    fn returns_renderer_rejects_non_empty_context() {
        let ctx = ExecutionContext::new().with("x", Value::Int(1));
        let result = render_string("hello", ctx, RenderFlags::new().with_renderer(true));
        match result {
            Err(err) => assert!(matches!(err, ShiboriError::InputTypeFailure { .. })),
            Ok(_) => panic!("expected returns_renderer with a context to fail"),
        }
    }

    #[test]
    fn empty_template_renders_to_empty_string() {
        let out = render_string("", ExecutionContext::new(), RenderFlags::new())
            .unwrap()
            .into_text()
            .unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn render_file_reads_and_renders_a_template_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("shibori-test-{}.tmpl", std::process::id()));
        fs::write(&path, "hello, <?=name?>!").unwrap();
        let ctx = ExecutionContext::new().with("name", Value::Str("file".into()));
        let out = render_file(&path, ctx, RenderFlags::new()).unwrap().into_text().unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(out, "hello, file!");
    }

    #[test]
    fn render_file_missing_path_is_input_type_failure() {
        let result = render_file("/nonexistent/path/to/a/template.tmpl", ExecutionContext::new(), RenderFlags::new());
        match result {
            Err(err) => assert!(matches!(err, ShiboriError::InputTypeFailure { .. })),
            Ok(_) => panic!("expected a missing template file to fail"),
        }
    }
}
