// End-to-end API tests exercising the public facade beyond the eight named
// scenarios in tests/fixtures.rs: flag combinations, position fidelity, and
// the indentation-stack invariants.

use shibori::{render_string, ExecutionContext, RenderFlags, ShiboriError, Value};

#[test]
fn empty_template_is_empty_output_with_no_error() {
    let out = render_string("", ExecutionContext::new(), RenderFlags::new())
        .unwrap()
        .into_text()
        .unwrap();
    assert_eq!(out, "");
}

#[test]
fn shift_jis_bytes_round_trip_through_the_declared_encoding() {
    let text = "<meta charset=\"shift-jis\">こんにちは、<?=name?>";
    let (input, _, had_errors) = encoding_rs::SHIFT_JIS.encode(text);
    assert!(!had_errors);

    let ctx = ExecutionContext::new().with("name", Value::Str("世界".to_string()));
    let out = shibori::render_bytes(&input, ctx, RenderFlags::new().with_bytes(true))
        .unwrap()
        .into_bytes()
        .unwrap();

    let (expected, _, had_errors) = encoding_rs::SHIFT_JIS.encode("<meta charset=\"shift-jis\">こんにちは、世界");
    assert!(!had_errors);
    assert_eq!(out, expected.into_owned());
}

#[test]
fn bytes_and_string_outputs_agree_after_utf8_round_trip() {
    let ctx = ExecutionContext::new().with("name", Value::Str("café".to_string()));
    let text = render_string("hello, <?=name?>", ctx.clone(), RenderFlags::new())
        .unwrap()
        .into_text()
        .unwrap();
    let bytes = render_string("hello, <?=name?>", ctx, RenderFlags::new().with_bytes(true))
        .unwrap()
        .into_bytes()
        .unwrap();
    assert_eq!(bytes, text.into_bytes());
}

#[test]
fn returns_iter_chunk_count_matches_literal_and_expression_count() {
    let ctx = ExecutionContext::new().with("name", Value::Str("x".to_string()));
    let out = render_string("a<?=name?>b<?=name?>c", ctx, RenderFlags::new().with_iter(true)).unwrap();
    let chunks = match out {
        shibori::RenderOutput::Iter(shibori::ChunkIter::Text(it)) => it.map(|r| r.unwrap()).collect::<Vec<_>>(),
        _ => panic!("expected a text chunk iterator"),
    };
    // 3 literal chunks ("a", "b", "c") + 2 inline expressions.
    assert_eq!(chunks, vec!["a", "x", "b", "x", "c"]);
}

#[test]
fn unclosed_block_bridge_is_indentation_failure_pinned_to_opener() {
    let err = render_string("<? if x: {?>body", ExecutionContext::new(), RenderFlags::new()).unwrap_err();
    match err {
        ShiboriError::IndentationFailure { line, column, .. } => assert_eq!((line, column), (1, 1)),
        other => panic!("expected IndentationFailure, got {other:?}"),
    }
}

#[test]
fn dangling_close_brace_is_indentation_failure_pinned_to_the_pi() {
    let err = render_string("body<?}?>", ExecutionContext::new(), RenderFlags::new()).unwrap_err();
    match err {
        ShiboriError::IndentationFailure { line, column, .. } => assert_eq!((line, column), (1, 5)),
        other => panic!("expected IndentationFailure, got {other:?}"),
    }
}

#[test]
fn malformed_embedded_script_reports_template_position() {
    let template = "first line\n<?py if :\n?>";
    let err = render_string(template, ExecutionContext::new(), RenderFlags::new()).unwrap_err();
    match err {
        ShiboriError::SyntaxFailure { line, .. } => assert_eq!(line, 2),
        other => panic!("expected SyntaxFailure, got {other:?}"),
    }
}

#[test]
fn type_mismatch_without_cast_string_propagates_runtime_failure_at_template_line() {
    let template = "line one\n<?=1?>";
    let err = render_string(template, ExecutionContext::new(), RenderFlags::new()).unwrap_err();
    match err {
        ShiboriError::RuntimeFailure { line, .. } => assert_eq!(line, 2),
        other => panic!("expected RuntimeFailure, got {other:?}"),
    }
}

#[test]
fn force_cast_string_flag_overrides_without_in_template_import() {
    let out = render_string("<?=1?>", ExecutionContext::new(), RenderFlags::new().with_cast_string(true))
        .unwrap()
        .into_text()
        .unwrap();
    assert_eq!(out, "1");
}

#[test]
fn pass_through_pi_is_emitted_unchanged() {
    let out = render_string("<?xml version=\"1.0\"?>", ExecutionContext::new(), RenderFlags::new())
        .unwrap()
        .into_text()
        .unwrap();
    assert_eq!(out, "<?xml version=\"1.0\"?>");
}
