//! Rendering of type errors found by a full check.
//!
//! Trees are built with locations matching the source text passed to the
//! renderer, the way the parser would attach them.

use garnet_ast::{AstBuilder, ParsedProgram};
use garnet_typeck::{check, check_with, DiagnosticOptions, InferConfig, TypeckResult};

// ── Helpers ────────────────────────────────────────────────────────────

/// `a = 1` on line 1, `a.frob(2)` on line 2.
fn undefined_method_program() -> ParsedProgram {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let set = b.set("a", one);
    let set = b.at(set, 1, 1);
    let a = b.var("a");
    let a = b.at(a, 2, 1);
    let two = b.int(2);
    let call = b.call_on(a, "frob", vec![two]);
    let call = b.at(call, 2, 3);
    b.program(vec![set, call])
}

const UNDEFINED_SOURCE: &str = "a = 1\na.frob(2)\n";

fn render_first_error(result: &TypeckResult, source: &str, options: &DiagnosticOptions) -> String {
    assert!(!result.errors.is_empty(), "expected an error");
    garnet_typeck::render_diagnostic(&result.errors[0], source, "main.gt", options)
}

// ── Reports ────────────────────────────────────────────────────────────

#[test]
fn test_diag_undefined_method_report() {
    let result = check(&undefined_method_program());
    let out = render_first_error(&result, UNDEFINED_SOURCE, &DiagnosticOptions::default());
    assert!(out.contains("E0001"), "{out}");
    assert!(out.contains("undefined method 'frob' for Int"), "{out}");
    assert!(out.contains("Int has no method 'frob'"), "{out}");
    assert!(out.contains("main.gt"), "{out}");
}

#[test]
fn test_diag_location_comes_from_the_call() {
    let result = check(&undefined_method_program());
    let loc = result.errors[0].location().expect("location");
    assert_eq!((loc.line, loc.column), (2, 3));
}

#[test]
fn test_diag_plain_without_source() {
    let result = check(&undefined_method_program());
    let out = render_first_error(&result, "", &DiagnosticOptions::default());
    insta::assert_snapshot!(out, @r"
    error[E0001]: undefined method 'frob' for Int
      --> main.gt:2:3
    ");
}

#[test]
fn test_diag_uninitialized_read_has_help() {
    let mut b = AstBuilder::new();
    let read = b.var("nope");
    let read = b.at(read, 1, 1);
    let program = b.program(vec![read]);
    let result = check(&program);
    let out = render_first_error(&result, "nope\n", &DiagnosticOptions::default());
    assert!(out.contains("E0007"), "{out}");
    assert!(out.contains("assign 'nope' before reading it"), "{out}");
}

#[test]
fn test_diag_non_convergent_is_internal() {
    // def foo(x); if x > 0; foo(x - 1) + 1 else 1 end; end; foo(5)
    let mut b = AstBuilder::new();
    let param = b.arg("x");
    let x = b.var("x");
    let zero = b.int(0);
    let cond = b.op(x, ">", zero);
    let x = b.var("x");
    let one = b.int(1);
    let minus = b.op(x, "-", one);
    let rec = b.call("foo", vec![minus]);
    let one = b.int(1);
    let plus = b.op(rec, "+", one);
    let base = b.int(1);
    let body = b.if_else(cond, vec![plus], vec![base]);
    let def = b.def("foo", vec![param], vec![body]);
    let def = b.at(def, 1, 1);
    let five = b.int(5);
    let call = b.call("foo", vec![five]);
    let program = b.program(vec![def, call]);

    let config = InferConfig {
        max_fixpoint_passes: 1,
        ..Default::default()
    };
    let result = check_with(&program, &config);
    let out = render_first_error(&result, "def foo(x)\n", &DiagnosticOptions::default());
    assert!(out.contains("ICE0001"), "{out}");
    assert!(out.contains("internal error"), "{out}");
    assert!(out.contains("please report"), "{out}");
}

// ── JSON ───────────────────────────────────────────────────────────────

#[test]
fn test_diag_json() {
    let result = check(&undefined_method_program());
    let options = DiagnosticOptions {
        color: false,
        json: true,
    };
    let out = render_first_error(&result, UNDEFINED_SOURCE, &options);
    let value: serde_json::Value = serde_json::from_str(&out).expect("valid json");
    assert_eq!(value["code"], "E0001");
    assert_eq!(value["severity"], "error");
    assert_eq!(value["file"], "main.gt");
    assert_eq!(value["spans"][0]["line"], 2);
    assert_eq!(value["spans"][0]["column"], 3);
}

#[test]
fn test_diag_render_errors_on_success_is_empty() {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let program = b.program(vec![one]);
    let result = check(&program);
    assert_eq!(result.render_errors("1\n", "main.gt", &DiagnosticOptions::default()), "");
}
