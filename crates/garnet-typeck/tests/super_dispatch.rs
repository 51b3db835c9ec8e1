//! `super` resolution through superclasses and included modules.

use garnet_ast::{AstBuilder, NodeId, ParsedProgram};
use garnet_typeck::{check, ErrorKind, TypeckResult};

// ── Helpers ────────────────────────────────────────────────────────────

fn check_ok(program: &ParsedProgram) -> TypeckResult {
    let result = check(program);
    assert!(result.is_ok(), "unexpected errors: {:?}", result.errors);
    result
}

/// `class <name> [< <parent>]; def <method>(<params>); <body>; end; end`
fn class_with(
    b: &mut AstBuilder,
    name: &str,
    parent: Option<&str>,
    method: &str,
    params: &[&str],
    body: Vec<NodeId>,
) -> NodeId {
    let args = params.iter().map(|p| b.arg(p)).collect();
    let def = b.def(method, args, body);
    b.class(name, parent, vec![def])
}

// ── Resolution ─────────────────────────────────────────────────────────

#[test]
fn super_calls_the_parent_method() {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let foo = class_with(&mut b, "Foo", None, "foo", &[], vec![one]);
    let sup = b.super_call(vec![]);
    let bar = class_with(&mut b, "Bar", Some("Foo"), "foo", &[], vec![sup]);
    let obj = b.new_object("Bar", vec![]);
    let call = b.call_on(obj, "foo", vec![]);
    let program = b.program(vec![foo, bar, call]);

    let result = check_ok(&program);
    assert_eq!(result.result_name().as_deref(), Some("Int"));
    let outer = result.spec(result.targets(call)[0]);
    assert_eq!(result.registry.name(outer.owner), "Bar");
}

#[test]
fn super_forwards_parameters() {
    let mut b = AstBuilder::new();
    let a = b.var("a");
    let foo = class_with(&mut b, "Foo", None, "add", &["a"], vec![a]);
    let sup = b.super_call(vec![]);
    let bar = class_with(&mut b, "Bar", Some("Foo"), "add", &["a"], vec![sup]);
    let obj = b.new_object("Bar", vec![]);
    let c = b.char('c');
    let call = b.call_on(obj, "add", vec![c]);
    let program = b.program(vec![foo, bar, call]);
    assert_eq!(check_ok(&program).result_name().as_deref(), Some("Char"));
}

#[test]
fn super_with_explicit_arguments() {
    let mut b = AstBuilder::new();
    let x = b.var("x");
    let y = b.var("y");
    let sum = b.op(x, "+", y);
    let foo = class_with(&mut b, "Foo", None, "add", &["x", "y"], vec![sum]);
    let a = b.var("a");
    let half = b.double(2.5);
    let sup = b.super_call(vec![a, half]);
    let bar = class_with(&mut b, "Bar", Some("Foo"), "add", &["a"], vec![sup]);
    let obj = b.new_object("Bar", vec![]);
    let one = b.int(1);
    let call = b.call_on(obj, "add", vec![one]);
    let program = b.program(vec![foo, bar, call]);
    assert_eq!(check_ok(&program).result_name().as_deref(), Some("Double"));
}

#[test]
fn super_reaches_an_included_module() {
    let mut b = AstBuilder::new();
    let c = b.char('h');
    let hi = b.def("hi", vec![], vec![c]);
    let module = b.module("Greet", vec![hi]);
    let include = b.include("Greet");
    let sup = b.super_call(vec![]);
    let own = b.def("hi", vec![], vec![sup]);
    let class = b.class("Foo", None, vec![include, own]);
    let obj = b.new_object("Foo", vec![]);
    let call = b.call_on(obj, "hi", vec![]);
    let program = b.program(vec![module, class, call]);
    assert_eq!(check_ok(&program).result_name().as_deref(), Some("Char"));
}

// ── Initializers ───────────────────────────────────────────────────────

#[test]
fn super_initialize_assigns_parent_ivars() {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let set = b.set_ivar("@x", one);
    let foo = class_with(&mut b, "Foo", None, "initialize", &[], vec![set]);
    let sup = b.super_call(vec![]);
    let init = b.def("initialize", vec![], vec![sup]);
    let x = b.ivar("@x");
    let getter = b.def("x", vec![], vec![x]);
    let bar = b.class("Bar", Some("Foo"), vec![init, getter]);
    let obj = b.new_object("Bar", vec![]);
    let call = b.call_on(obj, "x", vec![]);
    let program = b.program(vec![foo, bar, call]);

    let result = check_ok(&program);
    assert_eq!(result.result_name().as_deref(), Some("Int"));
    let bar_type = result.spec(result.targets(obj)[0]).self_type;
    assert_eq!(result.registry.name(bar_type), "Bar");
    assert_eq!(result.registry.ivar(bar_type, "@x"), Some(result.registry.core.int));
    assert!(result.registry.is_initialized(bar_type, "@x"));
}

#[test]
fn super_initialize_across_three_levels() {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let set = b.set_ivar("@x", one);
    let foo = class_with(&mut b, "Foo", None, "initialize", &[], vec![set]);
    let sup = b.super_call(vec![]);
    let bar = class_with(&mut b, "Bar", Some("Foo"), "initialize", &[], vec![sup]);
    let sup = b.super_call(vec![]);
    let baz = class_with(&mut b, "Baz", Some("Bar"), "initialize", &[], vec![sup]);
    let obj = b.new_object("Baz", vec![]);
    let program = b.program(vec![foo, bar, baz, obj]);

    let result = check_ok(&program);
    let baz_type = result.result_type.unwrap();
    assert_eq!(result.registry.name(baz_type), "Baz");
    assert_eq!(result.registry.ivar(baz_type, "@x"), Some(result.registry.core.int));
    assert!(result.registry.is_initialized(baz_type, "@x"));
}

// ── Errors ─────────────────────────────────────────────────────────────

#[test]
fn super_without_parent_method_is_an_error() {
    let mut b = AstBuilder::new();
    let sup = b.super_call(vec![]);
    let foo = class_with(&mut b, "Foo", None, "foo", &[], vec![sup]);
    let obj = b.new_object("Foo", vec![]);
    let call = b.call_on(obj, "foo", vec![]);
    let program = b.program(vec![foo, call]);

    let result = check(&program);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind(), ErrorKind::UnresolvedCall);
    assert_eq!(result.errors[0].code(), "E0004");
    assert_eq!(result.errors[0].to_string(), "no superclass method 'foo' for Foo");
}

#[test]
fn super_initialize_without_parent_initialize_is_an_error() {
    let mut b = AstBuilder::new();
    let sup = b.super_call(vec![]);
    let sup = b.at(sup, 2, 5);
    let foo = class_with(&mut b, "Foo", None, "initialize", &[], vec![sup]);
    let obj = b.new_object("Foo", vec![]);
    let program = b.program(vec![foo, obj]);

    let result = check(&program);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code(), "E0004");
    assert_eq!(result.errors[0].to_string(), "no superclass method 'initialize' for Foo");
    let loc = result.errors[0].location().expect("location");
    assert_eq!((loc.line, loc.column), (2, 5));
}

#[test]
fn super_outside_a_method_is_an_error() {
    let mut b = AstBuilder::new();
    let sup = b.super_call(vec![]);
    let program = b.program(vec![sup]);
    let result = check(&program);
    assert_eq!(result.errors[0].code(), "E0004");
    assert!(result.result_type.is_none());
}
