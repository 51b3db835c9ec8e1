//! Flow-sensitive typing: branches, narrowing, loops and blocks.

use garnet_ast::{AstBuilder, NodeId, ParsedProgram};
use garnet_typeck::{check, ErrorKind, TypeckResult};

// ── Helpers ────────────────────────────────────────────────────────────

fn check_ok(program: &ParsedProgram) -> TypeckResult {
    let result = check(program);
    assert!(result.is_ok(), "unexpected errors: {:?}", result.errors);
    result
}

fn result_of(program: &ParsedProgram) -> String {
    check_ok(program).result_name().unwrap_or_default()
}

/// `a = 1; if false; a = nil; end`: leaves `a` as `Int | Nil`.
fn nilable_a(b: &mut AstBuilder) -> Vec<NodeId> {
    let one = b.int(1);
    let set = b.set("a", one);
    let cond = b.bool(false);
    let nil = b.nil();
    let clear = b.set("a", nil);
    let branch = b.if_else(cond, vec![clear], vec![]);
    vec![set, branch]
}

/// `a = 1; a = 'c'`: leaves `a` as `Char | Int`.
fn int_or_char_a(b: &mut AstBuilder) -> Vec<NodeId> {
    let one = b.int(1);
    let first = b.set("a", one);
    let c = b.char('c');
    let second = b.set("a", c);
    vec![first, second]
}

// ── Assignment ─────────────────────────────────────────────────────────

#[test]
fn reassignment_accumulates_a_union() {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let first = b.set("a", one);
    let other = b.double(1.1);
    let second = b.set("a", other);
    let read = b.var("a");
    let program = b.program(vec![first, second, read]);
    assert_eq!(result_of(&program), "Double | Int");
}

#[test]
fn read_before_assignment_is_an_error() {
    let mut b = AstBuilder::new();
    let read = b.var("nope");
    let read = b.at(read, 1, 1);
    let program = b.program(vec![read]);

    let result = check(&program);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind(), ErrorKind::UninitializedRead);
    assert_eq!(result.errors[0].to_string(), "read of 'nope' before it is assigned");
    assert_eq!(result.errors[0].location().map(|l| l.line), Some(1));
}

// ── Branches ───────────────────────────────────────────────────────────

#[test]
fn assignment_in_one_branch_is_nilable_after_the_if() {
    let mut b = AstBuilder::new();
    let cond = b.bool(true);
    let one = b.int(1);
    let set = b.set("x", one);
    let branch = b.if_else(cond, vec![set], vec![]);
    let read = b.var("x");
    let program = b.program(vec![branch, read]);
    assert_eq!(result_of(&program), "Int | Nil");
}

#[test]
fn assignment_in_both_branches_is_not_nilable() {
    let mut b = AstBuilder::new();
    let cond = b.bool(true);
    let one = b.int(1);
    let then = b.set("x", one);
    let c = b.char('c');
    let other = b.set("x", c);
    let branch = b.if_else(cond, vec![then], vec![other]);
    let read = b.var("x");
    let program = b.program(vec![branch, read]);
    assert_eq!(result_of(&program), "Char | Int");
}

#[test]
fn if_without_else_is_nilable() {
    let mut b = AstBuilder::new();
    let cond = b.bool(true);
    let one = b.int(1);
    let branch = b.if_else(cond, vec![one], vec![]);
    let program = b.program(vec![branch]);
    assert_eq!(result_of(&program), "Int | Nil");
}

#[test]
fn truthiness_narrows_away_nil() {
    let mut b = AstBuilder::new();
    let mut stmts = nilable_a(&mut b);
    let cond = b.var("a");
    let a = b.var("a");
    let one = b.int(1);
    let sum = b.op(a, "+", one);
    let zero = b.int(0);
    let branch = b.if_else(cond, vec![sum], vec![zero]);
    stmts.push(branch);
    let program = b.program(stmts);

    let result = check_ok(&program);
    assert_eq!(result.result_name().as_deref(), Some("Int"));
    assert_eq!(result.type_name(a).as_deref(), Some("Int"));
}

#[test]
fn nil_check_narrows_the_else_branch() {
    let mut b = AstBuilder::new();
    let mut stmts = nilable_a(&mut b);
    let a = b.var("a");
    let cond = b.call_on(a, "nil?", vec![]);
    let zero = b.int(0);
    let a = b.var("a");
    let one = b.int(1);
    let sum = b.op(a, "+", one);
    let branch = b.if_else(cond, vec![zero], vec![sum]);
    stmts.push(branch);
    let program = b.program(stmts);
    assert_eq!(result_of(&program), "Int");
}

#[test]
fn is_a_narrows_both_branches() {
    let mut b = AstBuilder::new();
    let mut stmts = int_or_char_a(&mut b);
    let a = b.var("a");
    let cond = b.is_a(a, "Int");
    let a_int = b.var("a");
    let one = b.int(1);
    let sum = b.op(a_int, "+", one);
    let a_char = b.var("a");
    let ord = b.call_on(a_char, "ord", vec![]);
    let branch = b.if_else(cond, vec![sum], vec![ord]);
    stmts.push(branch);
    let program = b.program(stmts);

    let result = check_ok(&program);
    assert_eq!(result.result_name().as_deref(), Some("Int"));
    assert_eq!(result.type_name(a_int).as_deref(), Some("Int"));
    assert_eq!(result.type_name(a_char).as_deref(), Some("Char"));
}

#[test]
fn narrowing_ends_with_the_branch() {
    let mut b = AstBuilder::new();
    let mut stmts = int_or_char_a(&mut b);
    let a = b.var("a");
    let cond = b.is_a(a, "Int");
    let a = b.var("a");
    let branch = b.if_else(cond, vec![a], vec![]);
    let after = b.var("a");
    stmts.push(branch);
    stmts.push(after);
    let program = b.program(stmts);
    assert_eq!(result_of(&program), "Char | Int");
}

#[test]
fn and_narrows_its_right_operand() {
    let mut b = AstBuilder::new();
    let mut stmts = nilable_a(&mut b);
    let left = b.var("a");
    let a = b.var("a");
    let one = b.int(1);
    let sum = b.op(a, "+", one);
    let both = b.and(left, sum);
    stmts.push(both);
    let program = b.program(stmts);
    assert_eq!(result_of(&program), "Int | Nil");
}

#[test]
fn or_joins_both_operands() {
    let mut b = AstBuilder::new();
    let mut stmts = nilable_a(&mut b);
    let left = b.var("a");
    let c = b.char('c');
    let either = b.or(left, c);
    stmts.push(either);
    let program = b.program(stmts);
    assert_eq!(result_of(&program), "Char | Int | Nil");
}

#[test]
fn case_narrows_each_when() {
    let mut b = AstBuilder::new();
    let mut stmts = int_or_char_a(&mut b);
    let subject = b.var("a");
    let int = b.ident("Int");
    let a = b.var("a");
    let one = b.int(1);
    let sum = b.op(a, "+", one);
    let on_int = b.when(vec![int], vec![sum]);
    let char = b.ident("Char");
    let a = b.var("a");
    let ord = b.call_on(a, "ord", vec![]);
    let on_char = b.when(vec![char], vec![ord]);
    let case = b.case(subject, vec![on_int, on_char], vec![]);
    stmts.push(case);
    let program = b.program(stmts);
    assert_eq!(result_of(&program), "Int | Nil");
}

#[test]
fn case_with_else_is_not_nilable() {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let set = b.set("a", one);
    let subject = b.var("a");
    let value = b.int(1);
    let c = b.char('c');
    let on_one = b.when(vec![value], vec![c]);
    let fallback = b.double(0.5);
    let case = b.case(subject, vec![on_one], vec![fallback]);
    let program = b.program(vec![set, case]);
    assert_eq!(result_of(&program), "Char | Double");
}

// ── Loops ──────────────────────────────────────────────────────────────

#[test]
fn while_is_nil() {
    let mut b = AstBuilder::new();
    let zero = b.int(0);
    let init = b.set("i", zero);
    let i = b.var("i");
    let three = b.int(3);
    let cond = b.op(i, "<", three);
    let i = b.var("i");
    let one = b.int(1);
    let next = b.op(i, "+", one);
    let step = b.set("i", next);
    let lp = b.while_loop(cond, vec![step]);
    let program = b.program(vec![init, lp]);
    assert_eq!(result_of(&program), "Nil");
}

#[test]
fn loop_body_assignments_reach_the_condition() {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let init = b.set("a", one);
    let a = b.var("a");
    let cond = b.is_a(a, "Int");
    let c = b.char('c');
    let widen = b.set("a", c);
    let lp = b.while_loop(cond, vec![widen]);
    let read = b.var("a");
    let program = b.program(vec![init, lp, read]);

    let result = check_ok(&program);
    assert_eq!(result.result_name().as_deref(), Some("Char | Int"));
    assert_eq!(result.type_name(a).as_deref(), Some("Char | Int"));
}

#[test]
fn variable_first_assigned_in_a_loop_is_nilable() {
    let mut b = AstBuilder::new();
    let cond = b.bool(false);
    let one = b.int(1);
    let set = b.set("y", one);
    let lp = b.while_loop(cond, vec![set]);
    let read = b.var("y");
    let program = b.program(vec![lp, read]);
    assert_eq!(result_of(&program), "Int | Nil");
}

#[test]
fn do_while_body_runs_at_least_once() {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let set = b.set("z", one);
    let cond = b.bool(false);
    let lp = b.do_while(vec![set], cond);
    let read = b.var("z");
    let program = b.program(vec![lp, read]);
    assert_eq!(result_of(&program), "Int");
}

// ── Blocks ─────────────────────────────────────────────────────────────

#[test]
fn yield_passes_values_to_the_block() {
    // def twice; yield 1; yield 2.5; end
    // twice { |x| x }
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let first = b.yield_(vec![one]);
    let half = b.double(2.5);
    let second = b.yield_(vec![half]);
    let def = b.def("twice", vec![], vec![first, second]);
    let x = b.var("x");
    let block = b.block(&["x"], vec![x]);
    let call = b.call_with_block(None, "twice", vec![], block);
    let program = b.program(vec![def, call]);
    assert_eq!(result_of(&program), "Double | Int");
}

#[test]
fn yield_without_a_block_is_an_error() {
    let mut b = AstBuilder::new();
    let y = b.yield_(vec![]);
    let def = b.def("foo", vec![], vec![y]);
    let call = b.call("foo", vec![]);
    let program = b.program(vec![def, call]);

    let result = check(&program);
    assert_eq!(result.errors[0].code(), "E0005");
    assert_eq!(
        result.errors[0].to_string(),
        "'foo' yields but was called without a block"
    );
}

#[test]
fn block_assignments_widen_caller_locals() {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let set = b.set("a", one);
    let elem = b.int(1);
    let array = b.array(vec![elem]);
    let half = b.double(2.5);
    let widen = b.set("a", half);
    let block = b.block(&["e"], vec![widen]);
    let each = b.call_with_block(Some(array), "each", vec![], block);
    let read = b.var("a");
    let program = b.program(vec![set, each, read]);
    assert_eq!(result_of(&program), "Double | Int");
}

#[test]
fn times_yields_integers() {
    let mut b = AstBuilder::new();
    let three = b.int(3);
    let i = b.var("i");
    let block = b.block(&["i"], vec![i]);
    let times = b.call_with_block(Some(three), "times", vec![], block);
    let program = b.program(vec![times]);

    let result = check_ok(&program);
    assert_eq!(result.result_name().as_deref(), Some("Int"));
    assert_eq!(result.type_name(i).as_deref(), Some("Int"));
}

#[test]
fn break_value_joins_the_call_result() {
    let mut b = AstBuilder::new();
    let elem = b.int(1);
    let array = b.array(vec![elem]);
    let c = b.char('c');
    let brk = b.brk(vec![c]);
    let block = b.block(&["e"], vec![brk]);
    let each = b.call_with_block(Some(array), "each", vec![], block);
    let program = b.program(vec![each]);
    assert_eq!(result_of(&program), "Array | Char");
}

#[test]
fn return_in_a_block_returns_from_the_method() {
    // def find; [1].each { |e| return 'c' }; 1; end
    let mut b = AstBuilder::new();
    let elem = b.int(1);
    let array = b.array(vec![elem]);
    let c = b.char('c');
    let ret = b.ret(vec![c]);
    let block = b.block(&["e"], vec![ret]);
    let each = b.call_with_block(Some(array), "each", vec![], block);
    let one = b.int(1);
    let def = b.def("find", vec![], vec![each, one]);
    let call = b.call("find", vec![]);
    let program = b.program(vec![def, call]);
    assert_eq!(result_of(&program), "Char | Int");
}

#[test]
fn block_given_to_a_def_that_never_yields_is_ignored() {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let def = b.def("foo", vec![], vec![one]);
    let two = b.char('2');
    let block = b.block(&[], vec![two]);
    let call = b.call_with_block(None, "foo", vec![], block);
    let program = b.program(vec![def, call]);
    assert_eq!(result_of(&program), "Int");
}

#[test]
fn block_to_a_def_that_never_yields_shares_its_specialization() {
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let def = b.def("foo", vec![], vec![one]);
    let plain = b.call("foo", vec![]);
    let two = b.char('2');
    let block = b.block(&[], vec![two]);
    let with_block = b.call_with_block(None, "foo", vec![], block);
    let program = b.program(vec![def, plain, with_block]);

    let result = check_ok(&program);
    assert_eq!(result.targets(plain), result.targets(with_block));
    assert_eq!(result.specializations.len(), 1);
}
