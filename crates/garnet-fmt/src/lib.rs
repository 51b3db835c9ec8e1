//! Garnet pretty printer.
//!
//! Renders a syntax tree back to surface syntax: two-space indentation,
//! `end`-terminated blocks, infix operators, and `[]` / `[]=` sugar. With an
//! [`Annotator`] each statement gets a trailing `# : Type` comment, which is
//! how the checker's results are shown to a human.
//!
//! 1. [`walker`] turns the tree into a layout [`ir::Doc`]
//! 2. [`printer`] lays the document out against [`FormatConfig::max_width`]

pub mod ir;
pub mod printer;
pub mod walker;

use garnet_ast::{Ast, NodeId};

pub use printer::FormatConfig;
pub use walker::Annotator;

/// Print the subtree at `root`.
///
/// ```
/// use garnet_ast::AstBuilder;
/// use garnet_fmt::{format_tree, FormatConfig};
///
/// let mut b = AstBuilder::new();
/// let one = b.int(1);
/// let assign = b.set("x", one);
/// let program = b.program(vec![assign]);
/// let out = format_tree(&program.ast, program.root, &FormatConfig::default());
/// assert_eq!(out, "x = 1\n");
/// ```
pub fn format_tree(ast: &Ast, root: NodeId, config: &FormatConfig) -> String {
    let doc = walker::Walker::new(ast).program(root);
    printer::print(&doc, config)
}

/// Print the subtree at `root`, annotating statements with their types.
pub fn format_annotated(
    ast: &Ast,
    root: NodeId,
    annotator: &dyn Annotator,
    config: &FormatConfig,
) -> String {
    let doc = walker::Walker::new(ast)
        .with_annotator(annotator)
        .program(root);
    printer::print(&doc, config)
}

#[cfg(test)]
mod tests {
    use garnet_ast::{AstBuilder, NodeId, ParsedProgram};

    use super::*;

    fn fmt(program: &ParsedProgram) -> String {
        format_tree(&program.ast, program.root, &FormatConfig::default())
    }

    #[test]
    fn def_with_body() {
        let mut b = AstBuilder::new();
        let a = b.arg("a");
        let bb = b.arg("b");
        let lhs = b.var("a");
        let rhs = b.var("b");
        let sum = b.op(lhs, "+", rhs);
        let def = b.def("add", vec![a, bb], vec![sum]);
        let program = b.program(vec![def]);
        insta::assert_snapshot!(fmt(&program), @r"
        def add(a, b)
          a + b
        end
        ");
    }

    #[test]
    fn class_with_nested_if() {
        let mut b = AstBuilder::new();
        let cond = b.ivar("@x");
        let then = b.ivar("@x");
        let zero = b.int(0);
        let branch = b.if_else(cond, vec![then], vec![zero]);
        let def = b.def("value", vec![], vec![branch]);
        let class = b.class("Foo", Some("Bar"), vec![def]);
        let program = b.program(vec![class]);
        insta::assert_snapshot!(fmt(&program), @r"
        class Foo < Bar
          def value
            if @x
              @x
            else
              0
            end
          end
        end
        ");
    }

    #[test]
    fn generic_class_and_self_def() {
        let mut b = AstBuilder::new();
        let value = b.arg_typed("value", "T");
        let other = b.arg_self("other");
        let body = b.var("value");
        let def = b.def_on("self", "wrap", vec![value, other], vec![body]);
        let class = b.generic_class("Box", &["T"], None, vec![def]);
        let program = b.program(vec![class]);
        insta::assert_snapshot!(fmt(&program), @r"
        class Box[T]
          def self.wrap(value : T, other : self)
            value
          end
        end
        ");
    }

    #[test]
    fn call_sugar() {
        let mut b = AstBuilder::new();
        let a = b.var("a");
        let one = b.int(1);
        let index = b.call_on(a, "[]", vec![one]);

        let a2 = b.var("a");
        let one2 = b.int(1);
        let two = b.int(2);
        let store = b.call_on(a2, "[]=", vec![one2, two]);

        let x = b.var("x");
        let neg = b.call_on(x, "-@", vec![]);

        let x2 = b.var("x");
        let getter = b.call_on(x2, "foo", vec![]);

        let bare = b.call("foo", vec![]);

        let x3 = b.var("x");
        let arg1 = b.int(1);
        let arg2 = b.int(2);
        let e = b.var("e");
        let block = b.block(&["e"], vec![e]);
        let with_block = b.call_with_block(Some(x3), "bar", vec![arg1, arg2], block);

        let forward = b.super_call(vec![]);
        let three = b.int(3);
        let explicit = b.super_call(vec![three]);

        let program = b.program(vec![
            index, store, neg, getter, bare, with_block, forward, explicit,
        ]);
        insta::assert_snapshot!(fmt(&program), @r"
        a[1]
        a[1] = 2
        -(x)
        x.foo
        foo()
        x.bar(1, 2) do |e|
          e
        end
        super
        super(3)
        ");
    }

    #[test]
    fn literals() {
        let mut b = AstBuilder::new();
        let elements = vec![
            b.int(1),
            b.double(2.5),
            b.double(3.0),
            b.char('c'),
            b.string("q\"s"),
            b.symbol("sym"),
            b.nil(),
            b.bool(true),
            b.long(5),
        ];
        let array = b.array(elements);
        let from = b.int(1);
        let to = b.int(2);
        let inclusive = b.range(from, to, false);
        let from = b.int(1);
        let to = b.int(3);
        let exclusive = b.range(from, to, true);
        let key = b.int(1);
        let value = b.string("one");
        let hash = b.hash(vec![(key, value)]);
        let program = b.program(vec![array, inclusive, exclusive, hash]);
        insta::assert_snapshot!(fmt(&program), @r#"
        [1, 2.5, 3.0, 'c', "q\"s", :sym, nil, true, 5L]
        1..2
        1...3
        {1 => "one"}
        "#);
    }

    #[test]
    fn control_flow() {
        let mut b = AstBuilder::new();
        let x = b.var("x");
        let one = b.int(1);
        let two = b.int(2);
        let small = b.symbol("small");
        let when = b.when(vec![one, two], vec![small]);
        let big = b.symbol("big");
        let case = b.case(x, vec![when], vec![big]);

        let a = b.var("a");
        let three = b.int(3);
        let cond = b.op(a, "<", three);
        let a2 = b.var("a");
        let inc = b.int(1);
        let sum = b.op(a2, "+", inc);
        let step = b.set("a", sum);
        let looped = b.while_loop(cond, vec![step]);

        let a3 = b.var("a");
        let inc2 = b.int(1);
        let sum2 = b.op(a3, "+", inc2);
        let step2 = b.set("a", sum2);
        let a4 = b.var("a");
        let three2 = b.int(3);
        let cond2 = b.op(a4, "<", three2);
        let once = b.do_while(vec![step2], cond2);

        let program = b.program(vec![case, looped, once]);
        insta::assert_snapshot!(fmt(&program), @r"
        case x
        when 1, 2
          :small
        else
          :big
        end
        while a < 3
          a = a + 1
        end
        begin
          a = a + 1
        end while a < 3
        ");
    }

    #[test]
    fn lib_declarations() {
        let mut b = AstBuilder::new();
        let size = b.fun_arg("size", "Int", 0);
        let malloc = b.fun("malloc", vec![size], Some(("Void", 1)));
        let size_t = b.type_def("SizeT", "Long", 0);
        let x = b.fun_arg("x", "Int", 0);
        let y = b.fun_arg("y", "Int", 0);
        let point = b.struct_def("Point", vec![x, y]);
        let lib = b.lib("C", Some("c"), vec![malloc, size_t, point]);
        let program = b.program(vec![lib]);
        insta::assert_snapshot!(fmt(&program), @r#"
        lib C("c")
          fun malloc(size : Int) : Void*
          type SizeT : Long
          struct Point
            x : Int
            y : Int
          end
        end
        "#);
    }

    #[test]
    fn annotated_statements() {
        let mut b = AstBuilder::new();
        let one = b.int(1);
        let assign = b.set("x", one);
        let body = b.int(2);
        let def = b.def("two", vec![], vec![body]);
        let call = b.call("two", vec![]);
        let program = b.program(vec![assign, def, call]);
        let annotate = |id: NodeId| Some(if id == call { "Int" } else { "Int32" }.to_string());
        let out = format_annotated(&program.ast, program.root, &annotate, &FormatConfig::default());
        insta::assert_snapshot!(out, @r"
        x = 1 # : Int32
        def two
          2 # : Int32
        end
        two() # : Int
        ");
    }

    #[test]
    fn long_argument_lists_wrap() {
        let mut b = AstBuilder::new();
        let args = vec![b.var("first"), b.var("second"), b.var("third")];
        let call = b.call("combine", args);
        let program = b.program(vec![call]);
        let config = FormatConfig {
            max_width: 20,
            ..FormatConfig::default()
        };
        let out = format_tree(&program.ast, program.root, &config);
        assert_eq!(out, "combine(first,\n  second,\n  third)\n");
    }
}
