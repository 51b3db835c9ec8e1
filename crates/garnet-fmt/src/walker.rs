//! Syntax tree to [`Doc`] conversion.

use garnet_ast::{Ast, Node, NodeId, Restriction};

use crate::ir::{comma_list, concat, group, indent, join, line, text, Doc};

/// Supplies a trailing `# : Type` comment for statements.
pub trait Annotator {
    fn annotate(&self, id: NodeId) -> Option<String>;
}

impl<F> Annotator for F
where
    F: Fn(NodeId) -> Option<String>,
{
    fn annotate(&self, id: NodeId) -> Option<String> {
        self(id)
    }
}

pub struct Walker<'a> {
    ast: &'a Ast,
    annotator: Option<&'a dyn Annotator>,
}

impl<'a> Walker<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        Self {
            ast,
            annotator: None,
        }
    }

    pub fn with_annotator(mut self, annotator: &'a dyn Annotator) -> Self {
        self.annotator = Some(annotator);
        self
    }

    /// A whole program: top-level statements one per line.
    pub fn program(&self, root: NodeId) -> Doc {
        self.statements(root)
    }

    fn statements(&self, id: NodeId) -> Doc {
        match self.ast.get(id) {
            Node::Expressions { exps } => {
                join(exps.iter().map(|&e| self.statement(e)).collect(), line)
            }
            _ => self.statement(id),
        }
    }

    fn statement(&self, id: NodeId) -> Doc {
        let doc = self.expr(id);
        let declares = matches!(
            self.ast.get(id),
            Node::ClassDef { .. }
                | Node::ModuleDef { .. }
                | Node::Def { .. }
                | Node::LibDef { .. }
                | Node::Include { .. }
        );
        match self.annotator.and_then(|a| a.annotate(id)) {
            Some(ty) if !declares => concat(vec![doc, text(format!(" # : {}", ty))]),
            _ => doc,
        }
    }

    /// Indented body followed by a closing `end` on its own line.
    fn body_end(&self, body: Option<NodeId>) -> Doc {
        concat(vec![self.body(body), line(), text("end")])
    }

    fn body(&self, body: Option<NodeId>) -> Doc {
        match body {
            Some(id) => indent(concat(vec![line(), self.statements(id)])),
            None => Doc::Empty,
        }
    }

    fn list(&self, ids: &[NodeId]) -> Doc {
        comma_list(ids.iter().map(|&id| self.expr(id)).collect())
    }

    fn parens(&self, ids: &[NodeId]) -> Doc {
        group(concat(vec![text("("), indent(self.list(ids)), text(")")]))
    }

    fn keyword(&self, keyword: &str, exps: &[NodeId]) -> Doc {
        if exps.is_empty() {
            text(keyword)
        } else {
            concat(vec![text(format!("{} ", keyword)), self.list(exps)])
        }
    }

    fn binary(&self, left: NodeId, op: &str, right: NodeId) -> Doc {
        concat(vec![
            self.expr(left),
            text(format!(" {} ", op)),
            self.expr(right),
        ])
    }

    fn pointer_suffix(ptr: u32) -> Doc {
        text("*".repeat(ptr as usize))
    }

    pub fn expr(&self, id: NodeId) -> Doc {
        match self.ast.get(id) {
            Node::Expressions { exps } => {
                if exps.is_empty() {
                    text("()")
                } else {
                    concat(vec![
                        text("("),
                        join(exps.iter().map(|&e| self.expr(e)).collect(), || text("; ")),
                        text(")"),
                    ])
                }
            }
            Node::NilLiteral => text("nil"),
            Node::BoolLiteral { value } => text(value.to_string()),
            Node::IntLiteral { value } => text(value.to_string()),
            Node::LongLiteral { value } => text(format!("{}L", value)),
            Node::FloatLiteral { value } => text(format!("{}f", float_text(*value))),
            Node::DoubleLiteral { value } => text(float_text(*value)),
            Node::CharLiteral { value } => text(format!("'{}'", value.escape_default())),
            Node::StringLiteral { value } => text(format!("\"{}\"", escape_string(value))),
            Node::SymbolLiteral { value } => text(format!(":{}", value)),
            Node::RegexpLiteral { value } => text(format!("/{}/", value)),
            Node::RangeLiteral {
                from,
                to,
                exclusive,
            } => concat(vec![
                self.expr(*from),
                text(if *exclusive { "..." } else { ".." }),
                self.expr(*to),
            ]),
            Node::ArrayLiteral { elements } => group(concat(vec![
                text("["),
                indent(self.list(elements)),
                text("]"),
            ])),
            Node::HashLiteral { entries } => {
                let pairs = entries
                    .iter()
                    .map(|&(k, v)| concat(vec![self.expr(k), text(" => "), self.expr(v)]))
                    .collect();
                group(concat(vec![text("{"), indent(comma_list(pairs)), text("}")]))
            }

            Node::ClassDef {
                name,
                superclass,
                type_vars,
                body,
            } => {
                let mut header = format!("class {}", name);
                if let Some(vars) = type_vars {
                    header.push_str(&format!("[{}]", vars.join(", ")));
                }
                let mut parts = vec![text(header)];
                if let Some(sup) = superclass {
                    parts.push(text(" < "));
                    parts.push(self.expr(*sup));
                }
                parts.push(self.body_end(*body));
                concat(parts)
            }
            Node::ModuleDef { name, body } => {
                concat(vec![text(format!("module {}", name)), self.body_end(*body)])
            }
            Node::Def {
                receiver,
                name,
                args,
                body,
                ..
            } => {
                let mut parts = vec![text("def ")];
                if let Some(recv) = receiver {
                    parts.push(self.expr(*recv));
                    parts.push(text("."));
                }
                parts.push(text(name.clone()));
                if !args.is_empty() {
                    parts.push(self.parens(args));
                }
                parts.push(self.body_end(*body));
                concat(parts)
            }
            Node::Arg {
                name,
                default_value,
                restriction,
            } => {
                let mut parts = vec![text(name.clone())];
                if let Some(value) = default_value {
                    parts.push(text(" = "));
                    parts.push(self.expr(*value));
                }
                match restriction {
                    Some(Restriction::SelfType) => parts.push(text(" : self")),
                    Some(Restriction::Type(ident)) => {
                        parts.push(text(" : "));
                        parts.push(self.expr(*ident));
                    }
                    None => {}
                }
                concat(parts)
            }

            Node::Var { name } | Node::Global { name } | Node::InstanceVar { name } => {
                text(name.clone())
            }
            Node::Ident { names, global } => {
                let path = names.join("::");
                text(if *global { format!("::{}", path) } else { path })
            }

            Node::And { left, right } => self.binary(*left, "&&", *right),
            Node::Or { left, right } | Node::SimpleOr { left, right } => {
                self.binary(*left, "||", *right)
            }
            Node::Call {
                obj,
                name,
                args,
                block,
            } => {
                let call = self.call(*obj, name, args);
                match block {
                    Some(b) => concat(vec![call, text(" "), self.expr(*b)]),
                    None => call,
                }
            }
            Node::Block { args, body } => {
                let mut parts = vec![text("do")];
                if !args.is_empty() {
                    parts.push(text(" |"));
                    parts.push(self.list(args));
                    parts.push(text("|"));
                }
                parts.push(self.body_end(*body));
                concat(parts)
            }
            Node::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let mut parts = vec![text("if "), self.expr(*cond), self.body(*then_branch)];
                if else_branch.is_some() {
                    parts.push(line());
                    parts.push(text("else"));
                    parts.push(self.body(*else_branch));
                }
                parts.push(line());
                parts.push(text("end"));
                concat(parts)
            }
            Node::Assign { target, value } => self.binary(*target, "=", *value),
            Node::MultiAssign { targets, values } => {
                concat(vec![self.list(targets), text(" = "), self.list(values)])
            }
            Node::While {
                cond,
                body,
                run_once,
            } => {
                if *run_once {
                    concat(vec![
                        text("begin"),
                        self.body_end(*body),
                        text(" while "),
                        self.expr(*cond),
                    ])
                } else {
                    concat(vec![text("while "), self.expr(*cond), self.body_end(*body)])
                }
            }
            Node::Case {
                cond,
                whens,
                else_branch,
            } => {
                let mut parts = vec![text("case "), self.expr(*cond)];
                for &w in whens {
                    parts.push(line());
                    parts.push(self.expr(w));
                }
                if else_branch.is_some() {
                    parts.push(line());
                    parts.push(text("else"));
                    parts.push(self.body(*else_branch));
                }
                parts.push(line());
                parts.push(text("end"));
                concat(parts)
            }
            Node::When { conds, body } => {
                concat(vec![text("when "), self.list(conds), self.body(*body)])
            }
            Node::Return { exps } => self.keyword("return", exps),
            Node::Break { exps } => self.keyword("break", exps),
            Node::Next { exps } => self.keyword("next", exps),
            Node::Yield { exps } => self.keyword("yield", exps),

            Node::PointerOf { var } => concat(vec![self.expr(*var), text(".ptr")]),
            Node::IsA { obj, target } => concat(vec![
                self.expr(*obj),
                text(".is_a?("),
                self.expr(*target),
                text(")"),
            ]),
            Node::Require { string } => concat(vec![text("require "), self.expr(*string)]),
            Node::LibDef {
                name,
                libname,
                body,
            } => {
                let header = match libname {
                    Some(lib) => format!("lib {}(\"{}\")", name, lib),
                    None => format!("lib {}", name),
                };
                concat(vec![text(header), self.body_end(*body)])
            }
            Node::FunDef {
                name,
                real_name,
                args,
                return_type,
                ptr,
                varargs,
            } => {
                let mut parts = vec![text(format!("fun {}", name))];
                if name != real_name {
                    parts.push(text(format!(" = {}", real_name)));
                }
                if !args.is_empty() {
                    parts.push(text("("));
                    parts.push(self.list(args));
                    if *varargs {
                        parts.push(text(", ..."));
                    }
                    parts.push(text(")"));
                }
                if let Some(ret) = return_type {
                    parts.push(text(" : "));
                    parts.push(self.expr(*ret));
                    parts.push(Self::pointer_suffix(*ptr));
                }
                concat(parts)
            }
            Node::FunDefArg {
                name,
                type_ident,
                ptr,
                out,
            } => concat(vec![
                text(format!("{} : {}", name, if *out { "out " } else { "" })),
                self.expr(*type_ident),
                Self::pointer_suffix(*ptr),
            ]),
            Node::TypeDef {
                name,
                type_ident,
                ptr,
            } => concat(vec![
                text(format!("type {} : ", name)),
                self.expr(*type_ident),
                Self::pointer_suffix(*ptr),
            ]),
            Node::StructDef { name, fields } => {
                let fields = fields.iter().map(|&f| concat(vec![line(), self.expr(f)])).collect();
                concat(vec![
                    text(format!("struct {}", name)),
                    indent(concat(fields)),
                    line(),
                    text("end"),
                ])
            }
            Node::Include { name } => concat(vec![text("include "), self.expr(*name)]),
        }
    }

    fn call(&self, obj: Option<NodeId>, name: &str, args: &[NodeId]) -> Doc {
        let Some(obj) = obj else {
            // Bare `super` forwards the caller's arguments; `super()` passes none.
            if name == "super" && args.is_empty() {
                return text("super");
            }
            return concat(vec![text(name.to_string()), self.parens_or_empty(args)]);
        };
        match (name, args) {
            ("[]", _) => group(concat(vec![
                self.expr(obj),
                text("["),
                indent(self.list(args)),
                text("]"),
            ])),
            ("[]=", [index, value]) => concat(vec![
                self.expr(obj),
                text("["),
                self.expr(*index),
                text("] = "),
                self.expr(*value),
            ]),
            (op, []) if !is_identifier(op) => concat(vec![
                text(op.trim_end_matches('@').to_string()),
                text("("),
                self.expr(obj),
                text(")"),
            ]),
            (op, [rhs]) if !is_identifier(op) => self.binary(obj, op, *rhs),
            (_, []) => concat(vec![self.expr(obj), text(format!(".{}", name))]),
            _ => concat(vec![
                self.expr(obj),
                text(format!(".{}", name)),
                self.parens(args),
            ]),
        }
    }

    fn parens_or_empty(&self, args: &[NodeId]) -> Doc {
        if args.is_empty() {
            text("()")
        } else {
            self.parens(args)
        }
    }
}

fn is_identifier(name: &str) -> bool {
    name.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
}

/// Shortest form that still reads back as a float.
fn float_text(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}
