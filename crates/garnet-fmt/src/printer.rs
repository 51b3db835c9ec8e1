//! Renders a [`Doc`] to text.
//!
//! Each group is measured flat against the remaining width when it is
//! reached; if it does not fit, its soft lines become newlines. Indentation
//! is emitted lazily so blank lines carry no trailing spaces.

use serde::Deserialize;

use crate::ir::Doc;

/// Output layout settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Spaces per indentation level. Default: 2.
    pub indent_size: usize,
    /// Column at which groups break. Default: 100.
    pub max_width: usize,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            indent_size: 2,
            max_width: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Flat,
    Broken,
}

struct Printer<'c> {
    config: &'c FormatConfig,
    out: String,
    column: usize,
    pending_indent: Option<usize>,
}

pub fn print(doc: &Doc, config: &FormatConfig) -> String {
    let mut printer = Printer {
        config,
        out: String::new(),
        column: 0,
        pending_indent: None,
    };
    printer.render(doc, 0, Mode::Broken);
    let mut out = printer.out;
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

impl Printer<'_> {
    fn render(&mut self, doc: &Doc, indent: usize, mode: Mode) {
        match doc {
            Doc::Empty => {}
            Doc::Text(s) => self.write(s),
            Doc::SoftLine => match mode {
                Mode::Flat => self.write(" "),
                Mode::Broken => self.newline(indent),
            },
            Doc::Line => self.newline(indent),
            Doc::Indent(inner) => self.render(inner, indent + self.config.indent_size, mode),
            Doc::Group(inner) => {
                let start = self.pending_indent.unwrap_or(self.column);
                let fits = flat_width(inner)
                    .is_some_and(|width| start + width <= self.config.max_width);
                let mode = if fits { Mode::Flat } else { Mode::Broken };
                self.render(inner, indent, mode);
            }
            Doc::Concat(parts) => {
                for part in parts {
                    self.render(part, indent, mode);
                }
            }
        }
    }

    fn write(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        if let Some(indent) = self.pending_indent.take() {
            self.out.extend(std::iter::repeat(' ').take(indent));
            self.column = indent;
        }
        self.out.push_str(s);
        self.column += s.chars().count();
    }

    fn newline(&mut self, indent: usize) {
        self.out.push('\n');
        self.column = 0;
        self.pending_indent = Some(indent);
    }
}

/// Width of `doc` on one line, or `None` if it contains a forced break.
fn flat_width(doc: &Doc) -> Option<usize> {
    match doc {
        Doc::Empty => Some(0),
        Doc::Text(s) => Some(s.chars().count()),
        Doc::SoftLine => Some(1),
        Doc::Line => None,
        Doc::Indent(inner) | Doc::Group(inner) => flat_width(inner),
        Doc::Concat(parts) => parts
            .iter()
            .try_fold(0usize, |total, part| Some(total.saturating_add(flat_width(part)?))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    fn narrow(max_width: usize) -> FormatConfig {
        FormatConfig {
            max_width,
            ..FormatConfig::default()
        }
    }

    #[test]
    fn fitting_group_stays_flat() {
        let doc = group(concat(vec![text("f("), comma_list(vec![text("a"), text("b")]), text(")")]));
        assert_eq!(print(&doc, &FormatConfig::default()), "f(a, b)\n");
    }

    #[test]
    fn wide_group_breaks_inside_indent() {
        let doc = group(concat(vec![
            text("f("),
            indent(comma_list(vec![text("alpha"), text("beta")])),
            text(")"),
        ]));
        assert_eq!(print(&doc, &narrow(8)), "f(alpha,\n  beta)\n");
    }

    #[test]
    fn forced_line_breaks_group() {
        let doc = group(concat(vec![text("a"), soft_line(), text("b"), line(), text("c")]));
        assert_eq!(print(&doc, &FormatConfig::default()), "a\nb\nc\n");
    }

    #[test]
    fn blank_lines_have_no_trailing_spaces() {
        let doc = indent(concat(vec![text("x"), line(), line(), text("y")]));
        assert_eq!(print(&doc, &FormatConfig::default()), "x\n\n  y\n");
    }

    #[test]
    fn empty_doc_prints_nothing() {
        assert_eq!(print(&Doc::Empty, &FormatConfig::default()), "");
    }
}
