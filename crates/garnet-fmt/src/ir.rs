//! Layout IR between the tree walker and the printer.
//!
//! The walker describes structure (indentation, forced line breaks, optional
//! break points); the printer picks the layout once it knows the column.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Doc {
    Text(String),
    /// `" "` when the enclosing group fits on the line, newline otherwise.
    SoftLine,
    /// Unconditional newline at the current indentation.
    Line,
    /// Children render one indentation level deeper.
    Indent(Box<Doc>),
    /// Break points inside render flat if the whole group fits.
    Group(Box<Doc>),
    Concat(Vec<Doc>),
    Empty,
}

// ── Constructors ────────────────────────────────────────────────────────

pub fn text(s: impl Into<String>) -> Doc {
    Doc::Text(s.into())
}

pub fn soft_line() -> Doc {
    Doc::SoftLine
}

pub fn line() -> Doc {
    Doc::Line
}

pub fn indent(doc: Doc) -> Doc {
    Doc::Indent(Box::new(doc))
}

pub fn group(doc: Doc) -> Doc {
    Doc::Group(Box::new(doc))
}

pub fn concat(parts: Vec<Doc>) -> Doc {
    Doc::Concat(parts)
}

/// Interleave `docs` with `sep`.
pub fn join(docs: Vec<Doc>, sep: impl Fn() -> Doc) -> Doc {
    let mut parts = Vec::with_capacity(docs.len() * 2);
    for (i, doc) in docs.into_iter().enumerate() {
        if i > 0 {
            parts.push(sep());
        }
        parts.push(doc);
    }
    Doc::Concat(parts)
}

/// Comma list that breaks after each comma when too wide.
pub fn comma_list(docs: Vec<Doc>) -> Doc {
    join(docs, || concat(vec![text(","), soft_line()]))
}
