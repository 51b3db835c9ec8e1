//! Ariadne-based rendering of type errors.
//!
//! Errors carry a line and column, not a byte range. When the source text is
//! available the location is mapped back to a byte offset and the label
//! covers the identifier starting there. Without source text the error is
//! rendered as a single plain line.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use garnet_common::LineIndex;

use crate::error::TypeError;

/// How diagnostics are rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiagnosticOptions {
    pub color: bool,
    /// One JSON object per error instead of a report.
    pub json: bool,
}

// ── Span Helpers ───────────────────────────────────────────────────────

/// Byte range of the token at the error's location.
fn error_span(error: &TypeError, source: &str) -> Range<usize> {
    let len = source.len();
    let Some(loc) = error.location() else {
        return 0..len.min(1);
    };
    let start = LineIndex::new(source).offset(loc.line, loc.column) as usize;
    let start = (0..=start)
        .rev()
        .find(|&i| source.is_char_boundary(i))
        .unwrap_or(0);
    let token = source[start..]
        .char_indices()
        .find(|&(_, c)| !(c.is_alphanumeric() || matches!(c, '_' | '@' | '$' | '?' | '!')))
        .map_or(len - start, |(i, _)| i);
    let end = (start + token.max(1)).min(len);
    start.min(end)..end
}

// ── Labels ─────────────────────────────────────────────────────────────

fn label_message(error: &TypeError) -> String {
    match error {
        TypeError::UndefinedMethod { name, receiver, .. } => {
            format!("{} has no method '{}'", receiver, name)
        }
        TypeError::WrongArgumentCount {
            expected, found, ..
        } => format!("takes {} argument(s), given {}", expected, found),
        TypeError::UndefinedConstant { .. } => "not found in any enclosing namespace".into(),
        TypeError::NoSuperMethod { name, owner, .. } => {
            format!("no ancestor of {} defines '{}'", owner, name)
        }
        TypeError::NoBlockGiven { .. } => "called without a block".into(),
        TypeError::Mismatch {
            expected, found, ..
        } => format!("expected {}, found {}", expected, found),
        TypeError::UninitializedRead { name, .. } => {
            format!("'{}' is not assigned on every path reaching here", name)
        }
        TypeError::NonConvergent { .. } => "inference gave up here".into(),
        TypeError::SpecializationOverflow { .. } => "each call here opens a new specialization".into(),
    }
}

fn help_message(error: &TypeError) -> Option<String> {
    match error {
        TypeError::NoBlockGiven { method, .. } => Some(format!("pass a block to '{}'", method)),
        TypeError::UninitializedRead { name, .. } => {
            Some(format!("assign '{}' before reading it", name))
        }
        _ if error.is_internal() => Some("this is a compiler bug, please report it".into()),
        _ => None,
    }
}

// ── Rendering ──────────────────────────────────────────────────────────

/// Render one error as text (or JSON) for `filename`.
pub fn render_diagnostic(
    error: &TypeError,
    source: &str,
    filename: &str,
    options: &DiagnosticOptions,
) -> String {
    let code = error.code();
    let message = error.to_string();

    if options.json {
        let spans: Vec<serde_json::Value> = error
            .location()
            .map(|loc| serde_json::json!({ "line": loc.line, "column": loc.column }))
            .into_iter()
            .collect();
        let json = serde_json::json!({
            "code": code,
            "severity": if error.is_internal() { "internal" } else { "error" },
            "message": message,
            "file": filename,
            "spans": spans,
        });
        return json.to_string();
    }

    if source.is_empty() {
        return match error.location() {
            Some(loc) => format!("error[{}]: {}\n  --> {}:{}\n", code, message, filename, loc),
            None => format!("error[{}]: {}\n  --> {}\n", code, message, filename),
        };
    }

    let config = Config::default().with_color(options.color);
    let span = error_span(error, source);
    let kind = if error.is_internal() {
        ReportKind::Custom("internal error", Color::Magenta)
    } else {
        ReportKind::Error
    };
    let mut builder = Report::build(kind, span.clone())
        .with_code(code)
        .with_message(&message)
        .with_config(config)
        .with_label(
            Label::new(span)
                .with_message(label_message(error))
                .with_color(Color::Red),
        );
    if let Some(help) = help_message(error) {
        builder.set_help(help);
    }
    let report = builder.finish();

    let mut buf = Vec::new();
    if let Err(err) = report.write(Source::from(source), &mut buf) {
        return format!("error[{}]: {} (rendering failed: {})\n", code, message, err);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use garnet_common::Location;

    use super::*;

    fn undefined_at(line: u32, column: u32) -> TypeError {
        TypeError::UndefinedMethod {
            name: "frob".into(),
            receiver: "Int".into(),
            location: Some(Location::new(line, column)),
        }
    }

    #[test]
    fn span_covers_the_identifier() {
        let source = "a = 1\na.frob(2)\n";
        assert_eq!(error_span(&undefined_at(2, 3), source), 8..12);
    }

    #[test]
    fn span_is_clamped_to_source() {
        let source = "x";
        assert_eq!(error_span(&undefined_at(9, 9), source), 1..1);
    }

    #[test]
    fn report_names_code_and_receiver() {
        let source = "a = 1\na.frob(2)\n";
        let out = render_diagnostic(&undefined_at(2, 3), source, "t.gt", &DiagnosticOptions::default());
        assert!(out.contains("E0001"), "{out}");
        assert!(out.contains("undefined method 'frob' for Int"), "{out}");
        assert!(out.contains("Int has no method 'frob'"), "{out}");
    }

    #[test]
    fn plain_rendering_without_source() {
        let out = render_diagnostic(&undefined_at(2, 3), "", "t.gt", &DiagnosticOptions::default());
        assert_eq!(out, "error[E0001]: undefined method 'frob' for Int\n  --> t.gt:2:3\n");
    }

    #[test]
    fn json_rendering() {
        let options = DiagnosticOptions {
            color: false,
            json: true,
        };
        let out = render_diagnostic(&undefined_at(2, 3), "", "t.gt", &options);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["code"], "E0001");
        assert_eq!(value["severity"], "error");
        assert_eq!(value["spans"][0]["line"], 2);
        assert_eq!(value["file"], "t.gt");
    }
}
