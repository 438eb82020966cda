//! Rendering of load errors for humans (ariadne) and tools (JSON lines).

use std::ops::Range;

use ariadne::{Color, Config, IndexType, Label, Report, ReportKind, Source};
use vdisp_common::{LineIndex, Span};

use crate::error::LoadError;

/// How diagnostics are rendered.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticOptions {
    pub color: bool,
    pub json: bool,
}

/// Render an error against the file it came from.
pub fn render(error: &LoadError, source: &str, file: &str, options: &DiagnosticOptions) -> String {
    if options.json {
        return format!("{}\n", to_json(error, source, file));
    }
    let Some(span) = error.span() else {
        return format!("error[{}]: {error}\n", error.code());
    };

    let clamp = |r: Range<usize>| -> Range<usize> {
        let len = source.len();
        let start = r.start.min(len);
        let end = r.end.min(len).max(start);
        // ariadne needs at least one character to point at
        if start == end {
            start..(end + 1).min(len)
        } else {
            start..end
        }
    };

    let config = Config::default()
        .with_color(options.color)
        .with_index_type(IndexType::Byte);
    let primary = clamp(span.to_range());
    let mut builder = Report::build(ReportKind::Error, primary.clone())
        .with_code(error.code())
        .with_message(error.to_string())
        .with_config(config)
        .with_label(
            Label::new(primary)
                .with_message(error.label())
                .with_color(Color::Red),
        );
    if let Some((message, related)) = error.related() {
        builder.add_label(
            Label::new(clamp(related.to_range()))
                .with_message(message)
                .with_color(Color::Blue),
        );
    }
    if let Some(help) = error.help() {
        builder.set_help(help);
    }

    let mut buf = Vec::new();
    if builder.finish().write(Source::from(source), &mut buf).is_err() {
        return format!("error[{}]: {error}\n", error.code());
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// One JSON object describing the error. Spans carry byte offsets plus the
/// 1-based line and column of their start.
pub fn to_json(error: &LoadError, source: &str, file: &str) -> serde_json::Value {
    let index = LineIndex::new(source);
    let span_json = |span: Span, label: String| {
        let (line, column) = index.line_col(span.start);
        serde_json::json!({
            "start": span.start,
            "end": span.end,
            "line": line,
            "column": column,
            "label": label,
        })
    };
    let mut spans = Vec::new();
    if let Some(span) = error.span() {
        spans.push(span_json(span, error.label()));
    }
    if let Some((message, related)) = error.related() {
        spans.push(span_json(related, message));
    }
    serde_json::json!({
        "code": error.code(),
        "severity": "error",
        "message": error.to_string(),
        "file": file,
        "spans": spans,
        "fix": error.help(),
    })
}
