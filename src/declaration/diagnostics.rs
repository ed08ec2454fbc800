//! YAML diagnostics for the target declaration.
//!
//! Converts `serde_saphyr` errors into [`miette`] diagnostics that carry the
//! offending span and a hint for the common tab-indentation mistake.

// The unused_assignments lint fires on miette/thiserror derive output in some
// Rust versions but not others, so `#[expect]` cannot be used here.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use miette::{Diagnostic, NamedSource, SourceSpan};
use serde_saphyr::{Error as YamlError, Location};
use thiserror::Error;

/// Errors raised while reading the target declaration.
#[derive(Debug, Error, Diagnostic)]
pub enum DeclarationError {
    /// The declaration is not valid YAML or has the wrong shape.
    #[error("failed to parse target declaration {name}")]
    #[diagnostic(code(keelson::declaration::parse))]
    Parse {
        /// Label of the declaration source (usually its path).
        name: String,
        /// Span-carrying diagnostic produced from the YAML error.
        #[source]
        #[diagnostic_source]
        source: Box<dyn Diagnostic + Send + Sync + 'static>,
    },
}

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(keelson::declaration::yaml))]
struct YamlDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("parse error here")]
    span: Option<SourceSpan>,
    #[help]
    help: Option<String>,
    #[source]
    source: YamlError,
    message: String,
}

/// Reconstruct the byte offset of a 1-based line/column pair.
///
/// Columns past the end of the line clamp to the line end; both `\n` and
/// `\r\n` line endings are accepted.
fn byte_index(src: &str, line: u64, column: u64) -> usize {
    let target_line = usize::try_from(line.saturating_sub(1)).unwrap_or(usize::MAX);
    let target_column = usize::try_from(column.saturating_sub(1)).unwrap_or(usize::MAX);
    let mut offset = 0usize;
    for (idx, segment) in src.split_inclusive('\n').enumerate() {
        if idx == target_line {
            let without_newline = segment.strip_suffix('\n').unwrap_or(segment);
            let cleaned = without_newline
                .strip_suffix('\r')
                .unwrap_or(without_newline);
            let column_offset = cleaned
                .char_indices()
                .nth(target_column)
                .map_or(cleaned.len(), |(byte_idx, _)| byte_idx);
            return offset + column_offset;
        }
        offset += segment.len();
    }
    src.len()
}

fn to_span(src: &str, loc: Location) -> SourceSpan {
    let at = byte_index(src, loc.line(), loc.column());
    let bytes = src.as_bytes();
    let is_line_break = |b: u8| b == b'\n' || b == b'\r';
    let (start, end) = match bytes.get(at) {
        Some(&b) if !is_line_break(b) => (at, at + 1),
        _ => {
            let start = if at > 0 && bytes.get(at - 1).is_some_and(|p| !is_line_break(*p)) {
                at - 1
            } else {
                at
            };
            (start, at)
        }
    };
    SourceSpan::new(start.into(), end.saturating_sub(start))
}

fn has_tab_indent(src: &str, location: Option<Location>) -> bool {
    let Some(loc) = location else {
        return false;
    };
    let line_idx = usize::try_from(loc.line().saturating_sub(1)).unwrap_or(usize::MAX);
    src.lines()
        .nth(line_idx)
        .unwrap_or("")
        .chars()
        .take_while(|c| c.is_whitespace())
        .any(|c| c == '\t')
}

/// Map a `serde_saphyr` error into a [`miette`] diagnostic for `name`.
#[must_use]
pub fn map_yaml_error(
    err: YamlError,
    src: &str,
    name: &str,
) -> Box<dyn Diagnostic + Send + Sync + 'static> {
    let loc = err.location();
    let (line, col, span) = loc.map_or((1, 1, None), |l| {
        (l.line(), l.column(), Some(to_span(src, l)))
    });
    let help = has_tab_indent(src, loc)
        .then(|| String::from("Use spaces for indentation; tabs are invalid in YAML."));
    let message = format!("YAML parse error at line {line}, column {col}: {err}");
    Box::new(YamlDiagnostic {
        src: NamedSource::new(name, src.to_owned()),
        span,
        help,
        source: err,
        message,
    })
}
