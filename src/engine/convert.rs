//! Type conversions from diagnostic records to LSP types

use super::diagnostic::{DiagnosticRecord, Severity};
use tower_lsp::lsp_types::{
    CodeDescription, Diagnostic as LspDiagnostic, DiagnosticRelatedInformation,
    DiagnosticSeverity as LspDiagnosticSeverity, Location, NumberOrString,
    Position as LspPosition, Range as LspRange, Url,
};

/// Convert a record published for `uri` to an LSP diagnostic
pub fn to_lsp_diagnostic(uri: &Url, record: &DiagnosticRecord) -> LspDiagnostic {
    let range = LspRange {
        start: LspPosition {
            line: record.line,
            character: record.start_col,
        },
        end: LspPosition {
            line: record.line,
            character: record.end_col,
        },
    };

    LspDiagnostic {
        range,
        severity: Some(to_lsp_severity(&record.severity)),
        code: record.code.clone().map(NumberOrString::String),
        code_description: record
            .href
            .clone()
            .map(|href| CodeDescription { href }),
        source: Some(record.source.to_string()),
        message: record.message.clone(),
        related_information: record.tip.as_ref().map(|tip| {
            vec![DiagnosticRelatedInformation {
                location: Location {
                    uri: uri.clone(),
                    range,
                },
                message: tip.clone(),
            }]
        }),
        tags: None,
        data: None,
    }
}

/// Convert record severity to LSP severity
fn to_lsp_severity(severity: &Severity) -> LspDiagnosticSeverity {
    match severity {
        Severity::Error => LspDiagnosticSeverity::ERROR,
        Severity::Warning => LspDiagnosticSeverity::WARNING,
        Severity::Info => LspDiagnosticSeverity::INFORMATION,
        Severity::Hint => LspDiagnosticSeverity::HINT,
    }
}
