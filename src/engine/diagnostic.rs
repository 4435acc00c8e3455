//! Diagnostic records derived from analyser violations

use tower_lsp::lsp_types::Url;

/// Label shown as the diagnostic source
pub const SOURCE: &str = "PHPStan";

/// Documentation page for a rule identifier
const IDENTIFIER_DOCS_BASE: &str = "https://phpstan.org/error-identifiers/";

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

/// A single published finding, positioned in editor coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticRecord {
    /// Zero-based line
    pub line: u32,
    pub start_col: u32,
    /// Exclusive end column in UTF-16 code units
    pub end_col: u32,
    pub severity: Severity,
    pub source: &'static str,
    pub message: String,
    /// Rule identifier
    pub code: Option<String>,
    /// Documentation link for `code`
    pub href: Option<Url>,
    pub tip: Option<String>,
}

/// Documentation URL for a rule identifier, percent-encoded as one path segment
pub fn identifier_url(identifier: &str) -> Option<Url> {
    let mut url = Url::parse(IDENTIFIER_DOCS_BASE).ok()?;
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .push(identifier);
    Some(url)
}
