//! Typed schema of the analyser's JSON report
//!
//! ```json
//! {
//!   "totals": { "errors": 0, "file_errors": 1 },
//!   "files": {
//!     "/app/src/Foo.php": {
//!       "errors": 1,
//!       "messages": [
//!         { "message": "Undefined method.", "line": 10, "identifier": "method.notFound", "ignorable": true }
//!       ]
//!     }
//!   },
//!   "errors": []
//! }
//! ```

use super::error::AnalysisError;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Parsed output of one analyser invocation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisReport {
    /// Results keyed by the path the analyser reported
    #[serde(default, deserialize_with = "deserialize_files")]
    pub files: BTreeMap<String, FileResult>,
    #[serde(default)]
    pub totals: Totals,
    /// Messages not attached to any file
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Aggregate counters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Totals {
    #[serde(default)]
    pub errors: u64,
    #[serde(default)]
    pub file_errors: u64,
}

/// Findings for a single file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileResult {
    #[serde(default)]
    pub messages: Option<Vec<Violation>>,
}

/// A single reported issue
#[derive(Debug, Clone, Deserialize)]
pub struct Violation {
    pub message: String,
    /// 1-based line; some analyser errors carry no line at all
    #[serde(default)]
    pub line: Option<i64>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub ignorable: bool,
    #[serde(default)]
    pub tip: Option<String>,
}

impl AnalysisReport {
    /// Parse and validate a report
    pub fn parse(output: &str) -> Result<Self, AnalysisError> {
        Ok(serde_json::from_str(output)?)
    }

    /// Files that carry at least one violation
    pub fn files_with_findings(&self) -> impl Iterator<Item = (&str, &[Violation])> {
        self.files
            .iter()
            .filter_map(|(path, result)| Some((path.as_str(), result.violations()?)))
    }

    /// Whether any file carries at least one violation
    pub fn has_findings(&self) -> bool {
        self.files_with_findings().next().is_some()
    }
}

impl FileResult {
    /// The violations for this file, if there are any
    pub fn violations(&self) -> Option<&[Violation]> {
        self.messages
            .as_deref()
            .filter(|messages| !messages.is_empty())
    }
}

/// PHP encodes an empty map as `[]`, so accept an empty array as "no files"
fn deserialize_files<'de, D>(deserializer: D) -> Result<BTreeMap<String, FileResult>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Files {
        Map(BTreeMap<String, FileResult>),
        List(Vec<serde_json::Value>),
    }

    match Files::deserialize(deserializer)? {
        Files::Map(files) => Ok(files),
        Files::List(list) if list.is_empty() => Ok(BTreeMap::new()),
        Files::List(_) => Err(serde::de::Error::custom(
            "expected `files` to be an object keyed by path",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "totals": { "errors": 0, "file_errors": 2 },
        "files": {
            "/app/src/Foo.php": {
                "errors": 2,
                "messages": [
                    { "message": "Undefined method.", "line": 10, "identifier": "method.notFound", "ignorable": true },
                    { "message": "Missing return type.", "line": 3, "identifier": "missingType.return", "ignorable": true, "tip": "Add a return type." }
                ]
            },
            "/app/src/Bar.php": { "errors": 0, "messages": [] }
        },
        "errors": []
    }"#;

    #[test]
    fn test_parse_report() {
        let report = AnalysisReport::parse(SAMPLE).unwrap();
        assert_eq!(report.totals.file_errors, 2);
        assert_eq!(report.files.len(), 2);

        let foo = report.files["/app/src/Foo.php"].violations().unwrap();
        assert_eq!(foo.len(), 2);
        assert_eq!(foo[0].line, Some(10));
        assert_eq!(foo[0].identifier.as_deref(), Some("method.notFound"));
        assert_eq!(foo[1].tip.as_deref(), Some("Add a return type."));
    }

    #[test]
    fn test_files_with_findings_skips_empty() {
        let report = AnalysisReport::parse(SAMPLE).unwrap();
        let paths: Vec<_> = report.files_with_findings().map(|(path, _)| path).collect();
        assert_eq!(paths, vec!["/app/src/Foo.php"]);
        assert!(report.has_findings());
    }

    #[test]
    fn test_file_without_messages_field() {
        let report = AnalysisReport::parse(r#"{"files":{"/a.php":{}}}"#).unwrap();
        assert_eq!(report.files.len(), 1);
        assert!(!report.has_findings());
    }

    #[test]
    fn test_empty_files_as_array() {
        let json = r#"{"totals":{"errors":0,"file_errors":0},"files":[],"errors":[]}"#;
        let report = AnalysisReport::parse(json).unwrap();
        assert!(report.files.is_empty());
        assert_eq!(report.totals.file_errors, 0);
    }

    #[test]
    fn test_non_empty_files_array_is_malformed() {
        let result = AnalysisReport::parse(r#"{"files":[1]}"#);
        assert!(matches!(result, Err(AnalysisError::MalformedReport(_))));
    }

    #[test]
    fn test_missing_files_key() {
        let report = AnalysisReport::parse("{}").unwrap();
        assert!(report.files.is_empty());
        assert!(!report.has_findings());
    }

    #[test]
    fn test_null_line_and_missing_identifier() {
        let json = r#"{"files":{"/a.php":{"messages":[{"message":"Internal error.","line":null}]}}}"#;
        let report = AnalysisReport::parse(json).unwrap();
        let violation = &report.files["/a.php"].violations().unwrap()[0];
        assert_eq!(violation.line, None);
        assert!(violation.identifier.is_none());
        assert!(!violation.ignorable);
    }

    #[test]
    fn test_general_errors() {
        let json = r#"{"files":[],"errors":["Ignored error pattern was not matched."]}"#;
        let report = AnalysisReport::parse(json).unwrap();
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let result = AnalysisReport::parse("PHP Fatal error: Allowed memory size exhausted");
        assert!(matches!(result, Err(AnalysisError::MalformedReport(_))));
    }
}
