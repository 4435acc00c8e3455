//! Maps analyser reports onto the diagnostic store

use super::config::Settings;
use super::diagnostic::{identifier_url, DiagnosticRecord, Severity, SOURCE};
use super::report::{AnalysisReport, Violation};
use super::store::DiagnosticStore;
use std::path::{Path, PathBuf};

/// How a report is combined with what is already published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Whole-project: the report is the complete picture
    Replace,
    /// Single-file: only paths present in the report are updated
    Merge,
}

/// Outcome of applying a report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// Whether any file entry was inserted
    pub processed: bool,
    /// Paths whose published diagnostics may have changed
    pub touched: Vec<PathBuf>,
}

/// Converts violations into diagnostic records for one workspace
#[derive(Debug, Clone)]
pub struct ResultMapper {
    workspace_root: PathBuf,
    docker_volume_path: String,
}

impl ResultMapper {
    pub fn new(workspace_root: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            docker_volume_path: settings.docker_volume_path.clone(),
        }
    }

    /// Apply a report to the store
    pub fn apply_report(
        &self,
        report: &AnalysisReport,
        mode: ApplyMode,
        store: &DiagnosticStore,
    ) -> Applied {
        let mut applied = Applied::default();

        if mode == ApplyMode::Replace {
            applied.touched = store.clear();
        }

        for (reported_path, violations) in report.files_with_findings() {
            let path = self.remap_path(reported_path);
            let records = violations.iter().map(to_record).collect();

            tracing::debug!(
                "{} diagnostic(s) for {}",
                violations.len(),
                path.display()
            );
            store.set(path.clone(), records);

            if !applied.touched.contains(&path) {
                applied.touched.push(path);
            }
            applied.processed = true;
        }

        applied
    }

    /// Translate an analyser path into a workspace-local path
    pub fn remap_path(&self, reported: &str) -> PathBuf {
        let reported = Path::new(reported);

        if !self.docker_volume_path.is_empty() {
            if let Ok(rest) = reported.strip_prefix(&self.docker_volume_path) {
                return normalize(&self.workspace_root.join(rest));
            }
        }

        normalize(reported)
    }
}

/// Build the record for one violation
pub fn to_record(violation: &Violation) -> DiagnosticRecord {
    let line = violation.line.unwrap_or(0).saturating_sub(1).max(0);
    let end_col = violation.message.encode_utf16().count();

    DiagnosticRecord {
        line: u32::try_from(line).unwrap_or(u32::MAX),
        start_col: 0,
        end_col: u32::try_from(end_col).unwrap_or(u32::MAX),
        severity: Severity::Error,
        source: SOURCE,
        message: violation.message.clone(),
        code: violation.identifier.clone(),
        href: violation.identifier.as_deref().and_then(identifier_url),
        tip: violation.tip.clone(),
    }
}

/// Drop `.` components and trailing separators
pub(crate) fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}
