//! Analysis runner
//!
//! Builds the analyser command line, runs it, classifies the outcome and hands
//! the parsed report to the [`ResultMapper`].

use super::config::{ConfigAccessor, Settings};
use super::error::AnalysisError;
use super::executor::{CommandExecutor, ProcessOutput, ShellExecutor};
use super::guard::{RunGuard, RunKey};
use super::mapper::{normalize, ApplyMode, ResultMapper};
use super::report::AnalysisReport;
use super::store::DiagnosticStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a finished run changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub mode: ApplyMode,
    /// Paths whose diagnostics must be re-published
    pub touched: Vec<PathBuf>,
    /// Whole-project status line ("done" / "found N violations")
    pub status: Option<String>,
    /// Report-level messages not tied to a file
    pub general_errors: Vec<String>,
    pub file_errors: u64,
}

/// Runs the analyser for one workspace
pub struct AnalysisRunner<E = ShellExecutor> {
    workspace_root: PathBuf,
    config: Arc<ConfigAccessor>,
    store: Arc<DiagnosticStore>,
    executor: E,
    guard: RunGuard,
}

impl<E: CommandExecutor> AnalysisRunner<E> {
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        config: Arc<ConfigAccessor>,
        store: Arc<DiagnosticStore>,
        executor: E,
    ) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            config,
            store,
            executor,
            guard: RunGuard::new(),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn store(&self) -> &Arc<DiagnosticStore> {
        &self.store
    }

    pub fn config(&self) -> &Arc<ConfigAccessor> {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Analyse the whole project (`None`) or a single file
    pub async fn run(&self, target: Option<&Path>) -> Result<RunSummary, AnalysisError> {
        let target = target.map(normalize);
        let key = match &target {
            Some(path) => RunKey::File(path.clone()),
            None => RunKey::Project,
        };
        let _permit = self.guard.acquire(key).await;

        let settings = self.config.snapshot();
        let command_line = build_command_line(&settings, &self.workspace_root, target.as_deref());
        let had_entry = target
            .as_deref()
            .is_some_and(|path| self.store.contains(path));

        tracing::debug!(
            "Running `{}` in {}",
            command_line,
            self.workspace_root.display()
        );
        let output = self
            .executor
            .execute(&command_line, &self.workspace_root)
            .await?;
        let text = report_text(output)?;
        let report = AnalysisReport::parse(&text)?;

        let mapper = ResultMapper::new(self.workspace_root.clone(), &settings);
        let file_errors = report.totals.file_errors;
        let general_errors = report.errors.clone();

        let summary = match target {
            None => {
                let applied = mapper.apply_report(&report, ApplyMode::Replace, &self.store);
                RunSummary {
                    mode: ApplyMode::Replace,
                    touched: applied.touched,
                    status: Some(status_message(file_errors)),
                    general_errors,
                    file_errors,
                }
            }
            Some(path) => {
                let touched = if report.has_findings() {
                    mapper
                        .apply_report(&report, ApplyMode::Merge, &self.store)
                        .touched
                } else if had_entry && self.store.remove(&path) {
                    vec![path]
                } else {
                    Vec::new()
                };

                RunSummary {
                    mode: ApplyMode::Merge,
                    touched,
                    status: None,
                    general_errors,
                    file_errors,
                }
            }
        };

        tracing::info!(
            "Analysis finished: {} violation(s), {} path(s) updated",
            summary.file_errors,
            summary.touched.len()
        );
        Ok(summary)
    }
}

/// `{phpCommand} {command} [{relative target}]`
pub fn build_command_line(settings: &Settings, workspace_root: &Path, target: Option<&Path>) -> String {
    let mut parts: Vec<String> = [settings.php_command.trim(), settings.command.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();

    if let Some(target) = target {
        let relative = target.strip_prefix(workspace_root).unwrap_or(target);
        parts.push(shell_quote(&relative.to_string_lossy()));
    }

    parts.join(" ")
}

/// Status line for a whole-project run
pub fn status_message(file_errors: u64) -> String {
    if file_errors == 0 {
        "done".to_string()
    } else {
        format!("found {} violations", file_errors)
    }
}

/// Pick the report out of the process output
///
/// A non-zero exit with a report on stdout is the analyser saying "violations
/// found", not a failure.
fn report_text(output: ProcessOutput) -> Result<String, AnalysisError> {
    if !output.stdout.trim().is_empty() {
        return Ok(output.stdout);
    }

    if output.success() {
        return Err(AnalysisError::EmptyReport);
    }

    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return Err(AnalysisError::ToolFailed(stderr.to_string()));
    }

    Err(AnalysisError::ToolFailed(match output.code {
        Some(code) => format!("exited with status {}", code),
        None => "terminated by a signal".to_string(),
    }))
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "/._+:@%=,-".contains(c)
}

#[cfg(unix)]
fn shell_quote(arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(is_shell_safe) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(windows)]
fn shell_quote(arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(|c| is_shell_safe(c) || c == '\\') {
        arg.to_string()
    } else {
        format!("\"{}\"", arg.replace('"', "\"\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns canned output and remembers the command lines it saw
    struct FakeExecutor {
        result: Mutex<Option<std::io::Result<ProcessOutput>>>,
        seen: Mutex<Vec<String>>,
    }

    impl FakeExecutor {
        fn new(result: std::io::Result<ProcessOutput>) -> Self {
            Self {
                result: Mutex::new(Some(result)),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn output(code: i32, stdout: &str, stderr: &str) -> Self {
            Self::new(Ok(ProcessOutput {
                code: Some(code),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }))
        }
    }

    #[tower_lsp::async_trait]
    impl CommandExecutor for FakeExecutor {
        async fn execute(&self, command_line: &str, _cwd: &Path) -> std::io::Result<ProcessOutput> {
            self.seen.lock().unwrap().push(command_line.to_string());
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(ProcessOutput::default()))
        }
    }

    const ROOT: &str = "/home/user/proj";

    const FOO_REPORT: &str = r#"{"files":{"/home/user/proj/src/Foo.php":{"messages":[
        {"message":"Undefined method.","line":10,"identifier":"method.notFound","ignorable":false}
    ]}},"totals":{"errors":0,"file_errors":1},"errors":[]}"#;

    const EMPTY_REPORT: &str = r#"{"files":[],"totals":{"errors":0,"file_errors":0},"errors":[]}"#;

    fn runner(executor: FakeExecutor) -> AnalysisRunner<FakeExecutor> {
        AnalysisRunner::new(
            ROOT,
            Arc::new(ConfigAccessor::default()),
            Arc::new(DiagnosticStore::new()),
            executor,
        )
    }

    fn seed(runner: &AnalysisRunner<FakeExecutor>, path: &str) {
        let record = crate::engine::mapper::to_record(&crate::engine::report::Violation {
            message: "old".to_string(),
            line: Some(1),
            identifier: None,
            ignorable: false,
            tip: None,
        });
        runner.store().set(PathBuf::from(path), vec![record]);
    }

    #[test]
    fn test_build_whole_project_command() {
        let line = build_command_line(&Settings::default(), Path::new(ROOT), None);
        assert_eq!(
            line,
            "php vendor/bin/phpstan analyse --error-format=json --no-progress"
        );
    }

    #[test]
    fn test_build_single_file_command_is_root_relative() {
        let line = build_command_line(
            &Settings::default(),
            Path::new(ROOT),
            Some(Path::new("/home/user/proj/src/Foo.php")),
        );
        assert!(line.ends_with("--no-progress src/Foo.php"));
    }

    #[test]
    fn test_build_command_without_php_command() {
        let settings = Settings {
            php_command: String::new(),
            command: "phpstan analyse --error-format=json".to_string(),
            ..Settings::default()
        };
        let line = build_command_line(&settings, Path::new(ROOT), None);
        assert_eq!(line, "phpstan analyse --error-format=json");
    }

    #[cfg(unix)]
    #[test]
    fn test_build_command_quotes_awkward_paths() {
        let line = build_command_line(
            &Settings::default(),
            Path::new(ROOT),
            Some(Path::new("/home/user/proj/src/It's here.php")),
        );
        assert!(line.ends_with(r"'src/It'\''s here.php'"));
    }

    #[test]
    fn test_build_command_outside_root_keeps_absolute_path() {
        let line = build_command_line(
            &Settings::default(),
            Path::new(ROOT),
            Some(Path::new("/tmp/Other.php")),
        );
        assert!(line.ends_with(" /tmp/Other.php"));
    }

    #[test]
    fn test_status_message() {
        assert_eq!(status_message(0), "done");
        assert_eq!(status_message(3), "found 3 violations");
    }

    #[test]
    fn test_report_text_classification() {
        let ok = |code, stdout: &str, stderr: &str| {
            report_text(ProcessOutput {
                code: Some(code),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            })
        };

        assert_eq!(ok(0, "{}", "").unwrap(), "{}");
        assert_eq!(ok(1, "{}", "warning").unwrap(), "{}");
        assert!(matches!(ok(0, "  \n", ""), Err(AnalysisError::EmptyReport)));
        assert!(matches!(
            ok(255, "", "Memory limit\n"),
            Err(AnalysisError::ToolFailed(msg)) if msg == "Memory limit"
        ));
        assert!(matches!(
            ok(127, "", ""),
            Err(AnalysisError::ToolFailed(msg)) if msg == "exited with status 127"
        ));
    }

    #[tokio::test]
    async fn test_whole_project_run_replaces_store() {
        let runner = runner(FakeExecutor::output(1, FOO_REPORT, ""));
        seed(&runner, "/home/user/proj/src/Stale.php");

        let summary = runner.run(None).await.unwrap();

        assert_eq!(summary.mode, ApplyMode::Replace);
        assert_eq!(summary.status.as_deref(), Some("found 1 violations"));
        assert_eq!(
            runner.store().paths(),
            vec![PathBuf::from("/home/user/proj/src/Foo.php")]
        );
        assert!(summary
            .touched
            .contains(&PathBuf::from("/home/user/proj/src/Stale.php")));
    }

    #[tokio::test]
    async fn test_whole_project_clean_run() {
        let runner = runner(FakeExecutor::output(0, EMPTY_REPORT, ""));
        seed(&runner, "/home/user/proj/src/Foo.php");

        let summary = runner.run(None).await.unwrap();

        assert!(runner.store().is_empty());
        assert_eq!(summary.status.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_single_file_clean_run_removes_entry() {
        let runner = runner(FakeExecutor::output(0, EMPTY_REPORT, ""));
        seed(&runner, "/home/user/proj/src/Foo.php");
        seed(&runner, "/home/user/proj/src/Bar.php");

        let summary = runner
            .run(Some(Path::new("/home/user/proj/src/Foo.php")))
            .await
            .unwrap();

        assert_eq!(summary.mode, ApplyMode::Merge);
        assert_eq!(
            summary.touched,
            vec![PathBuf::from("/home/user/proj/src/Foo.php")]
        );
        assert_eq!(
            runner.store().paths(),
            vec![PathBuf::from("/home/user/proj/src/Bar.php")]
        );
        assert!(summary.status.is_none());
    }

    #[tokio::test]
    async fn test_single_file_clean_run_without_prior_entry() {
        let runner = runner(FakeExecutor::output(0, EMPTY_REPORT, ""));

        let summary = runner
            .run(Some(Path::new("/home/user/proj/src/Foo.php")))
            .await
            .unwrap();

        assert!(summary.touched.is_empty());
    }

    #[tokio::test]
    async fn test_single_file_report_for_other_path_keeps_entry() {
        let runner = runner(FakeExecutor::output(1, FOO_REPORT, ""));
        seed(&runner, "/home/user/proj/src/Bar.php");

        runner
            .run(Some(Path::new("/home/user/proj/src/Bar.php")))
            .await
            .unwrap();

        assert!(runner
            .store()
            .contains(Path::new("/home/user/proj/src/Bar.php")));
        assert!(runner
            .store()
            .contains(Path::new("/home/user/proj/src/Foo.php")));
    }

    #[tokio::test]
    async fn test_single_file_passes_relative_path() {
        let runner = runner(FakeExecutor::output(0, EMPTY_REPORT, ""));
        runner
            .run(Some(Path::new("/home/user/proj/src/Foo.php")))
            .await
            .unwrap();

        let seen = runner.executor.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].ends_with(" src/Foo.php"));
    }

    #[tokio::test]
    async fn test_stderr_failure_leaves_store_untouched() {
        let runner = runner(FakeExecutor::output(255, "", "PHP Fatal error"));
        seed(&runner, "/home/user/proj/src/Foo.php");

        let err = runner.run(None).await.unwrap_err();

        assert!(matches!(err, AnalysisError::ToolFailed(_)));
        assert_eq!(runner.store().len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_store_untouched() {
        let runner = runner(FakeExecutor::new(Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "No such file or directory",
        ))));
        seed(&runner, "/home/user/proj/src/Foo.php");

        let err = runner.run(None).await.unwrap_err();

        assert!(matches!(err, AnalysisError::Spawn(_)));
        assert_eq!(runner.store().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_report_leaves_store_untouched() {
        let runner = runner(FakeExecutor::output(1, "Deprecated: something\n{", ""));
        seed(&runner, "/home/user/proj/src/Foo.php");

        let err = runner.run(None).await.unwrap_err();

        assert!(matches!(err, AnalysisError::MalformedReport(_)));
        assert_eq!(runner.store().len(), 1);
    }

    #[tokio::test]
    async fn test_general_errors_are_returned() {
        let report = r#"{"files":[],"totals":{"errors":1,"file_errors":0},"errors":["Ignored error pattern #foo# was not matched."]}"#;
        let runner = runner(FakeExecutor::output(1, report, ""));

        let summary = runner.run(None).await.unwrap();
        assert_eq!(summary.general_errors.len(), 1);
        assert_eq!(summary.status.as_deref(), Some("done"));
    }
}
