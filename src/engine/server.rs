//! Language server wiring
//!
//! Every trigger ends up in [`AnalysisRunner::run`]: activation and the
//! `phpstan.analyse` command run the whole project, a change to a file matching
//! `watchGlob` does the same, and saving a PHP file analyses just that file.

use super::config::{ConfigAccessor, Settings, SECTION};
use super::convert;
use super::executor::ShellExecutor;
use super::runner::AnalysisRunner;
use super::store::DiagnosticStore;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

/// Command id that re-runs whole-project analysis
pub const ANALYSE_COMMAND: &str = "phpstan.analyse";

const WATCHER_ID: &str = "phpstan-watch-glob";
const WATCHER_METHOD: &str = "workspace/didChangeWatchedFiles";

/// PHPStan language server
pub struct LspServer {
    /// LSP client for sending notifications
    client: Client,
    config: Arc<ConfigAccessor>,
    store: Arc<DiagnosticStore>,
    /// Set once `initialize` has resolved the workspace root
    session: OnceLock<Session>,
}

/// Per-workspace state shared with spawned analysis tasks
#[derive(Clone)]
struct Session {
    client: Client,
    runner: Arc<AnalysisRunner<ShellExecutor>>,
    /// Settings from the workspace file, before editor overrides
    file_settings: Arc<Settings>,
    work_done_progress: bool,
    pull_configuration: bool,
    dynamic_watch: bool,
    watcher_registered: Arc<AtomicBool>,
    progress_ids: Arc<AtomicU64>,
}

impl LspServer {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            config: Arc::new(ConfigAccessor::default()),
            store: Arc::new(DiagnosticStore::new()),
            session: OnceLock::new(),
        }
    }

    /// Get server capabilities
    pub fn capabilities() -> ServerCapabilities {
        ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Options(
                TextDocumentSyncOptions {
                    open_close: Some(false),
                    change: Some(TextDocumentSyncKind::NONE),
                    will_save: None,
                    will_save_wait_until: None,
                    save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                        include_text: Some(false),
                    })),
                },
            )),
            execute_command_provider: Some(ExecuteCommandOptions {
                commands: vec![ANALYSE_COMMAND.to_string()],
                work_done_progress_options: WorkDoneProgressOptions::default(),
            }),
            ..ServerCapabilities::default()
        }
    }

    fn session(&self) -> Option<Session> {
        let session = self.session.get().cloned();
        if session.is_none() {
            tracing::warn!("Request received before initialize");
        }
        session
    }

    /// Layer the editor's settings over the workspace file and store them
    async fn apply_client_settings(&self, session: &Session, value: serde_json::Value) {
        let settings = match session.file_settings.with_client_value(value) {
            Ok(settings) => settings,
            Err(e) => {
                self.client
                    .show_message(MessageType::ERROR, format!("PHPStan settings: {}", e))
                    .await;
                return;
            }
        };

        if let Err(e) = settings.watch_matcher() {
            self.client
                .show_message(MessageType::ERROR, format!("PHPStan settings: {}", e))
                .await;
        }

        let glob_changed = settings.watch_glob != self.config.snapshot().watch_glob;
        if self.config.replace(settings) {
            tracing::info!("Settings updated");
            if glob_changed {
                session.register_watcher().await;
            }
        }
    }
}

impl Session {
    /// Run an analysis pass and publish whatever it changed
    async fn analyse(&self, target: Option<PathBuf>) {
        let label = match &target {
            Some(path) => format!("analysing {}", path.display()),
            None => "analysing project".to_string(),
        };
        let token = self.begin_progress(label).await;

        match self.runner.run(target.as_deref()).await {
            Ok(summary) => {
                self.publish(&summary.touched).await;

                for message in &summary.general_errors {
                    self.client
                        .show_message(MessageType::WARNING, format!("PHPStan: {}", message))
                        .await;
                }

                let status = summary.status.unwrap_or_else(|| "done".to_string());
                self.client
                    .log_message(MessageType::INFO, format!("PHPStan: {}", status))
                    .await;
                self.end_progress(token, status).await;
            }
            Err(e) => {
                tracing::warn!("Analysis failed: {}", e);
                self.end_progress(token, "failed".to_string()).await;
                self.client.show_message(MessageType::ERROR, e.to_string()).await;
            }
        }
    }

    /// Send the current store contents for each path
    async fn publish(&self, paths: &[PathBuf]) {
        let store = self.runner.store();

        for path in paths {
            let Ok(uri) = Url::from_file_path(path) else {
                tracing::warn!("Cannot publish diagnostics for {}", path.display());
                continue;
            };

            let diagnostics: Vec<_> = store
                .get(path)
                .unwrap_or_default()
                .iter()
                .map(|record| convert::to_lsp_diagnostic(&uri, record))
                .collect();

            self.client.publish_diagnostics(uri, diagnostics, None).await;
        }
    }

    /// Spawn an analysis pass so the handler returns immediately
    fn spawn_analyse(&self, target: Option<PathBuf>) {
        let session = self.clone();
        tokio::spawn(async move { session.analyse(target).await });
    }

    async fn begin_progress(&self, message: String) -> Option<NumberOrString> {
        if !self.work_done_progress {
            return None;
        }

        let id = self.progress_ids.fetch_add(1, Ordering::Relaxed);
        let token = NumberOrString::String(format!("phpstan/{}", id));

        if let Err(e) = self
            .client
            .send_request::<request::WorkDoneProgressCreate>(WorkDoneProgressCreateParams {
                token: token.clone(),
            })
            .await
        {
            tracing::debug!("Client refused progress token: {}", e);
            return None;
        }

        self.client
            .send_notification::<notification::Progress>(ProgressParams {
                token: token.clone(),
                value: ProgressParamsValue::WorkDone(WorkDoneProgress::Begin(
                    WorkDoneProgressBegin {
                        title: "PHPStan".to_string(),
                        cancellable: Some(false),
                        message: Some(message),
                        percentage: None,
                    },
                )),
            })
            .await;

        Some(token)
    }

    async fn end_progress(&self, token: Option<NumberOrString>, message: String) {
        let Some(token) = token else {
            return;
        };

        self.client
            .send_notification::<notification::Progress>(ProgressParams {
                token,
                value: ProgressParamsValue::WorkDone(WorkDoneProgress::End(WorkDoneProgressEnd {
                    message: Some(message),
                })),
            })
            .await;
    }

    /// Ask the client to watch `watchGlob`, replacing an earlier registration
    async fn register_watcher(&self) {
        if !self.dynamic_watch {
            return;
        }

        if self.watcher_registered.swap(false, Ordering::SeqCst) {
            if let Err(e) = self
                .client
                .unregister_capability(vec![Unregistration {
                    id: WATCHER_ID.to_string(),
                    method: WATCHER_METHOD.to_string(),
                }])
                .await
            {
                tracing::warn!("Failed to unregister file watcher: {}", e);
            }
        }

        let options = DidChangeWatchedFilesRegistrationOptions {
            watchers: vec![FileSystemWatcher {
                glob_pattern: GlobPattern::String(self.runner.config().snapshot().watch_glob),
                kind: None,
            }],
        };

        match self
            .client
            .register_capability(vec![Registration {
                id: WATCHER_ID.to_string(),
                method: WATCHER_METHOD.to_string(),
                register_options: serde_json::to_value(options).ok(),
            }])
            .await
        {
            Ok(()) => self.watcher_registered.store(true, Ordering::SeqCst),
            Err(e) => tracing::warn!("Failed to register file watcher: {}", e),
        }
    }

    /// Fetch the `phpstan` section through `workspace/configuration`
    async fn fetch_configuration(&self) -> Option<serde_json::Value> {
        if !self.pull_configuration {
            return None;
        }

        match self
            .client
            .configuration(vec![ConfigurationItem {
                scope_uri: None,
                section: Some(SECTION.to_string()),
            }])
            .await
        {
            Ok(values) => values.into_iter().next(),
            Err(e) => {
                tracing::debug!("workspace/configuration failed: {}", e);
                None
            }
        }
    }
}

/// Workspace root announced by the client
#[allow(deprecated)]
pub fn workspace_root(params: &InitializeParams) -> Option<PathBuf> {
    params
        .workspace_folders
        .as_ref()
        .and_then(|folders| folders.first())
        .and_then(|folder| folder.uri.to_file_path().ok())
        .or_else(|| params.root_uri.as_ref()?.to_file_path().ok())
        .or_else(|| params.root_path.as_ref().map(PathBuf::from))
}

/// Whether a saved file should trigger single-file analysis
pub fn is_php_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("php"))
}

/// Whether any changed path matches `watchGlob` relative to the root
pub fn matches_watch_glob(settings: &Settings, root: &Path, changed: &[PathBuf]) -> bool {
    let matcher = match settings.watch_matcher() {
        Ok(matcher) => matcher,
        Err(e) => {
            tracing::warn!("{}", e);
            return false;
        }
    };

    changed.iter().any(|path| {
        let relative = path.strip_prefix(root).unwrap_or(path);
        matcher.is_match(relative)
    })
}

#[tower_lsp::async_trait]
impl LanguageServer for LspServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let root = workspace_root(&params)
            .or_else(|| std::env::current_dir().ok())
            .ok_or_else(|| Error::invalid_params("No workspace root"))?;
        tracing::info!("phpstan-lsp initializing in {}", root.display());

        let file_settings = Settings::load_default(&root);
        self.config.replace(file_settings.clone());

        let capabilities = &params.capabilities;
        let work_done_progress = capabilities
            .window
            .as_ref()
            .and_then(|window| window.work_done_progress)
            .unwrap_or(false);
        let pull_configuration = capabilities
            .workspace
            .as_ref()
            .and_then(|workspace| workspace.configuration)
            .unwrap_or(false);
        let dynamic_watch = capabilities
            .workspace
            .as_ref()
            .and_then(|workspace| workspace.did_change_watched_files.as_ref())
            .and_then(|watch| watch.dynamic_registration)
            .unwrap_or(false);

        let runner = AnalysisRunner::new(
            root,
            self.config.clone(),
            self.store.clone(),
            ShellExecutor::new(),
        );

        let session = Session {
            client: self.client.clone(),
            runner: Arc::new(runner),
            file_settings: Arc::new(file_settings),
            work_done_progress,
            pull_configuration,
            dynamic_watch,
            watcher_registered: Arc::new(AtomicBool::new(false)),
            progress_ids: Arc::new(AtomicU64::new(0)),
        };
        if self.session.set(session).is_err() {
            tracing::warn!("initialize received twice, keeping the first workspace");
        }

        Ok(InitializeResult {
            capabilities: Self::capabilities(),
            server_info: Some(ServerInfo {
                name: "phpstan-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let Some(session) = self.session() else {
            return;
        };

        if let Some(value) = session.fetch_configuration().await {
            self.apply_client_settings(&session, value).await;
        }
        session.register_watcher().await;

        tracing::info!("phpstan-lsp initialized");
        session.spawn_analyse(None);
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!("phpstan-lsp shutting down");
        Ok(())
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let Ok(path) = params.text_document.uri.to_file_path() else {
            return;
        };
        if !is_php_file(&path) {
            return;
        }
        let Some(session) = self.session() else {
            return;
        };

        tracing::debug!("Saved {}", path.display());
        session.spawn_analyse(Some(path));
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let Some(session) = self.session() else {
            return;
        };

        let changed: Vec<PathBuf> = params
            .changes
            .iter()
            .filter_map(|change| change.uri.to_file_path().ok())
            .collect();

        let settings = self.config.snapshot();
        if matches_watch_glob(&settings, session.runner.workspace_root(), &changed) {
            tracing::info!("Analyser configuration changed, re-running analysis");
            session.spawn_analyse(None);
        }
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let Some(session) = self.session() else {
            return;
        };

        let value = match params.settings.get(SECTION) {
            Some(section) => Some(section.clone()),
            None => session.fetch_configuration().await,
        };

        if let Some(value) = value {
            self.apply_client_settings(&session, value).await;
        }
    }

    async fn execute_command(
        &self,
        params: ExecuteCommandParams,
    ) -> Result<Option<serde_json::Value>> {
        if params.command != ANALYSE_COMMAND {
            return Err(Error::invalid_params(format!(
                "Unknown command: {}",
                params.command
            )));
        }

        let session = self.session().ok_or_else(Error::invalid_request)?;
        session.analyse(None).await;
        Ok(None)
    }
}
