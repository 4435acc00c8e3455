//! PHPStan Language Server executable
//!
//! Runs as an LSP server over stdio by default. `check` runs one analysis
//! pass and prints the findings instead.

use clap::{Parser, Subcommand};
use phpstan_lsp::engine::ShellExecutor;
use phpstan_lsp::{AnalysisRunner, ConfigAccessor, DiagnosticStore, LspServer, Settings};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tower_lsp::{LspService, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "phpstan-lsp")]
#[command(about = "Language Server that publishes PHPStan findings as diagnostics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve LSP over stdio (default)
    Serve,

    /// Analyse once and print the findings
    Check {
        /// Project root (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Analyse a single file instead of the whole project
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries the protocol
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            serve().await;
            ExitCode::SUCCESS
        }
        Commands::Check { root, file } => check(root, file).await,
    }
}

async fn serve() {
    tracing::info!("Starting PHPStan Language Server");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(LspServer::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}

async fn check(root: Option<PathBuf>, file: Option<PathBuf>) -> ExitCode {
    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };
    let root = absolute(&cwd, root.unwrap_or_else(|| cwd.clone()));
    let file = file.map(|file| absolute(&cwd, file));

    let config = Arc::new(ConfigAccessor::new(Settings::load_default(&root)));
    let store = Arc::new(DiagnosticStore::new());
    let runner = AnalysisRunner::new(root, config, store.clone(), ShellExecutor::new());

    let summary = match runner.run(file.as_deref()).await {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    for path in store.paths() {
        for record in store.get(&path).unwrap_or_default() {
            let code = record
                .code
                .as_deref()
                .map(|code| format!(" [{}]", code))
                .unwrap_or_default();
            println!(
                "{}:{}:{}: {}{}",
                path.display(),
                record.line + 1,
                record.start_col + 1,
                record.message,
                code
            );
        }
    }

    for message in &summary.general_errors {
        eprintln!("warning: {}", message);
    }
    if let Some(status) = &summary.status {
        eprintln!("{}", status);
    }

    if store.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn absolute(cwd: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}
