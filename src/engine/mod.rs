//! Analysis engine
//!
//! Runs the analyser, maps its report to diagnostics and serves them over LSP.

pub mod config;
pub mod convert;
pub mod diagnostic;
pub mod error;
pub mod executor;
pub mod guard;
pub mod mapper;
pub mod report;
pub mod runner;
pub mod server;
pub mod store;

pub use config::{ConfigAccessor, Settings};
pub use diagnostic::{DiagnosticRecord, Severity};
pub use error::{AnalysisError, ConfigError};
pub use executor::{CommandExecutor, ProcessOutput, ShellExecutor};
pub use mapper::{ApplyMode, ResultMapper};
pub use report::AnalysisReport;
pub use runner::{AnalysisRunner, RunSummary};
pub use server::LspServer;
pub use store::DiagnosticStore;
