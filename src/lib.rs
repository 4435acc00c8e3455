//! PHPStan Language Server
//!
//! Runs [PHPStan](https://phpstan.org) as a subprocess, parses its JSON report
//! and publishes the findings as diagnostics.
//!
//! - Whole-project analysis on startup, on the `phpstan.analyse` command and
//!   whenever a file matching `watchGlob` changes
//! - Single-file analysis when a PHP file is saved
//!
//! # Usage
//!
//! Run the language server via stdio:
//!
//! ```bash
//! phpstan-lsp
//! ```
//!
//! Or analyse once from a terminal:
//!
//! ```bash
//! phpstan-lsp check --root path/to/project
//! ```
//!
//! # Configuration
//!
//! Editors send settings under the `phpstan` section. Defaults can also be
//! placed in a `.phpstan-lsp.yaml` in the workspace root:
//!
//! ```yaml
//! phpstan:
//!   phpCommand: docker compose exec -T app php
//!   command: vendor/bin/phpstan analyse --error-format=json --no-progress
//!   watchGlob: "**/phpstan.neon"
//!   dockerVolumePath: /app
//! ```

pub mod engine;

pub use engine::{
    AnalysisError, AnalysisReport, AnalysisRunner, ConfigAccessor, DiagnosticStore, LspServer,
    Settings,
};
