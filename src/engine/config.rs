//! Configuration for the analysis engine
//!
//! Settings live under the `phpstan` namespace. They are layered: built-in
//! defaults, then an optional YAML file in the workspace root, then whatever
//! the editor sends through `workspace/configuration`.

use super::error::ConfigError;
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::watch;

/// Configuration section name used by editors
pub const SECTION: &str = "phpstan";

/// Workspace files searched by [`Settings::load_default`], in order
const CONFIG_FILE_NAMES: [&str; 4] = [
    ".phpstan-lsp.yaml",
    ".phpstan-lsp.yml",
    "phpstan-lsp.yaml",
    "phpstan-lsp.yml",
];

/// Analyser settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Interpreter prefix placed before `command`
    pub php_command: String,
    /// Analyser invocation, including its output-format flags
    pub command: String,
    /// Glob of files whose change triggers a whole-project run
    pub watch_glob: String,
    /// Path prefix the analyser reports instead of the workspace root
    pub docker_volume_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            php_command: "php".to_string(),
            command: "vendor/bin/phpstan analyse --error-format=json --no-progress".to_string(),
            watch_glob: "**/{phpstan.neon,phpstan.neon.dist,phpstan.dist.neon}".to_string(),
            docker_volume_path: String::new(),
        }
    }
}

/// Shape of the workspace YAML file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    phpstan: Settings,
}

/// Settings sent by the editor; absent keys keep the current value
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SettingsOverride {
    php_command: Option<String>,
    command: Option<String>,
    watch_glob: Option<String>,
    docker_volume_path: Option<String>,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let file: ConfigFile = serde_yaml::from_str(&content)?;
        Ok(file.phpstan)
    }

    /// Load settings from the first config file found in the workspace root
    pub fn load_default(workspace_root: &Path) -> Self {
        for name in CONFIG_FILE_NAMES {
            let candidate = workspace_root.join(name);
            if !candidate.exists() {
                continue;
            }

            match Self::load(&candidate) {
                Ok(settings) => {
                    tracing::info!("Loaded settings from {}", candidate.display());
                    return settings;
                }
                Err(e) => {
                    tracing::warn!("Ignoring {}: {}", candidate.display(), e);
                }
            }
        }

        Self::default()
    }

    /// Apply a settings object received from the editor on top of `self`
    ///
    /// `null` leaves everything unchanged.
    pub fn with_client_value(&self, value: serde_json::Value) -> Result<Self, ConfigError> {
        if value.is_null() {
            return Ok(self.clone());
        }

        let overrides: SettingsOverride = serde_json::from_value(value)?;
        let mut merged = self.clone();
        if let Some(php_command) = overrides.php_command {
            merged.php_command = php_command;
        }
        if let Some(command) = overrides.command {
            merged.command = command;
        }
        if let Some(watch_glob) = overrides.watch_glob {
            merged.watch_glob = watch_glob;
        }
        if let Some(docker_volume_path) = overrides.docker_volume_path {
            merged.docker_volume_path = docker_volume_path;
        }
        Ok(merged)
    }

    /// Compile `watch_glob`
    pub fn watch_matcher(&self) -> Result<GlobMatcher, ConfigError> {
        Glob::new(&self.watch_glob)
            .map(|glob| glob.compile_matcher())
            .map_err(|source| ConfigError::InvalidGlob {
                pattern: self.watch_glob.clone(),
                source,
            })
    }
}

/// Holds the current settings snapshot and notifies subscribers on change
#[derive(Debug)]
pub struct ConfigAccessor {
    sender: watch::Sender<Settings>,
}

impl ConfigAccessor {
    pub fn new(settings: Settings) -> Self {
        let (sender, _) = watch::channel(settings);
        Self { sender }
    }

    /// Copy of the current settings
    pub fn snapshot(&self) -> Settings {
        self.sender.borrow().clone()
    }

    /// Replace the snapshot, returning whether anything changed
    pub fn replace(&self, settings: Settings) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == settings {
                false
            } else {
                *current = settings;
                true
            }
        })
    }

    /// Receiver that wakes whenever the settings change
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.sender.subscribe()
    }
}

impl Default for ConfigAccessor {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
