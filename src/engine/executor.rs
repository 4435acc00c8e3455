//! Subprocess execution
//!
//! The runner only needs "run this command line in that directory and give me
//! everything it printed", which is what [`CommandExecutor`] describes.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Buffered result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs a command line and waits for it to exit
#[tower_lsp::async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command_line: &str, cwd: &Path) -> std::io::Result<ProcessOutput>;
}

/// Runs command lines through the user's shell
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor {
    shell: Option<String>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific shell instead of `$SHELL`
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: Some(shell.into()),
        }
    }

    #[cfg(unix)]
    fn command(&self, command_line: &str) -> Command {
        let shell = self
            .shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "/bin/sh".to_string());

        let mut command = Command::new(shell);
        command.arg("-c").arg(command_line);
        command
    }

    #[cfg(windows)]
    fn command(&self, command_line: &str) -> Command {
        let shell = self.shell.clone().unwrap_or_else(|| "cmd".to_string());

        let mut command = Command::new(shell);
        command.arg("/C").arg(command_line);
        command
    }
}

#[tower_lsp::async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command_line: &str, cwd: &Path) -> std::io::Result<ProcessOutput> {
        let output = self
            .command(command_line)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
