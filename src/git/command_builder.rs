//! Type-safe git command builder.
//!
//! A fluent builder over the system `git` binary. Arguments are always passed
//! as a vector, never through a shell, and the working directory is supplied
//! with `-C` so invocations are independent of the process's own directory.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::core::BlobupError;
use crate::utils::platform::git_command;

/// Builder for constructing and executing git commands with consistent
/// timeout and error handling.
pub struct GitCommand {
    args: Vec<String>,
    current_dir: Option<std::path::PathBuf>,
    timeout_duration: Option<Duration>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            current_dir: None,
            // Local operations are fast; pushes go over the network but five
            // minutes is plenty for a device tree.
            timeout_duration: Some(Duration::from_secs(300)),
        }
    }
}

impl GitCommand {
    /// Create a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the repository directory the command operates on.
    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Override the timeout (`None` disables it).
    #[must_use]
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    fn full_args(&self) -> Vec<String> {
        let mut full = Vec::new();
        if let Some(ref dir) = self.current_dir {
            full.push("-C".to_string());
            full.push(dir.display().to_string());
        }
        full.extend(self.args.iter().cloned());
        full
    }

    /// The git operation name for error messages (first non-`-C` argument).
    fn operation(&self) -> String {
        self.args.first().cloned().unwrap_or_else(|| "unknown".to_string())
    }

    /// Execute the command and return its output without judging the exit
    /// status. Used where a non-zero exit still carries meaning, like push
    /// results with rejected refs.
    ///
    /// # Errors
    ///
    /// Fails when the process cannot be spawned or times out.
    pub async fn execute_unchecked(self) -> Result<GitCommandOutput> {
        let full_args = self.full_args();
        tracing::debug!(
            target: "git",
            "Executing command: {} {}",
            git_command(),
            full_args.join(" ")
        );

        let mut cmd = Command::new(git_command());
        cmd.args(&full_args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output_future = cmd.output();
        let output = if let Some(duration) = self.timeout_duration {
            match timeout(duration, output_future).await {
                Ok(result) => {
                    result.context(format!("Failed to execute git {}", full_args.join(" ")))?
                }
                Err(_) => {
                    return Err(BlobupError::GitCommandError {
                        operation: self.operation(),
                        stderr: format!(
                            "git command timed out after {} seconds: git {}",
                            duration.as_secs(),
                            full_args.join(" ")
                        ),
                    }
                    .into());
                }
            }
        } else {
            output_future
                .await
                .context(format!("Failed to execute git {}", full_args.join(" ")))?
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !stderr.is_empty() {
            tracing::debug!(target: "git", "{}", stderr.trim());
        }

        Ok(GitCommandOutput {
            stdout,
            stderr,
            success: output.status.success(),
        })
    }

    /// Execute the command and return the output, failing on a non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns [`BlobupError::GitCommandError`] carrying the operation name
    /// and captured stderr.
    pub async fn execute(self) -> Result<GitCommandOutput> {
        let operation = self.operation();
        let output = self.execute_unchecked().await?;
        if !output.success {
            return Err(BlobupError::GitCommandError {
                operation,
                stderr: if output.stderr.is_empty() {
                    output.stdout
                } else {
                    output.stderr
                },
            }
            .into());
        }
        Ok(output)
    }

    /// Execute and return only stdout as a trimmed string.
    ///
    /// # Errors
    ///
    /// Same as [`GitCommand::execute`].
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Execute and discard the output, checking only for success.
    ///
    /// # Errors
    ///
    /// Same as [`GitCommand::execute`].
    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }
}

/// Output from a git command.
pub struct GitCommandOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the command exited zero.
    pub success: bool,
}

// Convenience builders for the operations the publisher needs.

impl GitCommand {
    /// `git status --porcelain`, untracked files included.
    pub fn status_porcelain() -> Self {
        Self::new().args(["status", "--porcelain"])
    }

    /// `git add -A`.
    pub fn add_all() -> Self {
        Self::new().args(["add", "-A"])
    }

    /// `git commit -m <message>`.
    pub fn commit(message: &str) -> Self {
        Self::new().args(["commit", "-m", message])
    }

    /// `git remote`.
    pub fn list_remotes() -> Self {
        Self::new().arg("remote")
    }

    /// `git remote add <name> <url>`.
    pub fn remote_add(name: &str, url: &str) -> Self {
        Self::new().args(["remote", "add", name, url])
    }

    /// `git push --porcelain <remote> <refspec>`.
    ///
    /// Porcelain output yields one machine-readable status line per ref, so
    /// rejected refs can be reported individually.
    pub fn push_porcelain(remote: &str, refspec: &str) -> Self {
        Self::new().args(["push", "--porcelain", remote, refspec])
    }
}
