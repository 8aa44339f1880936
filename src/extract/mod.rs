//! Blob extraction tooling invocation.
//!
//! Extraction is delegated to two external tools, run in sequence for each
//! device:
//!
//! 1. the generic extraction utility at
//!    `{android_root}/tools/extract-utils/extract.py`, pointed at the
//!    downloaded recovery image, and
//! 2. the device tree's own `extract-files.py`, invoked with `--keep-dump`
//!    and, for target-only devices, `--only-target`.
//!
//! Both are opaque collaborators: no output is interpreted, but the exit
//! status is checked. A non-zero exit is fatal rather than silently patching
//! manifests against a stale or partial dump.

use crate::config::ExtractionScope;
use crate::core::BlobupError;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Builder for external tool invocations with consistent logging, timeout,
/// and exit-status handling.
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    timeout_duration: Option<Duration>,
}

impl ToolCommand {
    /// Default timeout for extraction passes. Dumps of multi-gigabyte images
    /// take a while; an hour is generous without hanging forever.
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

    /// Start building an invocation of `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            timeout_duration: Some(Self::DEFAULT_TIMEOUT),
        }
    }

    /// Add a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the working directory for the invocation.
    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Override the timeout (`None` disables it).
    #[must_use]
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Render the invocation for logs and error messages.
    fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Run the command to completion and require a zero exit status.
    ///
    /// # Errors
    ///
    /// Returns [`BlobupError::ExtractionFailed`] on a non-zero exit or a
    /// timeout, with captured stderr in the error.
    pub async fn execute(self) -> Result<()> {
        let line = self.command_line();
        debug!(target: "extract", "Executing command: {line}");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output_future = cmd.output();
        let output = if let Some(duration) = self.timeout_duration {
            match timeout(duration, output_future).await {
                Ok(result) => result.with_context(|| format!("Failed to execute {line}"))?,
                Err(_) => {
                    return Err(BlobupError::ExtractionFailed {
                        command: line,
                        stderr: format!("timed out after {} seconds", duration.as_secs()),
                    }
                    .into());
                }
            }
        } else {
            output_future.await.with_context(|| format!("Failed to execute {line}"))?
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.is_empty() {
            debug!(target: "extract", "{}", stdout.trim());
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BlobupError::ExtractionFailed {
                command: self.command_line(),
                stderr: stderr.trim().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Runs the two extraction passes for a device.
pub struct Extractor {
    android_root: PathBuf,
}

impl Extractor {
    /// Create an extractor rooted at the Android source checkout.
    pub fn new(android_root: impl Into<PathBuf>) -> Self {
        Self {
            android_root: android_root.into(),
        }
    }

    /// Path of the generic extraction utility.
    #[must_use]
    pub fn extract_utility(&self) -> PathBuf {
        self.android_root
            .join("tools")
            .join("extract-utils")
            .join("extract.py")
    }

    /// Run both extraction passes against a downloaded recovery image.
    ///
    /// # Errors
    ///
    /// Returns [`BlobupError::ToolNotFound`] when either tool is missing and
    /// [`BlobupError::ExtractionFailed`] when one exits non-zero.
    pub async fn run(
        &self,
        device_tree: &Path,
        image: &Path,
        scope: ExtractionScope,
    ) -> Result<()> {
        let utility = self.extract_utility();
        if !utility.is_file() {
            return Err(BlobupError::ToolNotFound {
                path: utility.display().to_string(),
            }
            .into());
        }
        ToolCommand::new(&utility)
            .arg(image.display().to_string())
            .execute()
            .await?;

        let script = device_tree.join("extract-files.py");
        if !script.is_file() {
            return Err(BlobupError::ToolNotFound {
                path: script.display().to_string(),
            }
            .into());
        }
        let mut cmd = ToolCommand::new(&script)
            .current_dir(device_tree)
            .arg(image.display().to_string())
            .arg("--keep-dump");
        if scope == ExtractionScope::TargetOnly {
            cmd = cmd.arg("--only-target");
        }
        cmd.execute().await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn test_command_line_rendering() {
        let cmd = ToolCommand::new("/tools/extract.py")
            .arg("/archive/recovery.zip")
            .arg("--keep-dump");
        assert_eq!(
            cmd.command_line(),
            "/tools/extract.py /archive/recovery.zip --keep-dump"
        );
    }

    #[tokio::test]
    async fn test_execute_success() {
        let dir = TempDir::new().unwrap();
        let tool = script(dir.path(), "ok.sh", "exit 0");
        ToolCommand::new(&tool).execute().await.unwrap();
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_fatal() {
        let dir = TempDir::new().unwrap();
        let tool = script(dir.path(), "fail.sh", "echo broken >&2; exit 3");
        let err = ToolCommand::new(&tool).execute().await.unwrap_err();
        let err = err.downcast::<BlobupError>().unwrap();
        match err {
            BlobupError::ExtractionFailed { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_fatal() {
        let dir = TempDir::new().unwrap();
        let tool = script(dir.path(), "slow.sh", "sleep 5");
        let err = ToolCommand::new(&tool)
            .with_timeout(Some(Duration::from_millis(100)))
            .execute()
            .await
            .unwrap_err();
        let err = err.downcast::<BlobupError>().unwrap();
        match err {
            BlobupError::ExtractionFailed { stderr, .. } => {
                assert!(stderr.contains("timed out"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_utility_reported() {
        let root = TempDir::new().unwrap();
        let extractor = Extractor::new(root.path());
        let err = extractor
            .run(root.path(), Path::new("/nonexistent.zip"), ExtractionScope::All)
            .await
            .unwrap_err();
        let err = err.downcast::<BlobupError>().unwrap();
        assert!(matches!(err, BlobupError::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_scope_controls_only_target_flag() {
        let root = TempDir::new().unwrap();
        let tools = root.path().join("tools/extract-utils");
        std::fs::create_dir_all(&tools).unwrap();
        script(&tools, "extract.py", "exit 0");

        let device_tree = root.path().join("device/xiaomi/cupid");
        std::fs::create_dir_all(&device_tree).unwrap();
        // Record the arguments the device script receives.
        script(
            &device_tree,
            "extract-files.py",
            "echo \"$@\" > args.txt",
        );

        let extractor = Extractor::new(root.path());
        extractor
            .run(&device_tree, Path::new("/img/recovery.zip"), ExtractionScope::TargetOnly)
            .await
            .unwrap();
        let args = std::fs::read_to_string(device_tree.join("args.txt")).unwrap();
        assert!(args.contains("--keep-dump"));
        assert!(args.contains("--only-target"));

        extractor
            .run(&device_tree, Path::new("/img/recovery.zip"), ExtractionScope::All)
            .await
            .unwrap();
        let args = std::fs::read_to_string(device_tree.join("args.txt")).unwrap();
        assert!(args.contains("--keep-dump"));
        assert!(!args.contains("--only-target"));
    }
}
