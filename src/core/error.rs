//! Error handling for blobup
//!
//! This module provides the error types and user-friendly error reporting for the
//! firmware update workflow. The error system is designed around two principles:
//! 1. **Strongly-typed errors** for precise handling in code
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! Two main types:
//! - [`BlobupError`] - Enumerated error types for all failure cases
//! - [`ErrorContext`] - Wrapper that adds user-friendly messages and suggestions
//!
//! # Error Taxonomy
//!
//! The workflow distinguishes four classes of failure:
//! - **Precondition failures** (dirty working tree) are not errors at all: they
//!   produce a per-device skip with a logged message and never reach this module.
//! - **Lookup and pattern-match failures** ([`BlobupError::BranchNotFound`],
//!   [`BlobupError::VersionTokenNotFound`], [`BlobupError::PropertyKeyMissing`],
//!   [`BlobupError::PatternMismatch`]) propagate and terminate the run.
//! - **Network and subprocess failures** ([`BlobupError::DownloadFailed`],
//!   [`BlobupError::ExtractionFailed`], [`BlobupError::GitCommandError`])
//!   propagate without retry.
//! - **Push-result errors** are logged per ref by the publisher and are not
//!   represented here; the local commit stands.
//!
//! Use [`user_friendly_error`] to convert any error into a displayable format
//! with contextual suggestions before exiting.

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for blobup operations.
///
/// Each variant represents a specific failure mode and carries enough context
/// (file paths, URLs, keys, exit codes) to tell the user what to fix.
#[derive(Error, Debug)]
pub enum BlobupError {
    /// Git executable not found in PATH
    #[error("Git is not installed or not found in PATH")]
    GitNotFound,

    /// Git operation failed during execution
    ///
    /// # Fields
    /// - `operation`: The git operation that failed (e.g., "commit", "push")
    /// - `stderr`: The error output from the git command
    #[error("Git operation failed: {operation}")]
    GitCommandError {
        /// The git operation that failed (e.g., "status", "commit", "push")
        operation: String,
        /// The error output from the git command
        stderr: String,
    },

    /// A configured working tree is missing or is not a git repository
    #[error("Not a valid git repository: {path}")]
    GitRepoInvalid {
        /// The path that was expected to contain a git repository
        path: String,
    },

    /// The metadata feed has no branch matching the configured channel label
    #[error("No release branch named '{channel}' in the feed for {codename}")]
    BranchNotFound {
        /// Device codename whose feed was queried
        codename: String,
        /// The release-channel label that was looked up
        channel: String,
    },

    /// The matched release branch lists no firmware versions
    #[error("Release branch '{channel}' for {codename} lists no versions")]
    NoVersions {
        /// Device codename whose feed was queried
        codename: String,
        /// The release-channel label that matched
        channel: String,
    },

    /// The version-token pattern did not match a file it must match
    #[error("No firmware version token found in {file}")]
    VersionTokenNotFound {
        /// The file that was scanned for the version token
        file: String,
    },

    /// A required field in a build-configuration file did not match its pattern
    #[error("Expected field '{field}' not found in {file}")]
    PatternMismatch {
        /// The assignment or field that was expected (e.g., "BuildFingerprint=")
        field: String,
        /// The file that was scanned
        file: String,
    },

    /// A build property required for fingerprint derivation is missing
    #[error("Build property '{key}' missing from extracted dump")]
    PropertyKeyMissing {
        /// The dotted property key that was looked up
        key: String,
    },

    /// A build fingerprint does not have `brand/name/device:release/id/incremental:type/tags` shape
    #[error("Malformed build fingerprint: {fingerprint}")]
    MalformedFingerprint {
        /// The string that failed to parse as a fingerprint
        fingerprint: String,
    },

    /// HTTP download failed or returned a non-success status
    #[error("Failed to download {url}")]
    DownloadFailed {
        /// The URL that failed to download
        url: String,
        /// The reason for the failure (status code or transport error)
        reason: String,
    },

    /// An extraction command exited with a non-zero status
    ///
    /// Always fatal; manifests are never patched against a stale or partial
    /// dump.
    #[error("Extraction command failed: {command}")]
    ExtractionFailed {
        /// The command line that was executed
        command: String,
        /// The captured error output
        stderr: String,
    },

    /// An external tool required for extraction is missing
    #[error("Extraction tool not found: {path}")]
    ToolNotFound {
        /// Path of the missing tool or script
        path: String,
    },

    /// Configuration file not found
    #[error("Configuration file not found at {path}")]
    ConfigNotFound {
        /// The path that was searched
        path: String,
    },

    /// Configuration content is invalid
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration problem
        message: String,
    },

    /// A device named on the command line is not in the registry
    #[error("Device '{codename}' is not configured")]
    DeviceNotConfigured {
        /// The codename that was requested
        codename: String,
    },

    /// Regular expression compilation failed
    #[error("Invalid pattern: {0}")]
    RegexError(#[from] regex::Error),
}

/// User-facing wrapper around an error with optional details and a suggestion.
///
/// Built by [`user_friendly_error`] at the top of the CLI and rendered with
/// [`ErrorContext::display`] before the process exits non-zero.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error message
    pub message: String,
    /// Optional expanded details (e.g., captured stderr)
    pub details: Option<String>,
    /// Optional actionable suggestion for the user
    pub suggestion: Option<String>,
}

impl ErrorContext {
    /// Create a context from any displayable error.
    pub fn new(error: impl fmt::Display) -> Self {
        Self {
            message: error.to_string(),
            details: None,
            suggestion: None,
        }
    }

    /// Attach expanded details shown below the error message.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attach an actionable suggestion shown below the error message.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Print the error to stderr with color.
    pub fn display(&self) {
        eprintln!("{} {}", "error:".red().bold(), self.message);
        if let Some(ref details) = self.details {
            for line in details.lines() {
                eprintln!("  {}", line.dimmed());
            }
        }
        if let Some(ref suggestion) = self.suggestion {
            eprintln!("{} {}", "hint:".yellow().bold(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref details) = self.details {
            write!(f, "\n{details}")?;
        }
        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\nhint: {suggestion}")?;
        }
        Ok(())
    }
}

/// Convert any error into an [`ErrorContext`] with a contextual suggestion.
///
/// Typed [`BlobupError`] values get variant-specific suggestions; everything
/// else falls back to the plain message chain.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(err) = error.downcast_ref::<BlobupError>() {
        match err {
            BlobupError::GitNotFound => ErrorContext::new(err)
                .with_suggestion("Install git and make sure it is in your PATH"),
            BlobupError::GitCommandError { stderr, .. } => {
                ErrorContext::new(err).with_details(stderr.clone())
            }
            BlobupError::GitRepoInvalid { .. } => ErrorContext::new(err).with_suggestion(
                "Check android_root in your configuration and that the device and vendor trees are checked out",
            ),
            BlobupError::BranchNotFound { channel, .. } => {
                ErrorContext::new(err).with_suggestion(format!(
                    "Check the channel label '{channel}' against the branch names the feed publishes"
                ))
            }
            BlobupError::VersionTokenNotFound { file } => {
                ErrorContext::new(err).with_suggestion(format!(
                    "{file} must already carry a firmware version token for the updater to replace"
                ))
            }
            BlobupError::PatternMismatch { .. }
            | BlobupError::PropertyKeyMissing { .. }
            | BlobupError::MalformedFingerprint { .. } => {
                ErrorContext::new(err)
                    .with_suggestion("The extracted dump may be incomplete; re-run the extraction")
            }
            BlobupError::DownloadFailed { reason, .. } => {
                ErrorContext::new(err).with_details(reason.clone())
            }
            BlobupError::ExtractionFailed { stderr, .. } => ErrorContext::new(err)
                .with_details(stderr.clone())
                .with_suggestion("Fix the extraction tooling before re-running; manifests were not patched"),
            BlobupError::ToolNotFound { .. } => ErrorContext::new(err)
                .with_suggestion("Check that extract-utils and the device extract-files script exist"),
            BlobupError::ConfigNotFound { path } => ErrorContext::new(err).with_suggestion(format!(
                "Run 'blobup init' to create a template configuration at {path}"
            )),
            BlobupError::ConfigError { .. } => {
                ErrorContext::new(err).with_suggestion("Fix the configuration file and try again")
            }
            BlobupError::DeviceNotConfigured { .. } => ErrorContext::new(err)
                .with_suggestion("Run 'blobup list' to see the configured devices"),
            _ => ErrorContext::new(err),
        }
    } else {
        // Preserve the anyhow context chain as details.
        let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
        let ctx = ErrorContext::new(&error);
        if chain.is_empty() { ctx } else { ctx.with_details(chain.join("\n")) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BlobupError::BranchNotFound {
            codename: "cupid".to_string(),
            channel: "Global Stable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No release branch named 'Global Stable' in the feed for cupid"
        );
    }

    #[test]
    fn test_user_friendly_error_typed() {
        let err = anyhow::Error::from(BlobupError::GitNotFound);
        let ctx = user_friendly_error(err);
        assert!(ctx.message.contains("not installed"));
        assert!(ctx.suggestion.unwrap().contains("PATH"));
    }

    #[test]
    fn test_user_friendly_error_chain() {
        let err = anyhow::anyhow!("inner cause").context("outer operation failed");
        let ctx = user_friendly_error(err);
        assert_eq!(ctx.message, "outer operation failed");
        assert_eq!(ctx.details.unwrap(), "inner cause");
    }

    #[test]
    fn test_context_format() {
        let ctx = ErrorContext::new("boom").with_suggestion("try again");
        assert_eq!(format!("{ctx}"), "boom\nhint: try again");
    }
}
