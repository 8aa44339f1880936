//! Platform helpers: external command lookup and path resolution.

use crate::core::BlobupError;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Name of the git executable on this platform.
#[must_use]
pub const fn git_command() -> &'static str {
    if cfg!(windows) { "git.exe" } else { "git" }
}

/// Verify that git is installed and reachable through PATH.
///
/// # Errors
///
/// Returns [`BlobupError::GitNotFound`] when the executable cannot be located.
pub fn ensure_git_available() -> Result<()> {
    which::which(git_command()).map_err(|_| BlobupError::GitNotFound)?;
    Ok(())
}

/// Resolve a user-supplied path, expanding `~` and environment variables.
///
/// # Errors
///
/// Returns an error when an environment variable referenced in the path is
/// not set.
pub fn resolve_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .with_context(|| format!("Failed to expand path: {path}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
