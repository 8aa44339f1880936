//! Git operations for the change publisher.
//!
//! Like Cargo with `git-fetch-with-cli`, this module wraps the system `git`
//! binary rather than an embedded Git library: the review endpoints here are
//! SSH remotes and the user's existing agent, keys, and git configuration
//! must keep working unchanged. Commands are built through
//! [`GitCommand`](command_builder::GitCommand) so argument passing, timeouts,
//! and error context stay consistent.
//!
//! The publisher's contract per device is small:
//!
//! - a dirty working tree at the start of a run means the device is skipped,
//! - after patching, each dirty tree is staged wholesale and committed,
//! - the review remote is created on first use and reused afterwards,
//! - the device tree's `HEAD` is pushed to a `refs/for/` review ref and the
//!   per-ref results are reported back; rejected refs are the caller's to
//!   log, not a hard failure. The vendor tree is committed but never pushed.

pub mod command_builder;

use crate::core::BlobupError;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

use command_builder::GitCommand;

/// A local git working tree.
#[derive(Debug)]
pub struct GitRepo {
    path: PathBuf,
}

impl GitRepo {
    /// Create a handle for an existing local repository.
    ///
    /// The path is not validated here; use [`GitRepo::ensure_valid`] before
    /// operating on it.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The repository's root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory looks like a git repository.
    #[must_use]
    pub fn is_git_repo(&self) -> bool {
        self.path.join(".git").exists()
    }

    /// Require that the path is a git repository.
    ///
    /// # Errors
    ///
    /// Returns [`BlobupError::GitRepoInvalid`] otherwise.
    pub fn ensure_valid(&self) -> Result<()> {
        if self.is_git_repo() {
            Ok(())
        } else {
            Err(BlobupError::GitRepoInvalid {
                path: self.path.display().to_string(),
            }
            .into())
        }
    }

    /// Whether the working tree has any changes, untracked files included.
    ///
    /// # Errors
    ///
    /// Fails when the status command fails.
    pub async fn is_dirty(&self) -> Result<bool> {
        let stdout = GitCommand::status_porcelain()
            .current_dir(&self.path)
            .execute_stdout()
            .await?;
        Ok(!stdout.is_empty())
    }

    /// Stage everything and commit with the given message.
    ///
    /// # Errors
    ///
    /// Fails when staging or committing fails.
    pub async fn commit_all(&self, message: &str) -> Result<()> {
        GitCommand::add_all()
            .current_dir(&self.path)
            .execute_success()
            .await?;
        debug!(target: "git", "committing in {}: {message}", self.path.display());
        GitCommand::commit(message)
            .current_dir(&self.path)
            .execute_success()
            .await
    }

    /// Names of the configured remotes.
    ///
    /// # Errors
    ///
    /// Fails when the remote listing fails.
    pub async fn remotes(&self) -> Result<Vec<String>> {
        let stdout = GitCommand::list_remotes()
            .current_dir(&self.path)
            .execute_stdout()
            .await?;
        Ok(stdout.lines().map(ToString::to_string).collect())
    }

    /// Create the named remote if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Fails when listing or adding remotes fails.
    pub async fn ensure_remote(&self, name: &str, url: &str) -> Result<()> {
        if self.remotes().await?.iter().any(|r| r == name) {
            return Ok(());
        }
        debug!(target: "git", "adding remote {name} -> {url}");
        GitCommand::remote_add(name, url)
            .current_dir(&self.path)
            .execute_success()
            .await
    }

    /// Push `HEAD` to the review ref of a branch and report per-ref results.
    ///
    /// A push where some refs are rejected is not an error: the rejected refs
    /// come back flagged in the reports for the caller to log. Only a push
    /// that produces no ref status at all (unreachable remote, auth failure)
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns [`BlobupError::GitCommandError`] when the push fails outright.
    pub async fn push_for_review(&self, remote: &str, branch: &str) -> Result<Vec<PushRefReport>> {
        let refspec = format!("HEAD:refs/for/{branch}");
        let output = GitCommand::push_porcelain(remote, &refspec)
            .current_dir(&self.path)
            .execute_unchecked()
            .await?;

        let reports = parse_push_porcelain(&output.stdout);
        if reports.is_empty() && !output.success {
            return Err(BlobupError::GitCommandError {
                operation: "push".to_string(),
                stderr: if output.stderr.is_empty() {
                    output.stdout
                } else {
                    output.stderr
                },
            }
            .into());
        }
        Ok(reports)
    }
}

/// One ref's result from a porcelain push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRefReport {
    /// Porcelain flag character (`!` marks a rejected ref).
    pub flag: char,
    /// The `from:to` refspec the line refers to.
    pub refspec: String,
    /// Human-readable summary from git.
    pub summary: String,
}

impl PushRefReport {
    /// Whether this ref was rejected by the remote.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.flag == '!'
    }
}

/// Parse `git push --porcelain` output into per-ref reports.
///
/// Porcelain lines look like `<flag>\t<from>:<to>\t<summary>`, between a
/// leading `To <url>` line and a trailing `Done`.
#[must_use]
pub fn parse_push_porcelain(stdout: &str) -> Vec<PushRefReport> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let flag_field = fields.next()?;
            let refspec = fields.next()?;
            let summary = fields.next().unwrap_or_default();
            let flag = if flag_field.is_empty() {
                ' '
            } else {
                flag_field.chars().next()?
            };
            if matches!(flag, ' ' | '+' | '-' | '*' | '=' | '!') {
                Some(PushRefReport {
                    flag,
                    refspec: refspec.to_string(),
                    summary: summary.to_string(),
                })
            } else {
                None
            }
        })
        .collect()
}
