//! Release channel metadata feed.
//!
//! Each device has a JSON document on the feed listing release branches; each
//! branch carries a localized name and a `roms` mapping from version string to
//! ROM descriptor. The resolver fetches the document fresh on every run, finds
//! the branch whose English name matches the configured channel label, and
//! picks the highest version by the numeric-run comparator.
//!
//! The feed schema is an external collaborator: only the fields the workflow
//! needs are modeled, everything else is ignored.

use crate::config::Config;
use crate::core::BlobupError;
use crate::version;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Timeout for metadata requests.
const FEED_TIMEOUT: Duration = Duration::from_secs(30);

/// The device's channel metadata document.
#[derive(Debug, Deserialize)]
pub struct ChannelFeed {
    /// Release branches published for the device.
    pub branches: Vec<Branch>,
}

/// One release branch of the feed.
#[derive(Debug, Deserialize)]
pub struct Branch {
    /// Localized branch names.
    pub name: BranchName,
    /// Version string to ROM descriptor.
    #[serde(default)]
    pub roms: HashMap<String, Rom>,
}

/// Localized names of a branch.
#[derive(Debug, Deserialize)]
pub struct BranchName {
    /// English name; the one channel labels are matched against.
    pub en: Option<String>,
}

/// ROM descriptor for one firmware version.
#[derive(Debug, Clone, Deserialize)]
pub struct Rom {
    /// File name of the recovery image on the mirror.
    pub recovery: String,
}

/// A resolved firmware release.
#[derive(Debug, Clone)]
pub struct Release {
    /// The resolved version string.
    pub version: String,
    /// The ROM descriptor for that version.
    pub rom: Rom,
}

/// Fetches channel metadata and resolves the latest release per device.
pub struct ReleaseFeed {
    client: reqwest::Client,
}

impl ReleaseFeed {
    /// Build a feed client with a request timeout.
    ///
    /// # Errors
    ///
    /// Fails when the underlying HTTP client cannot be constructed.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FEED_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Fetch the channel metadata document for a device.
    ///
    /// # Errors
    ///
    /// Network failures and non-success statuses propagate; there is no retry.
    pub async fn fetch(&self, config: &Config, codename: &str) -> Result<ChannelFeed> {
        let url = config.metadata_url(codename);
        debug!(target: "feed", "Fetching channel metadata from {url}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch channel metadata from {url}"))?
            .error_for_status()
            .with_context(|| format!("Channel metadata request rejected for {url}"))?;
        let feed = response
            .json::<ChannelFeed>()
            .await
            .with_context(|| format!("Failed to decode channel metadata from {url}"))?;
        Ok(feed)
    }

    /// Resolve the latest release of a channel for a device.
    ///
    /// # Errors
    ///
    /// Returns [`BlobupError::BranchNotFound`] when no branch carries the
    /// channel label and [`BlobupError::NoVersions`] when the branch lists no
    /// firmware versions.
    pub async fn latest_release(
        &self,
        config: &Config,
        codename: &str,
        channel: &str,
    ) -> Result<Release> {
        let feed = self.fetch(config, codename).await?;
        resolve_latest(&feed, codename, channel)
    }
}

/// Pick the newest version of the named channel out of a fetched feed.
///
/// # Errors
///
/// See [`ReleaseFeed::latest_release`].
pub fn resolve_latest(feed: &ChannelFeed, codename: &str, channel: &str) -> Result<Release> {
    let branch = feed
        .branches
        .iter()
        .find(|b| b.name.en.as_deref() == Some(channel))
        .ok_or_else(|| BlobupError::BranchNotFound {
            codename: codename.to_string(),
            channel: channel.to_string(),
        })?;

    let latest = version::latest(branch.roms.keys().map(String::as_str)).ok_or_else(|| {
        BlobupError::NoVersions {
            codename: codename.to_string(),
            channel: channel.to_string(),
        }
    })?;

    debug!(target: "feed", "{codename}: latest {channel} release is {latest}");
    Ok(Release {
        version: latest.to_string(),
        rom: branch.roms[latest].clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_feed() -> ChannelFeed {
        serde_json::from_str(
            r#"{
                "branches": [
                    {
                        "name": {"en": "Xiaomi HyperOS Global Stable", "cn": "国际稳定版"},
                        "roms": {
                            "OS1.0.1.0.VNBCNXM": {"recovery": "recovery-1.zip", "size": 123},
                            "OS1.0.10.0.VNBCNXM": {"recovery": "recovery-10.zip"},
                            "OS1.0.9.0.VNBCNXM": {"recovery": "recovery-9.zip"}
                        }
                    },
                    {
                        "name": {"en": "Xiaomi HyperOS Beta"},
                        "roms": {}
                    },
                    {
                        "name": {}
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_latest_by_numeric_runs() {
        let feed = sample_feed();
        let release =
            resolve_latest(&feed, "cupid", "Xiaomi HyperOS Global Stable").unwrap();
        assert_eq!(release.version, "OS1.0.10.0.VNBCNXM");
        assert_eq!(release.rom.recovery, "recovery-10.zip");
    }

    #[test]
    fn test_missing_branch_is_fatal() {
        let feed = sample_feed();
        let err = resolve_latest(&feed, "cupid", "Nonexistent Channel").unwrap_err();
        let err = err.downcast::<BlobupError>().unwrap();
        assert!(matches!(err, BlobupError::BranchNotFound { .. }));
    }

    #[test]
    fn test_empty_branch_is_fatal() {
        let feed = sample_feed();
        let err = resolve_latest(&feed, "cupid", "Xiaomi HyperOS Beta").unwrap_err();
        let err = err.downcast::<BlobupError>().unwrap();
        assert!(matches!(err, BlobupError::NoVersions { .. }));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        // Descriptors carry more fields than we model; decoding must not care.
        let feed = sample_feed();
        assert_eq!(feed.branches.len(), 3);
        assert!(feed.branches[2].name.en.is_none());
        assert!(feed.branches[2].roms.is_empty());
    }
}
