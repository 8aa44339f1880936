//! On-disk firmware archive.
//!
//! Downloaded recovery images live under
//! `{vendor_root}/archive/{codename}/{version}/{image}`, next to the dump
//! directory the extraction tooling produces (named after the image's file
//! stem). `{vendor_root}/{codename}` is a symlink to the current dump so the
//! latest extraction is always reachable under a stable path.
//!
//! A present image is trusted as-is: there is no integrity check and no
//! retry. Downloads stream to a `.part` file and are renamed into place, so
//! only a completed transfer ever occupies the image path.

use crate::core::BlobupError;
use crate::utils::fs::{ensure_dir, replace_symlink};
use crate::utils::progress::download_bar;
use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Whether [`ArtifactStore::ensure_image`] had to hit the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The image was downloaded on this run.
    Downloaded,
    /// The image was already present in the archive.
    Cached,
}

/// The firmware archive rooted at `vendor_root`.
pub struct ArtifactStore {
    vendor_root: PathBuf,
    client: reqwest::Client,
}

impl ArtifactStore {
    /// Create a store over the given vendor root.
    ///
    /// The HTTP client carries a connect timeout only; firmware images are
    /// multi-gigabyte and a whole-request timeout would kill slow mirrors.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be constructed.
    pub fn new(vendor_root: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            vendor_root: vendor_root.into(),
            client,
        })
    }

    /// Archive directory for a `(codename, version)` pair.
    #[must_use]
    pub fn archive_dir(&self, codename: &str, version: &str) -> PathBuf {
        self.vendor_root.join("archive").join(codename).join(version)
    }

    /// Path of the recovery image inside the archive.
    #[must_use]
    pub fn image_path(&self, codename: &str, version: &str, recovery: &str) -> PathBuf {
        self.archive_dir(codename, version).join(recovery)
    }

    /// Path of the extracted dump directory (image file stem).
    #[must_use]
    pub fn dump_dir(&self, codename: &str, version: &str, recovery: &str) -> PathBuf {
        let stem = Path::new(recovery)
            .file_stem()
            .map_or_else(|| recovery.to_string(), |s| s.to_string_lossy().into_owned());
        self.archive_dir(codename, version).join(stem)
    }

    /// Stable per-device path of the latest dump.
    #[must_use]
    pub fn latest_link(&self, codename: &str) -> PathBuf {
        self.vendor_root.join(codename)
    }

    /// Make sure the recovery image is present, downloading it if absent.
    ///
    /// Creates the archive directory when missing. Skips the network entirely
    /// when the file already exists.
    ///
    /// # Errors
    ///
    /// Returns [`BlobupError::DownloadFailed`] on transport errors or
    /// non-success statuses. A download that fails midway leaves only a
    /// `.part` file behind.
    pub async fn ensure_image(
        &self,
        url: &str,
        codename: &str,
        version: &str,
        recovery: &str,
    ) -> Result<FetchOutcome> {
        let dir = self.archive_dir(codename, version);
        ensure_dir(&dir)?;

        let dest = self.image_path(codename, version, recovery);
        if dest.is_file() {
            debug!(target: "archive", "{codename}: {recovery} already archived");
            return Ok(FetchOutcome::Cached);
        }

        info!(target: "archive", "downloading {url} to {}", dest.display());
        self.download(url, &dest).await?;
        Ok(FetchOutcome::Downloaded)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BlobupError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(BlobupError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            }
            .into());
        }

        let name = dest
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        let bar = download_bar(response.content_length(), format!("downloading {name}"));

        let part = dest.with_extension("part");
        let mut file = tokio::fs::File::create(&part)
            .await
            .with_context(|| format!("Failed to create {}", part.display()))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| BlobupError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write {}", part.display()))?;
            bar.inc(chunk.len() as u64);
        }
        file.sync_all()
            .await
            .with_context(|| format!("Failed to sync {}", part.display()))?;
        drop(file);
        bar.finish_and_clear();

        tokio::fs::rename(&part, dest)
            .await
            .with_context(|| format!("Failed to move {} into place", part.display()))?;
        Ok(())
    }

    /// Repoint the per-device "latest dump" symlink at a dump directory.
    ///
    /// # Errors
    ///
    /// Fails when the link path is occupied by something that is not a
    /// symlink, or link creation fails.
    pub fn link_latest(&self, codename: &str, dump_dir: &Path) -> Result<()> {
        let link = self.latest_link(codename);
        debug!(target: "archive", "linking {} -> {}", link.display(), dump_dir.display());
        replace_symlink(dump_dir, &link)
    }
}
