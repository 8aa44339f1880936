//! Configuration for blobup.
//!
//! Everything the historical update scripts kept as module-level constants -
//! tree roots, URL templates, the review endpoint, the version-token pattern,
//! and the device registry itself - lives in one TOML file loaded at startup
//! and passed into the workflow as an explicit structure.
//!
//! # Location
//!
//! - Default: `~/.config/blobup/config.toml` (platform config dir via `dirs`)
//! - Override: `--config <path>` or the `BLOBUP_CONFIG` environment variable
//!
//! # Format
//!
//! ```toml
//! android_root = "~/android/lineage-23"
//! vendor_root = "~/android/vendor/sm8450"
//! brand = "xiaomi"
//!
//! [review]
//! url = "ssh://{user}@review.lineageos.org:29418/LineageOS/{repo}"
//! user = "alice"
//! branch = "lineage-23.0"
//! remote = "lineage"
//!
//! [feed]
//! metadata_url = "https://example.com/devices/{codename}.json"
//! mirror_url = "https://mirror.example.com/{version}/{file}"
//! version_pattern = 'OS[.0-9]+[VW][LMN][A-Z]+((CN)|(MI))XM'
//!
//! [[devices]]
//! codename = "cupid"
//! channel = "Xiaomi HyperOS Global Stable"
//! extraction = "target-only"
//! fingerprint_source = "auto"
//! ```

use crate::core::BlobupError;
use crate::utils::platform::resolve_path;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// How much the device-tree extraction script is asked to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionScope {
    /// Pass `--only-target` so only the device's own partitions are extracted.
    #[default]
    TargetOnly,
    /// No restriction; the script extracts everything it knows about.
    All,
}

impl std::fmt::Display for ExtractionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TargetOnly => write!(f, "target-only"),
            Self::All => write!(f, "all"),
        }
    }
}

/// Where the build fingerprint and description are derived from.
///
/// The historical script variants disagreed: one assembled the fingerprint
/// from eight build-property keys, the other parsed the `post-build=` field
/// of the release metadata. Both are kept as named strategies; they produce
/// identical strings when the dump is self-consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FingerprintSource {
    /// Assemble from the layered build-property overlay.
    BuildProps,
    /// Parse the `post-build=` field of `META-INF/com/android/metadata`.
    PostBuild,
    /// Try the property overlay first, fall back to `post-build=`.
    #[default]
    Auto,
}

impl std::fmt::Display for FingerprintSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BuildProps => write!(f, "build-props"),
            Self::PostBuild => write!(f, "post-build"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// One entry of the device registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Device codename; names the trees, the feed document, and the archive.
    pub codename: String,
    /// Localized release-channel label to match against feed branch names.
    pub channel: String,
    /// Extraction scope for the device-tree extraction script.
    #[serde(default)]
    pub extraction: ExtractionScope,
    /// Fingerprint derivation strategy.
    #[serde(default)]
    pub fingerprint_source: FingerprintSource,
    /// Replace every occurrence of the version token in the proprietary
    /// lists instead of only the first.
    #[serde(default)]
    pub replace_all_matches: bool,
}

/// Code-review push endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// URL template with `{user}` and `{repo}` placeholders.
    pub url: String,
    /// Username substituted into the URL template.
    pub user: String,
    /// Target branch; changes are pushed to `refs/for/{branch}`.
    pub branch: String,
    /// Name of the git remote to create/reuse in the device tree.
    #[serde(default = "default_review_remote")]
    pub remote: String,
}

fn default_review_remote() -> String {
    "lineage".to_string()
}

/// Firmware feed and mirror settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Metadata URL template with a `{codename}` placeholder.
    pub metadata_url: String,
    /// Image mirror URL template with `{version}` and `{file}` placeholders.
    pub mirror_url: String,
    /// Regular expression matching a firmware version token.
    pub version_pattern: String,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the Android source checkout holding device and vendor trees.
    pub android_root: PathBuf,
    /// Root of the vendor blob area holding the archive and dump links.
    pub vendor_root: PathBuf,
    /// Vendor brand used in tree paths and review repository names.
    #[serde(default = "default_brand")]
    pub brand: String,
    /// Review endpoint settings.
    pub review: ReviewConfig,
    /// Feed and mirror settings.
    pub feed: FeedConfig,
    /// The device registry.
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

fn default_brand() -> String {
    "xiaomi".to_string()
}

impl Config {
    /// Default configuration file path.
    ///
    /// Honors the `BLOBUP_CONFIG` environment variable, then falls back to
    /// the platform config directory.
    ///
    /// # Errors
    ///
    /// Fails when no platform config directory can be determined.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("BLOBUP_CONFIG") {
            return resolve_path(&path);
        }
        let base = dirs::config_dir().context("Could not determine the user config directory")?;
        Ok(base.join("blobup").join("config.toml"))
    }

    /// Load configuration from an explicit path or the default location.
    ///
    /// # Errors
    ///
    /// Returns [`BlobupError::ConfigNotFound`] when the file does not exist,
    /// or a parse/validation error for invalid content.
    pub fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(p) => p,
            None => Self::default_path()?,
        };
        if !path.exists() {
            return Err(BlobupError::ConfigNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        Self::load_from(&path)
    }

    /// Load and validate configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Fails on unreadable files, invalid TOML, or failed validation.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration from {}", path.display()))?;
        config.expand_roots()?;
        config.validate()?;
        Ok(config)
    }

    /// Expand `~` and environment variables in the configured roots.
    fn expand_roots(&mut self) -> Result<()> {
        self.android_root = resolve_path(&self.android_root.to_string_lossy())?;
        self.vendor_root = resolve_path(&self.vendor_root.to_string_lossy())?;
        Ok(())
    }

    /// Validate registry and template invariants.
    ///
    /// # Errors
    ///
    /// Returns [`BlobupError::ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| -> Result<()> {
            Err(BlobupError::ConfigError { message }.into())
        };

        if self.devices.is_empty() {
            return fail("no devices configured".to_string());
        }
        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.codename.as_str()) {
                return fail(format!("duplicate device entry: {}", device.codename));
            }
        }
        if let Err(e) = Regex::new(&self.feed.version_pattern) {
            return fail(format!("invalid version_pattern: {e}"));
        }
        if !self.feed.metadata_url.contains("{codename}") {
            return fail("feed.metadata_url must contain a {codename} placeholder".to_string());
        }
        if !self.feed.mirror_url.contains("{version}") || !self.feed.mirror_url.contains("{file}") {
            return fail(
                "feed.mirror_url must contain {version} and {file} placeholders".to_string(),
            );
        }
        if !self.review.url.contains("{repo}") {
            return fail("review.url must contain a {repo} placeholder".to_string());
        }
        Ok(())
    }

    /// Compiled version-token regular expression.
    ///
    /// # Errors
    ///
    /// Fails when the configured pattern is invalid (already rejected by
    /// [`Config::validate`] on the load path).
    pub fn version_regex(&self) -> Result<Regex> {
        Ok(Regex::new(&self.feed.version_pattern)?)
    }

    /// Look up a device entry by codename.
    #[must_use]
    pub fn device(&self, codename: &str) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.codename == codename)
    }

    /// Select devices to process: all of them, or only the named ones.
    ///
    /// # Errors
    ///
    /// Returns [`BlobupError::DeviceNotConfigured`] when a requested codename
    /// is not in the registry.
    pub fn select_devices(&self, filter: &[String]) -> Result<Vec<&DeviceEntry>> {
        if filter.is_empty() {
            return Ok(self.devices.iter().collect());
        }
        filter
            .iter()
            .map(|codename| {
                self.device(codename).ok_or_else(|| {
                    BlobupError::DeviceNotConfigured {
                        codename: codename.clone(),
                    }
                    .into()
                })
            })
            .collect()
    }

    /// Path of the device support tree for a codename.
    #[must_use]
    pub fn device_tree_path(&self, codename: &str) -> PathBuf {
        self.android_root.join("device").join(&self.brand).join(codename)
    }

    /// Path of the vendor blob tree for a codename.
    #[must_use]
    pub fn vendor_tree_path(&self, codename: &str) -> PathBuf {
        self.android_root.join("vendor").join(&self.brand).join(codename)
    }

    /// Metadata feed URL for a codename.
    #[must_use]
    pub fn metadata_url(&self, codename: &str) -> String {
        self.feed.metadata_url.replace("{codename}", codename)
    }

    /// Mirror URL for a firmware image.
    #[must_use]
    pub fn mirror_url(&self, version: &str, file: &str) -> String {
        self.feed
            .mirror_url
            .replace("{version}", version)
            .replace("{file}", file)
    }

    /// Review remote URL for a device tree.
    #[must_use]
    pub fn review_repo_url(&self, codename: &str) -> String {
        let repo = format!("android_device_{}_{}", self.brand, codename);
        self.review
            .url
            .replace("{user}", &self.review.user)
            .replace("{repo}", &repo)
    }

    /// Template configuration written by `blobup init`.
    #[must_use]
    pub const fn template() -> &'static str {
        TEMPLATE
    }
}

const TEMPLATE: &str = r#"# blobup configuration
#
# Roots may use ~ and environment variables.
android_root = "~/android/lineage-23"
vendor_root = "~/android/vendor/sm8450"
brand = "xiaomi"

[review]
url = "ssh://{user}@review.lineageos.org:29418/LineageOS/{repo}"
user = "changeme"
branch = "lineage-23.0"
remote = "lineage"

[feed]
metadata_url = "https://raw.githubusercontent.com/HegeKen/HyperData/refs/heads/main/devices/{codename}.json"
mirror_url = "https://bkt-sgp-miui-ota-update-alisgp.oss-ap-southeast-1.aliyuncs.com/{version}/{file}"
version_pattern = 'OS[.0-9]+[VW][LMN][A-Z]+((CN)|(MI))XM'

[[devices]]
codename = "cupid"
channel = "Xiaomi HyperOS Global Stable"
extraction = "target-only"
fingerprint_source = "auto"

[[devices]]
codename = "mayfly"
channel = "Xiaomi HyperOS Stable"
extraction = "all"
fingerprint_source = "build-props"
"#;
