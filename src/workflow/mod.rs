//! The per-device update workflow.
//!
//! One pass over the configured devices, strictly sequential, with no shared
//! state between iterations beyond the configuration. Each device walks a
//! small state machine:
//!
//! ```text
//! start -> (dirty tree -> SKIPPED)
//!       -> version resolved -> (already up to date -> SKIPPED)
//!       -> downloaded/cached -> extracted -> manifests patched
//!       -> committed -> pushed -> DONE
//! ```
//!
//! Dirty working trees and the up-to-date check are the only recoverable
//! conditions; they skip the device with a logged message. Every other
//! failure - a missing feed branch, a failed download, a non-zero extraction
//! exit, a pattern that does not match - propagates and aborts the remaining
//! devices. No step is retried.
//!
//! Per-ref push rejections are the one softened case: they are logged and
//! the local commit stands, since a rejected review upload is recoverable by
//! hand without touching the trees.

use crate::archive::{ArtifactStore, FetchOutcome};
use crate::config::{Config, DeviceEntry, FingerprintSource};
use crate::extract::Extractor;
use crate::feed::ReleaseFeed;
use crate::git::GitRepo;
use crate::patcher::DevicePatcher;
use crate::props::{self, BuildStamp, PropertyMap};
use crate::utils::platform::ensure_git_available;
use anyhow::Result;
use regex::Regex;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// What happened to one device during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutcome {
    /// Skipped before any work because a working tree was dirty.
    SkippedDirty {
        /// Which tree was dirty: `"device"` or `"vendor"`.
        tree: &'static str,
    },
    /// Skipped because the manifests already reference the latest version.
    UpToDate {
        /// The resolved (and already applied) version.
        version: String,
    },
    /// Updated, committed, and pushed for review.
    Updated {
        /// The version the device was updated to.
        version: String,
    },
}

impl fmt::Display for DeviceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkippedDirty { tree } => write!(f, "skipped ({tree} tree dirty)"),
            Self::UpToDate { version } => write!(f, "up to date at {version}"),
            Self::Updated { version } => write!(f, "updated to {version}"),
        }
    }
}

/// One device's row in a `check` report.
#[derive(Debug, Clone)]
pub struct CheckReport {
    /// Device codename.
    pub codename: String,
    /// Release channel the device follows.
    pub channel: String,
    /// Version the local manifests currently reference, when readable.
    pub current: Option<String>,
    /// Latest version the feed offers.
    pub latest: String,
}

impl CheckReport {
    /// Whether the local manifests already reference the latest version.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.current.as_deref() == Some(self.latest.as_str())
    }
}

/// The firmware update workflow over a loaded configuration.
pub struct Workflow {
    config: Config,
    feed: ReleaseFeed,
    store: ArtifactStore,
    extractor: Extractor,
    version_re: Regex,
}

impl Workflow {
    /// Build a workflow from configuration.
    ///
    /// # Errors
    ///
    /// Fails when git is unavailable, the version pattern is invalid, or the
    /// HTTP client cannot be constructed.
    pub fn new(config: Config) -> Result<Self> {
        ensure_git_available()?;
        let version_re = config.version_regex()?;
        let store = ArtifactStore::new(&config.vendor_root)?;
        let extractor = Extractor::new(&config.android_root);
        let feed = ReleaseFeed::new()?;
        Ok(Self {
            config,
            feed,
            store,
            extractor,
            version_re,
        })
    }

    /// The configuration the workflow runs over.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the full update pipeline for the selected devices.
    ///
    /// Devices are processed one at a time in registry order. The first
    /// unrecovered error aborts the remaining devices.
    ///
    /// # Errors
    ///
    /// Propagates the first fatal error from any device's pipeline.
    pub async fn run(&self, filter: &[String]) -> Result<Vec<(String, DeviceOutcome)>> {
        let devices = self.config.select_devices(filter)?;
        let mut outcomes = Vec::with_capacity(devices.len());
        for device in devices {
            let outcome = self.update_device(device).await?;
            outcomes.push((device.codename.clone(), outcome));
        }
        Ok(outcomes)
    }

    /// Resolve latest versions without downloading or writing anything.
    ///
    /// # Errors
    ///
    /// Propagates feed lookup failures.
    pub async fn check(&self, filter: &[String]) -> Result<Vec<CheckReport>> {
        let devices = self.config.select_devices(filter)?;
        let mut reports = Vec::with_capacity(devices.len());
        for device in devices {
            let release = self
                .feed
                .latest_release(&self.config, &device.codename, &device.channel)
                .await?;
            let patcher = DevicePatcher::new(
                self.config.device_tree_path(&device.codename),
                self.version_re.clone(),
            );
            reports.push(CheckReport {
                codename: device.codename.clone(),
                channel: device.channel.clone(),
                current: patcher.current_version().ok(),
                latest: release.version,
            });
        }
        Ok(reports)
    }

    async fn update_device(&self, device: &DeviceEntry) -> Result<DeviceOutcome> {
        let codename = &device.codename;

        let device_tree = GitRepo::new(self.config.device_tree_path(codename));
        device_tree.ensure_valid()?;
        if device_tree.is_dirty().await? {
            warn!("Skipping {codename} because the device tree is dirty");
            return Ok(DeviceOutcome::SkippedDirty { tree: "device" });
        }

        let vendor_tree = GitRepo::new(self.config.vendor_tree_path(codename));
        vendor_tree.ensure_valid()?;
        if vendor_tree.is_dirty().await? {
            warn!("Skipping {codename} because the vendor tree is dirty");
            return Ok(DeviceOutcome::SkippedDirty { tree: "vendor" });
        }

        let release = self
            .feed
            .latest_release(&self.config, codename, &device.channel)
            .await?;
        let version = &release.version;
        let recovery = &release.rom.recovery;
        info!("{codename}: latest {} release is {version}", device.channel);

        let image = self.store.image_path(codename, version, recovery);
        let dump = self.store.dump_dir(codename, version, recovery);
        let patcher = DevicePatcher::new(device_tree.path(), self.version_re.clone());

        let fetched = self
            .store
            .ensure_image(
                &self.config.mirror_url(version, recovery),
                codename,
                version,
                recovery,
            )
            .await?;

        // The sole idempotence guard: a cached image with an existing dump
        // whose manifests already carry the resolved version means a prior
        // run completed.
        if fetched == FetchOutcome::Cached
            && dump.is_dir()
            && patcher.current_version()? == *version
        {
            info!("{codename} is already up to date at {version}");
            return Ok(DeviceOutcome::UpToDate {
                version: version.clone(),
            });
        }

        self.extractor
            .run(device_tree.path(), &image, device.extraction)
            .await?;
        self.store.link_latest(codename, &dump)?;

        patcher.patch_version_tokens(version, device.replace_all_matches)?;

        let stamp = self.resolve_stamp(device, &dump)?;
        patcher.patch_build_stamp(codename, &stamp)?;

        let patch_level = props::security_patch_level(&dump.join("vendor").join("build.prop"))?;
        patcher.patch_security_patch(&patch_level)?;

        let message = format!("{codename}: Update blobs and firmware from {version}");
        if device_tree.is_dirty().await? {
            device_tree.commit_all(&message).await?;
        }
        if vendor_tree.is_dirty().await? {
            vendor_tree.commit_all(&message).await?;
        }

        device_tree
            .ensure_remote(
                &self.config.review.remote,
                &self.config.review_repo_url(codename),
            )
            .await?;
        let reports = device_tree
            .push_for_review(&self.config.review.remote, &self.config.review.branch)
            .await?;
        for report in &reports {
            if report.is_rejected() {
                warn!("{codename}: push rejected: {} {}", report.refspec, report.summary);
            }
        }

        Ok(DeviceOutcome::Updated {
            version: version.clone(),
        })
    }

    /// Derive the build stamp according to the device's configured strategy.
    fn resolve_stamp(&self, device: &DeviceEntry, dump: &Path) -> Result<BuildStamp> {
        let prop_candidates = [
            dump.join("product").join("etc").join("build.prop"),
            dump.join("vendor").join("build.prop"),
            dump.join("vendor").join(format!("{}_build.prop", device.codename)),
        ];
        let metadata = dump
            .join("META-INF")
            .join("com")
            .join("android")
            .join("metadata");

        match device.fingerprint_source {
            FingerprintSource::BuildProps => {
                let overlay = PropertyMap::load_layered(&prop_candidates)?;
                props::stamp_from_props(&overlay)
            }
            FingerprintSource::PostBuild => props::stamp_from_release_metadata(&metadata),
            FingerprintSource::Auto => {
                let overlay = PropertyMap::load_layered(&prop_candidates)?;
                match props::stamp_from_props(&overlay) {
                    Ok(stamp) => Ok(stamp),
                    Err(e) => {
                        debug!(
                            "{}: property overlay incomplete ({e}), deriving from post-build",
                            device.codename
                        );
                        props::stamp_from_release_metadata(&metadata)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionScope;
    use tempfile::TempDir;

    fn test_config(root: &Path) -> Config {
        let toml = format!(
            r#"
            android_root = "{android}"
            vendor_root = "{vendor}"

            [review]
            url = "ssh://{{user}}@review.example.org:29418/LineageOS/{{repo}}"
            user = "tester"
            branch = "lineage-23.0"

            [feed]
            metadata_url = "https://example.invalid/devices/{{codename}}.json"
            mirror_url = "https://example.invalid/{{version}}/{{file}}"
            version_pattern = 'OS[.0-9]+[VW][LMN][A-Z]+((CN)|(MI))XM'

            [[devices]]
            codename = "cupid"
            channel = "Xiaomi HyperOS Global Stable"
            "#,
            android = root.join("android").display(),
            vendor = root.join("vendor").display(),
        );
        toml::from_str(&toml).unwrap()
    }

    fn write_dump_props(dump: &Path) {
        let vendor = dump.join("vendor");
        std::fs::create_dir_all(&vendor).unwrap();
        std::fs::write(
            vendor.join("build.prop"),
            "ro.product.vendor.brand=Xiaomi\n\
             ro.product.vendor.name=cupid\n\
             ro.product.vendor.device=cupid\n\
             ro.product.build.version.release=14\n\
             ro.product.build.id=UKQ1\n\
             ro.product.build.version.incremental=V816\n\
             ro.product.build.type=user\n\
             ro.product.build.tags=release-keys\n\
             ro.vendor.build.security_patch=2024-07-01\n",
        )
        .unwrap();
    }

    fn write_dump_metadata(dump: &Path) {
        let meta_dir = dump.join("META-INF/com/android");
        std::fs::create_dir_all(&meta_dir).unwrap();
        std::fs::write(
            meta_dir.join("metadata"),
            "post-build=Xiaomi/cupid/cupid:14/UKQ1/V816:user/release-keys\n",
        )
        .unwrap();
    }

    #[test]
    fn test_device_defaults_flow_into_workflow() {
        let root = TempDir::new().unwrap();
        let config = test_config(root.path());
        let device = &config.devices[0];
        assert_eq!(device.extraction, ExtractionScope::TargetOnly);
        assert_eq!(device.fingerprint_source, FingerprintSource::Auto);
    }

    #[test]
    fn test_resolve_stamp_from_props() {
        let root = TempDir::new().unwrap();
        let config = test_config(root.path());
        let workflow = Workflow::new(config).unwrap();

        let dump = root.path().join("dump");
        write_dump_props(&dump);

        let device = &workflow.config.devices[0];
        let stamp = workflow.resolve_stamp(device, &dump).unwrap();
        assert_eq!(
            stamp.fingerprint,
            "Xiaomi/cupid/cupid:14/UKQ1/V816:user/release-keys"
        );
    }

    #[test]
    fn test_resolve_stamp_auto_falls_back_to_post_build() {
        let root = TempDir::new().unwrap();
        let config = test_config(root.path());
        let workflow = Workflow::new(config).unwrap();

        // No build.prop files at all: auto must fall back to the release
        // metadata.
        let dump = root.path().join("dump");
        write_dump_metadata(&dump);

        let device = &workflow.config.devices[0];
        let stamp = workflow.resolve_stamp(device, &dump).unwrap();
        assert_eq!(stamp.description, "cupid-user 14 UKQ1 V816 release-keys");
    }

    #[test]
    fn test_resolve_stamp_strategies_agree() {
        let root = TempDir::new().unwrap();
        let mut config = test_config(root.path());
        config.devices[0].fingerprint_source = FingerprintSource::BuildProps;
        let workflow = Workflow::new(config).unwrap();

        let dump = root.path().join("dump");
        write_dump_props(&dump);
        write_dump_metadata(&dump);

        let device = &workflow.config.devices[0];
        let from_props = workflow.resolve_stamp(device, &dump).unwrap();

        let mut config = test_config(root.path());
        config.devices[0].fingerprint_source = FingerprintSource::PostBuild;
        let workflow = Workflow::new(config).unwrap();
        let device = &workflow.config.devices[0];
        let from_metadata = workflow.resolve_stamp(device, &dump).unwrap();

        assert_eq!(from_props, from_metadata);
    }

    #[test]
    fn test_outcome_display() {
        let outcome = DeviceOutcome::SkippedDirty { tree: "device" };
        assert_eq!(outcome.to_string(), "skipped (device tree dirty)");
        let outcome = DeviceOutcome::Updated {
            version: "OS1.0.10.0.VNBCNXM".to_string(),
        };
        assert_eq!(outcome.to_string(), "updated to OS1.0.10.0.VNBCNXM");
    }

    #[test]
    fn test_check_report_is_current() {
        let report = CheckReport {
            codename: "cupid".to_string(),
            channel: "Stable".to_string(),
            current: Some("OS1.0.10.0.VNBCNXM".to_string()),
            latest: "OS1.0.10.0.VNBCNXM".to_string(),
        };
        assert!(report.is_current());

        let report = CheckReport {
            current: None,
            ..report
        };
        assert!(!report.is_current());
    }
}
