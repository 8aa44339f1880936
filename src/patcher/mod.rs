//! Device manifest patching.
//!
//! All edits are positional regular-expression substitutions over whole-file
//! text, not structured edits. Four files per device tree are rewritten:
//!
//! - `proprietary-files.txt` and `proprietary-firmware.txt`: the firmware
//!   version token is replaced with the resolved version (first occurrence by
//!   default, every occurrence when the device opts in),
//! - `lineage_{codename}.mk`: the `BuildFingerprint=` and `BuildDesc="..."`
//!   assignments are rewritten from a freshly derived [`BuildStamp`],
//! - `BoardConfig.mk`: the `VENDOR_SECURITY_PATCH :=` value is rewritten from
//!   the dump's vendor security patch level.
//!
//! A file missing the expected field is a typed error: patching must never
//! silently no-op, because the version token in `proprietary-files.txt` is
//! also the workflow's only idempotence guard.
//!
//! Substitutions are deterministic, so applying the same patch twice yields
//! the same bytes as applying it once.

use crate::core::BlobupError;
use crate::props::BuildStamp;
use crate::utils::fs::{atomic_write, read_text};
use anyhow::Result;
use regex::{Captures, NoExpand, Regex};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The proprietary list files carrying a firmware version token.
pub const PROPRIETARY_FILES: [&str; 2] = ["proprietary-files.txt", "proprietary-firmware.txt"];

/// Patches the manifests of one device tree.
pub struct DevicePatcher {
    device_tree: PathBuf,
    version_re: Regex,
}

impl DevicePatcher {
    /// Create a patcher for a device tree with the configured version-token
    /// pattern.
    pub fn new(device_tree: impl Into<PathBuf>, version_re: Regex) -> Self {
        Self {
            device_tree: device_tree.into(),
            version_re,
        }
    }

    fn file(&self, name: &str) -> PathBuf {
        self.device_tree.join(name)
    }

    /// Read the firmware version the proprietary manifest currently
    /// references. This is the skip-rule probe.
    ///
    /// # Errors
    ///
    /// Returns [`BlobupError::VersionTokenNotFound`] when the manifest holds
    /// no version token, and an IO error when it cannot be read.
    pub fn current_version(&self) -> Result<String> {
        let path = self.file(PROPRIETARY_FILES[0]);
        let text = read_text(&path)?;
        self.version_re
            .find(&text)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                BlobupError::VersionTokenNotFound {
                    file: path.display().to_string(),
                }
                .into()
            })
    }

    /// Rewrite the version token in both proprietary list files.
    ///
    /// Replaces the first occurrence, or every occurrence when `replace_all`
    /// is set.
    ///
    /// # Errors
    ///
    /// Returns [`BlobupError::VersionTokenNotFound`] when either file holds
    /// no version token.
    pub fn patch_version_tokens(&self, version: &str, replace_all: bool) -> Result<()> {
        for name in PROPRIETARY_FILES {
            let path = self.file(name);
            let text = read_text(&path)?;
            if !self.version_re.is_match(&text) {
                return Err(BlobupError::VersionTokenNotFound {
                    file: path.display().to_string(),
                }
                .into());
            }
            let patched = if replace_all {
                self.version_re.replace_all(&text, NoExpand(version))
            } else {
                self.version_re.replace(&text, NoExpand(version))
            };
            debug!(target: "patcher", "updating version token in {}", path.display());
            atomic_write(&path, &patched)?;
        }
        Ok(())
    }

    /// Rewrite `BuildFingerprint=` and `BuildDesc="..."` in the device
    /// makefile.
    ///
    /// # Errors
    ///
    /// Returns [`BlobupError::PatternMismatch`] when either assignment is
    /// absent.
    pub fn patch_build_stamp(&self, codename: &str, stamp: &BuildStamp) -> Result<()> {
        let path = self.file(&format!("lineage_{codename}.mk"));
        let text = read_text(&path)?;

        let fingerprint_re = Regex::new(r"(BuildFingerprint=)[-_a-zA-Z0-9/:.]+")
            .map_err(BlobupError::RegexError)?;
        let text = replace_required(&fingerprint_re, &text, &path, "BuildFingerprint=", |caps| {
            format!("{}{}", &caps[1], stamp.fingerprint)
        })?;

        let desc_re = Regex::new(r#"(BuildDesc=")[^"]*(")"#).map_err(BlobupError::RegexError)?;
        let text = replace_required(&desc_re, &text, &path, "BuildDesc=", |caps| {
            format!("{}{}{}", &caps[1], stamp.description, &caps[2])
        })?;

        debug!(target: "patcher", "updating build stamp in {}", path.display());
        atomic_write(&path, &text)
    }

    /// Rewrite the `VENDOR_SECURITY_PATCH :=` value in `BoardConfig.mk`.
    ///
    /// # Errors
    ///
    /// Returns [`BlobupError::PatternMismatch`] when the assignment is absent.
    pub fn patch_security_patch(&self, patch_level: &str) -> Result<()> {
        let path = self.file("BoardConfig.mk");
        let text = read_text(&path)?;

        let re = Regex::new(r"(VENDOR_SECURITY_PATCH := )[-0-9]+")
            .map_err(BlobupError::RegexError)?;
        let text = replace_required(&re, &text, &path, "VENDOR_SECURITY_PATCH :=", |caps| {
            format!("{}{patch_level}", &caps[1])
        })?;

        debug!(target: "patcher", "updating security patch level in {}", path.display());
        atomic_write(&path, &text)
    }
}

/// Apply a substitution that must match at least once.
fn replace_required(
    re: &Regex,
    text: &str,
    path: &Path,
    field: &str,
    rep: impl FnMut(&Captures<'_>) -> String,
) -> Result<String> {
    if !re.is_match(text) {
        return Err(BlobupError::PatternMismatch {
            field: field.to_string(),
            file: path.display().to_string(),
        }
        .into());
    }
    Ok(re.replace(text, rep).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VERSION_PATTERN: &str = r"OS[.0-9]+[VW][LMN][A-Z]+((CN)|(MI))XM";
    const OLD: &str = "OS1.0.2.0.VLMCNXM";
    const NEW: &str = "OS1.0.10.0.VLMCNXM";

    fn patcher(dir: &TempDir) -> DevicePatcher {
        DevicePatcher::new(dir.path(), Regex::new(VERSION_PATTERN).unwrap())
    }

    fn write_proprietary(dir: &TempDir) {
        std::fs::write(
            dir.path().join("proprietary-files.txt"),
            format!("# {OLD} blobs\nvendor/lib64/libfoo.so\n# firmware {OLD}\n"),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("proprietary-firmware.txt"),
            format!("abl.img|{OLD}\n"),
        )
        .unwrap();
    }

    #[test]
    fn test_current_version() {
        let dir = TempDir::new().unwrap();
        write_proprietary(&dir);
        assert_eq!(patcher(&dir).current_version().unwrap(), OLD);
    }

    #[test]
    fn test_current_version_missing_token() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("proprietary-files.txt"), "no token\n").unwrap();
        let err = patcher(&dir).current_version().unwrap_err();
        let err = err.downcast::<BlobupError>().unwrap();
        assert!(matches!(err, BlobupError::VersionTokenNotFound { .. }));
    }

    #[test]
    fn test_patch_version_first_only() {
        let dir = TempDir::new().unwrap();
        write_proprietary(&dir);
        patcher(&dir).patch_version_tokens(NEW, false).unwrap();

        let text = std::fs::read_to_string(dir.path().join("proprietary-files.txt")).unwrap();
        assert!(text.contains(NEW));
        // Only the first occurrence changes.
        assert!(text.contains(OLD));
    }

    #[test]
    fn test_patch_version_all() {
        let dir = TempDir::new().unwrap();
        write_proprietary(&dir);
        patcher(&dir).patch_version_tokens(NEW, true).unwrap();

        let text = std::fs::read_to_string(dir.path().join("proprietary-files.txt")).unwrap();
        assert!(!text.contains(OLD));
        assert_eq!(text.matches(NEW).count(), 2);
    }

    #[test]
    fn test_patch_version_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_proprietary(&dir);
        let p = patcher(&dir);
        p.patch_version_tokens(NEW, true).unwrap();
        let once = std::fs::read_to_string(dir.path().join("proprietary-files.txt")).unwrap();
        p.patch_version_tokens(NEW, true).unwrap();
        let twice = std::fs::read_to_string(dir.path().join("proprietary-files.txt")).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_patch_build_stamp() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("lineage_cupid.mk"),
            "PRODUCT_BUILD_PROP_OVERRIDES += \\\n    BuildFingerprint=old/old/old:1/A/B:user/keys \\\n    BuildDesc=\"old desc\"\n",
        )
        .unwrap();

        let stamp = BuildStamp {
            fingerprint: "Xiaomi/cupid/cupid:14/UKQ1/V816:user/release-keys".to_string(),
            description: "cupid-user 14 UKQ1 V816 release-keys".to_string(),
        };
        patcher(&dir).patch_build_stamp("cupid", &stamp).unwrap();

        let text = std::fs::read_to_string(dir.path().join("lineage_cupid.mk")).unwrap();
        assert!(text.contains("BuildFingerprint=Xiaomi/cupid/cupid:14/UKQ1/V816:user/release-keys"));
        assert!(text.contains("BuildDesc=\"cupid-user 14 UKQ1 V816 release-keys\""));
        assert!(!text.contains("old desc"));
    }

    #[test]
    fn test_patch_build_stamp_missing_field() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lineage_cupid.mk"), "# nothing here\n").unwrap();
        let stamp = BuildStamp {
            fingerprint: "b/n/d:r/i/inc:t/k".to_string(),
            description: "n-t r i inc k".to_string(),
        };
        let err = patcher(&dir).patch_build_stamp("cupid", &stamp).unwrap_err();
        let err = err.downcast::<BlobupError>().unwrap();
        assert!(matches!(err, BlobupError::PatternMismatch { .. }));
    }

    #[test]
    fn test_patch_security_patch() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("BoardConfig.mk"),
            "VENDOR_SECURITY_PATCH := 2024-01-01\n",
        )
        .unwrap();
        patcher(&dir).patch_security_patch("2024-07-01").unwrap();
        let text = std::fs::read_to_string(dir.path().join("BoardConfig.mk")).unwrap();
        assert_eq!(text, "VENDOR_SECURITY_PATCH := 2024-07-01\n");
    }

    #[test]
    fn test_patch_security_patch_missing_field() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("BoardConfig.mk"), "# empty\n").unwrap();
        let err = patcher(&dir).patch_security_patch("2024-07-01").unwrap_err();
        let err = err.downcast::<BlobupError>().unwrap();
        assert!(matches!(err, BlobupError::PatternMismatch { .. }));
    }
}
