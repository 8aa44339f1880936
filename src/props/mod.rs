//! Build properties and fingerprint derivation.
//!
//! An extracted dump carries several `build.prop` files; the values the
//! patcher needs are assembled by overlaying up to three of them, later files
//! overriding earlier ones on key collision. From the overlay (or from the
//! release metadata's `post-build=` field) the build fingerprint and build
//! description are derived:
//!
//! ```text
//! fingerprint: brand/name/device:release/id/incremental:type/tags
//! description: name-type release id incremental tags
//! ```
//!
//! The two derivations are alternate strategies, not rivals: they produce
//! byte-identical strings whenever the dump is self-consistent.

use crate::core::BlobupError;
use crate::utils::fs::read_text;
use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Layered build-property map.
#[derive(Debug, Default)]
pub struct PropertyMap {
    values: HashMap<String, String>,
}

impl PropertyMap {
    /// Overlay property files, in priority order from low to high.
    ///
    /// Files that do not exist are skipped. Blank lines, `#` comments, and
    /// `import` directives are ignored; everything else must be `key=value`.
    ///
    /// # Errors
    ///
    /// Fails only when an existing file cannot be read.
    pub fn load_layered<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut map = Self::default();
        for path in paths {
            let path = path.as_ref();
            if !path.is_file() {
                continue;
            }
            debug!(target: "props", "overlaying {}", path.display());
            map.merge_text(&read_text(path)?);
        }
        Ok(map)
    }

    /// Merge `key=value` lines into the map, overriding existing keys.
    pub fn merge_text(&mut self, text: &str) {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("import") {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                self.values.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }

    /// Look up a property, failing when it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`BlobupError::PropertyKeyMissing`] for an absent key.
    pub fn get(&self, key: &str) -> Result<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| {
                BlobupError::PropertyKeyMissing {
                    key: key.to_string(),
                }
                .into()
            })
    }

    /// Look up a property without failing.
    #[must_use]
    pub fn try_get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the map holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Build fingerprint and description for a firmware build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStamp {
    /// `brand/name/device:release/id/incremental:type/tags`
    pub fingerprint: String,
    /// `name-type release id incremental tags`
    pub description: String,
}

/// Assemble a stamp from the build-property overlay.
///
/// # Errors
///
/// Returns [`BlobupError::PropertyKeyMissing`] when any of the eight keys is
/// absent.
pub fn stamp_from_props(props: &PropertyMap) -> Result<BuildStamp> {
    let brand = props.get("ro.product.vendor.brand")?;
    let name = props.get("ro.product.vendor.name")?;
    let device = props.get("ro.product.vendor.device")?;
    let release = props.get("ro.product.build.version.release")?;
    let id = props.get("ro.product.build.id")?;
    let incremental = props.get("ro.product.build.version.incremental")?;
    let build_type = props.get("ro.product.build.type")?;
    let tags = props.get("ro.product.build.tags")?;

    Ok(BuildStamp {
        fingerprint: format!(
            "{brand}/{name}/{device}:{release}/{id}/{incremental}:{build_type}/{tags}"
        ),
        description: format!("{name}-{build_type} {release} {id} {incremental} {tags}"),
    })
}

/// Parse the `post-build=` fingerprint out of release metadata text.
#[must_use]
pub fn parse_post_build(text: &str) -> Option<&str> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("post-build="))
        .map(str::trim)
        .find(|value| !value.is_empty())
}

/// Re-derive the build description from a fingerprint alone.
///
/// The fingerprint is split on `:` and `/`; the description rearranges the
/// same eight fields.
///
/// # Errors
///
/// Returns [`BlobupError::PatternMismatch`] when the string does not have
/// fingerprint shape.
pub fn derive_description(fingerprint: &str) -> Result<String> {
    let malformed = || BlobupError::MalformedFingerprint {
        fingerprint: fingerprint.to_string(),
    };

    let mut sections = fingerprint.split(':');
    let product = sections.next().ok_or_else(malformed)?;
    let build = sections.next().ok_or_else(malformed)?;
    let variant = sections.next().ok_or_else(malformed)?;
    if sections.next().is_some() {
        return Err(malformed().into());
    }

    let [_brand, name, _device] = split_exact::<3>(product).ok_or_else(malformed)?;
    let [release, id, incremental] = split_exact::<3>(build).ok_or_else(malformed)?;
    let [build_type, tags] = split_exact::<2>(variant).ok_or_else(malformed)?;

    Ok(format!("{name}-{build_type} {release} {id} {incremental} {tags}"))
}

fn split_exact<const N: usize>(section: &str) -> Option<[&str; N]> {
    let parts: Vec<&str> = section.split('/').collect();
    <[&str; N]>::try_from(parts).ok()
}

/// Load a stamp from a release metadata file via its `post-build=` field.
///
/// # Errors
///
/// Returns [`BlobupError::PatternMismatch`] when the field is absent or the
/// fingerprint is malformed.
pub fn stamp_from_release_metadata(metadata_path: &Path) -> Result<BuildStamp> {
    let text = read_text(metadata_path)?;
    let fingerprint = parse_post_build(&text).ok_or_else(|| BlobupError::PatternMismatch {
        field: "post-build=".to_string(),
        file: metadata_path.display().to_string(),
    })?;
    Ok(BuildStamp {
        fingerprint: fingerprint.to_string(),
        description: derive_description(fingerprint)?,
    })
}

/// Scrape the vendor security patch level out of a vendor `build.prop`.
///
/// # Errors
///
/// Returns [`BlobupError::PatternMismatch`] when the property is absent.
pub fn security_patch_level(vendor_prop_path: &Path) -> Result<String> {
    let text = read_text(vendor_prop_path)?;
    let re = Regex::new(r"ro\.vendor\.build\.security_patch=([-0-9]+)")
        .map_err(BlobupError::RegexError)?;
    re.captures(&text)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| {
            BlobupError::PatternMismatch {
                field: "ro.vendor.build.security_patch".to_string(),
                file: vendor_prop_path.display().to_string(),
            }
            .into()
        })
}
