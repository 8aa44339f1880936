//! blobup - release automation for Android device support trees.
//!
//! For each configured device, blobup checks a vendor firmware feed for the
//! latest release, downloads the recovery image into an on-disk archive,
//! invokes the extraction tooling to pull proprietary blobs out of it,
//! patches the device tree's text manifests and build configuration with
//! values scraped from the extracted build properties, commits the changes
//! to the device and vendor trees, and pushes the device tree for review.
//!
//! # Architecture Overview
//!
//! The pipeline is a flat, single-pass loop over the device registry with no
//! concurrency and no shared state across iterations. The interesting parts
//! are bookkeeping: version-string comparison, layered property overlays,
//! and targeted regular-expression rewrites of a fixed set of files. All
//! heavy lifting is delegated to external collaborators - the firmware feed,
//! the mirror, the extraction tooling, and the system git binary.
//!
//! # Core Modules
//!
//! - [`cli`] - command-line interface (`update`, `check`, `list`, `init`)
//! - [`config`] - TOML configuration and the device registry
//! - [`core`] - error types and user-facing error rendering
//! - [`workflow`] - the per-device state machine
//!
//! ## Pipeline Stages
//!
//! - [`feed`] - channel metadata fetch and latest-version resolution
//! - [`version`] - numeric-run ordering of vendor version strings
//! - [`archive`] - image download cache and the latest-dump symlink
//! - [`extract`] - checked invocation of the extraction tooling
//! - [`props`] - build-property overlay and fingerprint derivation
//! - [`patcher`] - regex rewrites of the device manifests
//! - [`git`] - dirty checks, commits, and review pushes via system git
//!
//! ## Supporting Modules
//!
//! - [`utils`] - file system helpers, platform lookup, progress bars
//!
//! # Configuration
//!
//! Everything the workflow needs - tree roots, URL templates, the review
//! endpoint, and the device registry - comes from one TOML file:
//!
//! ```toml
//! android_root = "~/android/lineage-23"
//! vendor_root = "~/android/vendor/sm8450"
//!
//! [review]
//! url = "ssh://{user}@review.lineageos.org:29418/LineageOS/{repo}"
//! user = "alice"
//! branch = "lineage-23.0"
//!
//! [feed]
//! metadata_url = "https://example.com/devices/{codename}.json"
//! mirror_url = "https://mirror.example.com/{version}/{file}"
//! version_pattern = 'OS[.0-9]+[VW][LMN][A-Z]+((CN)|(MI))XM'
//!
//! [[devices]]
//! codename = "cupid"
//! channel = "Xiaomi HyperOS Global Stable"
//! ```
//!
//! # Command-Line Usage
//!
//! ```bash
//! # Write a template configuration
//! blobup init
//!
//! # See what is out of date
//! blobup check
//!
//! # Update everything, or just one device
//! blobup update
//! blobup update cupid
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod core;
pub mod extract;
pub mod feed;
pub mod git;
pub mod patcher;
pub mod props;
pub mod utils;
pub mod version;
pub mod workflow;
