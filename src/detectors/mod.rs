//! Interfaces to the external metadata detectors.
//!
//! Package-manager, license and version detection are heuristic concerns
//! that live outside this crate; the orchestrator only consumes their
//! ranked results. Each trait returns candidates ordered best-first, and
//! the orchestrator takes the highest-confidence (first) entry.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// One detected package-manager context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageManagerInfo {
    pub name: String,
    pub version: String,
    pub manifest_file: String,
    pub lock_file: String,
    pub packages: Vec<String>,
}

/// One detected license, ranked by confidence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LicenseInfo {
    pub name: String,
    pub spdx_id: String,
    pub file_path: String,
    pub confidence: f64,
    pub copyright: String,
    pub author: String,
}

/// One detected version, ranked by confidence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionInfo {
    pub full_version: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub prerelease: String,
    pub build: String,
    pub source: String,
    pub confidence: f64,
    pub commit_hash: String,
    pub branch: String,
    pub tag: String,
}

pub trait PackageManagerDetector: Send + Sync {
    /// Detect package managers governing `dir`, best match first.
    fn detect(&self, dir: &Path) -> Vec<PackageManagerInfo>;
}

pub trait LicenseDetector: Send + Sync {
    /// Detect licenses applying to `dir`, ranked by confidence.
    fn detect(&self, dir: &Path) -> Vec<LicenseInfo>;
}

pub trait VersionDetector: Send + Sync {
    /// Detect version information for `dir`, ranked by confidence.
    fn detect(&self, dir: &Path) -> Vec<VersionInfo>;
}
