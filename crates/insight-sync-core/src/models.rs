//! Package records consumed from the scanning engine.
//!
//! The scanner owns these types; the pipeline only reads them. A [`Manifest`]
//! document can be deserialized from JSON and decomposed into [`PackageRecord`]s
//! through the [`PackageSource`] trait.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Source ecosystem of a manifest as reported by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ecosystem {
    #[serde(rename = "npm")]
    Npm,
    #[serde(rename = "PyPI")]
    PyPi,
    #[serde(rename = "Maven")]
    Maven,
    #[serde(rename = "Go")]
    Go,
    #[serde(rename = "RubyGems")]
    RubyGems,
    #[serde(rename = "crates.io")]
    Cargo,
    #[serde(rename = "Packagist")]
    Packagist,
    #[serde(rename = "NuGet")]
    NuGet,
    #[serde(rename = "GitHubActions")]
    GitHubActions,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Npm => "npm",
            Self::PyPi => "PyPI",
            Self::Maven => "Maven",
            Self::Go => "Go",
            Self::RubyGems => "RubyGems",
            Self::Cargo => "crates.io",
            Self::Packagist => "Packagist",
            Self::NuGet => "NuGet",
            Self::GitHubActions => "GitHubActions",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Identity of the manifest a package was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRef {
    /// Ecosystem of the manifest.
    pub ecosystem: Ecosystem,
    /// Path of the manifest; also the routing key for per-manifest sessions.
    pub path: String,
    /// Human-readable path, if it differs from `path`.
    pub display_path: Option<String>,
}

impl ManifestRef {
    /// Returns the display path, falling back to the raw path.
    pub fn display_path(&self) -> &str {
        self.display_path.as_deref().unwrap_or(&self.path)
    }
}

/// A dependency edge target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    pub version: String,
}

/// A known vulnerability affecting a package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

/// Upstream source project signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub stars: Option<i64>,
    #[serde(default)]
    pub forks: Option<i64>,
    #[serde(default)]
    pub issues: Option<i64>,
}

/// Enrichment data attached to a package by the analysis engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageInsights {
    #[serde(default)]
    pub vulnerabilities: Option<Vec<VulnerabilityInfo>>,
    #[serde(default)]
    pub projects: Option<Vec<ProjectInfo>>,
    #[serde(default)]
    pub licenses: Option<Vec<String>>,
}

/// A single analyzed package, as handed to the reporter.
#[derive(Debug, Clone)]
pub struct PackageRecord {
    pub manifest: Arc<ManifestRef>,
    pub name: String,
    pub version: String,
    /// `None` when the scanner could not compute the dependency list.
    pub dependencies: Option<Vec<PackageRef>>,
    pub insights: Option<PackageInsights>,
}

impl PackageRecord {
    /// Creates a record with no dependency or insight data.
    pub fn new(manifest: Arc<ManifestRef>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { manifest, name: name.into(), version: version.into(), dependencies: None, insights: None }
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<PackageRef>) -> Self {
        self.dependencies = Some(dependencies);
        self
    }

    #[must_use]
    pub fn with_insights(mut self, insights: PackageInsights) -> Self {
        self.insights = Some(insights);
        self
    }

    /// Direct dependencies of this package.
    ///
    /// # Errors
    /// Returns `DependenciesUnavailable` when the scanner produced no dependency graph.
    pub fn dependencies(&self) -> Result<&[PackageRef]> {
        self.dependencies
            .as_deref()
            .ok_or_else(|| SyncError::DependenciesUnavailable(self.manifest.path.clone()))
    }

    /// The `ecosystem/name/version` triple used in log lines.
    pub fn coordinates(&self) -> String {
        format!("{}/{}/{}", self.manifest.ecosystem, self.name, self.version)
    }
}

/// Producer side of the pipeline: something that can be decomposed into package records.
pub trait PackageSource: Send + Sync {
    /// Identity of the manifest being enumerated.
    fn manifest(&self) -> Arc<ManifestRef>;

    /// Enumerates the packages of the manifest. A failed entry does not stop enumeration.
    fn records(&self) -> Vec<Result<PackageRecord>>;
}

/// A package entry in a manifest document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestPackage {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub insights: Option<PackageInsights>,
}

/// A scanned manifest document, as exported by the scanner in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub ecosystem: Ecosystem,
    pub path: String,
    #[serde(default)]
    pub display_path: Option<String>,
    #[serde(default)]
    pub packages: Vec<ManifestPackage>,
    /// Adjacency list keyed by `name@version`.
    #[serde(default)]
    pub dependency_graph: Option<HashMap<String, Vec<PackageRef>>>,
}

impl Manifest {
    /// Parses a manifest document from JSON.
    ///
    /// # Errors
    /// Returns a JSON error if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn graph_key(name: &str, version: &str) -> String {
        format!("{name}@{version}")
    }
}

impl PackageSource for Manifest {
    fn manifest(&self) -> Arc<ManifestRef> {
        Arc::new(ManifestRef {
            ecosystem: self.ecosystem,
            path: self.path.clone(),
            display_path: self.display_path.clone(),
        })
    }

    fn records(&self) -> Vec<Result<PackageRecord>> {
        let manifest = self.manifest();
        self.packages
            .iter()
            .enumerate()
            .map(|(index, package)| {
                if package.name.trim().is_empty() {
                    return Err(SyncError::InvalidPackage {
                        manifest: self.path.clone(),
                        reason: format!("package #{index} has an empty name"),
                    });
                }

                let dependencies = self.dependency_graph.as_ref().map(|graph| {
                    graph
                        .get(&Self::graph_key(&package.name, &package.version))
                        .cloned()
                        .unwrap_or_default()
                });

                Ok(PackageRecord {
                    manifest: Arc::clone(&manifest),
                    name: package.name.clone(),
                    version: package.version.clone(),
                    dependencies,
                    insights: package.insights.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST_JSON: &str = r#"{
        "ecosystem": "npm",
        "path": "/src/app/package-lock.json",
        "display_path": "app/package-lock.json",
        "packages": [
            {"name": "express", "version": "4.18.2"},
            {"name": "", "version": "1.0.0"},
            {"name": "qs", "version": "6.11.0", "insights": {"licenses": ["BSD-3-Clause"]}}
        ],
        "dependency_graph": {
            "express@4.18.2": [{"name": "qs", "version": "6.11.0"}]
        }
    }"#;

    #[test]
    fn test_manifest_from_json() {
        let manifest = Manifest::from_json(MANIFEST_JSON).unwrap();
        assert_eq!(manifest.ecosystem, Ecosystem::Npm);
        assert_eq!(manifest.packages.len(), 3);
        assert_eq!(manifest.manifest().display_path(), "app/package-lock.json");
    }

    #[test]
    fn test_records_skip_nothing_and_report_invalid_entries() {
        let manifest = Manifest::from_json(MANIFEST_JSON).unwrap();
        let records = manifest.records();
        assert_eq!(records.len(), 3);
        assert!(records[0].is_ok());
        assert!(matches!(records[1], Err(SyncError::InvalidPackage { .. })));
        assert!(records[2].is_ok());
    }

    #[test]
    fn test_dependencies_resolved_from_graph() {
        let manifest = Manifest::from_json(MANIFEST_JSON).unwrap();
        let records = manifest.records();
        let express = records[0].as_ref().unwrap();
        assert_eq!(express.dependencies().unwrap().len(), 1);

        let qs = records[2].as_ref().unwrap();
        assert!(qs.dependencies().unwrap().is_empty());
    }

    #[test]
    fn test_dependencies_unavailable_without_graph() {
        let manifest_ref = Arc::new(ManifestRef {
            ecosystem: Ecosystem::PyPi,
            path: "requirements.txt".to_string(),
            display_path: None,
        });
        let record = PackageRecord::new(manifest_ref, "requests", "2.31.0");
        assert!(matches!(record.dependencies(), Err(SyncError::DependenciesUnavailable(_))));
        assert_eq!(record.coordinates(), "PyPI/requests/2.31.0");
    }

    #[test]
    fn test_unknown_ecosystem_deserializes() {
        let manifest = Manifest::from_json(r#"{"ecosystem": "Hex", "path": "mix.lock"}"#).unwrap();
        assert_eq!(manifest.ecosystem, Ecosystem::Unknown);
        assert!(manifest.packages.is_empty());
    }
}
