//! Translation of package records into publish requests.
//!
//! Only the minimum needed by the aggregation service leaves the process:
//! vulnerabilities carry an id, its type and a summary; the service enriches the
//! rest from its own database. Missing upstream data never fails translation, it
//! degrades to empty lists and zero values.

use tracing::warn;

use crate::error::SyncError;
use crate::models::{Ecosystem, PackageRecord, ProjectInfo, VulnerabilityInfo};
use crate::proto::{
    self, IssueStat, LicenseMeta, LicenseMetaList, Package, PackageManifest, PackageVersion,
    PackageVersionInsight, Project, ProjectInsight, ProjectSourceType,
    PublishPackageInsightRequest, ToolSession, Vulnerability, VulnerabilityIdentifier,
    VulnerabilityIdentifierType,
};

/// Maps a scanner ecosystem onto the wire ecosystem code.
pub fn ecosystem_code(ecosystem: Ecosystem) -> proto::Ecosystem {
    match ecosystem {
        Ecosystem::Npm => proto::Ecosystem::Npm,
        Ecosystem::PyPi => proto::Ecosystem::Pypi,
        Ecosystem::Maven => proto::Ecosystem::Maven,
        Ecosystem::Go => proto::Ecosystem::Go,
        Ecosystem::RubyGems => proto::Ecosystem::Rubygems,
        Ecosystem::Cargo => proto::Ecosystem::Cargo,
        Ecosystem::Packagist => proto::Ecosystem::Packagist,
        Ecosystem::NuGet => proto::Ecosystem::Nuget,
        Ecosystem::GitHubActions => proto::Ecosystem::GithubActions,
        Ecosystem::Unknown => proto::Ecosystem::Unspecified,
    }
}

/// Classifies a vulnerability identifier by its prefix.
pub fn vulnerability_id_type(id: &str) -> VulnerabilityIdentifierType {
    if id.starts_with("CVE-") {
        VulnerabilityIdentifierType::Cve
    } else if id.starts_with("OSV-") {
        VulnerabilityIdentifierType::Osv
    } else {
        VulnerabilityIdentifierType::Unspecified
    }
}

/// Classifies a project hosting platform by name.
pub fn project_source_type(kind: &str) -> ProjectSourceType {
    match kind {
        "GITHUB" => ProjectSourceType::Github,
        "GITLAB" => ProjectSourceType::Gitlab,
        _ => ProjectSourceType::Unspecified,
    }
}

/// Builds the publish request for `record` within session `session_id`.
pub fn translate(session_id: &str, record: &PackageRecord) -> PublishPackageInsightRequest {
    let ecosystem = ecosystem_code(record.manifest.ecosystem) as i32;
    let insights = record.insights.clone().unwrap_or_default();

    PublishPackageInsightRequest {
        tool_session: Some(ToolSession { tool_session_id: session_id.to_string() }),
        manifest: Some(PackageManifest {
            ecosystem,
            namespace: Some(record.manifest.path.clone()),
            name: record.manifest.display_path().to_string(),
        }),
        package_version: Some(package_version(ecosystem, &record.name, &record.version)),
        package_version_insight: Some(PackageVersionInsight {
            dependencies: dependencies(record, ecosystem),
            vulnerabilities: insights.vulnerabilities.unwrap_or_default().iter().map(vulnerability).collect(),
            project_insights: insights.projects.unwrap_or_default().iter().map(project_insight).collect(),
            licenses: Some(LicenseMetaList {
                licenses: insights
                    .licenses
                    .unwrap_or_default()
                    .into_iter()
                    .map(|license| LicenseMeta { license_id: license.clone(), name: license })
                    .collect(),
            }),
        }),
    }
}

fn package_version(ecosystem: i32, name: &str, version: &str) -> PackageVersion {
    PackageVersion {
        package: Some(Package { ecosystem, name: name.to_string() }),
        version: version.to_string(),
    }
}

fn dependencies(record: &PackageRecord, ecosystem: i32) -> Vec<PackageVersion> {
    match record.dependencies() {
        Ok(children) => {
            children.iter().map(|child| package_version(ecosystem, &child.name, &child.version)).collect()
        }
        Err(err) => {
            let degraded = SyncError::TranslationDegraded {
                package: record.coordinates(),
                reason: err.to_string(),
            };
            warn!(error = %degraded, "Publishing without dependencies");
            Vec::new()
        }
    }
}

fn vulnerability(info: &VulnerabilityInfo) -> Vulnerability {
    let id = info.id.clone().unwrap_or_default();
    Vulnerability {
        id: Some(VulnerabilityIdentifier { r#type: vulnerability_id_type(&id) as i32, value: id }),
        summary: info.summary.clone().unwrap_or_default(),
    }
}

fn project_insight(info: &ProjectInfo) -> ProjectInsight {
    ProjectInsight {
        project: Some(Project {
            r#type: project_source_type(info.kind.as_deref().unwrap_or_default()) as i32,
            name: info.name.clone().unwrap_or_default(),
            url: info.link.clone().unwrap_or_default(),
        }),
        stars: Some(info.stars.unwrap_or_default()),
        forks: Some(info.forks.unwrap_or_default()),
        issues: Some(IssueStat { total: info.issues.unwrap_or_default() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ManifestRef, PackageInsights, PackageRef};
    use std::sync::Arc;

    fn manifest() -> Arc<ManifestRef> {
        Arc::new(ManifestRef {
            ecosystem: Ecosystem::Npm,
            path: "/work/app/package-lock.json".to_string(),
            display_path: Some("app/package-lock.json".to_string()),
        })
    }

    #[test]
    fn test_vulnerability_id_classification() {
        assert_eq!(vulnerability_id_type("CVE-1234-5678"), VulnerabilityIdentifierType::Cve);
        assert_eq!(vulnerability_id_type("OSV-2021-123"), VulnerabilityIdentifierType::Osv);
        assert_eq!(vulnerability_id_type("GHSA-xxxx"), VulnerabilityIdentifierType::Unspecified);
        assert_eq!(vulnerability_id_type("cve-1234-5678"), VulnerabilityIdentifierType::Unspecified);
    }

    #[test]
    fn test_identity_fields() {
        let record = PackageRecord::new(manifest(), "express", "4.18.2");
        let request = translate("session-1", &record);

        assert_eq!(request.tool_session.unwrap().tool_session_id, "session-1");

        let manifest = request.manifest.unwrap();
        assert_eq!(manifest.ecosystem(), proto::Ecosystem::Npm);
        assert_eq!(manifest.namespace.as_deref(), Some("/work/app/package-lock.json"));
        assert_eq!(manifest.name, "app/package-lock.json");

        let version = request.package_version.unwrap();
        assert_eq!(version.version, "4.18.2");
        assert_eq!(version.package.unwrap().name, "express");
    }

    #[test]
    fn test_absent_insights_produce_empty_lists() {
        let record = PackageRecord::new(manifest(), "express", "4.18.2");
        let insight = translate("s", &record).package_version_insight.unwrap();

        assert!(insight.dependencies.is_empty());
        assert!(insight.vulnerabilities.is_empty());
        assert!(insight.project_insights.is_empty());
        assert!(insight.licenses.unwrap().licenses.is_empty());
    }

    #[test]
    fn test_present_but_empty_insights_produce_empty_lists() {
        let record = PackageRecord::new(manifest(), "express", "4.18.2").with_insights(PackageInsights {
            vulnerabilities: None,
            projects: Some(Vec::new()),
            licenses: None,
        });
        let insight = translate("s", &record).package_version_insight.unwrap();
        assert!(insight.vulnerabilities.is_empty());
        assert!(insight.project_insights.is_empty());
    }

    #[test]
    fn test_vulnerabilities_are_minimized() {
        let record = PackageRecord::new(manifest(), "lodash", "4.17.20").with_insights(PackageInsights {
            vulnerabilities: Some(vec![
                VulnerabilityInfo {
                    id: Some("GHSA-xxxx".to_string()),
                    summary: Some("Command injection".to_string()),
                    severity: Some("HIGH".to_string()),
                },
                VulnerabilityInfo::default(),
            ]),
            ..Default::default()
        });
        let vulnerabilities = translate("s", &record).package_version_insight.unwrap().vulnerabilities;

        assert_eq!(vulnerabilities.len(), 2);
        let first = vulnerabilities[0].id.as_ref().unwrap();
        assert_eq!(first.value, "GHSA-xxxx");
        assert_eq!(first.r#type(), VulnerabilityIdentifierType::Unspecified);
        assert_eq!(vulnerabilities[0].summary, "Command injection");

        assert_eq!(vulnerabilities[1].id.as_ref().unwrap().value, "");
        assert_eq!(vulnerabilities[1].summary, "");
    }

    #[test]
    fn test_project_insights_default_missing_counts_to_zero() {
        let record = PackageRecord::new(manifest(), "express", "4.18.2").with_insights(PackageInsights {
            projects: Some(vec![
                ProjectInfo {
                    kind: Some("GITHUB".to_string()),
                    name: Some("expressjs/express".to_string()),
                    link: Some("https://github.com/expressjs/express".to_string()),
                    stars: Some(42),
                    forks: None,
                    issues: Some(7),
                },
                ProjectInfo { kind: Some("BITBUCKET".to_string()), ..Default::default() },
            ]),
            ..Default::default()
        });
        let projects = translate("s", &record).package_version_insight.unwrap().project_insights;

        let github = &projects[0];
        assert_eq!(github.project.as_ref().unwrap().r#type(), ProjectSourceType::Github);
        assert_eq!(github.project.as_ref().unwrap().url, "https://github.com/expressjs/express");
        assert_eq!(github.stars, Some(42));
        assert_eq!(github.forks, Some(0));
        assert_eq!(github.issues.as_ref().unwrap().total, 7);

        let other = &projects[1];
        assert_eq!(other.project.as_ref().unwrap().r#type(), ProjectSourceType::Unspecified);
        assert_eq!(other.stars, Some(0));
        assert_eq!(other.issues.as_ref().unwrap().total, 0);
    }

    #[test]
    fn test_licenses_use_token_for_id_and_name() {
        let record = PackageRecord::new(manifest(), "express", "4.18.2").with_insights(PackageInsights {
            licenses: Some(vec!["MIT".to_string(), "Apache-2.0".to_string()]),
            ..Default::default()
        });
        let licenses = translate("s", &record).package_version_insight.unwrap().licenses.unwrap().licenses;

        assert_eq!(licenses.len(), 2);
        assert_eq!(licenses[0].license_id, "MIT");
        assert_eq!(licenses[0].name, "MIT");
        assert_eq!(licenses[1].license_id, "Apache-2.0");
    }

    #[test]
    fn test_dependencies_carry_manifest_ecosystem() {
        let record = PackageRecord::new(manifest(), "express", "4.18.2").with_dependencies(vec![
            PackageRef { name: "qs".to_string(), version: "6.11.0".to_string() },
            PackageRef { name: "debug".to_string(), version: "2.6.9".to_string() },
        ]);
        let dependencies = translate("s", &record).package_version_insight.unwrap().dependencies;

        assert_eq!(dependencies.len(), 2);
        assert_eq!(dependencies[0].version, "6.11.0");
        assert_eq!(dependencies[1].package.as_ref().unwrap().ecosystem(), proto::Ecosystem::Npm);
    }

    #[test]
    fn test_unknown_ecosystem_maps_to_unspecified() {
        assert_eq!(ecosystem_code(Ecosystem::Unknown), proto::Ecosystem::Unspecified);
        assert_eq!(ecosystem_code(Ecosystem::Cargo), proto::Ecosystem::Cargo);
    }
}
