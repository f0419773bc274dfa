//! Vulnerability scanner runner
//!
//! Wraps `trivy` in filesystem mode, strictly offline: the database
//! cache must already exist, update flags are forced off, and a missing
//! cache fails fast with a clear diagnostic instead of fetching.

use std::collections::BTreeMap;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    run_command, AnalyzerRunner, CommandSpec, RunnerContext, RunnerDiagnostics, RunnerReport,
    RunnerStatus, ToolCapabilities, ToolKind,
};
use crate::config::SecurityScorePolicy;
use crate::models::documents::{Severity, VulnerabilityFinding};

/// Normalized scan result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VulnScanReport {
    pub findings: Vec<VulnerabilityFinding>,
    pub severity_counts: BTreeMap<String, u64>,
    /// Scan targets reported by the tool (lock files, images, ...).
    pub targets: u64,
    pub security_score: f64,
}

impl VulnScanReport {
    pub fn from_findings(
        findings: Vec<VulnerabilityFinding>,
        targets: u64,
        policy: &SecurityScorePolicy,
    ) -> Self {
        let mut severity_counts: BTreeMap<String, u64> = BTreeMap::new();
        for finding in &findings {
            *severity_counts
                .entry(finding.severity.as_str().to_string())
                .or_default() += 1;
        }
        let security_score = security_score(&severity_counts, findings.len() as u64, targets, policy);
        Self { findings, severity_counts, targets, security_score }
    }
}

/// Piecewise penalty heuristic, preserved verbatim from the legacy
/// implementation and exposed as a configurable policy.
pub fn security_score(
    severity_counts: &BTreeMap<String, u64>,
    total_findings: u64,
    targets: u64,
    policy: &SecurityScorePolicy,
) -> f64 {
    let count = |label: &str| severity_counts.get(label).copied().unwrap_or(0) as f64;
    let density = total_findings as f64 / targets.max(1) as f64;

    let penalty = policy.critical_weight * count("Critical")
        + policy.high_weight * count("High")
        + policy.medium_weight * count("Medium")
        + policy.low_weight * count("Low")
        + policy.density_penalty * density;

    (100.0 - penalty).clamp(0.0, 100.0)
}

// Wire shapes for the scanner's JSON report.
#[derive(Debug, Deserialize)]
struct ScannerReport {
    #[serde(rename = "Results", default)]
    results: Vec<ScannerResult>,
}

#[derive(Debug, Deserialize)]
struct ScannerResult {
    #[serde(rename = "Vulnerabilities", default)]
    vulnerabilities: Vec<ScannerVulnerability>,
}

#[derive(Debug, Deserialize)]
struct ScannerVulnerability {
    #[serde(rename = "VulnerabilityID")]
    id: String,
    #[serde(rename = "PkgName", default)]
    package: String,
    #[serde(rename = "InstalledVersion", default)]
    installed_version: String,
    #[serde(rename = "FixedVersion", default)]
    fixed_version: String,
    #[serde(rename = "Severity", default)]
    severity: String,
    #[serde(rename = "Title", default)]
    title: String,
}

fn normalize(report: ScannerReport) -> (Vec<VulnerabilityFinding>, u64) {
    let targets = report.results.len() as u64;
    let findings = report
        .results
        .into_iter()
        .flat_map(|result| result.vulnerabilities)
        .map(|v| VulnerabilityFinding {
            id: v.id,
            package: v.package,
            installed_version: v.installed_version,
            fixed_version: v.fixed_version,
            severity: Severity::parse(&v.severity),
            title: v.title,
        })
        .collect();
    (findings, targets)
}

pub struct VulnScanRunner {
    policy: SecurityScorePolicy,
}

impl VulnScanRunner {
    pub fn new(policy: SecurityScorePolicy) -> Self {
        Self { policy }
    }
}

#[async_trait::async_trait]
impl AnalyzerRunner for VulnScanRunner {
    type Output = VulnScanReport;

    fn tool_kind(&self) -> ToolKind {
        ToolKind::VulnerabilityScanner
    }

    fn stage_name(&self) -> &'static str {
        "vulnerability"
    }

    async fn run(
        &self,
        ctx: &RunnerContext,
        capabilities: &ToolCapabilities,
    ) -> RunnerReport<Self::Output> {
        let Some(tool) = capabilities.path(self.tool_kind()) else {
            let reason = capabilities
                .absent_reason(self.tool_kind())
                .unwrap_or_else(|| "tool not found".to_string());
            return RunnerReport::not_applicable(&reason);
        };

        // Never fetch: an absent or empty cache is an immediate failure.
        let cache = match &capabilities.vulndb_cache {
            Some(dir) if dir_is_populated(dir) => dir.clone(),
            _ => {
                return RunnerReport {
                    status: RunnerStatus::Failed,
                    output: None,
                    error: Some("cache missing".to_string()),
                    duration: std::time::Duration::ZERO,
                };
            }
        };

        let spec = CommandSpec {
            program: tool.to_path_buf(),
            args: vec![
                "fs".to_string(),
                "--skip-db-update".to_string(),
                "--skip-java-db-update".to_string(),
                "--offline-scan".to_string(),
                "--cache-dir".to_string(),
                cache.display().to_string(),
                "--format".to_string(),
                "json".to_string(),
                "--quiet".to_string(),
                ctx.repo.display().to_string(),
            ],
            cwd: None,
            timeout: std::time::Duration::from_secs(ctx.timeouts.vulnerability_secs),
        };

        let outcome = match run_command(&spec, ctx.kill_grace()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return RunnerReport {
                    status: RunnerStatus::Failed,
                    output: None,
                    error: Some(e.to_string()),
                    duration: std::time::Duration::ZERO,
                };
            }
        };

        if let Err(e) = RunnerDiagnostics::from_outcome(&spec, &outcome).write(&ctx.output_dir, self.stage_name()) {
            debug!("could not write scanner diagnostics: {e}");
        }

        if outcome.timed_out {
            return RunnerReport {
                status: RunnerStatus::TimedOut,
                output: None,
                error: Some("vulnerability scanner timed out".to_string()),
                duration: outcome.duration,
            };
        }
        if !outcome.success() || outcome.stdout.is_empty() {
            return RunnerReport {
                status: RunnerStatus::Failed,
                output: None,
                error: Some(format!(
                    "vulnerability scanner exited with {:?}: {}",
                    outcome.exit_code,
                    gitscope_utils::text::tail(outcome.stderr_text().trim(), 256)
                )),
                duration: outcome.duration,
            };
        }

        let parsed = serde_json::from_slice::<ScannerReport>(&outcome.stdout)
            .context("failed to parse scanner output");
        match parsed {
            Ok(report) => {
                let (findings, targets) = normalize(report);
                debug!("scanner reported {} findings across {targets} targets", findings.len());
                RunnerReport {
                    status: RunnerStatus::Ok,
                    output: Some(VulnScanReport::from_findings(findings, targets, &self.policy)),
                    error: None,
                    duration: outcome.duration,
                }
            }
            Err(e) => RunnerReport {
                status: RunnerStatus::Failed,
                output: None,
                error: Some(format!("{e:#}")),
                duration: outcome.duration,
            },
        }
    }
}

fn dir_is_populated(dir: &std::path::Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Results": [
            {
                "Target": "package-lock.json",
                "Vulnerabilities": [
                    {
                        "VulnerabilityID": "CVE-2021-23337",
                        "PkgName": "lodash",
                        "InstalledVersion": "4.17.15",
                        "FixedVersion": "4.17.21",
                        "Severity": "HIGH",
                        "Title": "lodash: command injection via template"
                    },
                    {
                        "VulnerabilityID": "CVE-2020-8203",
                        "PkgName": "lodash",
                        "InstalledVersion": "4.17.15",
                        "Severity": "MEDIUM",
                        "Title": "lodash: prototype pollution"
                    }
                ]
            },
            { "Target": "Cargo.lock" }
        ]
    }"#;

    #[test]
    fn test_normalize_findings() {
        let report: ScannerReport = serde_json::from_str(SAMPLE).unwrap();
        let (findings, targets) = normalize(report);

        assert_eq!(targets, 2);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].id, "CVE-2021-23337");
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].fixed_version, "4.17.21");
        // FixedVersion absent means no fixed release yet.
        assert_eq!(findings[1].fixed_version, "");
    }

    #[test]
    fn test_security_score_penalties() {
        let policy = SecurityScorePolicy::default();
        let mut counts = BTreeMap::new();
        counts.insert("Critical".to_string(), 1);
        counts.insert("High".to_string(), 2);
        counts.insert("Medium".to_string(), 5);
        counts.insert("Low".to_string(), 10);

        // 2.0 + 2.0 + 1.0 + 0.5 severity penalty, 18 findings over 2
        // targets -> 45 density penalty.
        let score = security_score(&counts, 18, 2, &policy);
        assert!((score - (100.0 - 5.5 - 45.0)).abs() < 1e-9);
    }

    #[test]
    fn test_security_score_clamped() {
        let policy = SecurityScorePolicy::default();
        let mut counts = BTreeMap::new();
        counts.insert("Critical".to_string(), 100);
        assert_eq!(security_score(&counts, 100, 1, &policy), 0.0);
        assert_eq!(security_score(&BTreeMap::new(), 0, 0, &policy), 100.0);
    }

    #[tokio::test]
    async fn test_missing_cache_fails_fast() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RunnerContext {
            repo: tmp.path().to_path_buf(),
            output_dir: tmp.path().to_path_buf(),
            timeouts: crate::config::TimeoutConfig::default(),
        };
        // Tool "present" but no cache directory configured at all.
        let capabilities = ToolCapabilities::default()
            .with_tool(ToolKind::VulnerabilityScanner, tmp.path().join("trivy"));

        let runner = VulnScanRunner::new(SecurityScorePolicy::default());
        let report = runner.run(&ctx, &capabilities).await;
        assert_eq!(report.status, RunnerStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("cache missing"));
    }
}
