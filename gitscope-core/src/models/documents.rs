//! Output document schemas
//!
//! One tagged shape per document; schema evolution is explicit through
//! `schema_version`. All documents serialize with deterministic key
//! order (`BTreeMap` throughout) so reruns are byte-identical modulo
//! `generated_at`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Current schema version for every document shape.
pub const SCHEMA_VERSION: u32 = 1;

/// Header fields shared by every JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub schema_version: u32,
    /// UTC, ISO-8601.
    pub generated_at: String,
    /// Repository short name; `combined` for the aggregated view.
    pub repository: String,
}

impl DocumentMeta {
    pub fn new(repository: &str, generated_at: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: generated_at.to_string(),
            repository: repository.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// commit_analysis.json

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopFile {
    pub path: String,
    pub revisions: u64,
    pub churn: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitAnalysisDoc {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub total_commits: u64,
    pub commits_by_month: BTreeMap<String, u64>,
    pub commits_by_year: BTreeMap<String, u64>,
    /// Category → count over the classification universe.
    pub classification: BTreeMap<String, u64>,
    pub top_files: Vec<TopFile>,
}

// ---------------------------------------------------------------------------
// developer_contributions.json

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeveloperContribution {
    pub name: String,
    pub email: String,
    pub commits: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub files_touched: u64,
    pub first_commit: String,
    pub last_commit: String,
    pub region: String,
    /// Classification category → count for this developer.
    pub categories: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeveloperContributionsDoc {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub total_developers: u64,
    pub developers: Vec<DeveloperContribution>,
}

// ---------------------------------------------------------------------------
// technology_stack.json

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnologyDetail {
    pub files: u64,
    pub lines: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyStackDoc {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    /// Tag → file count.
    pub overall_technology_usage: BTreeMap<String, u64>,
    pub technology_details: BTreeMap<String, TechnologyDetail>,
    /// Category → (tag → file count).
    pub technology_by_category: BTreeMap<String, BTreeMap<String, u64>>,
}

// ---------------------------------------------------------------------------
// regional_analysis.json

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalAnalysisDoc {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub regions: BTreeMap<String, super::aggregates::RegionStats>,
}

// ---------------------------------------------------------------------------
// module_ownership.json

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleOwnership {
    /// Author (display name) with the highest churn in the module.
    pub owner: String,
    pub authors: Vec<String>,
    pub revisions: u64,
    pub churn: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleOwnershipDoc {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub modules: BTreeMap<String, ModuleOwnership>,
}

// ---------------------------------------------------------------------------
// overall_summary.json

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallSummaryDoc {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub total_commits: u64,
    pub total_developers: u64,
    pub total_files: u64,
    pub total_lines_added: u64,
    pub total_lines_deleted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
    /// Derived from the data endpoints; absent when no commit dates exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_years: Option<u32>,
    pub classification: BTreeMap<String, u64>,
    /// Tag → file count, most used first when rendered.
    pub technologies: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_score: Option<f64>,
}

// ---------------------------------------------------------------------------
// developer_rankings.json

/// Raw per-developer metric vector, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetrics {
    pub commits: u64,
    pub churn: u64,
    pub hotspot_score: f64,
    pub hotspot_files: u64,
    pub ownership: f64,
    pub complexity: f64,
    pub communication: f64,
    pub recency: f64,
    pub fragmentation: f64,
    pub coupling: f64,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    /// 1-origin position after the total-order sort.
    pub rank: u64,
    /// Display name.
    pub developer: String,
    /// Lowercased email join key.
    pub email: String,
    pub weighted_score: f64,
    pub metrics: RawMetrics,
    /// Dimension → normalized score in [0,100].
    pub normalized_scores: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeveloperRankingsDoc {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub weights: BTreeMap<String, f64>,
    pub total_developers: u64,
    pub rankings: Vec<RankingEntry>,
}

// ---------------------------------------------------------------------------
// vulnerabilities.json

/// Normalized vulnerability severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "CRITICAL" => Severity::Critical,
            "HIGH" => Severity::High,
            "MEDIUM" | "MODERATE" => Severity::Medium,
            "LOW" => Severity::Low,
            _ => Severity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
            Severity::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityFinding {
    /// Stable identifier, usually a CVE label.
    pub id: String,
    pub package: String,
    pub installed_version: String,
    /// Empty when no fixed release exists.
    #[serde(default)]
    pub fixed_version: String,
    pub severity: Severity,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilitiesDoc {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub total_findings: u64,
    /// Severity label → count.
    pub severity_counts: BTreeMap<String, u64>,
    pub security_score: f64,
    pub findings: Vec<VulnerabilityFinding>,
}

// ---------------------------------------------------------------------------
// complexity.json

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityDistribution {
    /// CCN <= 5
    pub low: u64,
    /// CCN 6-10
    pub medium: u64,
    /// CCN 11-20
    pub high: u64,
    /// CCN > 20
    pub very_high: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexitySummary {
    pub total_functions: u64,
    pub total_complexity: u64,
    pub average_complexity: f64,
    pub max_complexity: u64,
    pub distribution: ComplexityDistribution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionComplexity {
    pub name: String,
    pub file: String,
    pub line: u64,
    pub ccn: u64,
    pub nloc: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityDoc {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub summary: ComplexitySummary,
    /// File → summed CCN, used by the ranking join.
    pub files: BTreeMap<String, u64>,
    /// Per-function detail, persisted verbatim.
    pub functions: Vec<FunctionComplexity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse_covers_aliases() {
        assert_eq!(Severity::parse("critical"), Severity::Critical);
        assert_eq!(Severity::parse("MODERATE"), Severity::Medium);
        assert_eq!(Severity::parse("nonsense"), Severity::Unknown);
        assert_eq!(Severity::parse(""), Severity::Unknown);
    }

    #[test]
    fn test_meta_flattens_into_document() {
        let doc = RegionalAnalysisDoc {
            meta: DocumentMeta::new("demo", "2024-01-01T00:00:00Z"),
            regions: BTreeMap::new(),
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["schema_version"], 1);
        assert_eq!(value["repository"], "demo");
        assert!(value.get("meta").is_none());
    }

    #[test]
    fn test_active_years_omitted_when_absent() {
        let doc = OverallSummaryDoc {
            meta: DocumentMeta::new("demo", "2024-01-01T00:00:00Z"),
            total_commits: 0,
            total_developers: 0,
            total_files: 0,
            total_lines_added: 0,
            total_lines_deleted: 0,
            first_commit: None,
            last_commit: None,
            active_years: None,
            classification: BTreeMap::new(),
            technologies: BTreeMap::new(),
            security_score: None,
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("active_years").is_none());
        assert!(value.get("first_commit").is_none());
    }
}
