//! Run configuration
//!
//! One `AnalysisConfig` value is built by the CLI (flags merged over an
//! optional TOML file) and passed into the pipeline controller. Stages
//! receive it through the pipeline context; nothing reads ambient state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

/// Selectable analyzer stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolSelection {
    /// In-process history analysis, classification and ranking
    Internal,
    /// Code counter (per-language line counts)
    TechStack,
    /// Complexity analyzer
    CodeQuality,
    /// Vulnerability scanner (offline cache only)
    Vulnerability,
    /// Evolution analyzer
    Evolution,
    /// Everything above
    All,
}

impl std::str::FromStr for ToolSelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "internal" => Ok(ToolSelection::Internal),
            "tech-stack" => Ok(ToolSelection::TechStack),
            "code-quality" => Ok(ToolSelection::CodeQuality),
            "vulnerability" => Ok(ToolSelection::Vulnerability),
            "evolution" => Ok(ToolSelection::Evolution),
            "all" => Ok(ToolSelection::All),
            other => Err(format!(
                "Invalid tool selection '{other}'. Valid options: internal, tech-stack, code-quality, vulnerability, evolution, all"
            )),
        }
    }
}

/// Declared ranking weight vector. Dimension names are fixed; the values
/// are configurable and must sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub commits: f64,
    pub churn: f64,
    pub hotspot: f64,
    pub ownership: f64,
    pub complexity: f64,
    pub communication: f64,
    pub recency: f64,
    pub fragmentation: f64,
    pub coupling: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            commits: 0.20,
            churn: 0.15,
            hotspot: 0.15,
            ownership: 0.15,
            complexity: 0.10,
            communication: 0.08,
            recency: 0.07,
            fragmentation: 0.05,
            coupling: 0.05,
        }
    }
}

impl RankingWeights {
    /// Weight vector as (dimension name, weight) pairs, in declaration
    /// order. The same names key the normalized score map in the
    /// rankings document.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("commits", self.commits),
            ("churn", self.churn),
            ("hotspot", self.hotspot),
            ("ownership", self.ownership),
            ("complexity", self.complexity),
            ("communication", self.communication),
            ("recency", self.recency),
            ("fragmentation", self.fragmentation),
            ("coupling", self.coupling),
        ]
    }

    pub fn as_map(&self) -> BTreeMap<String, f64> {
        self.entries()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    /// Weights must sum to 1 within 1e-6.
    pub fn validate(&self) -> crate::Result<()> {
        let sum: f64 = self.entries().iter().map(|(_, w)| w).sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(crate::Error::Config(format!(
                "Ranking weights must sum to 1.0, got {sum:.6}"
            )));
        }
        if self.entries().iter().any(|(_, w)| *w < 0.0) {
            return Err(crate::Error::Config(
                "Ranking weights must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Security score policy. The coefficients reproduce the legacy heuristic
/// verbatim; they are policy, not derived from any standard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityScorePolicy {
    pub critical_weight: f64,
    pub high_weight: f64,
    pub medium_weight: f64,
    pub low_weight: f64,
    pub density_penalty: f64,
}

impl Default for SecurityScorePolicy {
    fn default() -> Self {
        Self {
            critical_weight: 2.0,
            high_weight: 1.0,
            medium_weight: 0.2,
            low_weight: 0.05,
            density_penalty: 5.0,
        }
    }
}

/// Per-stage and global timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub global_secs: u64,
    pub counter_secs: u64,
    pub complexity_secs: u64,
    pub vulnerability_secs: u64,
    pub evolution_sub_analysis_secs: u64,
    /// Grace window between the soft and hard kill signals.
    pub kill_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            global_secs: 3600,
            counter_secs: 300,
            complexity_secs: 300,
            vulnerability_secs: 900,
            evolution_sub_analysis_secs: 300,
            kill_grace_secs: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn global(&self) -> Duration {
        Duration::from_secs(self.global_secs)
    }
}

/// The file-backed part of the configuration surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub weights: RankingWeights,
    pub security_score: SecurityScorePolicy,
    pub timeouts: TimeoutConfig,
    /// Globs excluded from churn aggregates (revision counts still apply).
    pub churn_ignore: Option<Vec<String>>,
    /// Vulnerability database cache directory, overriding the bundled one.
    pub vulndb_cache: Option<PathBuf>,
    /// Extra email-domain → region entries layered over the built-in table.
    pub region_overrides: BTreeMap<String, String>,
    /// Company email domains for the company-only filter. Empty disables it.
    pub company_domains: Vec<String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| crate::Error::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Default churn-ignore set: vendored dependencies, generated artifacts,
/// common lock files.
pub const DEFAULT_CHURN_IGNORE: &[&str] = &[
    "node_modules/**",
    "vendor/**",
    "dist/**",
    "target/**",
    "*.min.js",
    "*.min.css",
    "*.lock",
    "package-lock.json",
    "yarn.lock",
    "Cargo.lock",
    "*.generated.*",
];

/// Complete configuration for a pipeline run. Immutable once built.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Repositories under analysis (local working trees).
    pub repos: Vec<PathBuf>,
    /// Output root; per-repository directories are created beneath it.
    pub output_root: PathBuf,
    /// Selected analyzer stages.
    pub tools: Vec<ToolSelection>,
    /// Bounded pool size for external runners and evolution sub-analyses.
    pub workers: usize,
    /// Evolution analyzer jar, when not bundled.
    pub jar_path: Option<PathBuf>,
    /// Java executable, when not on the search path.
    pub java_path: Option<PathBuf>,
    /// Vulnerability database cache directory override.
    pub vulndb_cache: Option<PathBuf>,
    /// Apply the company-only filter to contribution and ranking documents.
    pub company_filter: bool,
    pub weights: RankingWeights,
    pub security_score: SecurityScorePolicy,
    pub timeouts: TimeoutConfig,
    pub churn_ignore: Vec<String>,
    pub region_overrides: BTreeMap<String, String>,
    pub company_domains: Vec<String>,
}

impl AnalysisConfig {
    /// Build a config from CLI-level values layered over an optional file.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        repos: Vec<PathBuf>,
        output_root: PathBuf,
        tools: Vec<ToolSelection>,
        workers: usize,
        jar_path: Option<PathBuf>,
        java_path: Option<PathBuf>,
        company_filter: bool,
        file: ConfigFile,
    ) -> crate::Result<Self> {
        if repos.is_empty() {
            return Err(crate::Error::Config("At least one --repo is required".to_string()));
        }
        file.weights.validate()?;

        let config = Self {
            repos,
            output_root,
            tools: if tools.is_empty() { vec![ToolSelection::All] } else { tools },
            workers: workers.max(1),
            jar_path,
            java_path,
            vulndb_cache: file.vulndb_cache,
            company_filter,
            weights: file.weights,
            security_score: file.security_score,
            timeouts: file.timeouts,
            churn_ignore: file
                .churn_ignore
                .unwrap_or_else(|| DEFAULT_CHURN_IGNORE.iter().map(|s| s.to_string()).collect()),
            region_overrides: file.region_overrides,
            company_domains: file.company_domains,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::Result<()> {
        for repo in &self.repos {
            if !repo.exists() {
                return Err(crate::Error::Config(format!(
                    "Repository path does not exist: {}",
                    repo.display()
                )));
            }
        }
        Ok(())
    }

    /// Whether a stage is selected for this run.
    pub fn tool_enabled(&self, tool: ToolSelection) -> bool {
        self.tools.contains(&ToolSelection::All) || self.tools.contains(&tool)
    }

    /// Compiled churn-ignore matcher.
    pub fn churn_ignore_set(&self) -> crate::Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.churn_ignore {
            let glob = Glob::new(pattern).map_err(|e| {
                crate::Error::Config(format!("Invalid churn-ignore glob '{pattern}': {e}"))
            })?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to build churn-ignore set: {e}")))
    }
}
