//! Run manifest: the single source of truth for stage outcomes
//!
//! Append-only during the run, sealed (written) at exit. Only
//! configuration and prerequisite errors escape to the exit code; every
//! other failure lives here.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    Ok,
    Skipped,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: String,
    pub status: StageStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageOutcome {
    pub fn ok(stage: &str, duration: Duration) -> Self {
        Self {
            stage: stage.to_string(),
            status: StageStatus::Ok,
            duration_ms: duration.as_millis() as u64,
            error: None,
        }
    }

    pub fn skipped(stage: &str, reason: &str) -> Self {
        Self {
            stage: stage.to_string(),
            status: StageStatus::Skipped,
            duration_ms: 0,
            error: Some(reason.to_string()),
        }
    }

    pub fn failed(stage: &str, duration: Duration, error: &str) -> Self {
        Self {
            stage: stage.to_string(),
            status: StageStatus::Failed,
            duration_ms: duration.as_millis() as u64,
            error: Some(error.to_string()),
        }
    }

    pub fn timed_out(stage: &str, duration: Duration) -> Self {
        Self {
            stage: stage.to_string(),
            status: StageStatus::TimedOut,
            duration_ms: duration.as_millis() as u64,
            error: Some("time budget exceeded".to_string()),
        }
    }
}

/// Capability snapshot entry for one external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityEntry {
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absent_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub generated_at: String,
    pub repository: String,
    pub repository_path: String,
    pub output_dir: String,
    /// Tool identifier → capability snapshot, taken once at startup.
    pub capabilities: BTreeMap<String, CapabilityEntry>,
    /// Ordered stage outcomes, in execution order.
    pub stages: Vec<StageOutcome>,
    /// Malformed records skipped across all parsers.
    pub parse_errors: u64,
}

impl RunManifest {
    pub fn new(repository: &str, repository_path: &str, output_dir: &str) -> Self {
        Self {
            schema_version: super::documents::SCHEMA_VERSION,
            run_id: Uuid::new_v4(),
            generated_at: String::new(),
            repository: repository.to_string(),
            repository_path: repository_path.to_string(),
            output_dir: output_dir.to_string(),
            capabilities: BTreeMap::new(),
            stages: Vec::new(),
            parse_errors: 0,
        }
    }

    /// Append one stage outcome. Outcomes are never rewritten.
    pub fn record(&mut self, outcome: StageOutcome) {
        self.stages.push(outcome);
    }

    pub fn stage(&self, name: &str) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// At least one non-extraction stage produced output.
    pub fn any_output(&self) -> bool {
        self.stages
            .iter()
            .any(|s| s.stage != "extractor" && s.status == StageStatus::Ok)
    }
}
