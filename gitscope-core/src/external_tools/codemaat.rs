//! Evolution analyzer orchestration
//!
//! Drives the fifteen sub-analyses of the evolution analyzer jar over
//! the extracted log, in a bounded worker pool. Sub-analyses are
//! independent and commute; result ordering is deterministic by analysis
//! name regardless of completion order, and one failure never cancels
//! the rest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{
    run_command, AnalyzerRunner, CommandSpec, RunnerContext, RunnerDiagnostics, RunnerReport,
    RunnerStatus, ToolCapabilities, ToolKind,
};

/// The fifteen sub-analyses: output table name → analyzer flag.
pub const SUB_ANALYSES: &[(&str, &str)] = &[
    ("revisions", "revisions"),
    ("authors", "authors"),
    ("entity-churn", "entity-churn"),
    ("absolute-churn", "abs-churn"),
    ("age", "age"),
    ("main-developer", "main-dev"),
    ("main-developer-by-revisions", "main-dev-by-revs"),
    ("author-churn", "author-churn"),
    ("communication", "communication"),
    ("entity-ownership", "entity-ownership"),
    ("coupling", "coupling"),
    ("sum-of-coupling", "soc"),
    ("entity-effort", "entity-effort"),
    ("fragmentation", "fractal-value"),
    ("refactoring-main-developer", "refactoring-main-dev"),
];

/// One cell of a parsed analyzer table. Numeric columns are coerced to
/// integers or floats; everything else stays text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CsvValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl CsvValue {
    fn coerce(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return CsvValue::Int(n);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return CsvValue::Float(f);
        }
        CsvValue::Text(trimmed.to_string())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CsvValue::Int(n) => Some(*n),
            CsvValue::Float(f) => Some(*f as i64),
            CsvValue::Text(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CsvValue::Int(n) => Some(*n as f64),
            CsvValue::Float(f) => Some(*f),
            CsvValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CsvValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for CsvValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CsvValue::Int(n) => write!(f, "{n}"),
            CsvValue::Float(v) => write!(f, "{v}"),
            CsvValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A header-rowed table as emitted by the analyzer. Unknown columns are
/// preserved for forward compatibility; an empty result file is a
/// success with zero rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CsvValue>>,
}

impl CsvTable {
    pub fn parse(text: &str) -> Self {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let Some(header_line) = lines.next() else {
            return Self::default();
        };

        let headers: Vec<String> = header_line.split(',').map(|h| h.trim().to_string()).collect();
        let rows = lines
            .map(|line| line.split(',').map(CsvValue::coerce).collect())
            .collect();
        Self { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by header name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Iterate (text key column, value columns) conveniently.
    pub fn rows(&self) -> impl Iterator<Item = &Vec<CsvValue>> {
        self.rows.iter()
    }

    /// Re-emit the table; parsing the result yields the same table.
    pub fn to_csv_string(&self) -> String {
        let mut out = String::new();
        if self.headers.is_empty() {
            return out;
        }
        out.push_str(&self.headers.join(","));
        out.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out
    }
}

/// Outcome of one sub-analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAnalysisOutcome {
    pub status: RunnerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<CsvTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// All sub-analysis results, keyed (and therefore ordered) by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvolutionReport {
    pub analyses: BTreeMap<String, SubAnalysisOutcome>,
}

impl EvolutionReport {
    pub fn table(&self, name: &str) -> Option<&CsvTable> {
        self.analyses
            .get(name)
            .filter(|a| a.status == RunnerStatus::Ok)
            .and_then(|a| a.table.as_ref())
    }
}

pub struct EvolutionOrchestrator {
    workers: usize,
    log_path: PathBuf,
}

impl EvolutionOrchestrator {
    pub fn new(workers: usize, log_path: impl AsRef<Path>) -> Self {
        Self {
            workers: workers.max(1),
            log_path: log_path.as_ref().to_path_buf(),
        }
    }

    fn command_for(&self, java: &Path, jar: &Path, flag: &str, timeout: Duration) -> CommandSpec {
        CommandSpec {
            program: java.to_path_buf(),
            args: vec![
                "-jar".to_string(),
                jar.display().to_string(),
                "-l".to_string(),
                self.log_path.display().to_string(),
                "-c".to_string(),
                "git2".to_string(),
                "-a".to_string(),
                flag.to_string(),
            ],
            cwd: None,
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl AnalyzerRunner for EvolutionOrchestrator {
    type Output = EvolutionReport;

    fn tool_kind(&self) -> ToolKind {
        ToolKind::EvolutionAnalyzer
    }

    fn stage_name(&self) -> &'static str {
        "evolution"
    }

    async fn run(
        &self,
        ctx: &RunnerContext,
        capabilities: &ToolCapabilities,
    ) -> RunnerReport<Self::Output> {
        let Some(jar) = capabilities.path(self.tool_kind()) else {
            let reason = capabilities
                .absent_reason(self.tool_kind())
                .unwrap_or_else(|| "analyzer jar not found".to_string());
            return RunnerReport::not_applicable(&reason);
        };
        let Some(java) = capabilities.java.clone() else {
            return RunnerReport::not_applicable("java executable not found");
        };
        if !self.log_path.is_file() {
            return RunnerReport {
                status: RunnerStatus::Failed,
                output: None,
                error: Some("extracted evolution log missing".to_string()),
                duration: Duration::ZERO,
            };
        }

        let started = std::time::Instant::now();
        let timeout = Duration::from_secs(ctx.timeouts.evolution_sub_analysis_secs);
        let grace = ctx.kill_grace();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut join_set = JoinSet::new();

        for (name, flag) in SUB_ANALYSES {
            let spec = self.command_for(&java, jar, flag, timeout);
            let semaphore = semaphore.clone();
            let name = name.to_string();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = run_command(&spec, grace).await;
                (name, spec, outcome)
            });
        }

        let mut report = EvolutionReport::default();
        while let Some(joined) = join_set.join_next().await {
            let Ok((name, spec, outcome)) = joined else {
                warn!("evolution worker task aborted");
                continue;
            };
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    report.analyses.insert(
                        name,
                        SubAnalysisOutcome {
                            status: RunnerStatus::Failed,
                            table: None,
                            error: Some(e.to_string()),
                            duration_ms: 0,
                        },
                    );
                    continue;
                }
            };

            let diag_name = format!("evolution-{name}");
            if let Err(e) = RunnerDiagnostics::from_outcome(&spec, &outcome).write(&ctx.output_dir, &diag_name) {
                debug!("could not write {diag_name} diagnostics: {e}");
            }

            let sub = if outcome.timed_out {
                SubAnalysisOutcome {
                    status: RunnerStatus::TimedOut,
                    table: None,
                    error: Some("sub-analysis timed out".to_string()),
                    duration_ms: outcome.duration.as_millis() as u64,
                }
            } else if !outcome.success() {
                SubAnalysisOutcome {
                    status: RunnerStatus::Failed,
                    table: None,
                    error: Some(format!(
                        "analyzer exited with {:?}: {}",
                        outcome.exit_code,
                        gitscope_utils::text::tail(outcome.stderr_text().trim(), 256)
                    )),
                    duration_ms: outcome.duration.as_millis() as u64,
                }
            } else {
                // Empty output is a success with zero rows.
                let table = CsvTable::parse(&String::from_utf8_lossy(&outcome.stdout));
                SubAnalysisOutcome {
                    status: RunnerStatus::Ok,
                    table: Some(table),
                    error: None,
                    duration_ms: outcome.duration.as_millis() as u64,
                }
            };
            report.analyses.insert(name, sub);
        }

        let ok = report
            .analyses
            .values()
            .filter(|a| a.status == RunnerStatus::Ok)
            .count();
        debug!("evolution orchestration: {ok}/{} sub-analyses ok", SUB_ANALYSES.len());

        let status = if ok > 0 {
            RunnerStatus::Ok
        } else if report.analyses.values().any(|a| a.status == RunnerStatus::TimedOut) {
            RunnerStatus::TimedOut
        } else {
            RunnerStatus::Failed
        };

        RunnerReport {
            status,
            error: (ok == 0).then(|| "all sub-analyses failed".to_string()),
            output: Some(report),
            duration: started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifteen_sub_analyses_declared() {
        assert_eq!(SUB_ANALYSES.len(), 15);
        // Names are unique; the map ordering depends on it.
        let mut names: Vec<&str> = SUB_ANALYSES.iter().map(|(n, _)| *n).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 15);
    }

    #[test]
    fn test_csv_parse_coerces_numeric_columns() {
        let table = CsvTable::parse("entity,n-revs,fractal-value\nsrc/a.rs,12,0.75\nsrc/b.rs,3,0\n");
        assert_eq!(table.headers, vec!["entity", "n-revs", "fractal-value"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][1], CsvValue::Int(12));
        assert_eq!(table.rows[0][2], CsvValue::Float(0.75));
        assert_eq!(table.rows[0][0].as_str(), Some("src/a.rs"));
    }

    #[test]
    fn test_empty_file_is_zero_rows() {
        let table = CsvTable::parse("");
        assert!(table.is_empty());
        assert!(table.headers.is_empty());
    }

    #[test]
    fn test_unknown_columns_preserved() {
        let table = CsvTable::parse("entity,n-revs,new-column\na,1,x\n");
        assert_eq!(table.column("new-column"), Some(2));
        assert_eq!(table.rows[0][2].as_str(), Some("x"));
    }

    #[test]
    fn test_round_trip_parse_emit_parse() {
        let original = "entity,n-revs,fractal-value\nsrc/a.rs,12,0.75\nsrc/b.rs,3,1\n";
        let table = CsvTable::parse(original);
        let emitted = table.to_csv_string();
        let reparsed = CsvTable::parse(&emitted);
        assert_eq!(table, reparsed);
    }

    #[tokio::test]
    async fn test_missing_jar_is_not_applicable() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RunnerContext {
            repo: tmp.path().to_path_buf(),
            output_dir: tmp.path().to_path_buf(),
            timeouts: crate::config::TimeoutConfig::default(),
        };
        let orchestrator = EvolutionOrchestrator::new(5, tmp.path().join("log.txt"));
        let report = orchestrator.run(&ctx, &ToolCapabilities::default()).await;
        assert_eq!(report.status, RunnerStatus::NotApplicable);
    }

    #[tokio::test]
    async fn test_missing_log_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("code-maat.jar");
        std::fs::write(&jar, b"jar").unwrap();
        let java = tmp.path().join("java");
        std::fs::write(&java, b"bin").unwrap();

        let mut capabilities = ToolCapabilities::default()
            .with_tool(ToolKind::EvolutionAnalyzer, jar);
        capabilities.java = Some(java);

        let ctx = RunnerContext {
            repo: tmp.path().to_path_buf(),
            output_dir: tmp.path().to_path_buf(),
            timeouts: crate::config::TimeoutConfig::default(),
        };
        let orchestrator = EvolutionOrchestrator::new(5, tmp.path().join("nope.txt"));
        let report = orchestrator.run(&ctx, &capabilities).await;
        assert_eq!(report.status, RunnerStatus::Failed);
    }
}
