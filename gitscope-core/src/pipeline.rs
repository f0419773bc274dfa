//! Pipeline controller
//!
//! The single entry point. Runs stages in dependency order — locator,
//! extractor, then the fan-out consumers, then ranking and output —
//! while enforcing the global wall-clock budget and recording a manifest
//! per repository. Only configuration and prerequisite errors escape to
//! the exit code; everything else lands in the manifest.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::classifier::CommitClassifier;
use crate::config::{AnalysisConfig, ToolSelection};
use crate::external_tools::codemaat::{EvolutionOrchestrator, EvolutionReport};
use crate::external_tools::complexity::ComplexityRunner;
use crate::external_tools::counter::CodeCounterRunner;
use crate::external_tools::vulnscan::VulnScanRunner;
use crate::external_tools::{
    AnalyzerRunner, RunnerContext, RunnerReport, ToolCapabilities, ToolLocator,
};
use crate::git::GitLogExtractor;
use crate::history::{parse_full_history, regions::RegionResolver, HistoryAnalyzer};
use crate::models::{RunManifest, StageOutcome};
use crate::output::{OutputWriter, RepoAnalysis};
use crate::ranking::RankingEngine;

/// Failures that map to a non-zero process exit. Everything else is a
/// manifest entry.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("git unavailable: {0}")]
    GitUnavailable(String),

    #[error("{0} is not a Git working tree")]
    NotAWorkingTree(PathBuf),

    #[error("global time budget exhausted before any output was produced")]
    GlobalTimeout,
}

impl PipelineError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => 2,
            PipelineError::GitUnavailable(_) => 3,
            PipelineError::GlobalTimeout => 4,
            PipelineError::NotAWorkingTree(_) => 5,
        }
    }
}

pub struct PipelineController {
    config: AnalysisConfig,
}

impl PipelineController {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Run the whole pipeline; returns the sealed manifests.
    pub async fn run(&self) -> Result<Vec<RunManifest>, PipelineError> {
        let started = Instant::now();
        let budget = self.config.timeouts.global();

        // Prerequisite: Git. Nothing can proceed without it.
        let git_version = GitLogExtractor::git_version()
            .await
            .map_err(|e| PipelineError::GitUnavailable(e.to_string()))?;
        info!("using {git_version}");

        // Capability snapshot, taken once.
        let locator = ToolLocator::new(
            self.config.jar_path.clone(),
            self.config.java_path.clone(),
            self.config.vulndb_cache.clone(),
        );
        let capabilities = locator.locate().await;

        let writer = OutputWriter::new(&self.config.output_root);
        let engine = RankingEngine::new(
            self.config.weights.clone(),
            self.config.company_domains.clone(),
            self.config.company_filter,
        );

        let mut manifests = Vec::new();
        let mut analyses = Vec::new();

        for repo in &self.config.repos {
            let extractor = GitLogExtractor::new(repo);
            extractor
                .verify_working_tree()
                .await
                .map_err(|_| PipelineError::NotAWorkingTree(repo.clone()))?;

            let (manifest, analysis) = self
                .run_repository(repo, &capabilities, &writer, &engine, started, budget)
                .await;
            manifests.push(manifest);
            if let Some(analysis) = analysis {
                analyses.push(analysis);
            }
        }

        if analyses.len() > 1 {
            if let Err(e) = writer.write_combined(&analyses, &engine) {
                warn!("failed to write combined view: {e}");
            } else {
                info!("wrote combined view across {} repositories", analyses.len());
            }
        }

        let any_output = manifests.iter().any(|m| m.any_output());
        if !any_output && started.elapsed() >= budget {
            return Err(PipelineError::GlobalTimeout);
        }
        Ok(manifests)
    }

    /// Remaining global budget; `None` once exhausted.
    fn remaining(started: Instant, budget: Duration) -> Option<Duration> {
        budget.checked_sub(started.elapsed()).filter(|d| !d.is_zero())
    }

    async fn run_repository(
        &self,
        repo: &std::path::Path,
        capabilities: &ToolCapabilities,
        writer: &OutputWriter,
        engine: &RankingEngine,
        started: Instant,
        budget: Duration,
    ) -> (RunManifest, Option<RepoAnalysis>) {
        let name = gitscope_utils::paths::repo_short_name(repo);
        let output_dir = writer.repo_dir(&name);
        info!("analyzing {name} ({})", repo.display());

        let mut manifest = RunManifest::new(
            &name,
            &repo.display().to_string(),
            &output_dir.display().to_string(),
        );
        manifest.capabilities = capabilities.snapshot();

        // --- extractor -----------------------------------------------------
        let stage_start = Instant::now();
        let logs = match Self::remaining(started, budget) {
            None => {
                manifest.record(StageOutcome::timed_out("extractor", Duration::ZERO));
                let _ = writer.write_manifest(&name, &mut manifest);
                return (manifest, None);
            }
            Some(remaining) => match tokio::time::timeout(remaining, extractor_logs(repo)).await {
                Err(_) => {
                    manifest.record(StageOutcome::timed_out("extractor", stage_start.elapsed()));
                    let _ = writer.write_manifest(&name, &mut manifest);
                    return (manifest, None);
                }
                Ok(Err(e)) => {
                    manifest.record(StageOutcome::failed("extractor", stage_start.elapsed(), &e.to_string()));
                    let _ = writer.write_manifest(&name, &mut manifest);
                    return (manifest, None);
                }
                Ok(Ok(logs)) => logs,
            },
        };
        if logs.warnings.is_empty() {
            manifest.record(StageOutcome::ok("extractor", stage_start.elapsed()));
        } else {
            // Partial output: recorded, downstream proceeds regardless.
            manifest.record(StageOutcome::failed(
                "extractor",
                stage_start.elapsed(),
                &logs.warnings.join("; "),
            ));
        }
        if let Err(e) = writer.write_extractions(&name, &logs) {
            warn!("failed to persist extracted logs: {e}");
        }

        // --- history parse + fold (internal) -------------------------------
        let internal = self.config.tool_enabled(ToolSelection::Internal);
        let mut analysis = RepoAnalysis {
            name: name.clone(),
            ..Default::default()
        };

        let mut commits = Vec::new();
        if internal {
            let stage_start = Instant::now();
            match self.fold_history(&logs.full_history) {
                Ok((folded, parsed_commits)) => {
                    manifest.parse_errors = folded.parse_errors;
                    analysis.history = folded;
                    commits = parsed_commits;
                    manifest.record(StageOutcome::ok("history", stage_start.elapsed()));
                }
                Err(e) => {
                    manifest.record(StageOutcome::failed("history", stage_start.elapsed(), &e.to_string()));
                }
            }

            let stage_start = Instant::now();
            analysis.classification = CommitClassifier::new().classify_all(&commits);
            manifest.record(StageOutcome::ok("classifier", stage_start.elapsed()));
        } else {
            manifest.record(StageOutcome::skipped("history", "internal analysis not selected"));
            manifest.record(StageOutcome::skipped("classifier", "internal analysis not selected"));
        }

        // --- external runner fan-out ---------------------------------------
        let ctx = RunnerContext {
            repo: repo.to_path_buf(),
            output_dir: output_dir.clone(),
            timeouts: self.config.timeouts.clone(),
        };
        let evolution_log = output_dir.join("extractions").join("git_log_codemaat.txt");
        let pool = Arc::new(Semaphore::new(self.config.workers));

        let counter_fut = self.pooled_runner(
            ToolSelection::TechStack,
            CodeCounterRunner,
            &ctx,
            capabilities,
            pool.clone(),
            started,
            budget,
        );
        let complexity_fut = self.pooled_runner(
            ToolSelection::CodeQuality,
            ComplexityRunner,
            &ctx,
            capabilities,
            pool.clone(),
            started,
            budget,
        );
        let vuln_fut = self.pooled_runner(
            ToolSelection::Vulnerability,
            VulnScanRunner::new(self.config.security_score.clone()),
            &ctx,
            capabilities,
            pool.clone(),
            started,
            budget,
        );
        let evolution_fut = self.pooled_runner(
            ToolSelection::Evolution,
            EvolutionOrchestrator::new(self.config.workers, &evolution_log),
            &ctx,
            capabilities,
            pool.clone(),
            started,
            budget,
        );

        let (counter, complexity, vulnerabilities, evolution) =
            tokio::join!(counter_fut, complexity_fut, vuln_fut, evolution_fut);

        record_runner(&mut manifest, "tech-stack", &counter);
        record_runner(&mut manifest, "code-quality", &complexity);
        record_runner(&mut manifest, "vulnerability", &vulnerabilities);
        record_runner(&mut manifest, "evolution", &evolution);

        analysis.counter = counter.and_then(|r| r.output);
        analysis.complexity = complexity.and_then(|r| r.output);
        analysis.vulnerabilities = vulnerabilities.and_then(|r| r.output);
        analysis.evolution = evolution.and_then(|r| r.output);

        if let Some(evolution) = &analysis.evolution {
            enrich_files(&mut analysis.history, evolution);
        }

        // --- ranking -------------------------------------------------------
        if internal {
            let stage_start = Instant::now();
            analysis.raw_rows = engine.build_rows(
                &analysis.history,
                analysis.evolution.as_ref(),
                analysis.complexity.as_ref(),
            );
            analysis.rankings = engine.rank_rows(analysis.raw_rows.clone());
            manifest.record(StageOutcome::ok("ranking", stage_start.elapsed()));
        } else {
            manifest.record(StageOutcome::skipped("ranking", "internal analysis not selected"));
        }

        // --- aggregation & output ------------------------------------------
        let stage_start = Instant::now();
        match writer.write_repository(&analysis) {
            Ok(()) => manifest.record(StageOutcome::ok("aggregator", stage_start.elapsed())),
            Err(e) => manifest.record(StageOutcome::failed(
                "aggregator",
                stage_start.elapsed(),
                &e.to_string(),
            )),
        }

        if let Err(e) = writer.write_manifest(&name, &mut manifest) {
            warn!("failed to write manifest for {name}: {e}");
        }
        (manifest, Some(analysis))
    }

    fn fold_history(
        &self,
        full_history: &[u8],
    ) -> crate::Result<(crate::models::HistoryAggregates, Vec<crate::models::CommitRecord>)> {
        let parsed = parse_full_history(std::io::BufReader::new(full_history))?;
        let analyzer = HistoryAnalyzer::new(
            self.config.churn_ignore_set()?,
            RegionResolver::new(self.config.region_overrides.clone()),
        );
        let aggregates = analyzer.analyze(&parsed.commits, parsed.parse_errors);
        Ok((aggregates, parsed.commits))
    }

    /// Run one analyzer through the shared worker pool, bounded by both
    /// its own timeout and the remaining global budget.
    async fn pooled_runner<R: AnalyzerRunner>(
        &self,
        selection: ToolSelection,
        runner: R,
        ctx: &RunnerContext,
        capabilities: &ToolCapabilities,
        pool: Arc<Semaphore>,
        started: Instant,
        budget: Duration,
    ) -> Option<RunnerReport<R::Output>> {
        if !self.config.tool_enabled(selection) {
            return None;
        }
        let _permit = pool.acquire().await.ok();
        let Some(remaining) = Self::remaining(started, budget) else {
            return Some(RunnerReport {
                status: crate::external_tools::RunnerStatus::TimedOut,
                output: None,
                error: Some("global budget exhausted".to_string()),
                duration: Duration::ZERO,
            });
        };
        match tokio::time::timeout(remaining, runner.run(ctx, capabilities)).await {
            Ok(report) => Some(report),
            Err(_) => Some(RunnerReport {
                status: crate::external_tools::RunnerStatus::TimedOut,
                output: None,
                error: Some("global budget exhausted".to_string()),
                duration: remaining,
            }),
        }
    }
}

async fn extractor_logs(repo: &std::path::Path) -> crate::Result<crate::git::ExtractedLogs> {
    GitLogExtractor::new(repo).extract().await
}

fn record_runner<T>(manifest: &mut RunManifest, stage: &str, report: &Option<RunnerReport<T>>) {
    match report {
        None => manifest.record(StageOutcome::skipped(stage, "not selected")),
        Some(report) => {
            let status = report.status.to_stage_status();
            let outcome = StageOutcome {
                stage: stage.to_string(),
                status,
                duration_ms: report.duration.as_millis() as u64,
                error: report.error.clone(),
            };
            manifest.record(outcome);
        }
    }
}

/// Fold evolution results into the file aggregates: fragmentation,
/// coupling partners, age in months.
fn enrich_files(history: &mut crate::models::HistoryAggregates, evolution: &EvolutionReport) {
    if let Some(table) = evolution.table("fragmentation") {
        if let (Some(entity_col), Some(value_col)) =
            (table.column("entity"), table.column("fractal-value"))
        {
            for row in table.rows() {
                let (Some(entity), Some(value)) = (
                    row.get(entity_col).and_then(|c| c.as_str()),
                    row.get(value_col).and_then(|c| c.as_f64()),
                ) else {
                    continue;
                };
                if let Some(file) = history.files.get_mut(entity) {
                    file.fragmentation = Some(value.clamp(0.0, 1.0));
                }
            }
        }
    }

    if let Some(table) = evolution.table("age") {
        if let (Some(entity_col), Some(age_col)) =
            (table.column("entity"), table.column("age-months"))
        {
            for row in table.rows() {
                let (Some(entity), Some(age)) = (
                    row.get(entity_col).and_then(|c| c.as_str()),
                    row.get(age_col).and_then(|c| c.as_i64()),
                ) else {
                    continue;
                };
                if let Some(file) = history.files.get_mut(entity) {
                    file.age_months = Some(age.max(0) as u64);
                }
            }
        }
    }

    if let Some(table) = evolution.table("coupling") {
        if let (Some(entity_col), Some(coupled_col), Some(degree_col), Some(revs_col)) = (
            table.column("entity"),
            table.column("coupled"),
            table.column("degree"),
            table.column("average-revs"),
        ) {
            for row in table.rows() {
                let (Some(entity), Some(coupled), Some(degree), Some(revs)) = (
                    row.get(entity_col).and_then(|c| c.as_str()),
                    row.get(coupled_col).and_then(|c| c.as_str()),
                    row.get(degree_col).and_then(|c| c.as_i64()),
                    row.get(revs_col).and_then(|c| c.as_i64()),
                ) else {
                    continue;
                };
                if let Some(file) = history.files.get_mut(entity) {
                    file.coupling.push(crate::models::aggregates::CouplingPartner {
                        path: coupled.to_string(),
                        shared_revisions: revs.max(0) as u64,
                        degree: degree.max(0) as u64,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;
    use crate::external_tools::codemaat::{CsvTable, SubAnalysisOutcome};
    use crate::external_tools::RunnerStatus;
    use crate::models::StageStatus;
    use std::process::Command;

    fn git(dir: &std::path::Path, args: &[&str]) -> bool {
        Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .env("GIT_AUTHOR_NAME", "Alice")
            .env("GIT_AUTHOR_EMAIL", "alice@example.com")
            .env("GIT_COMMITTER_NAME", "Alice")
            .env("GIT_COMMITTER_EMAIL", "alice@example.com")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn scratch_repo() -> Option<tempfile::TempDir> {
        let tmp = tempfile::tempdir().ok()?;
        if !git(tmp.path(), &["init", "-q"]) {
            return None;
        }
        std::fs::write(tmp.path().join("main.c"), "int main() { return 0; }\n").ok()?;
        git(tmp.path(), &["add", "."]).then_some(())?;
        git(tmp.path(), &["commit", "-q", "-m", "initial commit"]).then_some(())?;
        Some(tmp)
    }

    fn config_for(repo: &std::path::Path, output: &std::path::Path) -> AnalysisConfig {
        AnalysisConfig::from_parts(
            vec![repo.to_path_buf()],
            output.to_path_buf(),
            vec![ToolSelection::Internal],
            2,
            None,
            None,
            false,
            ConfigFile::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_single_commit_repo() {
        let Some(repo) = scratch_repo() else {
            return; // git unavailable in this environment
        };
        let out = tempfile::tempdir().unwrap();
        let controller = PipelineController::new(config_for(repo.path(), out.path()));
        let manifests = controller.run().await.unwrap();

        assert_eq!(manifests.len(), 1);
        let manifest = &manifests[0];
        assert_eq!(manifest.stage("extractor").unwrap().status, StageStatus::Ok);
        assert_eq!(manifest.stage("history").unwrap().status, StageStatus::Ok);
        assert!(manifest.any_output());

        let repo_dir = out.path().join(manifest.repository.as_str());
        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(repo_dir.join("overall_summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["total_commits"], 1);
        assert_eq!(summary["total_developers"], 1);

        let rankings: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(repo_dir.join("developer_rankings.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(rankings["total_developers"], 1);
        assert_eq!(rankings["rankings"][0]["rank"], 1);
        assert_eq!(rankings["rankings"][0]["email"], "alice@example.com");
        let score = rankings["rankings"][0]["weighted_score"].as_f64().unwrap();
        assert!((score - 100.0).abs() < 1e-6);

        let tech: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(repo_dir.join("technology_stack.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(tech["overall_technology_usage"]["c"], 1);

        assert!(repo_dir.join("extractions/git_log_all.log").is_file());
        assert!(repo_dir.join("manifest.json").is_file());
    }

    #[tokio::test]
    async fn test_external_tools_skipped_when_absent() {
        let Some(repo) = scratch_repo() else {
            return;
        };
        let out = tempfile::tempdir().unwrap();
        let config = AnalysisConfig::from_parts(
            vec![repo.path().to_path_buf()],
            out.path().to_path_buf(),
            vec![],
            2,
            Some(std::path::PathBuf::from("/no/such.jar")),
            None,
            false,
            ConfigFile::default(),
        )
        .unwrap();
        let manifests = PipelineController::new(config).run().await.unwrap();
        let manifest = &manifests[0];

        // Evolution jar is certainly absent; the stage downgrades, the
        // run still exits cleanly with output.
        assert_eq!(manifest.stage("evolution").unwrap().status, StageStatus::Skipped);
        assert!(manifest.any_output());
    }

    #[tokio::test]
    async fn test_non_working_tree_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        if GitLogExtractor::git_version().await.is_err() {
            return;
        }
        let controller = PipelineController::new(config_for(tmp.path(), out.path()));
        let err = controller.run().await.unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_enrich_files_from_evolution_tables() {
        let mut history = crate::models::HistoryAggregates::default();
        history.files.insert(
            "src/a.c".to_string(),
            crate::models::aggregates::FileAggregate {
                revisions: 3,
                churn: 10,
                authors: Default::default(),
                last_touched: chrono::Utc::now(),
                technology: "c".to_string(),
                renamed_from: None,
                fragmentation: None,
                coupling: Vec::new(),
                age_months: None,
            },
        );

        let mut evolution = EvolutionReport::default();
        for (name, csv) in [
            ("fragmentation", "entity,fractal-value,total-revs\nsrc/a.c,0.42,3\n"),
            ("age", "entity,age-months\nsrc/a.c,7\n"),
            ("coupling", "entity,coupled,degree,average-revs\nsrc/a.c,src/b.c,66,4\n"),
        ] {
            evolution.analyses.insert(
                name.to_string(),
                SubAnalysisOutcome {
                    status: RunnerStatus::Ok,
                    table: Some(CsvTable::parse(csv)),
                    error: None,
                    duration_ms: 1,
                },
            );
        }

        enrich_files(&mut history, &evolution);
        let file = &history.files["src/a.c"];
        assert_eq!(file.fragmentation, Some(0.42));
        assert_eq!(file.age_months, Some(7));
        assert_eq!(file.coupling.len(), 1);
        assert_eq!(file.coupling[0].path, "src/b.c");
        assert_eq!(file.coupling[0].degree, 66);
    }
}
