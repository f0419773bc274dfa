//! Aggregation and output writing
//!
//! Writes the per-repository document layout under the output root, and
//! the `combined` view across repositories: countable fields summed,
//! sets unioned, ratios re-derived from summed counts, author tables
//! re-ranked against the combined maxima.
//!
//! Every file write is atomic: a temporary file in the target directory,
//! then a rename. A failed write is retried once after a short delay.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::classifier::ClassificationReport;
use crate::external_tools::codemaat::EvolutionReport;
use crate::external_tools::complexity::ComplexityReport;
use crate::external_tools::counter::CodeCountReport;
use crate::external_tools::vulnscan::VulnScanReport;
use crate::git::ExtractedLogs;
use crate::models::aggregates::{HistoryAggregates, RegionStats};
use crate::models::documents::*;
use crate::models::RunManifest;
use crate::ranking::{DeveloperRankings, RankingEngine, RawRow};

/// Everything the pipeline produced for one repository, immutable by the
/// time it reaches the writer.
#[derive(Debug, Default)]
pub struct RepoAnalysis {
    pub name: String,
    pub history: HistoryAggregates,
    pub classification: ClassificationReport,
    pub rankings: DeveloperRankings,
    /// Unnormalized rows kept for combined re-ranking.
    pub raw_rows: Vec<RawRow>,
    pub counter: Option<CodeCountReport>,
    pub complexity: Option<ComplexityReport>,
    pub vulnerabilities: Option<VulnScanReport>,
    pub evolution: Option<EvolutionReport>,
}

pub struct OutputWriter {
    root: PathBuf,
    /// One generation timestamp per run, shared by every document.
    generated_at: String,
}

impl OutputWriter {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            generated_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_timestamp(mut self, generated_at: &str) -> Self {
        self.generated_at = generated_at.to_string();
        self
    }

    pub fn repo_dir(&self, repo_name: &str) -> PathBuf {
        self.root.join(repo_name)
    }

    fn meta(&self, repository: &str) -> DocumentMeta {
        DocumentMeta::new(repository, &self.generated_at)
    }

    /// Write the raw extracted logs under `extractions/`.
    pub fn write_extractions(&self, repo_name: &str, logs: &ExtractedLogs) -> crate::Result<()> {
        let dir = self.repo_dir(repo_name).join("extractions");
        self.write_atomic(&dir.join("git_log_all.log"), &logs.full_history)?;
        self.write_atomic(&dir.join("git_log_stats.log"), &logs.stats)?;
        self.write_atomic(&dir.join("git_log_codemaat.txt"), &logs.evolution)?;
        Ok(())
    }

    /// Write every per-repository document.
    pub fn write_repository(&self, analysis: &RepoAnalysis) -> crate::Result<()> {
        let dir = self.repo_dir(&analysis.name);
        let name = &analysis.name;

        self.write_json(&dir.join("commit_analysis.json"), &self.commit_analysis(name, analysis))?;
        self.write_json(
            &dir.join("developer_contributions.json"),
            &self.developer_contributions(name, &analysis.history, &analysis.classification),
        )?;
        self.write_json(
            &dir.join("technology_stack.json"),
            &self.technology_stack(name, analysis),
        )?;
        self.write_json(
            &dir.join("regional_analysis.json"),
            &RegionalAnalysisDoc {
                meta: self.meta(name),
                regions: analysis.history.regions.clone(),
            },
        )?;
        self.write_json(
            &dir.join("module_ownership.json"),
            &self.module_ownership(name, &analysis.history),
        )?;
        self.write_json(&dir.join("overall_summary.json"), &self.overall_summary(name, analysis))?;
        self.write_json(
            &dir.join("developer_rankings.json"),
            &rankings_doc(self.meta(name), &analysis.rankings),
        )?;

        if let Some(report) = &analysis.vulnerabilities {
            self.write_json(
                &dir.join("vulnerabilities.json"),
                &VulnerabilitiesDoc {
                    meta: self.meta(name),
                    total_findings: report.findings.len() as u64,
                    severity_counts: report.severity_counts.clone(),
                    security_score: report.security_score,
                    findings: report.findings.clone(),
                },
            )?;
        }
        if let Some(report) = &analysis.complexity {
            self.write_json(
                &dir.join("complexity.json"),
                &ComplexityDoc {
                    meta: self.meta(name),
                    summary: report.summary.clone(),
                    files: report.files.clone(),
                    functions: report.functions.clone(),
                },
            )?;
        }
        if let Some(report) = &analysis.evolution {
            let csv_dir = dir.join("code_analysis");
            for (analysis_name, outcome) in &report.analyses {
                if let Some(table) = &outcome.table {
                    self.write_atomic(
                        &csv_dir.join(format!("{analysis_name}.csv")),
                        table.to_csv_string().as_bytes(),
                    )?;
                }
            }
        }

        debug!("wrote repository documents for {name}");
        Ok(())
    }

    /// Seal the run manifest. Called exactly once, at exit.
    pub fn write_manifest(&self, repo_name: &str, manifest: &mut RunManifest) -> crate::Result<()> {
        manifest.generated_at = self.generated_at.clone();
        self.write_json(&self.repo_dir(repo_name).join("manifest.json"), manifest)
    }

    /// Write the combined view across repositories.
    pub fn write_combined(
        &self,
        analyses: &[RepoAnalysis],
        engine: &RankingEngine,
    ) -> crate::Result<()> {
        let combined = combine(analyses, engine);
        self.write_repository(&combined)
    }

    // -- document builders --------------------------------------------------

    fn commit_analysis(&self, name: &str, analysis: &RepoAnalysis) -> CommitAnalysisDoc {
        let top_files = analysis
            .history
            .top_files(20)
            .into_iter()
            .map(|(path, file)| TopFile {
                path: path.clone(),
                revisions: file.revisions,
                churn: file.churn,
            })
            .collect();

        CommitAnalysisDoc {
            meta: self.meta(name),
            total_commits: analysis.history.total_commits,
            commits_by_month: analysis.history.commits_by_month.clone(),
            commits_by_year: analysis.history.commits_by_year.clone(),
            classification: analysis.classification.by_category.clone(),
            top_files,
        }
    }

    fn developer_contributions(
        &self,
        name: &str,
        history: &HistoryAggregates,
        classification: &ClassificationReport,
    ) -> DeveloperContributionsDoc {
        let mut developers: Vec<DeveloperContribution> = history
            .authors
            .iter()
            .map(|(email, author)| DeveloperContribution {
                name: author.name.clone(),
                email: email.clone(),
                commits: author.commits,
                lines_added: author.lines_added,
                lines_deleted: author.lines_deleted,
                files_touched: author.files_touched.len() as u64,
                first_commit: iso(author.first_seen),
                last_commit: iso(author.last_seen),
                region: author.region.clone(),
                categories: classification.by_author.get(email).cloned().unwrap_or_default(),
            })
            .collect();
        developers.sort_by(|a, b| b.commits.cmp(&a.commits).then_with(|| a.email.cmp(&b.email)));

        DeveloperContributionsDoc {
            meta: self.meta(name),
            total_developers: developers.len() as u64,
            developers,
        }
    }

    fn technology_stack(&self, name: &str, analysis: &RepoAnalysis) -> TechnologyStackDoc {
        let mut usage: BTreeMap<String, u64> = BTreeMap::new();
        let mut details: BTreeMap<String, TechnologyDetail> = BTreeMap::new();
        let mut by_category: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();

        for (tag, stats) in &analysis.history.technologies {
            usage.insert(tag.clone(), stats.files);
            details.insert(tag.clone(), TechnologyDetail { files: stats.files, lines: stats.lines });
            *by_category
                .entry(stats.category.clone())
                .or_default()
                .entry(tag.clone())
                .or_default() += stats.files;
        }

        // The counter sees the working tree, not the history; where it
        // reports a tag it is strictly finer and overrides.
        if let Some(counter) = &analysis.counter {
            for (tag, (files, lines)) in counter.by_tag() {
                usage.insert(tag.clone(), files);
                details.insert(tag.clone(), TechnologyDetail { files, lines });
            }
        }

        TechnologyStackDoc {
            meta: self.meta(name),
            overall_technology_usage: usage,
            technology_details: details,
            technology_by_category: by_category,
        }
    }

    fn module_ownership(&self, name: &str, history: &HistoryAggregates) -> ModuleOwnershipDoc {
        struct ModuleFold {
            revisions: u64,
            churn: u64,
            files_per_author: BTreeMap<String, u64>,
        }

        let mut folds: BTreeMap<String, ModuleFold> = BTreeMap::new();
        for (path, file) in &history.files {
            let module = gitscope_utils::paths::top_level_module(path).to_string();
            let fold = folds.entry(module).or_insert_with(|| ModuleFold {
                revisions: 0,
                churn: 0,
                files_per_author: BTreeMap::new(),
            });
            fold.revisions += file.revisions;
            fold.churn += file.churn;
            for email in &file.authors {
                *fold.files_per_author.entry(email.clone()).or_default() += 1;
            }
        }

        let modules = folds
            .into_iter()
            .map(|(module, fold)| {
                let owner_email = fold
                    .files_per_author
                    .iter()
                    .max_by(|(ea, ca), (eb, cb)| ca.cmp(cb).then_with(|| eb.cmp(ea)))
                    .map(|(email, _)| email.clone())
                    .unwrap_or_default();
                let owner = history
                    .authors
                    .get(&owner_email)
                    .map(|a| a.name.clone())
                    .unwrap_or(owner_email);
                let authors = fold
                    .files_per_author
                    .keys()
                    .filter_map(|email| history.authors.get(email).map(|a| a.name.clone()))
                    .collect::<BTreeSet<String>>()
                    .into_iter()
                    .collect();
                (
                    module,
                    ModuleOwnership { owner, authors, revisions: fold.revisions, churn: fold.churn },
                )
            })
            .collect();

        ModuleOwnershipDoc { meta: self.meta(name), modules }
    }

    fn overall_summary(&self, name: &str, analysis: &RepoAnalysis) -> OverallSummaryDoc {
        let history = &analysis.history;
        let (first, last) = match history.date_range() {
            Some((first, last)) => (Some(iso(first)), Some(iso(last))),
            None => (None, None),
        };

        OverallSummaryDoc {
            meta: self.meta(name),
            total_commits: history.total_commits,
            total_developers: history.authors.len() as u64,
            total_files: history.files.len() as u64,
            total_lines_added: history.authors.values().map(|a| a.lines_added).sum(),
            total_lines_deleted: history.authors.values().map(|a| a.lines_deleted).sum(),
            first_commit: first,
            last_commit: last,
            active_years: history.active_years(),
            classification: analysis.classification.by_category.clone(),
            technologies: history
                .technologies
                .iter()
                .map(|(tag, stats)| (tag.clone(), stats.files))
                .collect(),
            security_score: analysis.vulnerabilities.as_ref().map(|v| v.security_score),
        }
    }

    // -- write primitives ---------------------------------------------------

    fn write_json<T: Serialize>(&self, path: &Path, document: &T) -> crate::Result<()> {
        let mut bytes = serde_json::to_vec_pretty(document)?;
        bytes.push(b'\n');
        self.write_atomic(path, &bytes)
    }

    /// Temp file in the target directory, then rename; retried once.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> crate::Result<()> {
        match write_atomic_once(path, bytes) {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!("write of {} failed ({first}), retrying once", path.display());
                std::thread::sleep(Duration::from_millis(100));
                write_atomic_once(path, bytes)
            }
        }
    }
}

fn write_atomic_once(path: &Path, bytes: &[u8]) -> crate::Result<()> {
    use std::io::Write;

    let parent = path
        .parent()
        .ok_or_else(|| crate::Error::Config(format!("no parent directory for {}", path.display())))?;
    std::fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.persist(path)
        .map_err(|e| crate::Error::Io(e.error))?;
    Ok(())
}

fn rankings_doc(meta: DocumentMeta, rankings: &DeveloperRankings) -> DeveloperRankingsDoc {
    DeveloperRankingsDoc {
        meta,
        weights: rankings.weights.clone(),
        total_developers: rankings.entries.len() as u64,
        rankings: rankings.entries.clone(),
    }
}

fn iso(when: chrono::DateTime<chrono::Utc>) -> String {
    when.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ---------------------------------------------------------------------------
// Combined view

/// Merge per-repository analyses into the `combined` view: countable
/// fields summed, sets unioned, authors re-ranked over summed raw
/// metrics against the combined maxima.
pub fn combine(analyses: &[RepoAnalysis], engine: &RankingEngine) -> RepoAnalysis {
    let mut history = HistoryAggregates::default();
    let mut classification = ClassificationReport::default();

    for analysis in analyses {
        history.total_commits += analysis.history.total_commits;
        history.parse_errors += analysis.history.parse_errors;

        for (month, count) in &analysis.history.commits_by_month {
            *history.commits_by_month.entry(month.clone()).or_default() += count;
        }
        for (year, count) in &analysis.history.commits_by_year {
            *history.commits_by_year.entry(year.clone()).or_default() += count;
        }
        for (category, count) in &analysis.classification.by_category {
            *classification.by_category.entry(category.clone()).or_default() += count;
        }
        for (email, categories) in &analysis.classification.by_author {
            let merged = classification.by_author.entry(email.clone()).or_default();
            for (category, count) in categories {
                *merged.entry(category.clone()).or_default() += count;
            }
        }
        for (month, categories) in &analysis.classification.by_month {
            let merged = classification.by_month.entry(month.clone()).or_default();
            for (category, count) in categories {
                *merged.entry(category.clone()).or_default() += count;
            }
        }

        for (email, author) in &analysis.history.authors {
            match history.authors.get_mut(email) {
                Some(merged) => {
                    merged.commits += author.commits;
                    merged.lines_added += author.lines_added;
                    merged.lines_deleted += author.lines_deleted;
                    merged.first_seen = merged.first_seen.min(author.first_seen);
                    if author.last_seen > merged.last_seen {
                        merged.last_seen = author.last_seen;
                        merged.name = author.name.clone();
                    }
                    merged.files_touched.extend(author.files_touched.iter().cloned());
                }
                None => {
                    history.authors.insert(email.clone(), author.clone());
                }
            }
        }

        for (path, file) in &analysis.history.files {
            match history.files.get_mut(path) {
                Some(merged) => {
                    merged.revisions += file.revisions;
                    merged.churn += file.churn;
                    merged.authors.extend(file.authors.iter().cloned());
                    merged.last_touched = merged.last_touched.max(file.last_touched);
                }
                None => {
                    history.files.insert(path.clone(), file.clone());
                }
            }
        }

        for (region, stats) in &analysis.history.regions {
            let merged = history.regions.entry(region.clone()).or_insert_with(RegionStats::default);
            merged.commits += stats.commits;
            merged.lines_added += stats.lines_added;
            merged.lines_deleted += stats.lines_deleted;
        }

        for (tag, stats) in &analysis.history.technologies {
            let merged = history
                .technologies
                .entry(tag.clone())
                .or_insert_with(|| crate::models::aggregates::TechnologyStats {
                    files: 0,
                    lines: 0,
                    category: stats.category.clone(),
                });
            merged.files += stats.files;
            merged.lines += stats.lines;
        }
    }

    // Region developer counts are set cardinalities, re-derived from the
    // merged author table rather than summed.
    for stats in history.regions.values_mut() {
        stats.developers = 0;
    }
    let regions: Vec<String> = history.authors.values().map(|a| a.region.clone()).collect();
    for region in regions {
        if let Some(stats) = history.regions.get_mut(&region) {
            stats.developers += 1;
        }
    }

    let rankings = engine.rank_rows(combine_raw_rows(analyses));

    RepoAnalysis {
        name: "combined".to_string(),
        history,
        classification,
        rankings,
        raw_rows: Vec::new(),
        counter: None,
        complexity: None,
        vulnerabilities: None,
        evolution: None,
    }
}

/// Sum raw metric vectors per author across repositories. Additive
/// counters sum; recency takes the best (latest activity wins);
/// fragmentation is a commit-weighted mean.
fn combine_raw_rows(analyses: &[RepoAnalysis]) -> Vec<RawRow> {
    let mut merged: BTreeMap<String, RawRow> = BTreeMap::new();
    let mut fragmentation_weight: BTreeMap<String, (f64, u64)> = BTreeMap::new();

    for analysis in analyses {
        for row in &analysis.raw_rows {
            let frag = fragmentation_weight
                .entry(row.email.clone())
                .or_insert((0.0, 0));
            frag.0 += row.metrics.fragmentation * row.metrics.commits as f64;
            frag.1 += row.metrics.commits;

            match merged.get_mut(&row.email) {
                Some(existing) => {
                    existing.metrics.commits += row.metrics.commits;
                    existing.metrics.churn += row.metrics.churn;
                    existing.metrics.hotspot_score += row.metrics.hotspot_score;
                    existing.metrics.hotspot_files += row.metrics.hotspot_files;
                    existing.metrics.ownership += row.metrics.ownership;
                    existing.metrics.complexity += row.metrics.complexity;
                    existing.metrics.communication += row.metrics.communication;
                    existing.metrics.coupling += row.metrics.coupling;
                    existing.metrics.lines_added += row.metrics.lines_added;
                    existing.metrics.lines_deleted += row.metrics.lines_deleted;
                    existing.metrics.recency = existing.metrics.recency.max(row.metrics.recency);
                }
                None => {
                    merged.insert(row.email.clone(), row.clone());
                }
            }
        }
    }

    for (email, row) in merged.iter_mut() {
        if let Some((weighted, commits)) = fragmentation_weight.get(email) {
            row.metrics.fragmentation = if *commits > 0 { weighted / *commits as f64 } else { 0.0 };
        }
    }

    merged.into_values().collect()
}
