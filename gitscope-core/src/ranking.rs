//! Developer ranking engine
//!
//! Joins metrics from the history aggregates, the evolution analyzer
//! tables, and the complexity report into a per-developer raw vector;
//! normalizes each dimension to [0,100] against the population maximum;
//! combines via the declared weight vector; emits a ranked list carrying
//! both raw and normalized values so nothing downstream recomputes.
//!
//! Dimensions whose population maximum is zero carry no signal for this
//! run; they are dropped and the remaining weights renormalized, so the
//! emitted `weights` map always matches the weighted scores exactly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RankingWeights;
use crate::external_tools::codemaat::EvolutionReport;
use crate::external_tools::complexity::ComplexityReport;
use crate::models::aggregates::HistoryAggregates;
use crate::models::documents::{RankingEntry, RawMetrics};

/// Recency decays linearly from 100 at zero days to 0 at this age.
const RECENCY_HORIZON_DAYS: f64 = 730.0;

/// All rankable dimensions, with their raw-vector accessors. The first
/// nine are the weighted ones; the rest are reported but unweighted.
const DIMENSIONS: &[(&str, fn(&RawMetrics) -> f64)] = &[
    ("commits", |m| m.commits as f64),
    ("churn", |m| m.churn as f64),
    ("hotspot", |m| m.hotspot_score),
    ("ownership", |m| m.ownership),
    ("complexity", |m| m.complexity),
    ("communication", |m| m.communication),
    ("recency", |m| m.recency),
    ("fragmentation", |m| m.fragmentation),
    ("coupling", |m| m.coupling),
    ("hotspot_files", |m| m.hotspot_files as f64),
    ("lines_added", |m| m.lines_added as f64),
    ("lines_deleted", |m| m.lines_deleted as f64),
];

/// One unranked row of the join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub email: String,
    pub name: String,
    pub metrics: RawMetrics,
}

/// The engine's immutable result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeveloperRankings {
    /// Effective weights: zero-signal dimensions removed, the rest
    /// renormalized to sum to 1.
    pub weights: BTreeMap<String, f64>,
    pub entries: Vec<RankingEntry>,
}

pub struct RankingEngine {
    weights: RankingWeights,
    company_domains: Vec<String>,
    company_filter: bool,
}

impl RankingEngine {
    pub fn new(weights: RankingWeights, company_domains: Vec<String>, company_filter: bool) -> Self {
        Self {
            weights,
            company_domains: company_domains.into_iter().map(|d| d.to_lowercase()).collect(),
            company_filter,
        }
    }

    /// Build raw rows from the joined inputs, then rank them.
    pub fn rank(
        &self,
        history: &HistoryAggregates,
        evolution: Option<&EvolutionReport>,
        complexity: Option<&ComplexityReport>,
    ) -> DeveloperRankings {
        let rows = self.build_rows(history, evolution, complexity);
        self.rank_rows(rows)
    }

    /// Whether the company-only filter excludes this email.
    fn filtered_out(&self, email: &str) -> bool {
        if !self.company_filter || self.company_domains.is_empty() {
            return false;
        }
        match gitscope_utils::text::email_domain(email) {
            Some(domain) => !self.company_domains.contains(&domain),
            None => true,
        }
    }

    /// The join: one row per author in the (possibly filtered) population.
    pub fn build_rows(
        &self,
        history: &HistoryAggregates,
        evolution: Option<&EvolutionReport>,
        complexity: Option<&ComplexityReport>,
    ) -> Vec<RawRow> {
        let population: BTreeMap<&String, &crate::models::AuthorAggregate> = history
            .authors
            .iter()
            .filter(|(email, _)| !self.filtered_out(email))
            .collect();

        // Evolution tables key authors by display name; bridge to the
        // email join key through the latest email seen for each name.
        let name_to_email = latest_email_by_name(&population);

        let signals = EvolutionSignals::extract(history, evolution, &name_to_email);
        let complexity_by_email =
            attribute_complexity(complexity, evolution, &name_to_email);

        // Deterministic recency reference: the newest commit in the
        // population, so reruns reproduce byte-identical scores.
        let reference = population.values().map(|a| a.last_seen).max();

        let mut rows = Vec::with_capacity(population.len());
        for (email, author) in &population {
            let (hotspot_files, hotspot_score) = signals.hotspot_for(author);
            let metrics = RawMetrics {
                commits: author.commits,
                churn: author.churn(),
                hotspot_score,
                hotspot_files,
                ownership: signals.ownership.get(*email).copied().unwrap_or(0.0),
                complexity: complexity_by_email.get(*email).copied().unwrap_or(0.0),
                communication: signals.communication.get(*email).copied().unwrap_or(0.0),
                recency: recency_score(author.last_seen, reference),
                fragmentation: signals.fragmentation_for(author),
                coupling: signals.coupling.get(*email).copied().unwrap_or(0.0),
                lines_added: author.lines_added,
                lines_deleted: author.lines_deleted,
            };
            rows.push(RawRow {
                email: (*email).clone(),
                name: author.name.clone(),
                metrics,
            });
        }
        rows
    }

    /// Normalize, weight, and rank a prepared row set. The combined view
    /// re-enters here with summed raw vectors.
    pub fn rank_rows(&self, mut rows: Vec<RawRow>) -> DeveloperRankings {
        if rows.is_empty() {
            return DeveloperRankings::default();
        }

        // Per-dimension maxima over the current join population.
        let mut maxima: BTreeMap<&str, f64> = BTreeMap::new();
        for &(name, accessor) in DIMENSIONS {
            let max = rows
                .iter()
                .map(|r| accessor(&r.metrics).max(0.0))
                .fold(0.0_f64, f64::max);
            maxima.insert(name, max);
        }

        // Effective weights over dimensions that carry signal.
        let present: Vec<(&str, f64)> = self
            .weights
            .entries()
            .into_iter()
            .filter(|(name, _)| maxima.get(name).copied().unwrap_or(0.0) > 0.0)
            .collect();
        let weight_sum: f64 = present.iter().map(|(_, w)| w).sum();
        let effective: BTreeMap<String, f64> = if weight_sum > 0.0 {
            present
                .iter()
                .map(|(name, w)| (name.to_string(), w / weight_sum))
                .collect()
        } else {
            BTreeMap::new()
        };

        let mut scored: Vec<(RawRow, BTreeMap<String, f64>, f64)> = rows
            .drain(..)
            .map(|row| {
                let mut normalized = BTreeMap::new();
                for &(name, accessor) in DIMENSIONS {
                    let max = maxima[name];
                    let value = if max > 0.0 {
                        (100.0 * accessor(&row.metrics).max(0.0) / max).clamp(0.0, 100.0)
                    } else {
                        0.0
                    };
                    normalized.insert(name.to_string(), value);
                }
                let score: f64 = effective
                    .iter()
                    .map(|(name, weight)| weight * normalized[name])
                    .sum();
                (row, normalized, score)
            })
            .collect();

        // Score descending, then commit count descending, then email
        // ascending; rank is the 1-origin position.
        scored.sort_by(|(a, _, sa), (b, _, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.metrics.commits.cmp(&a.metrics.commits))
                .then_with(|| a.email.cmp(&b.email))
        });

        let entries: Vec<RankingEntry> = scored
            .into_iter()
            .enumerate()
            .map(|(idx, (row, normalized, score))| RankingEntry {
                rank: idx as u64 + 1,
                developer: row.name,
                email: row.email,
                weighted_score: score,
                metrics: row.metrics,
                normalized_scores: normalized,
            })
            .collect();

        debug!(
            "ranked {} developers over {} weighted dimensions",
            entries.len(),
            effective.len()
        );
        DeveloperRankings { weights: effective, entries }
    }
}

/// Linear recency decay: 100 at zero days, 0 at the horizon, clamped.
fn recency_score(last_seen: DateTime<Utc>, reference: Option<DateTime<Utc>>) -> f64 {
    let Some(reference) = reference else {
        return 0.0;
    };
    let age_days = (reference - last_seen).num_seconds().max(0) as f64 / 86_400.0;
    (100.0 * (1.0 - age_days / RECENCY_HORIZON_DAYS)).clamp(0.0, 100.0)
}

/// Latest email per display name across the population.
fn latest_email_by_name(
    population: &BTreeMap<&String, &crate::models::AuthorAggregate>,
) -> BTreeMap<String, String> {
    let mut best: BTreeMap<String, (DateTime<Utc>, String)> = BTreeMap::new();
    for (email, author) in population {
        let entry = best
            .entry(author.name.clone())
            .or_insert_with(|| (author.last_seen, (*email).clone()));
        if author.last_seen > entry.0 {
            *entry = (author.last_seen, (*email).clone());
        }
    }
    best.into_iter().map(|(name, (_, email))| (name, email)).collect()
}

/// Per-author signals harvested from the evolution tables.
struct EvolutionSignals {
    ownership: BTreeMap<String, f64>,
    communication: BTreeMap<String, f64>,
    coupling: BTreeMap<String, f64>,
    /// Hotspot files with their revision counts.
    hotspots: BTreeMap<String, u64>,
    /// File → fragmentation (fractal value).
    fractal: BTreeMap<String, f64>,
}

impl EvolutionSignals {
    fn extract(
        history: &HistoryAggregates,
        evolution: Option<&EvolutionReport>,
        name_to_email: &BTreeMap<String, String>,
    ) -> Self {
        let mut ownership = BTreeMap::new();
        let mut communication = BTreeMap::new();
        let mut coupling = BTreeMap::new();
        let mut fractal = BTreeMap::new();

        // Revision counts: the evolution table when available, otherwise
        // the history fold.
        let mut revisions: BTreeMap<String, u64> = history
            .files
            .iter()
            .map(|(path, file)| (path.clone(), file.revisions))
            .collect();

        if let Some(report) = evolution {
            if let Some(table) = report.table("revisions") {
                if let (Some(entity_col), Some(revs_col)) =
                    (table.column("entity"), table.column("n-revs"))
                {
                    revisions.clear();
                    for row in table.rows() {
                        if let (Some(entity), Some(revs)) = (
                            row.get(entity_col).and_then(|c| c.as_str()),
                            row.get(revs_col).and_then(|c| c.as_i64()),
                        ) {
                            revisions.insert(entity.to_string(), revs.max(0) as u64);
                        }
                    }
                }
            }

            // Ownership: author's added lines over the entity total.
            if let Some(table) = report.table("entity-ownership") {
                if let (Some(entity_col), Some(author_col), Some(added_col)) = (
                    table.column("entity"),
                    table.column("author"),
                    table.column("added"),
                ) {
                    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
                    for row in table.rows() {
                        if let (Some(entity), Some(added)) = (
                            row.get(entity_col).and_then(|c| c.as_str()),
                            row.get(added_col).and_then(|c| c.as_f64()),
                        ) {
                            *totals.entry(entity.to_string()).or_default() += added.max(0.0);
                        }
                    }
                    for row in table.rows() {
                        let (Some(entity), Some(author), Some(added)) = (
                            row.get(entity_col).and_then(|c| c.as_str()),
                            row.get(author_col).and_then(|c| c.as_str()),
                            row.get(added_col).and_then(|c| c.as_f64()),
                        ) else {
                            continue;
                        };
                        let total = totals.get(entity).copied().unwrap_or(0.0);
                        if total <= 0.0 {
                            continue;
                        }
                        if let Some(email) = name_to_email.get(author) {
                            *ownership.entry(email.clone()).or_default() += added.max(0.0) / total;
                        }
                    }
                }
            }

            // Communication: summed strength over the author's rows.
            if let Some(table) = report.table("communication") {
                if let (Some(author_col), Some(strength_col)) =
                    (table.column("author"), table.column("strength"))
                {
                    for row in table.rows() {
                        let (Some(author), Some(strength)) = (
                            row.get(author_col).and_then(|c| c.as_str()),
                            row.get(strength_col).and_then(|c| c.as_f64()),
                        ) else {
                            continue;
                        };
                        if let Some(email) = name_to_email.get(author) {
                            *communication.entry(email.clone()).or_default() += strength.max(0.0);
                        }
                    }
                }
            }

            // Coupling: sum-of-coupling attributed through the main
            // developer of each entity.
            let main_dev = main_developer_by_entity(report);
            if let Some(table) = report.table("sum-of-coupling") {
                if let (Some(entity_col), Some(soc_col)) =
                    (table.column("entity"), table.column("soc"))
                {
                    for row in table.rows() {
                        let (Some(entity), Some(soc)) = (
                            row.get(entity_col).and_then(|c| c.as_str()),
                            row.get(soc_col).and_then(|c| c.as_f64()),
                        ) else {
                            continue;
                        };
                        let Some(author) = main_dev.get(entity) else {
                            continue;
                        };
                        if let Some(email) = name_to_email.get(author) {
                            *coupling.entry(email.clone()).or_default() += soc.max(0.0);
                        }
                    }
                }
            }

            // Fragmentation per file.
            if let Some(table) = report.table("fragmentation") {
                if let (Some(entity_col), Some(fractal_col)) =
                    (table.column("entity"), table.column("fractal-value"))
                {
                    for row in table.rows() {
                        if let (Some(entity), Some(value)) = (
                            row.get(entity_col).and_then(|c| c.as_str()),
                            row.get(fractal_col).and_then(|c| c.as_f64()),
                        ) {
                            fractal.insert(entity.to_string(), value.clamp(0.0, 1.0));
                        }
                    }
                }
            }
        }

        // Hotspots: top quartile of the revision population, at least one
        // file when any exist. Tie-inclusive: every file at or above the
        // quartile boundary's revision count qualifies.
        let mut by_revisions: Vec<(&String, &u64)> = revisions.iter().collect();
        by_revisions.sort_by(|(pa, ra), (pb, rb)| rb.cmp(ra).then_with(|| pa.cmp(pb)));
        let hotspots = match by_revisions.get((by_revisions.len() / 4).max(1) - 1) {
            None => BTreeMap::new(),
            Some((_, threshold)) => {
                let threshold = **threshold;
                by_revisions
                    .into_iter()
                    .take_while(|(_, revs)| **revs >= threshold)
                    .filter(|(_, revs)| **revs > 0)
                    .map(|(path, revs)| (path.clone(), *revs))
                    .collect()
            }
        };

        Self { ownership, communication, coupling, hotspots, fractal }
    }

    /// Hotspot participation: count of hotspot files the author touched
    /// and the sum of their revision counts.
    fn hotspot_for(&self, author: &crate::models::AuthorAggregate) -> (u64, f64) {
        let mut files = 0u64;
        let mut score = 0.0;
        for path in &author.files_touched {
            if let Some(revs) = self.hotspots.get(path) {
                files += 1;
                score += *revs as f64;
            }
        }
        (files, score)
    }

    /// Mean fractal value over the files the author contributed to.
    fn fragmentation_for(&self, author: &crate::models::AuthorAggregate) -> f64 {
        let mut sum = 0.0;
        let mut count = 0u64;
        for path in &author.files_touched {
            if let Some(value) = self.fractal.get(path) {
                sum += value;
                count += 1;
            }
        }
        if count > 0 { sum / count as f64 } else { 0.0 }
    }
}

/// Entity → main developer display name, preferring the churn-based
/// table, falling back to the revision-based one.
fn main_developer_by_entity(report: &EvolutionReport) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for source in ["main-developer", "main-developer-by-revisions"] {
        let Some(table) = report.table(source) else {
            continue;
        };
        let (Some(entity_col), Some(dev_col)) =
            (table.column("entity"), table.column("main-dev"))
        else {
            continue;
        };
        for row in table.rows() {
            if let (Some(entity), Some(dev)) = (
                row.get(entity_col).and_then(|c| c.as_str()),
                row.get(dev_col).and_then(|c| c.as_str()),
            ) {
                map.entry(entity.to_string()).or_insert_with(|| dev.to_string());
            }
        }
    }
    map
}

/// Complexity attributed to an author: the summed complexity of
/// functions in files they are the main developer of.
fn attribute_complexity(
    complexity: Option<&ComplexityReport>,
    evolution: Option<&EvolutionReport>,
    name_to_email: &BTreeMap<String, String>,
) -> BTreeMap<String, f64> {
    let mut by_email: BTreeMap<String, f64> = BTreeMap::new();
    let (Some(complexity), Some(evolution)) = (complexity, evolution) else {
        return by_email;
    };
    let main_dev = main_developer_by_entity(evolution);
    for (file, ccn) in &complexity.files {
        let Some(author) = main_dev.get(file) else {
            continue;
        };
        if let Some(email) = name_to_email.get(author) {
            *by_email.entry(email.clone()).or_default() += *ccn as f64;
        }
    }
    by_email
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external_tools::codemaat::{CsvTable, SubAnalysisOutcome};
    use crate::external_tools::RunnerStatus;
    use crate::models::aggregates::{AuthorAggregate, FileAggregate};
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn engine() -> RankingEngine {
        RankingEngine::new(RankingWeights::default(), Vec::new(), false)
    }

    fn history_with(authors: Vec<(&str, &str, u64, u64, Vec<&str>)>) -> HistoryAggregates {
        let mut history = HistoryAggregates::default();
        let when = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        for (email, name, commits, added, files) in authors {
            let mut touched = BTreeSet::new();
            for path in &files {
                touched.insert(path.to_string());
                let file = history
                    .files
                    .entry(path.to_string())
                    .or_insert_with(|| FileAggregate {
                        revisions: 0,
                        churn: 0,
                        authors: BTreeSet::new(),
                        last_touched: when,
                        technology: "c".to_string(),
                        renamed_from: None,
                        fragmentation: None,
                        coupling: Vec::new(),
                        age_months: None,
                    });
                file.revisions += commits;
                file.churn += added;
                file.authors.insert(email.to_string());
            }
            history.authors.insert(
                email.to_string(),
                AuthorAggregate {
                    name: name.to_string(),
                    first_seen: when,
                    last_seen: when,
                    commits,
                    lines_added: added,
                    lines_deleted: 0,
                    files_touched: touched,
                    region: "Unknown".to_string(),
                },
            );
            history.total_commits += commits;
        }
        history
    }

    #[test]
    fn test_single_author_scores_one_hundred() {
        let history = history_with(vec![(
            "alice@example.com",
            "Alice",
            1,
            10,
            vec!["src/main.c"],
        )]);
        let rankings = engine().rank(&history, None, None);

        assert_eq!(rankings.entries.len(), 1);
        let entry = &rankings.entries[0];
        assert_eq!(entry.rank, 1);
        assert_eq!(entry.email, "alice@example.com");
        assert!((entry.weighted_score - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_tie_broken_by_email_ascending() {
        let history = history_with(vec![
            ("zoe@example.com", "Zoe", 1, 5, vec!["b.c"]),
            ("amy@example.com", "Amy", 1, 5, vec!["a.c"]),
        ]);
        let rankings = engine().rank(&history, None, None);

        assert_eq!(rankings.entries[0].email, "amy@example.com");
        assert_eq!(rankings.entries[0].rank, 1);
        assert_eq!(rankings.entries[1].email, "zoe@example.com");
        assert_eq!(rankings.entries[1].rank, 2);
        // Both are the maximum on every present dimension.
        assert!((rankings.entries[0].weighted_score - 100.0).abs() < 1e-6);
        assert!((rankings.entries[1].weighted_score - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_ranks_are_a_permutation() {
        let history = history_with(vec![
            ("a@x.com", "A", 9, 100, vec!["a.c"]),
            ("b@x.com", "B", 4, 50, vec!["b.c"]),
            ("c@x.com", "C", 1, 10, vec!["c.c"]),
        ]);
        let rankings = engine().rank(&history, None, None);

        let mut ranks: Vec<u64> = rankings.entries.iter().map(|e| e.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_weighted_score_is_dot_product_of_emitted_weights() {
        let history = history_with(vec![
            ("a@x.com", "A", 9, 100, vec!["a.c"]),
            ("b@x.com", "B", 4, 50, vec!["b.c"]),
        ]);
        let rankings = engine().rank(&history, None, None);

        for entry in &rankings.entries {
            let expected: f64 = rankings
                .weights
                .iter()
                .map(|(dim, weight)| weight * entry.normalized_scores[dim])
                .sum();
            assert!((entry.weighted_score - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_company_filter_restricts_population() {
        let engine = RankingEngine::new(
            RankingWeights::default(),
            vec!["corp.com".to_string()],
            true,
        );
        let history = history_with(vec![
            ("a@corp.com", "A", 2, 10, vec!["a.c"]),
            ("b@gmail.com", "B", 9, 90, vec!["b.c"]),
        ]);
        let rankings = engine.rank(&history, None, None);

        assert_eq!(rankings.entries.len(), 1);
        assert_eq!(rankings.entries[0].email, "a@corp.com");
    }

    fn evolution_with(tables: Vec<(&str, &str)>) -> EvolutionReport {
        let mut report = EvolutionReport::default();
        for (name, csv) in tables {
            report.analyses.insert(
                name.to_string(),
                SubAnalysisOutcome {
                    status: RunnerStatus::Ok,
                    table: Some(CsvTable::parse(csv)),
                    error: None,
                    duration_ms: 1,
                },
            );
        }
        report
    }

    #[test]
    fn test_evolution_signals_join_through_author_names() {
        let history = history_with(vec![
            ("alice@x.com", "Alice", 5, 50, vec!["src/a.c"]),
            ("bob@x.com", "Bob", 2, 20, vec!["src/b.c"]),
        ]);
        let evolution = evolution_with(vec![
            ("revisions", "entity,n-revs\nsrc/a.c,8\nsrc/b.c,1\n"),
            (
                "entity-ownership",
                "entity,author,added,deleted\nsrc/a.c,Alice,80,5\nsrc/a.c,Bob,20,1\n",
            ),
            ("communication", "author,peer,shared,strength\nAlice,Bob,4,40\nBob,Alice,4,40\n"),
            ("main-developer", "entity,main-dev,added,total-added,ownership\nsrc/a.c,Alice,80,100,0.8\n"),
            ("sum-of-coupling", "entity,soc\nsrc/a.c,12\n"),
            ("fragmentation", "entity,fractal-value,total-revs\nsrc/a.c,0.5,8\n"),
        ]);

        let rows = engine().build_rows(&history, Some(&evolution), None);
        let alice = rows.iter().find(|r| r.email == "alice@x.com").unwrap();
        assert!((alice.metrics.ownership - 0.8).abs() < 1e-9);
        assert!((alice.metrics.communication - 40.0).abs() < 1e-9);
        assert!((alice.metrics.coupling - 12.0).abs() < 1e-9);
        assert!((alice.metrics.fragmentation - 0.5).abs() < 1e-9);
        // src/a.c is the top-quartile hotspot (8 of the 2-file population).
        assert_eq!(alice.metrics.hotspot_files, 1);
        assert!((alice.metrics.hotspot_score - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_complexity_attributed_to_main_developer() {
        let history = history_with(vec![
            ("alice@x.com", "Alice", 5, 50, vec!["src/a.c"]),
            ("bob@x.com", "Bob", 2, 20, vec!["src/b.c"]),
        ]);
        let evolution = evolution_with(vec![(
            "main-developer",
            "entity,main-dev,added,total-added,ownership\nsrc/a.c,Alice,80,100,0.8\nsrc/b.c,Bob,20,20,1.0\n",
        )]);
        let mut complexity = ComplexityReport::default();
        complexity.files.insert("src/a.c".to_string(), 30);
        complexity.files.insert("src/b.c".to_string(), 7);

        let rows = engine().build_rows(&history, Some(&evolution), Some(&complexity));
        let alice = rows.iter().find(|r| r.email == "alice@x.com").unwrap();
        let bob = rows.iter().find(|r| r.email == "bob@x.com").unwrap();
        assert!((alice.metrics.complexity - 30.0).abs() < 1e-9);
        assert!((bob.metrics.complexity - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_recency_decay() {
        let reference = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!((recency_score(now, reference) - 100.0).abs() < 1e-9);

        let year_old = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let score = recency_score(year_old, reference);
        assert!(score > 49.0 && score < 51.0);

        let ancient = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(recency_score(ancient, reference), 0.0);
    }

    proptest! {
        #[test]
        fn prop_normalized_scores_bounded(commits in proptest::collection::vec(0u64..10_000, 1..20)) {
            let authors: Vec<(String, u64)> = commits
                .iter()
                .enumerate()
                .map(|(i, c)| (format!("dev{i}@x.com"), *c))
                .collect();
            let mut history = HistoryAggregates::default();
            let when = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
            for (email, commits) in &authors {
                history.authors.insert(email.clone(), AuthorAggregate {
                    name: email.clone(),
                    first_seen: when,
                    last_seen: when,
                    commits: *commits,
                    lines_added: commits * 3,
                    lines_deleted: commits * 2,
                    files_touched: BTreeSet::new(),
                    region: "Unknown".to_string(),
                });
            }
            let rankings = engine().rank(&history, None, None);

            // Ranks are a permutation of 1..N.
            let mut ranks: Vec<u64> = rankings.entries.iter().map(|e| e.rank).collect();
            ranks.sort_unstable();
            prop_assert_eq!(ranks, (1..=authors.len() as u64).collect::<Vec<_>>());

            for entry in &rankings.entries {
                // Normalization bound.
                for value in entry.normalized_scores.values() {
                    prop_assert!((0.0..=100.0).contains(value));
                }
                // Scores must match the emitted weights exactly.
                let expected: f64 = rankings
                    .weights
                    .iter()
                    .map(|(dim, w)| w * entry.normalized_scores[dim])
                    .sum();
                prop_assert!((entry.weighted_score - expected).abs() < 1e-6);
            }
        }
    }
}
