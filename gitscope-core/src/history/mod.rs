//! History analysis
//!
//! Parses the full-history log into the commit record backbone, then
//! folds it into the author/file/timeline/region/technology aggregates.
//! The fold is a pure function of the record sequence; the resulting
//! aggregates are immutable downstream.

pub mod parser;
pub mod regions;
pub mod technology;

use std::collections::BTreeSet;

use chrono::Datelike;
use globset::GlobSet;
use tracing::debug;

use crate::models::aggregates::{
    AuthorAggregate, FileAggregate, HistoryAggregates, RegionStats, TechnologyStats,
};
use crate::models::CommitRecord;
use regions::RegionResolver;

pub use parser::{parse_full_history, ParsedHistory};

pub struct HistoryAnalyzer {
    churn_ignore: GlobSet,
    regions: RegionResolver,
}

impl HistoryAnalyzer {
    pub fn new(churn_ignore: GlobSet, regions: RegionResolver) -> Self {
        Self { churn_ignore, regions }
    }

    /// Fold the chronological record sequence into the full aggregate set.
    pub fn analyze(&self, commits: &[CommitRecord], parse_errors: u64) -> HistoryAggregates {
        let mut aggregates = HistoryAggregates {
            parse_errors,
            ..Default::default()
        };

        for commit in commits {
            aggregates.total_commits += 1;
            self.fold_timeline(&mut aggregates, commit);
            self.fold_author(&mut aggregates, commit);
            self.fold_files(&mut aggregates, commit);
        }

        fill_missing_months(&mut aggregates.commits_by_month);
        self.derive_regions(&mut aggregates);
        derive_technologies(&mut aggregates);

        debug!(
            "History fold: {} commits, {} authors, {} files",
            aggregates.total_commits,
            aggregates.authors.len(),
            aggregates.files.len()
        );
        aggregates
    }

    fn fold_timeline(&self, aggregates: &mut HistoryAggregates, commit: &CommitRecord) {
        let (year, month) = commit.bucket_keys();
        *aggregates.commits_by_year.entry(year).or_default() += 1;
        *aggregates.commits_by_month.entry(month).or_default() += 1;
    }

    fn fold_author(&self, aggregates: &mut HistoryAggregates, commit: &CommitRecord) {
        let key = commit.email_key();
        let author = aggregates
            .authors
            .entry(key)
            .or_insert_with(|| AuthorAggregate {
                name: commit.author_name.clone(),
                first_seen: commit.timestamp,
                last_seen: commit.timestamp,
                commits: 0,
                lines_added: 0,
                lines_deleted: 0,
                files_touched: BTreeSet::new(),
                region: self.regions.region_for_email(&commit.author_email),
            });

        // Records arrive chronologically, so the latest non-empty name wins.
        if !commit.author_name.trim().is_empty() {
            author.name = commit.author_name.clone();
        }
        author.first_seen = author.first_seen.min(commit.timestamp);
        author.last_seen = author.last_seen.max(commit.timestamp);
        author.commits += 1;

        for change in &commit.changes {
            author.files_touched.insert(change.path.clone());
            if !change.binary && !self.churn_ignore.is_match(&change.path) {
                author.lines_added += change.added;
                author.lines_deleted += change.deleted;
            }
        }
    }

    fn fold_files(&self, aggregates: &mut HistoryAggregates, commit: &CommitRecord) {
        // Guard revision counts against a path listed twice in one commit.
        let mut counted: BTreeSet<&str> = BTreeSet::new();

        for change in &commit.changes {
            let file = aggregates
                .files
                .entry(change.path.clone())
                .or_insert_with(|| FileAggregate {
                    revisions: 0,
                    churn: 0,
                    authors: BTreeSet::new(),
                    last_touched: commit.timestamp,
                    technology: technology::technology_for_path(&change.path).tag.to_string(),
                    renamed_from: None,
                    fragmentation: None,
                    coupling: Vec::new(),
                    age_months: None,
                });

            if counted.insert(change.path.as_str()) {
                file.revisions += 1;
            }
            if !change.binary && !self.churn_ignore.is_match(&change.path) {
                file.churn += change.churn();
            }
            file.authors.insert(commit.email_key());
            file.last_touched = file.last_touched.max(commit.timestamp);
            if let Some(from) = &change.rename_from {
                file.renamed_from = Some(from.clone());
            }
        }
    }

    fn derive_regions(&self, aggregates: &mut HistoryAggregates) {
        for author in aggregates.authors.values() {
            let stats = aggregates
                .regions
                .entry(author.region.clone())
                .or_insert_with(RegionStats::default);
            stats.developers += 1;
            stats.commits += author.commits;
            stats.lines_added += author.lines_added;
            stats.lines_deleted += author.lines_deleted;
        }
    }
}

/// Group files by technology tag, carrying counts and cumulative lines.
fn derive_technologies(aggregates: &mut HistoryAggregates) {
    for (path, file) in &aggregates.files {
        let tag = technology::technology_for_path(path);
        let stats = aggregates
            .technologies
            .entry(file.technology.clone())
            .or_insert_with(|| TechnologyStats {
                files: 0,
                lines: 0,
                category: tag.category.to_string(),
            });
        stats.files += 1;
        stats.lines += file.churn;
    }
}

/// Ensure every month between the first and last commit month has an
/// entry, zero-filled.
fn fill_missing_months(commits_by_month: &mut std::collections::BTreeMap<String, u64>) {
    let (Some(first), Some(last)) = (
        commits_by_month.keys().next().cloned(),
        commits_by_month.keys().next_back().cloned(),
    ) else {
        return;
    };

    let (Some(mut cursor), Some(end)) = (parse_month(&first), parse_month(&last)) else {
        return;
    };

    while cursor <= end {
        let key = format!("{:04}-{:02}", cursor.0, cursor.1);
        commits_by_month.entry(key).or_insert(0);
        cursor = if cursor.1 == 12 { (cursor.0 + 1, 1) } else { (cursor.0, cursor.1 + 1) };
    }
}

fn parse_month(key: &str) -> Option<(i32, u32)> {
    let (year, month) = key.split_once('-')?;
    let year = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    (1..=12).contains(&month).then_some((year, month))
}

/// Month difference helper used by recency-style derivations.
pub fn months_between(earlier: chrono::DateTime<chrono::Utc>, later: chrono::DateTime<chrono::Utc>) -> i64 {
    let years = i64::from(later.year() - earlier.year());
    years * 12 + i64::from(later.month() as i32 - earlier.month() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalysisConfig, ConfigFile};
    use crate::models::{ChangeKind, FileChange};
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn analyzer() -> HistoryAnalyzer {
        let config = AnalysisConfig::from_parts(
            vec![std::env::temp_dir()],
            PathBuf::from("results"),
            vec![],
            1,
            None,
            None,
            false,
            ConfigFile::default(),
        )
        .unwrap();
        HistoryAnalyzer::new(config.churn_ignore_set().unwrap(), RegionResolver::default())
    }

    fn change(path: &str, added: u64, deleted: u64) -> FileChange {
        FileChange {
            path: path.to_string(),
            added,
            deleted,
            kind: ChangeKind::Modified,
            binary: false,
            rename_from: None,
            rename_to: None,
        }
    }

    fn commit(id: u8, email: &str, month: u32, changes: Vec<FileChange>) -> CommitRecord {
        CommitRecord {
            id: format!("{:040x}", id),
            author_name: "Dev".to_string(),
            author_email: email.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, month, 10, 12, 0, 0).unwrap(),
            subject: "work".to_string(),
            changes,
        }
    }

    #[test]
    fn test_author_commit_sum_equals_total() {
        let commits = vec![
            commit(1, "a@x.in", 1, vec![change("a.rs", 5, 0)]),
            commit(2, "b@y.de", 2, vec![change("b.rs", 1, 1)]),
            commit(3, "a@x.in", 3, vec![change("a.rs", 2, 2)]),
        ];
        let aggregates = analyzer().analyze(&commits, 0);

        assert_eq!(aggregates.total_commits, 3);
        let sum: u64 = aggregates.authors.values().map(|a| a.commits).sum();
        assert_eq!(sum, aggregates.total_commits);
    }

    #[test]
    fn test_monthly_timeline_is_gap_free() {
        let commits = vec![
            commit(1, "a@x.in", 1, vec![]),
            commit(2, "a@x.in", 5, vec![]),
        ];
        let aggregates = analyzer().analyze(&commits, 0);

        let months: Vec<&String> = aggregates.commits_by_month.keys().collect();
        assert_eq!(months, vec!["2024-01", "2024-02", "2024-03", "2024-04", "2024-05"]);
        assert_eq!(aggregates.commits_by_month["2024-03"], 0);
    }

    #[test]
    fn test_binary_touch_counts_revision_without_churn() {
        let binary = FileChange {
            path: "assets/logo.png".to_string(),
            added: 0,
            deleted: 0,
            kind: ChangeKind::Modified,
            binary: true,
            rename_from: None,
            rename_to: None,
        };
        let commits = vec![commit(1, "a@x.in", 1, vec![binary])];
        let aggregates = analyzer().analyze(&commits, 0);

        let file = &aggregates.files["assets/logo.png"];
        assert_eq!(file.revisions, 1);
        assert_eq!(file.churn, 0);
        assert_eq!(aggregates.authors["a@x.in"].lines_added, 0);
    }

    #[test]
    fn test_churn_ignored_paths_keep_revisions() {
        let commits = vec![commit(
            1,
            "a@x.in",
            1,
            vec![change("package-lock.json", 4000, 3000), change("src/app.js", 10, 2)],
        )];
        let aggregates = analyzer().analyze(&commits, 0);

        assert_eq!(aggregates.files["package-lock.json"].revisions, 1);
        assert_eq!(aggregates.files["package-lock.json"].churn, 0);
        assert_eq!(aggregates.authors["a@x.in"].lines_added, 10);
        assert_eq!(aggregates.authors["a@x.in"].lines_deleted, 2);
    }

    #[test]
    fn test_rename_back_reference_retained() {
        let changes = vec![
            FileChange {
                path: "new/path.js".to_string(),
                added: 3,
                deleted: 1,
                kind: ChangeKind::Renamed,
                binary: false,
                rename_from: Some("old/path.js".to_string()),
                rename_to: None,
            },
            FileChange {
                path: "old/path.js".to_string(),
                added: 0,
                deleted: 0,
                kind: ChangeKind::Renamed,
                binary: false,
                rename_from: None,
                rename_to: Some("new/path.js".to_string()),
            },
        ];
        let commits = vec![commit(1, "a@x.in", 1, changes)];
        let aggregates = analyzer().analyze(&commits, 0);

        assert_eq!(aggregates.files["new/path.js"].revisions, 1);
        assert_eq!(aggregates.files["old/path.js"].revisions, 1);
        assert_eq!(
            aggregates.files["new/path.js"].renamed_from.as_deref(),
            Some("old/path.js")
        );
    }

    #[test]
    fn test_region_rollup() {
        let commits = vec![
            commit(1, "a@firm.in", 1, vec![]),
            commit(2, "b@firm.in", 1, vec![]),
            commit(3, "c@lab.de", 1, vec![]),
        ];
        let aggregates = analyzer().analyze(&commits, 0);

        assert_eq!(aggregates.regions["India"].developers, 2);
        assert_eq!(aggregates.regions["Germany"].commits, 1);
    }

    #[test]
    fn test_technology_rollup_counts_files_and_lines() {
        let commits = vec![
            commit(1, "a@x.in", 1, vec![change("src/a.py", 10, 0), change("src/b.py", 5, 5)]),
            commit(2, "a@x.in", 2, vec![change("web/app.js", 7, 0)]),
        ];
        let aggregates = analyzer().analyze(&commits, 0);

        assert_eq!(aggregates.technologies["python"].files, 2);
        assert_eq!(aggregates.technologies["python"].lines, 20);
        assert_eq!(aggregates.technologies["javascript"].files, 1);
    }

    #[test]
    fn test_months_between() {
        let a = Utc.with_ymd_and_hms(2023, 11, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        assert_eq!(months_between(a, b), 3);
    }
}
