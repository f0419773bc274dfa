//! Derived aggregates over the commit record sequence
//!
//! All maps are `BTreeMap`/`BTreeSet` so document serialization is
//! deterministic regardless of fold order.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-author aggregate, keyed externally by lowercased email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorAggregate {
    /// Most recent non-empty display name.
    pub name: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub commits: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub files_touched: BTreeSet<String>,
    /// Inferred from the email domain; `Unknown` when unmapped.
    pub region: String,
}

impl AuthorAggregate {
    pub fn churn(&self) -> u64 {
        self.lines_added + self.lines_deleted
    }
}

/// A co-change partner of a file, from the evolution coupling table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouplingPartner {
    pub path: String,
    pub shared_revisions: u64,
    /// Percentage degree of coupling as reported by the analyzer.
    pub degree: u64,
}

/// Per-file aggregate, keyed externally by normalized path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAggregate {
    /// Number of distinct commits touching the file.
    pub revisions: u64,
    /// Cumulative added + deleted lines (binary touches contribute zero).
    pub churn: u64,
    pub authors: BTreeSet<String>,
    pub last_touched: DateTime<Utc>,
    /// Primary technology tag from the extension table.
    pub technology: String,
    /// Back-reference kept when the file arrived via rename.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<String>,
    /// Authorship spread in [0,1]; from the evolution analyzer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragmentation: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub coupling: Vec<CouplingPartner>,
    /// Age in months; from the evolution analyzer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_months: Option<u64>,
}

/// The full set of aggregates the history analyzer derives in one fold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryAggregates {
    /// Lowercased email → author aggregate.
    pub authors: BTreeMap<String, AuthorAggregate>,
    /// Normalized path → file aggregate.
    pub files: BTreeMap<String, FileAggregate>,
    /// `YYYY-MM` → commit count; every month between the first and last
    /// commit month is present, zero-filled.
    pub commits_by_month: BTreeMap<String, u64>,
    /// `YYYY` → commit count.
    pub commits_by_year: BTreeMap<String, u64>,
    /// Region → per-region rollup.
    pub regions: BTreeMap<String, RegionStats>,
    /// Technology tag → rollup.
    pub technologies: BTreeMap<String, TechnologyStats>,
    pub total_commits: u64,
    /// Malformed log lines skipped during parsing.
    pub parse_errors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionStats {
    pub developers: u64,
    pub commits: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnologyStats {
    pub files: u64,
    pub lines: u64,
    /// Grouping used by the technology-by-category document section.
    pub category: String,
}

impl HistoryAggregates {
    /// First and last commit timestamps, when any commits exist.
    pub fn date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.authors.values().map(|a| a.first_seen).min()?;
        let last = self.authors.values().map(|a| a.last_seen).max()?;
        Some((first, last))
    }

    /// Calendar-year span of activity, derived strictly from the data.
    /// `None` when the history holds no commits.
    pub fn active_years(&self) -> Option<u32> {
        use chrono::Datelike;
        let (first, last) = self.date_range()?;
        Some((last.year() - first.year() + 1).max(1) as u32)
    }

    /// Files ordered by revision count descending, path ascending.
    pub fn top_files(&self, limit: usize) -> Vec<(&String, &FileAggregate)> {
        let mut files: Vec<_> = self.files.iter().collect();
        files.sort_by(|(pa, a), (pb, b)| {
            b.revisions.cmp(&a.revisions).then_with(|| pa.cmp(pb))
        });
        files.truncate(limit);
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn author(first: i32, last: i32) -> AuthorAggregate {
        AuthorAggregate {
            name: "A".to_string(),
            first_seen: Utc.with_ymd_and_hms(first, 1, 1, 0, 0, 0).unwrap(),
            last_seen: Utc.with_ymd_and_hms(last, 6, 1, 0, 0, 0).unwrap(),
            commits: 1,
            lines_added: 0,
            lines_deleted: 0,
            files_touched: BTreeSet::new(),
            region: "Unknown".to_string(),
        }
    }

    #[test]
    fn test_active_years_from_data_endpoints() {
        let mut aggregates = HistoryAggregates::default();
        aggregates.authors.insert("a@x.com".to_string(), author(2019, 2023));
        assert_eq!(aggregates.active_years(), Some(5));
    }

    #[test]
    fn test_active_years_absent_without_commits() {
        let aggregates = HistoryAggregates::default();
        assert_eq!(aggregates.active_years(), None);
    }

    #[test]
    fn test_top_files_orders_by_revisions_then_path() {
        let mut aggregates = HistoryAggregates::default();
        let base = FileAggregate {
            revisions: 0,
            churn: 0,
            authors: BTreeSet::new(),
            last_touched: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            technology: "rust".to_string(),
            renamed_from: None,
            fragmentation: None,
            coupling: Vec::new(),
            age_months: None,
        };
        aggregates.files.insert("b.rs".to_string(), FileAggregate { revisions: 3, ..base.clone() });
        aggregates.files.insert("a.rs".to_string(), FileAggregate { revisions: 3, ..base.clone() });
        aggregates.files.insert("c.rs".to_string(), FileAggregate { revisions: 9, ..base });

        let top: Vec<&String> = aggregates.top_files(10).into_iter().map(|(p, _)| p).collect();
        assert_eq!(top, vec!["c.rs", "a.rs", "b.rs"]);
    }
}
