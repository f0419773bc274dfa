//! Commit classification
//!
//! Classifies each commit into a fixed taxonomy by matching the subject
//! line against an ordered table of regular-expression groups. The first
//! matching group wins; the table order encodes the fixed priority
//! merge > bug > test > docs > refactor > chore > feature > other.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::CommitRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Merge,
    Bug,
    Test,
    Docs,
    Refactor,
    Chore,
    Feature,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Merge => "merge",
            Category::Bug => "bug",
            Category::Test => "test",
            Category::Docs => "docs",
            Category::Refactor => "refactor",
            Category::Chore => "chore",
            Category::Feature => "feature",
            Category::Other => "other",
        }
    }
}

/// The single pattern table: priority order, conventional-commit
/// prefixes first within each group, then keyword stems.
const RULES: &[(Category, &str)] = &[
    (Category::Merge, r"(?i)^merge\b"),
    (
        Category::Bug,
        r"(?i)^(fix|bugfix|hotfix)(\(.*\))?!?:|\bfix(es|ed)?\b|\bbug(s|fix)?\b|\bhotfix\b|\bregression\b|\bcrash\b|\brepair(s|ed)?\b",
    ),
    (
        Category::Test,
        r"(?i)^test(\(.*\))?!?:|\btests?\b|\btesting\b|\bcoverage\b",
    ),
    (
        Category::Docs,
        r"(?i)^docs?(\(.*\))?!?:|\bdocs?\b|\bdocumentation\b|\breadme\b|\bchangelog\b",
    ),
    (
        Category::Refactor,
        r"(?i)^refactor(\(.*\))?!?:|\brefactor(ing|ed)?\b|\bcleanup\b|\bclean\s+up\b|\brestructur(e|ed|ing)\b|\brework(ed)?\b|\bsimplif(y|ies|ied)\b|\brewrite\b",
    ),
    (
        Category::Chore,
        r"(?i)^(chore|build|ci|style|perf)(\(.*\))?!?:|\bbump(ed)?\b|\bupgrad(e|ed|ing)\b|\bdependenc(y|ies)\b|\brelease\b|\bformat(ting)?\b|\blint(ing)?\b",
    ),
    (
        Category::Feature,
        r"(?i)^feat(ure)?(\(.*\))?!?:|\badd(s|ed|ing)?\b|\bimplement(s|ed|ation)?\b|\bintroduc(e|es|ed)\b|\bcreat(e|es|ed)\b|\bsupport\b|\binitial\b|\bnew\b|\benabl(e|es|ed)\b",
    ),
];

/// Per-run classification aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Category → count, merge included.
    pub by_category: BTreeMap<String, u64>,
    /// Lowercased email → (category → count).
    pub by_author: BTreeMap<String, BTreeMap<String, u64>>,
    /// `YYYY-MM` → (category → count).
    pub by_month: BTreeMap<String, BTreeMap<String, u64>>,
}

pub struct CommitClassifier {
    rules: Vec<(Category, Regex)>,
}

impl Default for CommitClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitClassifier {
    pub fn new() -> Self {
        let rules = RULES
            .iter()
            .map(|(category, pattern)| {
                // The table is static; a non-compiling pattern is a
                // programming error caught by the tests below.
                (*category, Regex::new(pattern).unwrap_or_else(|e| {
                    panic!("invalid classifier pattern for {category:?}: {e}")
                }))
            })
            .collect();
        Self { rules }
    }

    /// Classify one subject line; first matching group wins.
    pub fn classify(&self, subject: &str) -> Category {
        for (category, pattern) in &self.rules {
            if pattern.is_match(subject) {
                return *category;
            }
        }
        Category::Other
    }

    /// Classify the whole record sequence and fold the aggregates.
    /// Merge commits are flagged by their opening token before pattern
    /// matching; they stay out of the feature/bug distribution.
    pub fn classify_all(&self, commits: &[CommitRecord]) -> ClassificationReport {
        let mut report = ClassificationReport::default();

        for commit in commits {
            let category = if commit.is_merge() {
                Category::Merge
            } else {
                self.classify(&commit.subject)
            };
            let label = category.as_str().to_string();
            let (_, month) = commit.bucket_keys();

            *report.by_category.entry(label.clone()).or_default() += 1;
            *report
                .by_author
                .entry(commit.email_key())
                .or_default()
                .entry(label.clone())
                .or_default() += 1;
            *report
                .by_month
                .entry(month)
                .or_default()
                .entry(label)
                .or_default() += 1;
        }

        report
    }
}
