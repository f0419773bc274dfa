//! Commit records parsed from the full-history log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a commit touched a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One file-change entry within a commit.
///
/// A rename yields two entries sharing the `Renamed` kind: the new path
/// (carrying the churn and a `rename_from` back-reference) and the old
/// path (a zero-churn touch carrying `rename_to`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Repository-relative path, forward slashes.
    pub path: String,
    /// Lines added; zero for binary files.
    pub added: u64,
    /// Lines deleted; zero for binary files.
    pub deleted: u64,
    pub kind: ChangeKind,
    /// Numstat reported `-\t-` for this file.
    pub binary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename_to: Option<String>,
}

impl FileChange {
    pub fn churn(&self) -> u64 {
        self.added + self.deleted
    }
}

/// One commit from the extracted history, in authored-timestamp order
/// after the extractor's re-sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// 40-character hex commit identifier.
    pub id: String,
    /// Author display name, original casing.
    pub author_name: String,
    /// Author email, original casing; lowercase only for join keys.
    pub author_email: String,
    /// Authored timestamp, UTC.
    pub timestamp: DateTime<Utc>,
    /// Subject line.
    pub subject: String,
    pub changes: Vec<FileChange>,
}

impl CommitRecord {
    /// Lowercased email join key.
    pub fn email_key(&self) -> String {
        gitscope_utils::text::email_key(&self.author_email)
    }

    /// Merge commits open with the literal token `Merge`.
    pub fn is_merge(&self) -> bool {
        self.subject.starts_with("Merge ")
    }

    /// Timeline bucket keys: (`YYYY`, `YYYY-MM`).
    pub fn bucket_keys(&self) -> (String, String) {
        (
            self.timestamp.format("%Y").to_string(),
            self.timestamp.format("%Y-%m").to_string(),
        )
    }
}
