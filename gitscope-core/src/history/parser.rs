//! Streaming parser for the full-history numstat log
//!
//! Consumes the log line-at-a-time, yields commit records, then re-sorts
//! them forward-chronologically and finalizes change kinds. Malformed
//! lines are skipped and counted; a single bad record never aborts the
//! parse.

use std::io::BufRead;

use chrono::{DateTime, Utc};

use crate::models::{ChangeKind, CommitRecord, FileChange};

/// Parse result: chronologically ordered records plus the skip counter.
#[derive(Debug, Default)]
pub struct ParsedHistory {
    pub commits: Vec<CommitRecord>,
    pub parse_errors: u64,
}

/// Parse the full-history log format: marker line
/// `commit <hex> <iso8601> <name> <email>`, subject line, then numstat
/// lines `<added>\t<deleted>\t<path>` with `-\t-\t<path>` for binaries.
pub fn parse_full_history(reader: impl BufRead) -> crate::Result<ParsedHistory> {
    let mut parsed = ParsedHistory::default();
    let mut current: Option<CommitRecord> = None;
    let mut expect_subject = false;

    for line in reader.lines() {
        let line = line?;

        // The subject line directly follows the marker and may itself
        // open with the word "commit"; consume it before marker checks.
        if expect_subject {
            if let Some(record) = current.as_mut() {
                record.subject = line.trim_end().to_string();
            }
            expect_subject = false;
            continue;
        }

        if let Some(rest) = line.strip_prefix("commit ") {
            if let Some(record) = current.take() {
                parsed.commits.push(record);
            }
            match parse_marker(rest) {
                Some(record) => {
                    current = Some(record);
                    expect_subject = true;
                }
                None => {
                    parsed.parse_errors += 1;
                }
            }
            continue;
        }

        let Some(record) = current.as_mut() else {
            if !line.trim().is_empty() {
                parsed.parse_errors += 1;
            }
            continue;
        };

        if line.trim().is_empty() {
            continue;
        }

        match parse_numstat(&line) {
            Some(changes) => record.changes.extend(changes),
            None => parsed.parse_errors += 1,
        }
    }

    if let Some(record) = current.take() {
        parsed.commits.push(record);
    }

    // The log is reverse-chronological; aggregation wants forward order.
    parsed
        .commits
        .sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    finalize_change_kinds(&mut parsed.commits);

    Ok(parsed)
}

/// Parse the remainder of a marker line: `<hex> <iso8601> <name> <email>`.
/// The email never contains spaces, so it is the final token; the name is
/// everything between the date and the email.
fn parse_marker(rest: &str) -> Option<CommitRecord> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }

    let id = tokens[0];
    if id.len() != 40 || !id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let timestamp = parse_timestamp(tokens[1])?;
    let email = tokens[tokens.len() - 1];
    let name = tokens[2..tokens.len() - 1].join(" ");

    Some(CommitRecord {
        id: id.to_string(),
        author_name: name,
        author_email: email.to_string(),
        timestamp,
        subject: String::new(),
        changes: Vec::new(),
    })
}

/// Strict-ISO dates from `--date=iso-strict` parse as RFC 3339.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse one numstat line into file-change entries. Paths with spaces are
/// delimited by the tab structure, never quoted. Renames yield two
/// entries sharing the rename flag.
fn parse_numstat(line: &str) -> Option<Vec<FileChange>> {
    let mut parts = line.splitn(3, '\t');
    let added_raw = parts.next()?;
    let deleted_raw = parts.next()?;
    let path_raw = parts.next()?.trim_end();
    if path_raw.is_empty() {
        return None;
    }

    let binary = added_raw == "-" && deleted_raw == "-";
    let (added, deleted) = if binary {
        (0, 0)
    } else {
        (added_raw.parse::<u64>().ok()?, deleted_raw.parse::<u64>().ok()?)
    };

    if let Some((old_path, new_path)) = parse_rename(path_raw) {
        return Some(vec![
            FileChange {
                path: new_path.clone(),
                added,
                deleted,
                kind: ChangeKind::Renamed,
                binary,
                rename_from: Some(old_path.clone()),
                rename_to: None,
            },
            FileChange {
                path: old_path,
                added: 0,
                deleted: 0,
                kind: ChangeKind::Renamed,
                binary,
                rename_from: None,
                rename_to: Some(new_path),
            },
        ]);
    }

    Some(vec![FileChange {
        path: gitscope_utils::paths::normalize_path(path_raw),
        added,
        deleted,
        kind: ChangeKind::Modified,
        binary,
        rename_from: None,
        rename_to: None,
    }])
}

/// Recognize the two numstat rename forms:
/// `prefix/{old => new}/suffix` and the braceless `old => new`.
fn parse_rename(path: &str) -> Option<(String, String)> {
    if let (Some(open), Some(close)) = (path.find('{'), path.rfind('}')) {
        if open < close {
            let inner = &path[open + 1..close];
            if let Some((old_part, new_part)) = inner.split_once(" => ") {
                let prefix = &path[..open];
                let suffix = &path[close + 1..];
                let old_path = collapse_separators(&format!("{prefix}{old_part}{suffix}"));
                let new_path = collapse_separators(&format!("{prefix}{new_part}{suffix}"));
                return Some((old_path, new_path));
            }
        }
    }
    path.split_once(" => ")
        .map(|(old, new)| (old.to_string(), new.to_string()))
}

/// Empty brace halves leave doubled slashes behind (`a//b`); collapse them.
fn collapse_separators(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !prev_slash {
                out.push(c);
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    out
}

/// Assign chronological change kinds: first touch of a path is `Added`; a
/// final touch with zero additions and positive deletions is `Deleted`.
/// Renames keep their kind from the parse.
fn finalize_change_kinds(commits: &mut [CommitRecord]) {
    use std::collections::{HashMap, HashSet};

    let mut seen: HashSet<String> = HashSet::new();
    let mut last_touch: HashMap<String, (usize, usize)> = HashMap::new();

    for (commit_idx, commit) in commits.iter_mut().enumerate() {
        for (change_idx, change) in commit.changes.iter_mut().enumerate() {
            if change.kind == ChangeKind::Modified && !seen.contains(&change.path) {
                change.kind = ChangeKind::Added;
            }
            seen.insert(change.path.clone());
            last_touch.insert(change.path.clone(), (commit_idx, change_idx));
        }
    }

    for (commit_idx, change_idx) in last_touch.into_values() {
        let change = &mut commits[commit_idx].changes[change_idx];
        if change.kind == ChangeKind::Modified
            && !change.binary
            && change.added == 0
            && change.deleted > 0
        {
            change.kind = ChangeKind::Deleted;
        }
    }
}
