//! Git log extraction
//!
//! Produces the three canonical log formats with fixed argument sets and
//! stores raw bytes for downstream consumers; no parsing happens here.
//! Git being absent is the one fatal prerequisite failure in the
//! pipeline.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

/// Fixed pretty format for the full history log: marker line, then the
/// subject on its own line, then numstat lines.
const FULL_HISTORY_FORMAT: &str = "commit %H %ad %an %ae%n%s";

/// Compressed form consumed by the commit classifier.
const STATS_FORMAT: &str = "%H|%ad|%ae|%s";

/// The git2 dialect the evolution analyzer expects.
const EVOLUTION_FORMAT: &str = "--%h--%ad--%aN";

/// Raw bytes of the three extracted logs plus non-fatal warnings.
#[derive(Debug, Default)]
pub struct ExtractedLogs {
    pub full_history: Vec<u8>,
    pub stats: Vec<u8>,
    pub evolution: Vec<u8>,
    /// Non-zero git exits that still produced partial output.
    pub warnings: Vec<String>,
}

pub struct GitLogExtractor {
    repo: PathBuf,
}

impl GitLogExtractor {
    pub fn new(repo: impl AsRef<Path>) -> Self {
        Self { repo: repo.as_ref().to_path_buf() }
    }

    /// Confirm the git binary is invocable. Absence is fatal for the
    /// whole pipeline.
    pub async fn git_version() -> crate::Result<String> {
        let output = Command::new("git")
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| crate::Error::Git(format!("git binary unavailable: {e}")))?;

        if !output.status.success() {
            return Err(crate::Error::Git("git --version failed".to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Validate that the configured path is a Git working tree.
    pub async fn verify_working_tree(&self) -> crate::Result<()> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(["rev-parse", "--is-inside-work-tree"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| crate::Error::Git(format!("git binary unavailable: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() && stdout.trim() == "true" {
            Ok(())
        } else {
            Err(crate::Error::Config(format!(
                "{} is not a Git working tree",
                self.repo.display()
            )))
        }
    }

    /// Produce all three log formats, one git invocation per format.
    pub async fn extract(&self) -> crate::Result<ExtractedLogs> {
        let mut logs = ExtractedLogs::default();

        let full_args = vec![
            "log".to_string(),
            "--numstat".to_string(),
            "--date=iso-strict".to_string(),
            format!("--pretty=format:{FULL_HISTORY_FORMAT}"),
        ];
        let (bytes, warning) = self.run_log(&full_args).await?;
        logs.full_history = bytes;
        if let Some(w) = warning {
            logs.warnings.push(w);
        }

        let stats_args = vec![
            "log".to_string(),
            "--date=iso-strict".to_string(),
            format!("--pretty=format:{STATS_FORMAT}"),
        ];
        let (bytes, warning) = self.run_log(&stats_args).await?;
        logs.stats = bytes;
        if let Some(w) = warning {
            logs.warnings.push(w);
        }

        let evolution_args = vec![
            "log".to_string(),
            "--all".to_string(),
            "--numstat".to_string(),
            "--date=short".to_string(),
            format!("--pretty=format:{EVOLUTION_FORMAT}"),
        ];
        let (bytes, warning) = self.run_log(&evolution_args).await?;
        logs.evolution = bytes;
        if let Some(w) = warning {
            logs.warnings.push(w);
        }

        debug!(
            "Extracted logs: full={}B stats={}B evolution={}B",
            logs.full_history.len(),
            logs.stats.len(),
            logs.evolution.len()
        );
        Ok(logs)
    }

    /// Run one `git log` variant with the invariant argument prefix:
    /// no pager, no color, UTF-8 paths unquoted.
    async fn run_log(&self, args: &[String]) -> crate::Result<(Vec<u8>, Option<String>)> {
        let output = Command::new("git")
            .arg("--no-pager")
            .arg("-C")
            .arg(&self.repo)
            .args(["-c", "color.ui=false", "-c", "core.quotepath=false"])
            .args(args)
            .arg("--encoding=UTF-8")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| crate::Error::Git(format!("failed to spawn git: {e}")))?;

        if output.status.success() {
            return Ok((output.stdout, None));
        }

        // Partial output still flows downstream; the error is recorded.
        let stderr = String::from_utf8_lossy(&output.stderr);
        let warning = format!(
            "git log exited with {}: {}",
            output.status,
            gitscope_utils::text::tail(stderr.trim(), 512)
        );
        warn!("{warning}");
        Ok((output.stdout, Some(warning)))
    }
}
