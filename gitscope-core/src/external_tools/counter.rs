//! Code counter runner
//!
//! Wraps the `scc` line counter: per-language file and line counts as a
//! JSON array. The result is folded into the technology aggregate,
//! overriding extension heuristics where the counter is strictly finer.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    run_command, AnalyzerRunner, CommandSpec, RunnerContext, RunnerDiagnostics, RunnerReport,
    RunnerStatus, ToolCapabilities, ToolKind,
};

/// One per-language row, normalized from the counter's field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageCount {
    #[serde(alias = "Name")]
    pub language: String,
    #[serde(alias = "Count")]
    pub files: u64,
    #[serde(alias = "Lines")]
    pub lines: u64,
    #[serde(alias = "Code")]
    pub code: u64,
    #[serde(alias = "Comment")]
    pub comments: u64,
    #[serde(alias = "Blank")]
    pub blanks: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeCountReport {
    pub languages: Vec<LanguageCount>,
}

impl CodeCountReport {
    /// Technology tag → (files, code lines), for the override fold.
    pub fn by_tag(&self) -> std::collections::BTreeMap<String, (u64, u64)> {
        let mut map = std::collections::BTreeMap::new();
        for row in &self.languages {
            let tag = crate::history::technology::tag_for_language_name(&row.language);
            let entry = map.entry(tag).or_insert((0, 0));
            entry.0 += row.files;
            entry.1 += row.code;
        }
        map
    }
}

pub struct CodeCounterRunner;

#[async_trait::async_trait]
impl AnalyzerRunner for CodeCounterRunner {
    type Output = CodeCountReport;

    fn tool_kind(&self) -> ToolKind {
        ToolKind::CodeCounter
    }

    fn stage_name(&self) -> &'static str {
        "tech-stack"
    }

    async fn run(
        &self,
        ctx: &RunnerContext,
        capabilities: &ToolCapabilities,
    ) -> RunnerReport<Self::Output> {
        let Some(tool) = capabilities.path(self.tool_kind()) else {
            let reason = capabilities
                .absent_reason(self.tool_kind())
                .unwrap_or_else(|| "tool not found".to_string());
            return RunnerReport::not_applicable(&reason);
        };

        let spec = CommandSpec {
            program: tool.to_path_buf(),
            args: vec![
                "--format".to_string(),
                "json".to_string(),
                ctx.repo.display().to_string(),
            ],
            cwd: None,
            timeout: std::time::Duration::from_secs(ctx.timeouts.counter_secs),
        };

        let outcome = match run_command(&spec, ctx.kill_grace()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return RunnerReport {
                    status: RunnerStatus::Failed,
                    output: None,
                    error: Some(e.to_string()),
                    duration: std::time::Duration::ZERO,
                };
            }
        };

        if let Err(e) = RunnerDiagnostics::from_outcome(&spec, &outcome).write(&ctx.output_dir, self.stage_name()) {
            debug!("could not write counter diagnostics: {e}");
        }

        if outcome.timed_out {
            return RunnerReport {
                status: RunnerStatus::TimedOut,
                output: None,
                error: Some("code counter timed out".to_string()),
                duration: outcome.duration,
            };
        }
        if !outcome.success() || outcome.stdout.is_empty() {
            return RunnerReport {
                status: RunnerStatus::Failed,
                output: None,
                error: Some(format!(
                    "code counter exited with {:?}: {}",
                    outcome.exit_code,
                    gitscope_utils::text::tail(outcome.stderr_text().trim(), 256)
                )),
                duration: outcome.duration,
            };
        }

        let parsed = serde_json::from_slice::<Vec<LanguageCount>>(&outcome.stdout)
            .context("failed to parse counter output");
        match parsed {
            Ok(languages) => {
                debug!("code counter reported {} languages", languages.len());
                RunnerReport {
                    status: RunnerStatus::Ok,
                    output: Some(CodeCountReport { languages }),
                    error: None,
                    duration: outcome.duration,
                }
            }
            Err(e) => RunnerReport {
                status: RunnerStatus::Failed,
                output: None,
                error: Some(format!("{e:#}")),
                duration: outcome.duration,
            },
        }
    }
}
