//! Complexity analyzer runner
//!
//! Wraps `lizard`: per-function cyclomatic complexity and non-comment
//! line counts in CSV form. The runner derives the summary document the
//! ranking engine consumes; per-function detail is persisted verbatim.

use std::collections::BTreeMap;

use tracing::debug;

use super::{
    run_command, AnalyzerRunner, CommandSpec, RunnerContext, RunnerDiagnostics, RunnerReport,
    RunnerStatus, ToolCapabilities, ToolKind,
};
use crate::models::documents::{
    ComplexityDistribution, ComplexitySummary, FunctionComplexity,
};

/// Parsed complexity report: summary plus detail, exactly what lands in
/// `complexity.json` minus the document header.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ComplexityReport {
    pub summary: ComplexitySummary,
    /// File → summed CCN, the ranking join input.
    pub files: BTreeMap<String, u64>,
    pub functions: Vec<FunctionComplexity>,
}

impl ComplexityReport {
    /// Build the report from parsed functions; the distribution buckets
    /// are fixed: low <=5, medium 6-10, high 11-20, very_high >20.
    pub fn from_functions(functions: Vec<FunctionComplexity>) -> Self {
        let mut distribution = ComplexityDistribution::default();
        let mut files: BTreeMap<String, u64> = BTreeMap::new();
        let mut total = 0u64;
        let mut max = 0u64;

        for function in &functions {
            total += function.ccn;
            max = max.max(function.ccn);
            *files.entry(function.file.clone()).or_default() += function.ccn;
            match function.ccn {
                0..=5 => distribution.low += 1,
                6..=10 => distribution.medium += 1,
                11..=20 => distribution.high += 1,
                _ => distribution.very_high += 1,
            }
        }

        let count = functions.len() as u64;
        let summary = ComplexitySummary {
            total_functions: count,
            total_complexity: total,
            average_complexity: if count > 0 { total as f64 / count as f64 } else { 0.0 },
            max_complexity: max,
            distribution,
        };
        Self { summary, files, functions }
    }
}

/// Parse lizard CSV rows:
/// `nloc,ccn,tokens,params,length,location,file,function,long_name,start,end`.
/// Unparseable rows are skipped, never fatal.
pub fn parse_lizard_csv(text: &str, repo_prefix: &str) -> (Vec<FunctionComplexity>, u64) {
    let mut functions = Vec::new();
    let mut skipped = 0u64;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 11 {
            skipped += 1;
            continue;
        }
        // The long-name column may itself contain commas (parameter
        // lists), so start/end are taken from the right edge.
        let (Ok(nloc), Ok(ccn), Ok(start)) = (
            fields[0].trim().parse::<u64>(),
            fields[1].trim().parse::<u64>(),
            fields[fields.len() - 2].trim().parse::<u64>(),
        ) else {
            skipped += 1;
            continue;
        };

        let file = strip_repo_prefix(fields[6].trim().trim_matches('"'), repo_prefix);
        let name = fields[7].trim().trim_matches('"').to_string();
        functions.push(FunctionComplexity {
            name,
            file,
            line: start,
            ccn,
            nloc,
        });
    }

    (functions, skipped)
}

/// Lizard reports absolute paths; documents use repository-relative ones.
fn strip_repo_prefix(path: &str, repo_prefix: &str) -> String {
    let normalized = gitscope_utils::paths::normalize_path(path);
    let prefix = gitscope_utils::paths::normalize_path(repo_prefix);
    normalized
        .strip_prefix(&prefix)
        .map(|rest| rest.trim_start_matches('/').to_string())
        .unwrap_or(normalized)
}

pub struct ComplexityRunner;

#[async_trait::async_trait]
impl AnalyzerRunner for ComplexityRunner {
    type Output = ComplexityReport;

    fn tool_kind(&self) -> ToolKind {
        ToolKind::ComplexityAnalyzer
    }

    fn stage_name(&self) -> &'static str {
        "code-quality"
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
            args: vec!["--csv".to_string(), ctx.repo.display().to_string()],
            cwd: None,
            timeout: std::time::Duration::from_secs(ctx.timeouts.complexity_secs),
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
            debug!("could not write complexity diagnostics: {e}");
        }

        if outcome.timed_out {
            return RunnerReport {
                status: RunnerStatus::TimedOut,
                output: None,
                error: Some("complexity analyzer timed out".to_string()),
                duration: outcome.duration,
            };
        }
        if !outcome.success() {
            return RunnerReport {
                status: RunnerStatus::Failed,
                output: None,
                error: Some(format!(
                    "complexity analyzer exited with {:?}: {}",
                    outcome.exit_code,
                    gitscope_utils::text::tail(outcome.stderr_text().trim(), 256)
                )),
                duration: outcome.duration,
            };
        }

        let text = String::from_utf8_lossy(&outcome.stdout);
        let (functions, skipped) = parse_lizard_csv(&text, &ctx.repo.display().to_string());
        if skipped > 0 {
            debug!("complexity parse skipped {skipped} malformed rows");
        }
        if functions.is_empty() && !text.trim().is_empty() {
            return RunnerReport {
                status: RunnerStatus::Failed,
                output: None,
                error: Some("complexity output produced no parsable functions".to_string()),
                duration: outcome.duration,
            };
        }

        RunnerReport {
            status: RunnerStatus::Ok,
            output: Some(ComplexityReport::from_functions(functions)),
            error: None,
            duration: outcome.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
12,3,80,2,12,\"parse@10-21@/work/repo/src/parser.rs\",/work/repo/src/parser.rs,parse,\"parse(input)\",10,21
40,12,300,1,40,\"fold@30-69@/work/repo/src/agg.rs\",/work/repo/src/agg.rs,fold,\"fold(rows)\",30,69
8,25,90,0,8,\"dispatch@5-12@/work/repo/src/agg.rs\",/work/repo/src/agg.rs,dispatch,\"dispatch()\",5,12
";

    #[test]
    fn test_parse_lizard_rows() {
        let (functions, skipped) = parse_lizard_csv(SAMPLE, "/work/repo");
        assert_eq!(skipped, 0);
        assert_eq!(functions.len(), 3);
        assert_eq!(functions[0].file, "src/parser.rs");
        assert_eq!(functions[0].ccn, 3);
        assert_eq!(functions[0].line, 10);
    }

    #[test]
    fn test_summary_distribution_buckets() {
        let (functions, _) = parse_lizard_csv(SAMPLE, "/work/repo");
        let report = ComplexityReport::from_functions(functions);

        assert_eq!(report.summary.total_functions, 3);
        assert_eq!(report.summary.total_complexity, 40);
        assert_eq!(report.summary.max_complexity, 25);
        assert_eq!(report.summary.distribution.low, 1);
        assert_eq!(report.summary.distribution.high, 1);
        assert_eq!(report.summary.distribution.very_high, 1);
        assert!((report.summary.average_complexity - 40.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_per_file_sums_feed_ranking_join() {
        let (functions, _) = parse_lizard_csv(SAMPLE, "/work/repo");
        let report = ComplexityReport::from_functions(functions);
        assert_eq!(report.files["src/agg.rs"], 37);
        assert_eq!(report.files["src/parser.rs"], 3);
    }

    #[test]
    fn test_malformed_rows_skipped() {
        let (functions, skipped) = parse_lizard_csv("garbage line\n1,2\n", "/r");
        assert!(functions.is_empty());
        assert_eq!(skipped, 2);
    }

    #[test]
    fn test_empty_input_yields_empty_report() {
        let report = ComplexityReport::from_functions(Vec::new());
        assert_eq!(report.summary.total_functions, 0);
        assert_eq!(report.summary.average_complexity, 0.0);
    }
}
