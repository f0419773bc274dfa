//! gitscope CLI entry point
//!
//! One command: `analyze`. Parses flags, layers them over the optional
//! TOML configuration file, and hands one immutable config to the
//! pipeline controller. Exit codes: 0 success with output, 2
//! misconfiguration, 3 git unavailable, 4 global timeout before any
//! output, 5 not a Git working tree.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use gitscope_core::config::{AnalysisConfig, ConfigFile, ToolSelection};
use gitscope_core::{PipelineController, PipelineError};
use gitscope_utils::logging::{init_logging, Verbosity};

#[derive(Parser)]
#[command(name = "gitscope")]
#[command(about = "gitscope - Git repository analysis and developer ranking")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one or more Git repositories into dashboard-ready documents
    Analyze {
        /// Path to a Git working tree; repeat for a combined view
        #[arg(long, required = true)]
        repo: Vec<PathBuf>,

        /// Output root directory
        #[arg(short = 'o', long, default_value = "./results")]
        output: PathBuf,

        /// Analyzer subset (comma-separated: internal, tech-stack,
        /// code-quality, vulnerability, evolution, all)
        #[arg(long, value_delimiter = ',', default_value = "all")]
        tools: Vec<String>,

        /// Evolution analyzer jar, when not bundled
        #[arg(long)]
        jar: Option<PathBuf>,

        /// Java executable, when not on the search path
        #[arg(long)]
        java: Option<PathBuf>,

        /// Bounded-pool size for external runners and evolution sub-analyses
        #[arg(short = 'w', long, default_value_t = 5)]
        workers: usize,

        /// Force sequential execution (workers = 1)
        #[arg(long)]
        sequential: bool,

        /// Verbose (debug-level) logging
        #[arg(short = 'v', long)]
        verbose: bool,

        /// Overall wall-clock budget in seconds
        #[arg(long, value_name = "SECONDS")]
        timeout_global: Option<u64>,

        /// Disable the company-only developer filter
        #[arg(long)]
        no_company_filter: bool,

        /// TOML configuration file (weights, ignore globs, regions, policies)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            repo,
            output,
            tools,
            jar,
            java,
            workers,
            sequential,
            verbose,
            timeout_global,
            no_company_filter,
            config,
        } => {
            let verbosity = if verbose { Verbosity::Verbose } else { Verbosity::Normal };
            if let Err(e) = init_logging(verbosity) {
                eprintln!("warning: {e}");
            }

            let config = match build_config(
                repo,
                output,
                tools,
                jar,
                java,
                if sequential { 1 } else { workers },
                timeout_global,
                !no_company_filter,
                config,
            ) {
                Ok(config) => config,
                Err(e) => {
                    error!("{e}");
                    return ExitCode::from(2);
                }
            };

            match PipelineController::new(config).run().await {
                Ok(manifests) => {
                    for manifest in &manifests {
                        println!(
                            "{}: {} stages recorded, output in {}",
                            manifest.repository,
                            manifest.stages.len(),
                            manifest.output_dir
                        );
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("{e}");
                    exit_code_for(&e)
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_config(
    repos: Vec<PathBuf>,
    output: PathBuf,
    tools: Vec<String>,
    jar: Option<PathBuf>,
    java: Option<PathBuf>,
    workers: usize,
    timeout_global: Option<u64>,
    company_filter: bool,
    config_path: Option<PathBuf>,
) -> gitscope_core::Result<AnalysisConfig> {
    let mut file = match &config_path {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };
    if let Some(seconds) = timeout_global {
        file.timeouts.global_secs = seconds;
    }

    let tools = tools
        .iter()
        .map(|raw| raw.parse::<ToolSelection>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(gitscope_core::Error::Config)?;

    AnalysisConfig::from_parts(repos, output, tools, workers, jar, java, company_filter, file)
}

fn exit_code_for(error: &PipelineError) -> ExitCode {
    ExitCode::from(error.exit_code() as u8)
}
