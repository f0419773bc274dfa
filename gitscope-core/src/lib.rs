//! gitscope core - Repository Analysis Engine
//!
//! This crate provides the analysis pipeline for gitscope:
//! - Git history extraction in the three canonical log formats
//! - History aggregation (authors, files, timelines, regions, technology)
//! - Commit classification
//! - External analyzer runners (code counter, complexity, vulnerability,
//!   evolution) with uniform timeout and failure semantics
//! - Developer ranking over the joined metric set
//! - Output document writing and the multi-repository combined view

pub mod classifier;
pub mod config;
pub mod external_tools;
pub mod git;
pub mod history;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod ranking;

pub use config::AnalysisConfig;
pub use models::manifest::{RunManifest, StageOutcome, StageStatus};
pub use pipeline::{PipelineController, PipelineError};

/// Result type used throughout gitscope core
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for gitscope core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Git invocation failed
    #[error("Git error: {0}")]
    Git(String),

    /// External tool error
    #[error("External tool error: {tool}: {message}")]
    ExternalTool { tool: String, message: String },

    /// Operation exceeded its time budget
    #[error("Operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Utility error
    #[error("Utility error: {0}")]
    Util(#[from] gitscope_utils::UtilError),
}
