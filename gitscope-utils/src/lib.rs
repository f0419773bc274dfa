//! Shared helpers for gitscope
//!
//! Small, dependency-light support code used by the analysis engine and
//! the CLI: logging bootstrap, path normalization, and text helpers.

pub mod logging;
pub mod paths;
pub mod text;

/// Result type used throughout gitscope utilities
pub type Result<T> = std::result::Result<T, UtilError>;

/// Error types for utility operations
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
