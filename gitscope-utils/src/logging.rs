//! Logging bootstrap built on the tracing ecosystem
//!
//! The CLI initializes one global subscriber at startup; everything else
//! just uses the `tracing` macros.

use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Verbosity presets for the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    fn default_level(self) -> Level {
        match self {
            Verbosity::Quiet => Level::WARN,
            Verbosity::Normal => Level::INFO,
            Verbosity::Verbose => Level::DEBUG,
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides the preset when set. Safe to call more than once;
/// subsequent calls are no-ops (the first subscriber wins).
pub fn init_logging(verbosity: Verbosity) -> crate::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.default_level().into())
        .from_env_lossy();

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| crate::UtilError::Config(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(Verbosity::Quiet.default_level(), Level::WARN);
        assert_eq!(Verbosity::Normal.default_level(), Level::INFO);
        assert_eq!(Verbosity::Verbose.default_level(), Level::DEBUG);
    }

    #[test]
    fn test_init_is_idempotent() {
        // Second call must not panic even though a subscriber exists.
        let _ = init_logging(Verbosity::Normal);
        let _ = init_logging(Verbosity::Verbose);
    }
}
