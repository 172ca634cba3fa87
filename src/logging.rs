//! Tracing subscriber setup for the `linkwatch` binary.
//!
//! Filter priority, highest first:
//!
//! 1. `LINKWATCH_LOG` (per-target directives, e.g. `linkwatch=debug,warn`)
//! 2. `RUST_LOG`
//! 3. `-v` (debug for this crate) / `-q` (errors only)
//! 4. `warn`
//!
//! Logs go to stderr so stdout stays reserved for status lines.

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Crate-specific filter variable.
pub const LOG_ENV: &str = "LINKWATCH_LOG";

/// Verbosity chosen on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    /// Verbose wins when both flags are given.
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    pub fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::DEBUG,
        }
    }
}

/// Install the global subscriber.
///
/// Returns an error if a global subscriber is already set.
pub fn init_subscriber(
    verbosity: Verbosity,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let use_ansi = std::io::IsTerminal::is_terminal(&std::io::stderr());
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(use_ansi)
        .with_target(verbosity == Verbosity::Verbose);

    tracing_subscriber::registry()
        .with(build_env_filter(verbosity))
        .with(fmt_layer.compact())
        .try_init()
}

fn build_env_filter(verbosity: Verbosity) -> EnvFilter {
    if let Ok(directives) = std::env::var(LOG_ENV) {
        if let Ok(filter) = EnvFilter::try_new(&directives) {
            return filter;
        }
    }

    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let level = verbosity.default_level();
    let directive = match verbosity {
        Verbosity::Verbose => format!("{},linkwatch=debug", Level::WARN),
        _ => level.to_string(),
    };
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}
