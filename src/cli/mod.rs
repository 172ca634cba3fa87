//! CLI module for linkwatch.
//!
//! Provides argument parsing, version display and the watch session.
//!
//! ```ignore
//! use linkwatch::cli::{parse_args, run_cli_command};
//!
//! let command = parse_args(std::env::args());
//! run_cli_command(command).await?;
//! ```

pub mod args;
pub mod version;
pub mod watch;

pub use args::{parse_args, CliCommand, WatchOptions, USAGE};
pub use version::{handle_version_command, version_line, VERSION};
pub use watch::run_watch;

use color_eyre::eyre::eyre;
use color_eyre::Result;

/// Run a parsed CLI command.
///
/// `Version` never returns (it exits the process).
pub async fn run_cli_command(command: CliCommand) -> Result<()> {
    match command {
        CliCommand::Version => handle_version_command(),
        CliCommand::Help => {
            println!("{}", USAGE);
            Ok(())
        }
        CliCommand::Invalid(reason) => Err(eyre!("{}\n\n{}", reason, USAGE)),
        CliCommand::Watch(options) => run_watch(options).await,
    }
}
