//! Command-line argument parsing for the linkwatch CLI.

use crate::logging::Verbosity;

/// Options for a watch session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WatchOptions {
    /// Backend base URL; falls back to `LINKWATCH_URL`, then the default
    pub url: Option<String>,
    /// Ask the backend to start linking once the engine runs
    pub connect: bool,
    /// Ask the backend to log the account out once the engine runs
    pub logout: bool,
    pub verbosity: Verbosity,
}

/// Parsed CLI command to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Show version information
    Version,
    /// Show usage
    Help,
    /// Follow the link state until interrupted (default)
    Watch(WatchOptions),
    /// Arguments could not be parsed
    Invalid(String),
}

/// Usage text printed by `--help`.
pub const USAGE: &str = "\
Usage: linkwatch [OPTIONS]

Follow the state of the messaging-account link and print every change.

Options:
      --url <URL>    Backend base URL (default: $LINKWATCH_URL or http://localhost:8000)
      --connect      Request a new link once started
      --logout       Log the linked account out once started
  -v, --verbose      Debug logging
  -q, --quiet        Errors only
  -V, --version      Print version
  -h, --help         Print this help";

/// Parse command-line arguments and return the command to run.
///
/// # Examples
///
/// ```
/// use linkwatch::cli::args::{parse_args, CliCommand};
///
/// let args = vec!["linkwatch".to_string(), "--version".to_string()];
/// assert_eq!(parse_args(args.into_iter()), CliCommand::Version);
/// ```
pub fn parse_args<I>(args: I) -> CliCommand
where
    I: Iterator<Item = String>,
{
    let mut options = WatchOptions::default();
    let mut verbose = false;
    let mut quiet = false;
    let mut args = args.skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => return CliCommand::Version,
            "--help" | "-h" => return CliCommand::Help,
            "--connect" => options.connect = true,
            "--logout" => options.logout = true,
            "--verbose" | "-v" => verbose = true,
            "--quiet" | "-q" => quiet = true,
            "--url" => match args.next() {
                Some(url) if !url.starts_with('-') => options.url = Some(url),
                _ => return CliCommand::Invalid("--url requires a value".to_string()),
            },
            other => match other.strip_prefix("--url=") {
                Some(url) if !url.is_empty() => options.url = Some(url.to_string()),
                Some(_) => return CliCommand::Invalid("--url requires a value".to_string()),
                None => return CliCommand::Invalid(format!("unknown argument: {}", other)),
            },
        }
    }

    if options.connect && options.logout {
        return CliCommand::Invalid("--connect and --logout cannot be combined".to_string());
    }

    options.verbosity = Verbosity::from_flags(verbose, quiet);
    CliCommand::Watch(options)
}
