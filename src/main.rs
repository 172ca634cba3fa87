use color_eyre::Result;
use linkwatch::cli::{parse_args, run_cli_command, CliCommand};
use linkwatch::logging::{init_subscriber, Verbosity};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let command = parse_args(std::env::args());

    let verbosity = match &command {
        CliCommand::Watch(options) => options.verbosity,
        _ => Verbosity::Normal,
    };
    init_subscriber(verbosity)?;

    run_cli_command(command).await
}
