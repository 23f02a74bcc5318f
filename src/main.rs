use airq_pipeline::cli::{run, Cli};
use airq_pipeline::utils::init_logging;
use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())
        .context("failed to set up logging")?;
    run(cli).context("airq failed")
}
