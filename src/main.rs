//! tuneweaver - browse, rank and track a music catalog from the command line.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tuneweaver::cli;

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("tuneweaver=info".parse()?))
        .init();

    cli::run_command(&args)
}
