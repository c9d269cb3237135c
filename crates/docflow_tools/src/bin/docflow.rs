#![forbid(unsafe_code)]

use clap::Parser;
use docflow_tools::cli::{execute_command, render, Cli};
use docflow_tools::config::ToolConfig;
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();
    if let Err(err) = run(Cli::parse()) {
        eprintln!("error: {err:#}");
        std::process::exit(2);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ToolConfig::load(cli.config.as_deref())?;
    let value = execute_command(&config, &cli.command)?;
    println!("{}", render(&value, cli.compact)?);
    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
