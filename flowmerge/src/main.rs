use anyhow::{Context as _, Result};
use clap::Parser;
use flowmerge::{RunConfig, RunOptions, run};
use std::{io::IsTerminal as _, num::NonZeroUsize, path::PathBuf};
use tracing_subscriber::EnvFilter;

/// Merge the flow exports of every collector into one deduplicated
/// dataset.
#[derive(Parser)]
#[command(version, about)]
struct Command {
    /// run configuration (`maxPacketLoss`, `maxTimeDifference`, ...)
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// topology document
    #[arg(long, default_value = "netconfig.json")]
    topology: PathBuf,

    /// routing table, derived from the topology when omitted
    #[arg(long)]
    routing_table: Option<PathBuf>,

    /// directory of the collector exports, overrides `flowDir`
    #[arg(long)]
    flows: Option<PathBuf>,

    #[arg(long, default_value = "flowData.json")]
    output: PathBuf,

    /// also split the output in N time sections
    #[arg(long)]
    sections: Option<NonZeroUsize>,

    /// write the routing table used by the run
    #[arg(long)]
    write_routing_table: Option<PathBuf>,

    /// number of worker threads, overrides `workers`
    #[arg(long)]
    workers: Option<usize>,

    /// log filter, overrides `RUST_LOG`
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cmd = Command::parse();

    let filter = match &cmd.log_level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_level(true)
        .with_line_number(true)
        .init();

    let config = RunConfig::load(&cmd.config)
        .with_context(|| format!("Cannot load {}", cmd.config.display()))?;

    let options = RunOptions {
        config,
        topology: cmd.topology,
        routing_table: cmd.routing_table,
        flows: cmd.flows,
        output: cmd.output,
        sections: cmd.sections,
        write_routing_table: cmd.write_routing_table,
        workers: cmd.workers,
    };

    let summary = run(&options)?;
    println!("{}", summary.merged);

    Ok(())
}
