use crate::{
    RunConfig,
    emit::{write_flows, write_json, write_sections},
    input::{discover_exports, load_all, read_routing_table, read_topology},
};
use anyhow::{Context as _, Result, bail, ensure};
use flowmerge_core::{
    Collector, DelayCache, FlowMatcher, MergeBatch, PathResolver, RoutingTable,
    loader::Loader,
    merge::WindowedMerge,
    scheduler::{WorkerPool, reduce},
};
use std::{num::NonZeroUsize, path::PathBuf, sync::Arc};
use tracing::{info, warn};

/// Everything a run needs to know.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: RunConfig,
    pub topology: PathBuf,
    /// derived from the topology if `None`
    pub routing_table: Option<PathBuf>,
    /// overrides the configured `flowDir`
    pub flows: Option<PathBuf>,
    pub output: PathBuf,
    pub sections: Option<NonZeroUsize>,
    pub write_routing_table: Option<PathBuf>,
    /// overrides the configured `workers`
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// collector exports discovered, including the ones left without flows
    pub collectors: usize,
    /// records kept by the loader, over every collector
    pub loaded: usize,
    /// records written
    pub merged: usize,
}

impl RunOptions {
    pub fn new(config: RunConfig, topology: PathBuf, output: PathBuf) -> Self {
        Self {
            config,
            topology,
            routing_table: None,
            flows: None,
            output,
            sections: None,
            write_routing_table: None,
            workers: None,
        }
    }
}

pub fn run(options: &RunOptions) -> Result<RunSummary> {
    let config = &options.config;

    let Some(flow_dir) = options.flows.as_ref().or(config.flow_dir.as_ref()) else {
        bail!("No flow directory: set `flowDir` in the configuration or pass `--flows`");
    };

    let topology = read_topology(&options.topology)?;

    let table = match &options.routing_table {
        Some(path) => read_routing_table(path)?,
        None => {
            let table = RoutingTable::derive(&topology).context("Cannot derive the routing table")?;
            info!(sources = table.len(), "routing table derived from the topology");
            table
        }
    };
    if let Some(path) = &options.write_routing_table {
        write_json(path, &table)?;
        info!(path = %path.display(), "routing table written");
    }

    let pool = match options.workers.or(config.workers) {
        Some(workers) => WorkerPool::new(workers)?,
        None => WorkerPool::with_available_parallelism()?,
    };
    info!(workers = pool.size(), "worker pool ready");

    let exports = discover_exports(flow_dir)?;
    ensure!(
        !exports.is_empty(),
        "No flow export found in {}",
        flow_dir.display()
    );

    let collectors: Vec<Collector> = exports.iter().map(|e| e.collector.clone()).collect();

    let loader = Loader::new(topology.known_addresses()).with_filters(config.filters.clone());
    let batches = load_all(exports, Arc::new(loader), &pool)?;
    let loaded: usize = batches.iter().map(MergeBatch::len).sum();
    info!(collectors = collectors.len(), flows = loaded, "flows loaded");

    // only collectors with flows left are ever compared
    let (active, batches): (Vec<Collector>, Vec<MergeBatch>) = collectors
        .iter()
        .cloned()
        .zip(batches)
        .filter(|(collector, batch)| {
            if batch.is_empty() {
                warn!(%collector, "no flow between known endpoints, collector skipped");
            }
            !batch.is_empty()
        })
        .unzip();

    let resolver = PathResolver::new(&topology, &table).with_max_hops(config.max_hops);
    let delays = DelayCache::build(&resolver, &active)
        .context("Cannot resolve the propagation delays between collectors")?;

    let merge = WindowedMerge::new(FlowMatcher::new(config.tolerances(), delays))
        .with_margin(config.search_margin);
    let merged = reduce(batches, Arc::new(merge), &pool)
        .context("Merge failed, the run needs to be rerun")?;

    write_flows(&options.output, &merged)?;
    if let Some(sections) = options.sections {
        write_sections(&options.output, &merged, sections)?;
    }

    info!(
        collectors = collectors.len(),
        loaded,
        merged = merged.len(),
        "run complete"
    );

    Ok(RunSummary {
        collectors: collectors.len(),
        loaded,
        merged: merged.len(),
    })
}
