//! Reading the inputs of a run from the file system.

use anyhow::{Context as _, Result, anyhow, bail};
use flowmerge_core::{
    Collector, FlowRecord, MergeBatch, RoutingTable, TopologyGraph,
    loader::Loader,
    scheduler::{Received, WorkerPool, result_channel},
    topology::TopologyDocument,
};
use serde::de::DeserializeOwned;
use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Cannot parse {}", path.display()))
}

pub fn read_topology(path: &Path) -> Result<TopologyGraph> {
    let document: TopologyDocument = read_json(path)?;
    let topology = TopologyGraph::new(document)
        .with_context(|| format!("Invalid topology {}", path.display()))?;
    info!(nodes = topology.len(), path = %path.display(), "topology loaded");
    Ok(topology)
}

pub fn read_routing_table(path: &Path) -> Result<RoutingTable> {
    let table: RoutingTable = read_json(path)?;
    info!(sources = table.len(), path = %path.display(), "routing table loaded");
    Ok(table)
}

/// The flow export files of one collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorExport {
    pub collector: Collector,
    pub files: Vec<PathBuf>,
}

/// Find the collector exports of `dir`.
///
/// A `<collector>.json` file is one export; a `<collector>/` directory
/// holds an export split in several `*.json` files, read in name order.
/// Directories without any `*.json` file are skipped with a warning.
/// Exports are returned sorted by collector.
pub fn discover_exports(dir: &Path) -> Result<Vec<CollectorExport>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Cannot list flow directory {}", dir.display()))?;

    let mut exports: Vec<CollectorExport> = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Cannot list flow directory {}", dir.display()))?
            .path();

        let export = if path.is_dir() {
            let files = json_files(&path)?;
            if files.is_empty() {
                warn!(path = %path.display(), "no flow export found, collector skipped");
                continue;
            }
            let Some(name) = path.file_name() else {
                continue;
            };
            CollectorExport {
                collector: Collector::new(name.to_string_lossy()),
                files,
            }
        } else if is_json(&path) {
            let Some(stem) = path.file_stem() else {
                continue;
            };
            CollectorExport {
                collector: Collector::new(stem.to_string_lossy()),
                files: vec![path.clone()],
            }
        } else {
            debug!(path = %path.display(), "ignored");
            continue;
        };

        if let Some(existing) = exports.iter_mut().find(|e| e.collector == export.collector) {
            warn!(collector = %export.collector, "collector exported twice, files concatenated");
            existing.files.extend(export.files);
        } else {
            exports.push(export);
        }
    }

    exports.sort_by(|a, b| a.collector.cmp(&b.collector));
    Ok(exports)
}

fn is_json(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "json")
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Cannot list {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("Cannot list {}", dir.display()))?
            .path();
        if is_json(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read every record of a collector export.
pub fn read_export(export: &CollectorExport) -> Result<Vec<FlowRecord>> {
    let mut flows = Vec::new();
    for file in &export.files {
        let mut records: Vec<FlowRecord> = read_json(file)?;
        debug!(
            collector = %export.collector,
            file = %file.display(),
            flows = records.len(),
            "export read"
        );
        flows.append(&mut records);
    }
    Ok(flows)
}

/// Read and load every export on the `pool`, one task per collector.
///
/// Batches are returned in the order of `exports`. The first malformed
/// export fails the whole load.
pub fn load_all(
    exports: Vec<CollectorExport>,
    loader: Arc<Loader>,
    pool: &WorkerPool,
) -> Result<Vec<MergeBatch>> {
    let (sender, receiver) = result_channel::<(usize, Result<MergeBatch>)>();

    let count = exports.len();
    for (index, export) in exports.into_iter().enumerate() {
        let sender = sender.clone();
        let loader = Arc::clone(&loader);
        pool.execute(move || {
            info!(collector = %export.collector, "loading");
            let batch = read_export(&export)
                .with_context(|| format!("Cannot load the flows of {}", export.collector))
                .map(|flows| loader.load(export.collector, flows));
            let _ = sender.send((index, batch));
        })?;
    }
    drop(sender);

    let mut batches: Vec<Option<MergeBatch>> = vec![None; count];
    for _ in 0..count {
        match receiver.receive() {
            Received::Value((index, batch)) => batches[index] = Some(batch?),
            Received::Disconnected => bail!("Worker pool stopped before every export was loaded"),
        }
    }

    batches
        .into_iter()
        .map(|batch| batch.ok_or_else(|| anyhow!("Missing export result")))
        .collect()
}
