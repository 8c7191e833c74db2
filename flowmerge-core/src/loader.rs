//! Turn one collector's raw export into a [`MergeBatch`].

use crate::{Collector, FlowRecord, MergeBatch};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

/// Optional filters applied to a raw export before anything else.
///
/// All filters are empty by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderFilters {
    /// drop records with one of these destination ports
    pub exclude_ports: BTreeSet<u16>,
    /// drop records from or to one of these addresses
    pub exclude_hosts: BTreeSet<String>,
    /// drop records from or to an address starting with one of these
    /// prefixes (e.g. `"172.30."`)
    pub exclude_prefixes: Vec<String>,
}

impl LoaderFilters {
    pub fn is_empty(&self) -> bool {
        self.exclude_ports.is_empty()
            && self.exclude_hosts.is_empty()
            && self.exclude_prefixes.is_empty()
    }

    fn apply(&self, collector: &Collector, flows: &mut Vec<FlowRecord>) {
        if !self.exclude_ports.is_empty() {
            let removed = remove(flows, |flow| {
                flow.dst_port
                    .is_some_and(|port| self.exclude_ports.contains(&port))
            });
            info!(%collector, removed, "removed flows due to port");
        }

        if !self.exclude_hosts.is_empty() {
            let removed = remove(flows, |flow| {
                self.exclude_hosts.contains(&flow.src_addr)
                    || self.exclude_hosts.contains(&flow.dst_addr)
            });
            info!(%collector, removed, "removed flows due to host");
        }

        if !self.exclude_prefixes.is_empty() {
            let removed = remove(flows, |flow| {
                self.exclude_prefixes.iter().any(|prefix| {
                    flow.src_addr.starts_with(prefix.as_str())
                        || flow.dst_addr.starts_with(prefix.as_str())
                })
            });
            info!(%collector, removed, "removed flows due to address prefix");
        }
    }
}

fn remove(flows: &mut Vec<FlowRecord>, mut drop: impl FnMut(&FlowRecord) -> bool) -> usize {
    let len = flows.len();
    flows.retain(|flow| !drop(flow));
    len - flows.len()
}

/// Loads collector exports, keeping only the flows between known
/// topology endpoints.
///
/// A record is kept if its source and destination are two different
/// known addresses, and it is the first record (in total order) between
/// that unordered pair of addresses in the export. Every kept record is
/// tagged with the collector it came from.
///
/// ```
/// # use flowmerge_core::{Collector, loader::Loader};
/// let loader = Loader::new(["10.0.0.1", "10.0.0.2"]);
/// let batch = loader.load(Collector::new("ServerA"), Vec::new());
/// assert!(batch.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Loader {
    known: HashSet<String>,
    filters: LoaderFilters,
}

impl Loader {
    pub fn new<I, S>(known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: known.into_iter().map(Into::into).collect(),
            filters: LoaderFilters::default(),
        }
    }

    pub fn with_filters(mut self, filters: LoaderFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn filters(&self) -> &LoaderFilters {
        &self.filters
    }

    pub fn is_known(&self, address: &str) -> bool {
        self.known.contains(address)
    }

    pub fn load(&self, collector: Collector, mut flows: Vec<FlowRecord>) -> MergeBatch {
        let raw = flows.len();

        self.filters.apply(&collector, &mut flows);

        let mut batch: MergeBatch = flows
            .into_iter()
            .map(|flow| flow.with_collector(collector.clone()))
            .collect();

        let mut seen: HashSet<(String, String)> = HashSet::new();
        batch.retain(|flow| {
            if flow.src_addr == flow.dst_addr
                || !self.is_known(&flow.src_addr)
                || !self.is_known(&flow.dst_addr)
            {
                return false;
            }
            seen.insert(endpoints(flow))
        });

        debug!(%collector, raw, kept = batch.len(), "export filtered");
        info!(%collector, flows = batch.len(), "loaded flows");

        batch
    }
}

/// The unordered pair of addresses of a record.
fn endpoints(flow: &FlowRecord) -> (String, String) {
    if flow.src_addr <= flow.dst_addr {
        (flow.src_addr.clone(), flow.dst_addr.clone())
    } else {
        (flow.dst_addr.clone(), flow.src_addr.clone())
    }
}
