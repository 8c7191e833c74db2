//! The simulated network: named nodes connected by undirected links.
//!
//! A [`TopologyGraph`] is built once per run, either from the JSON
//! topology document ([`TopologyDocument`]) or programmatically with a
//! [`TopologyBuilder`], and is read-only afterwards.

mod link;

pub use self::link::{Bandwidth, Link, LinkId};
use crate::delay::Delay;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, hash_map::Entry};
use thiserror::Error;
use tracing::warn;

/// The topology document as written by the topology reader
/// (`netconfig.json`).
///
/// Fields other than `nodes` and `links` (region information, ...) are
/// ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyDocument {
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default)]
    pub networks: Vec<NetworkSpec>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// An address of a node on one of its networks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSpec {
    #[serde(default)]
    pub name: String,
    pub ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSpec {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub bandwidth: Bandwidth,
    pub delay: Delay,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Node ({name}) is declared more than once")]
    DuplicateNode { name: String },
    #[error("Link ({from} <-> {to}) refers to an undeclared node ({missing})")]
    UnknownNode {
        from: String,
        to: String,
        missing: String,
    },
    #[error("Link ({name} <-> {name}) connects a node to itself")]
    SelfLink { name: String },
}

/// A node of the topology and the addresses it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    addresses: Vec<String>,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }
}

/// Static graph of named nodes and undirected, delayed links.
///
/// Node names are case-normalised (lower case), like collector
/// identities.
///
/// ```
/// use flowmerge_core::{topology::TopologyGraph, Delay};
///
/// let topology = TopologyGraph::builder()
///     .node("a", ["10.0.0.1"])
///     .node("b", ["10.0.0.2"])
///     .link("a", "b", "5ms".parse::<Delay>().unwrap())
///     .build()
///     .unwrap();
///
/// assert_eq!(topology.link("b", "a").unwrap().delay().as_micros(), 5_000);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    nodes: BTreeMap<String, Node>,
    /// declaration order of the nodes
    order: Vec<String>,
    links: HashMap<LinkId, Link>,
    /// neighbours of every node, in link declaration order
    adjacency: BTreeMap<String, Vec<String>>,
}

/// Builder for a [`TopologyGraph`].
///
/// Obtained via [`TopologyGraph::builder`]. Declare nodes, then the links
/// between them, then call [`build`](TopologyBuilder::build).
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    document: TopologyDocument,
}

impl TopologyBuilder {
    /// Declare a node owning the given addresses.
    pub fn node<I, S>(mut self, name: &str, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document.nodes.push(NodeSpec {
            name: name.to_owned(),
            networks: addresses
                .into_iter()
                .map(|ip| NetworkSpec {
                    name: String::new(),
                    ip: ip.into(),
                })
                .collect(),
            kind: None,
        });
        self
    }

    /// Connect two declared nodes.
    pub fn link(self, a: &str, b: &str, delay: Delay) -> Self {
        self.link_with_bandwidth(a, b, delay, Bandwidth::default())
    }

    pub fn link_with_bandwidth(
        mut self,
        a: &str,
        b: &str,
        delay: Delay,
        bandwidth: Bandwidth,
    ) -> Self {
        self.document.links.push(LinkSpec {
            source: a.to_owned(),
            target: b.to_owned(),
            bandwidth,
            delay,
        });
        self
    }

    pub fn build(self) -> Result<TopologyGraph, TopologyError> {
        TopologyGraph::new(self.document)
    }
}

impl TopologyGraph {
    pub fn builder() -> TopologyBuilder {
        TopologyBuilder::default()
    }

    /// Validate the document and build the graph.
    ///
    /// # Errors
    ///
    /// - [`TopologyError::DuplicateNode`] if two nodes share a name.
    /// - [`TopologyError::UnknownNode`] if a link refers to a node that
    ///   is not declared.
    /// - [`TopologyError::SelfLink`] if a link connects a node to itself.
    ///
    /// Links declared more than once between the same two nodes are
    /// folded into one: their delays add up and the widest bandwidth is
    /// kept.
    pub fn new(document: TopologyDocument) -> Result<Self, TopologyError> {
        let mut graph = Self::default();

        for spec in document.nodes {
            let name = spec.name.to_lowercase();
            if graph.nodes.contains_key(&name) {
                return Err(TopologyError::DuplicateNode { name });
            }
            let addresses = spec.networks.into_iter().map(|network| network.ip).collect();
            graph.order.push(name.clone());
            graph.adjacency.insert(name.clone(), Vec::new());
            graph.nodes.insert(name.clone(), Node { name, addresses });
        }

        for spec in document.links {
            let source = spec.source.to_lowercase();
            let target = spec.target.to_lowercase();

            for end in [&source, &target] {
                if !graph.nodes.contains_key(end) {
                    return Err(TopologyError::UnknownNode {
                        from: source.clone(),
                        to: target.clone(),
                        missing: end.clone(),
                    });
                }
            }
            if source == target {
                return Err(TopologyError::SelfLink { name: source });
            }

            let id = LinkId::new((source.as_str(), target.as_str()));
            match graph.links.entry(id) {
                Entry::Occupied(mut entry) => {
                    let previous = entry.get();
                    let folded = Link::new(
                        previous.delay() + spec.delay,
                        previous.bandwidth().max(spec.bandwidth),
                    );
                    warn!(
                        id = %entry.key(),
                        delay = %folded.delay(),
                        "link declared more than once, delays summed"
                    );
                    entry.insert(folded);
                }
                Entry::Vacant(entry) => {
                    entry.insert(Link::new(spec.delay, spec.bandwidth));
                    graph
                        .adjacency
                        .entry(source.clone())
                        .or_default()
                        .push(target.clone());
                    graph.adjacency.entry(target).or_default().push(source);
                }
            }
        }

        Ok(graph)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|name| self.nodes.get(name))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The link between `a` and `b`, in either direction.
    pub fn link(&self, a: &str, b: &str) -> Option<&Link> {
        self.links.get(&LinkId::new((a, b)))
    }

    /// Neighbours of `name` in link declaration order.
    pub fn neighbours(&self, name: &str) -> impl Iterator<Item = &str> {
        self.adjacency
            .get(name)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Every address owned by a node of the topology, in declaration
    /// order, without duplicates.
    ///
    /// These are the addresses the loader keeps flows for.
    pub fn known_addresses(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.nodes()
            .flat_map(|node| node.addresses.iter())
            .filter(|address| seen.insert(address.as_str()))
            .cloned()
            .collect()
    }
}
