//! Next-hop routing between the nodes of a [`TopologyGraph`] and the
//! propagation delay it implies between two collectors.

mod resolver;

pub use self::resolver::{DelayCache, PathResolver};
use crate::topology::TopologyGraph;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use thiserror::Error;

/// Errors raised while walking or deriving a [`RoutingTable`].
///
/// All of them denote a routing table that does not match the topology
/// (or a corrupt one) and are fatal for a run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// The node has no entry at all in the routing table.
    #[error("Node ({node}) Not Found in the routing table")]
    UnknownNode { node: String },
    /// The node has an entry but no next hop towards the destination.
    #[error("No next hop from ({from}) towards ({to})")]
    NoRoute { from: String, to: String },
    /// Following next hops did not reach the destination within the hop
    /// bound: the table is cyclic or corrupt.
    #[error("Path from ({from}) to ({to}) exceeds {max_hops} hops, the routing table is corrupt")]
    HopLimitExceeded {
        from: String,
        to: String,
        max_hops: usize,
    },
    /// The topology has no path between the two nodes.
    #[error("No path between ({from}) and ({to}) in the topology")]
    Disconnected { from: String, to: String },
}

/// All-pairs next-hop table: `table[from][to]` is the neighbour of
/// `from` to forward to in order to reach `to`.
///
/// Serialised as the nested JSON object `{ from: { to: next_hop } }`.
/// Node names are case-normalised (lower case) when loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoutingTable {
    table: BTreeMap<String, BTreeMap<String, String>>,
}

impl RoutingTable {
    pub fn new(table: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        let table = table
            .into_iter()
            .map(|(from, hops)| {
                let hops = hops
                    .into_iter()
                    .map(|(to, next)| (to.to_lowercase(), next.to_lowercase()))
                    .collect();
                (from.to_lowercase(), hops)
            })
            .collect();
        Self { table }
    }

    /// The next hop from `from` towards `to`.
    ///
    /// Returns `Err(RoutingError::UnknownNode)` if `from` has no entry in
    /// the table and `Err(RoutingError::NoRoute)` if the entry has no
    /// next hop for `to`.
    pub fn next_hop(&self, from: &str, to: &str) -> Result<&str, RoutingError> {
        let Some(hops) = self.table.get(from) else {
            return Err(RoutingError::UnknownNode {
                node: from.to_owned(),
            });
        };
        let Some(next) = hops.get(to) else {
            return Err(RoutingError::NoRoute {
                from: from.to_owned(),
                to: to.to_owned(),
            });
        };
        Ok(next)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn insert(&mut self, from: &str, to: &str, next: &str) {
        self.table
            .entry(from.to_owned())
            .or_default()
            .insert(to.to_owned(), next.to_owned());
    }

    /// Derive a routing table from the topology.
    ///
    /// For every ordered pair of distinct nodes a breadth-first search
    /// finds a minimum-hop path; when a node can be reached from several
    /// nodes of the same depth, the link with the largest bandwidth is
    /// preferred (first declared link on ties). Every hop of the path
    /// then records its next hop towards the destination.
    ///
    /// # Errors
    ///
    /// [`RoutingError::Disconnected`] if two nodes are not connected.
    pub fn derive(topology: &TopologyGraph) -> Result<Self, RoutingError> {
        let mut table = Self::default();

        for source in topology.nodes() {
            let parents = shortest_path_tree(topology, source.name());

            for target in topology.nodes() {
                if target.name() == source.name() {
                    continue;
                }

                let mut path = vec![target.name()];
                let mut current = target.name();
                while current != source.name() {
                    let Some(&parent) = parents.get(current) else {
                        return Err(RoutingError::Disconnected {
                            from: source.name().to_owned(),
                            to: target.name().to_owned(),
                        });
                    };
                    path.push(parent);
                    current = parent;
                }
                path.reverse();

                for hop in path.windows(2) {
                    table.insert(hop[0], target.name(), hop[1]);
                }
            }
        }

        Ok(table)
    }
}

/// breadth-first search from `source`, returning the parent of every
/// reached node (the source itself has no parent).
fn shortest_path_tree<'a>(
    topology: &'a TopologyGraph,
    source: &'a str,
) -> HashMap<&'a str, &'a str> {
    let mut depth = HashMap::from([(source, 0usize)]);
    let mut parents: HashMap<&str, &str> = HashMap::new();
    let mut queue = VecDeque::from([source]);

    while let Some(current) = queue.pop_front() {
        let current_depth = depth[current];

        for neighbour in topology.neighbours(current) {
            match depth.get(neighbour) {
                None => {
                    depth.insert(neighbour, current_depth + 1);
                    parents.insert(neighbour, current);
                    queue.push_back(neighbour);
                }
                Some(&d) if d == current_depth + 1 => {
                    let wider = |parent: &str| {
                        topology
                            .link(parent, neighbour)
                            .map(|link| link.bandwidth())
                            .unwrap_or_default()
                    };
                    if let Some(&previous) = parents.get(neighbour)
                        && wider(current) > wider(previous)
                    {
                        parents.insert(neighbour, current);
                    }
                }
                Some(_) => (),
            }
        }
    }

    parents
}

impl<'de> Deserialize<'de> for RoutingTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BTreeMap::deserialize(deserializer).map(Self::new)
    }
}
