use super::{RoutingError, RoutingTable};
use crate::{Collector, Delay, defaults::DEFAULT_MAX_HOPS, topology::TopologyGraph};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Resolves the path, and the propagation delay along it, between two
/// nodes by following the next hops of a [`RoutingTable`].
///
/// ```
/// use flowmerge_core::{routing::{PathResolver, RoutingTable}, topology::TopologyGraph};
///
/// let topology = TopologyGraph::builder()
///     .node("x", ["10.0.0.1"])
///     .node("r", Vec::<String>::new())
///     .node("y", ["10.0.0.2"])
///     .link("x", "r", "2ms".parse().unwrap())
///     .link("r", "y", "3ms".parse().unwrap())
///     .build()
///     .unwrap();
/// let table = RoutingTable::derive(&topology).unwrap();
///
/// let resolver = PathResolver::new(&topology, &table);
/// assert_eq!(resolver.path("x", "y").unwrap(), vec!["x", "r", "y"]);
/// assert_eq!(resolver.delay("x", "y").unwrap().as_micros(), 5_000);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PathResolver<'a> {
    topology: &'a TopologyGraph,
    table: &'a RoutingTable,
    max_hops: usize,
}

impl<'a> PathResolver<'a> {
    pub fn new(topology: &'a TopologyGraph, table: &'a RoutingTable) -> Self {
        Self {
            topology,
            table,
            max_hops: DEFAULT_MAX_HOPS,
        }
    }

    /// Set the maximum number of hops a path may have.
    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// The ordered list of nodes from `from` to `to`, both included.
    ///
    /// # Errors
    ///
    /// - [`RoutingError::UnknownNode`] / [`RoutingError::NoRoute`] if the
    ///   table has no next hop for a node of the walk.
    /// - [`RoutingError::HopLimitExceeded`] if `to` is not reached within
    ///   [`max_hops`](Self::max_hops) hops.
    pub fn path(&self, from: &str, to: &str) -> Result<Vec<String>, RoutingError> {
        let mut path = vec![from.to_owned()];
        let mut current = from;

        while current != to {
            if path.len() > self.max_hops {
                return Err(RoutingError::HopLimitExceeded {
                    from: from.to_owned(),
                    to: to.to_owned(),
                    max_hops: self.max_hops,
                });
            }

            current = self.table.next_hop(current, to)?;
            path.push(current.to_owned());
        }

        Ok(path)
    }

    /// The expected one-way propagation delay from `from` to `to`: the
    /// sum of the delays of the links along [`path`](Self::path).
    ///
    /// The delay between a node and itself is [`Delay::ZERO`]. A hop
    /// without a matching topology link contributes nothing.
    pub fn delay(&self, from: &str, to: &str) -> Result<Delay, RoutingError> {
        if from == to {
            return Ok(Delay::ZERO);
        }

        let path = self.path(from, to)?;
        let delay = path
            .windows(2)
            .map(|hop| match self.topology.link(&hop[0], &hop[1]) {
                Some(link) => link.delay(),
                None => {
                    warn!(from = %hop[0], to = %hop[1], "routing hop has no topology link");
                    Delay::ZERO
                }
            })
            .sum();

        Ok(delay)
    }
}

/// Propagation delays between every ordered pair of collectors of a
/// run.
///
/// The routing table is static for a run, so every pair is resolved once
/// up front; merges then only read the cache and can share it between
/// threads.
#[derive(Debug, Clone, Default)]
pub struct DelayCache {
    delays: HashMap<Collector, HashMap<Collector, Delay>>,
}

impl DelayCache {
    /// Resolve the delay of every ordered pair of `collectors`.
    ///
    /// # Errors
    ///
    /// The first [`RoutingError`] met; a corrupt routing table aborts the
    /// run.
    pub fn build<'c, I>(resolver: &PathResolver<'_>, collectors: I) -> Result<Self, RoutingError>
    where
        I: IntoIterator<Item = &'c Collector>,
    {
        let mut collectors: Vec<&Collector> = collectors.into_iter().collect();
        collectors.sort();
        collectors.dedup();

        let mut cache = Self::default();
        for from in &collectors {
            for to in &collectors {
                let delay = resolver.delay(from.as_str(), to.as_str())?;
                debug!(%from, %to, %delay, "resolved propagation delay");
                cache.insert((*from).clone(), (*to).clone(), delay);
            }
        }

        Ok(cache)
    }

    pub fn insert(&mut self, from: Collector, to: Collector, delay: Delay) {
        self.delays.entry(from).or_default().insert(to, delay);
    }

    /// The delay from `from` to `to`; always [`Delay::ZERO`] when both
    /// are the same collector.
    pub fn get(&self, from: &Collector, to: &Collector) -> Option<Delay> {
        if from == to {
            return Some(Delay::ZERO);
        }
        self.delays.get(from.as_str())?.get(to.as_str()).copied()
    }

    pub fn len(&self) -> usize {
        self.delays.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn ms(millis: f64) -> Delay {
        Delay::from_millis_f64(millis).unwrap()
    }

    /// x - r1 - r2 - y with delays 1ms, 1.5ms, 2.5ms
    fn topology() -> TopologyGraph {
        TopologyGraph::builder()
            .node("x", ["10.0.0.1"])
            .node("r1", Vec::<String>::new())
            .node("r2", Vec::<String>::new())
            .node("y", ["10.0.0.2"])
            .link("x", "r1", ms(1.0))
            .link("r2", "r1", ms(1.5))
            .link("y", "r2", ms(2.5))
            .build()
            .unwrap()
    }

    fn table(entries: &[(&str, &str, &str)]) -> RoutingTable {
        let mut map: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (from, to, next) in entries {
            map.entry(from.to_string())
                .or_default()
                .insert(to.to_string(), next.to_string());
        }
        RoutingTable::new(map)
    }

    #[test]
    fn same_node_is_zero() {
        let topology = topology();
        let table = RoutingTable::default();
        let resolver = PathResolver::new(&topology, &table);

        assert_eq!(resolver.delay("x", "x"), Ok(Delay::ZERO));
        assert_eq!(resolver.path("x", "x").unwrap(), vec!["x"]);
    }

    #[test]
    fn sums_links_in_either_direction() {
        let topology = topology();
        let table = RoutingTable::derive(&topology).unwrap();
        let resolver = PathResolver::new(&topology, &table);

        assert_eq!(resolver.path("x", "y").unwrap(), vec!["x", "r1", "r2", "y"]);
        assert_eq!(resolver.delay("x", "y"), Ok(ms(5.0)));
        assert_eq!(resolver.delay("y", "x"), Ok(ms(5.0)));
        assert_eq!(resolver.delay("r1", "y"), Ok(ms(4.0)));
    }

    #[test]
    fn cyclic_table_exceeds_hop_bound() {
        let topology = topology();
        // r1 and r2 bounce packets for y between each other
        let table = table(&[("x", "y", "r1"), ("r1", "y", "r2"), ("r2", "y", "r1")]);
        let resolver = PathResolver::new(&topology, &table);
        assert_eq!(resolver.max_hops(), DEFAULT_MAX_HOPS);

        let err = resolver.delay("x", "y").unwrap_err();
        assert_eq!(
            err,
            RoutingError::HopLimitExceeded {
                from: "x".to_owned(),
                to: "y".to_owned(),
                max_hops: DEFAULT_MAX_HOPS,
            }
        );
    }

    #[test]
    fn hop_bound_is_inclusive() {
        let topology = topology();
        let table = RoutingTable::derive(&topology).unwrap();

        let resolver = PathResolver::new(&topology, &table).with_max_hops(3);
        assert_eq!(resolver.max_hops(), 3);
        assert!(resolver.path("x", "y").is_ok());

        let resolver = resolver.with_max_hops(2);
        assert!(matches!(
            resolver.path("x", "y"),
            Err(RoutingError::HopLimitExceeded { max_hops: 2, .. })
        ));
    }

    #[test]
    fn missing_next_hop() {
        let topology = topology();
        let table = table(&[("x", "y", "r1")]);
        let resolver = PathResolver::new(&topology, &table);

        assert_eq!(
            resolver.path("x", "y"),
            Err(RoutingError::UnknownNode { node: "r1".to_owned() })
        );
    }

    #[test]
    fn hop_without_link_adds_nothing() {
        let topology = topology();
        // x forwards straight to r2 although they are not linked
        let table = table(&[("x", "y", "r2"), ("r2", "y", "y")]);
        let resolver = PathResolver::new(&topology, &table);

        assert_eq!(resolver.delay("x", "y"), Ok(ms(2.5)));
    }

    #[test]
    fn cache_all_pairs() {
        let topology = topology();
        let table = RoutingTable::derive(&topology).unwrap();
        let resolver = PathResolver::new(&topology, &table);
        let x = Collector::new("x");
        let y = Collector::new("y");

        let cache = DelayCache::build(&resolver, [&x, &y, &x]).unwrap();

        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get(&x, &y), Some(ms(5.0)));
        assert_eq!(cache.get(&y, &x), Some(ms(5.0)));
        assert_eq!(cache.get(&x, &x), Some(Delay::ZERO));
        assert_eq!(cache.get(&x, &Collector::new("z")), None);
        assert_eq!(
            cache.get(&Collector::new("z"), &Collector::new("z")),
            Some(Delay::ZERO)
        );
    }

    #[test]
    fn cache_fails_on_corrupt_table() {
        let topology = topology();
        let table = table(&[("x", "y", "r1"), ("r1", "y", "x"), ("y", "x", "r2")]);
        let resolver = PathResolver::new(&topology, &table);
        let x = Collector::new("x");
        let y = Collector::new("y");

        assert!(DelayCache::build(&resolver, [&x, &y]).is_err());
    }
}
