use flowmerge_core::{
    Collector, Delay, DelayCache, FlowMatcher, FlowRecord, MergeBatch, Timestamp, Tolerances,
    loader::Loader,
    merge::WindowedMerge,
    routing::{PathResolver, RoutingTable},
    scheduler::{WorkerPool, reduce},
    topology::TopologyGraph,
};
use rand_chacha::ChaChaRng;
use rand_core::{Rng as _, SeedableRng as _};
use std::{collections::BTreeMap, sync::Arc};

const COLLECTORS: [&str; 3] = ["x", "y", "z"];

/// distance of each collector from the source of every flow
const OFFSET_MS: [i64; 3] = [0, 5, 12];

fn ms(millis: u64) -> Delay {
    Delay::from_millis_f64(millis as f64).unwrap()
}

/// x --5ms-- y --7ms-- z
fn topology() -> TopologyGraph {
    TopologyGraph::builder()
        .node("x", ["10.0.0.1"])
        .node("y", ["10.0.0.2"])
        .node("z", ["10.0.0.3"])
        .link("x", "y", ms(5))
        .link("y", "z", ms(7))
        .build()
        .unwrap()
}

fn windowed() -> WindowedMerge {
    let topology = topology();
    let table = RoutingTable::derive(&topology).unwrap();
    let resolver = PathResolver::new(&topology, &table);
    let collectors: Vec<Collector> = COLLECTORS.iter().map(Collector::new).collect();
    let delays = DelayCache::build(&resolver, &collectors).unwrap();

    WindowedMerge::new(FlowMatcher::new(Tolerances::new(5, 5), delays))
}

fn record(id: u16, t_first: i64, duration: i64, packets: u64, collector: &str) -> FlowRecord {
    FlowRecord {
        src_addr: "10.0.0.1".to_owned(),
        dst_addr: "10.0.0.3".to_owned(),
        protocol: 17,
        src_port: Some(id),
        dst_port: Some(53),
        t_first: Timestamp::from_micros(t_first),
        t_last: Timestamp::from_micros(t_first + duration),
        in_packets: packets,
        in_bytes: packets * 64,
        collector: Some(Collector::new(collector)),
        extra: Default::default(),
    }
}

fn jitter(rng: &mut ChaChaRng, max_micros: u64) -> i64 {
    (rng.next_u64() % (2 * max_micros + 1)) as i64 - max_micros as i64
}

/// `flows` physical flows, one second apart, each observed by a random
/// non-empty subset of the collectors. Returns one batch per collector.
fn observations(seed: u64, flows: u16) -> Vec<MergeBatch> {
    let mut rng = ChaChaRng::seed_from_u64(seed);
    let mut per_collector: Vec<Vec<FlowRecord>> = vec![Vec::new(); COLLECTORS.len()];

    for id in 0..flows {
        let start = 1_000_000 * (i64::from(id) + 1);
        let duration = 1_000 + (rng.next_u64() % 500_000) as i64;
        let packets = 10 + rng.next_u64() % 1_000;

        let mut observers = (rng.next_u64() % 7) + 1;
        for (index, collector) in COLLECTORS.iter().enumerate() {
            if observers & 1 == 1 {
                let t_first = start + OFFSET_MS[index] * 1_000 + jitter(&mut rng, 2_000);
                let lost = rng.next_u64() % 3;
                per_collector[index].push(record(id, t_first, duration, packets - lost, collector));
            }
            observers >>= 1;
        }
    }

    per_collector.into_iter().map(MergeBatch::new).collect()
}

fn flows_per_id(batch: &MergeBatch) -> BTreeMap<u16, usize> {
    let mut ids = BTreeMap::new();
    for flow in batch {
        *ids.entry(flow.src_port.unwrap()).or_default() += 1;
    }
    ids
}

fn assert_one_per_flow(batch: &MergeBatch, flows: u16) {
    let ids = flows_per_id(batch);
    assert_eq!(ids.len(), usize::from(flows));
    assert!(ids.values().all(|count| *count == 1), "{ids:?}");
}

// ------------------------------------------------------------------
// 1. algebraic properties of the windowed merge
// ------------------------------------------------------------------

#[test]
fn merge_is_idempotent() {
    let merge = windowed();
    for seed in 0..8 {
        for batch in observations(seed, 200) {
            assert_eq!(merge.merge(batch.clone(), batch.clone()), batch);
        }
    }
}

#[test]
fn merge_is_commutative_up_to_retained_collector() {
    let merge = windowed();
    for seed in 0..8 {
        let [x, y, _z]: [MergeBatch; 3] = observations(seed, 200).try_into().unwrap();

        let xy = merge.merge(x.clone(), y.clone());
        let yx = merge.merge(y, x);

        assert_eq!(xy.len(), yx.len());
        assert_eq!(flows_per_id(&xy), flows_per_id(&yx));
        for (a, b) in xy.iter().zip(yx.iter()) {
            assert!(merge.matcher().matches(a, b) || merge.matcher().matches(b, a));
        }
    }
}

#[test]
fn merge_is_associative() {
    let merge = windowed();
    for seed in 0..8 {
        let [x, y, z]: [MergeBatch; 3] = observations(seed, 200).try_into().unwrap();

        let left = merge.merge(merge.merge(x.clone(), y.clone()), z.clone());
        let right = merge.merge(x, merge.merge(y, z));

        assert_one_per_flow(&left, 200);
        assert_one_per_flow(&right, 200);
    }
}

// ------------------------------------------------------------------
// 2. reduction on the worker pool
// ------------------------------------------------------------------

#[test]
fn reduction_keeps_one_observation_per_flow() {
    let merge = Arc::new(windowed());
    let pool = WorkerPool::new(4).unwrap();

    for seed in 0..4 {
        let result = reduce(observations(seed, 500), Arc::clone(&merge), &pool).unwrap();

        assert_one_per_flow(&result, 500);
        assert!(result.iter().all(|flow| flow.collector.is_some()));

        let starts: Vec<_> = result.iter().map(|flow| flow.t_first).collect();
        assert!(starts.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}

#[test]
fn reduction_is_independent_of_batch_order() {
    let merge = Arc::new(windowed());
    let pool = WorkerPool::new(2).unwrap();

    let batches = observations(7, 300);
    let mut reversed = batches.clone();
    reversed.reverse();

    let forward = reduce(batches, Arc::clone(&merge), &pool).unwrap();
    let backward = reduce(reversed, merge, &pool).unwrap();

    assert_eq!(flows_per_id(&forward), flows_per_id(&backward));
}

// ------------------------------------------------------------------
// 3. loader on generated exports
// ------------------------------------------------------------------

#[test]
fn loader_keeps_first_flow_per_pair() {
    let loader = Loader::new(topology().known_addresses());
    let [x, _, _]: [MergeBatch; 3] = observations(3, 50).try_into().unwrap();
    let raw: Vec<FlowRecord> = x.into_inner();
    let first = raw.first().cloned();

    let batch = loader.load(Collector::new("X"), raw);

    // every generated flow is between the same two addresses
    assert_eq!(batch.len(), usize::from(first.is_some()));
    if let Some(first) = first {
        assert_eq!(batch[0].src_port, first.src_port);
    }
}
