//! Topology-aware fuzzy deduplication of flow records.
//!
//! Several collectors of a network observe the same physical flows. The
//! [`loader`] turns every collector export into a sorted [`MergeBatch`],
//! the [`scheduler`] reduces the batches pairwise with the
//! [`WindowedMerge`](merge::WindowedMerge), and the [`FlowMatcher`]
//! decides which records are observations of the same flow, compensating
//! for the propagation [`Delay`] between collectors as derived from the
//! [`topology`] and its [`routing`] table.

pub mod defaults;
mod delay;
pub mod flow;
pub mod loader;
mod matcher;
pub mod merge;
pub mod routing;
pub mod scheduler;
mod time;
pub mod topology;

pub use self::{
    delay::{Delay, DelayError},
    flow::{Collector, FlowRecord, MergeBatch, Timestamp, TimestampParseError},
    matcher::{FlowMatcher, Tolerances},
    routing::{DelayCache, PathResolver, RoutingError, RoutingTable},
    topology::{TopologyError, TopologyGraph},
};
