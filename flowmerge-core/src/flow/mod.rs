//! Flow records and the batches they are merged in.
//!
//! A [`FlowRecord`] is one collector's observation of a flow. The same
//! physical flow is usually observed by several collectors along its path;
//! the records then differ slightly in packet counts and timestamps.
//!
//! Records are grouped in [`MergeBatch`]es, always kept in the total
//! order defined by [`FlowRecord::sort_key`].

mod batch;
mod timestamp;

pub use self::{
    batch::MergeBatch,
    timestamp::{Timestamp, TimestampParseError},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{borrow::Borrow, fmt};

/// Identity of the collector that exported a flow record.
///
/// Collector identities are node names of the topology. They are
/// case-normalised (lower case) at construction.
///
/// ```
/// # use flowmerge_core::Collector;
/// assert_eq!(Collector::new("Router-A").as_str(), "router-a");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collector(String);

impl Collector {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().to_lowercase())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Collector {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One collector's observation of a flow.
///
/// Fields use the names of nfdump's JSON exporter. Fields this crate does
/// not interpret are kept in [`FlowRecord::extra`] and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    #[serde(rename = "src4_addr", alias = "src_addr", alias = "src6_addr")]
    pub src_addr: String,
    #[serde(rename = "dst4_addr", alias = "dst_addr", alias = "dst6_addr")]
    pub dst_addr: String,
    #[serde(rename = "proto", alias = "protocol")]
    pub protocol: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<u16>,
    pub t_first: Timestamp,
    pub t_last: Timestamp,
    pub in_packets: u64,
    pub in_bytes: u64,
    /// Set by the loader; raw exports do not carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector: Option<Collector>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Key of the total order of [`FlowRecord`]s: `t_first` first, then the
/// full content of the record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortKey {
    t_first: Timestamp,
    content: String,
}

impl FlowRecord {
    /// the total order key of this record.
    ///
    /// Two records with the same `t_first` are ordered by their JSON
    /// representation, so sorting is deterministic regardless of the
    /// order in which records were merged.
    pub fn sort_key(&self) -> SortKey {
        let content = serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"));
        SortKey {
            t_first: self.t_first,
            content,
        }
    }

    /// `true` if both records carry the same addresses, protocol and
    /// ports.
    ///
    /// A port missing on either side is not a mismatch.
    pub fn same_five_tuple(&self, other: &Self) -> bool {
        fn optional_eq<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }

        self.src_addr == other.src_addr
            && self.dst_addr == other.dst_addr
            && self.protocol == other.protocol
            && optional_eq(self.src_port, other.src_port)
            && optional_eq(self.dst_port, other.dst_port)
    }

    /// Tag the record with the collector that exported it.
    pub fn with_collector(mut self, collector: Collector) -> Self {
        self.collector = Some(collector);
        self
    }
}
