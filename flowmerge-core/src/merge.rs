use crate::{Delay, FlowMatcher, FlowRecord, MergeBatch, defaults::DEFAULT_SEARCH_MARGIN};
use tracing::debug;

/// Pairwise deduplicating merge of two [`MergeBatch`]es.
///
/// Every record of the incoming batch is compared, with the
/// [`FlowMatcher`], against the records of the master batch that start
/// within `± margin` of it. The window is positioned by binary search so
/// a merge costs `O(n log m)` comparisons plus the size of the windows.
///
/// Incoming records matching a master record are dropped; the others are
/// appended and the result is put back in total order.
#[derive(Debug, Clone)]
pub struct WindowedMerge {
    matcher: FlowMatcher,
    margin: Delay,
}

impl WindowedMerge {
    pub fn new(matcher: FlowMatcher) -> Self {
        Self {
            matcher,
            margin: DEFAULT_SEARCH_MARGIN,
        }
    }

    /// Set the half-width of the search window.
    pub fn with_margin(mut self, margin: Delay) -> Self {
        self.margin = margin;
        self
    }

    pub fn margin(&self) -> Delay {
        self.margin
    }

    pub fn matcher(&self) -> &FlowMatcher {
        &self.matcher
    }

    /// Merge `incoming` into `master`.
    ///
    /// When the two batches hold observations of the same physical flow,
    /// the one from `master` is kept.
    pub fn merge(&self, master: MergeBatch, incoming: MergeBatch) -> MergeBatch {
        if master.is_empty() {
            return incoming;
        }
        if incoming.is_empty() {
            return master;
        }

        let incoming_len = incoming.len();
        let fresh: Vec<FlowRecord> = incoming
            .into_iter()
            .filter(|flow| !self.is_duplicate(&master, flow))
            .collect();
        let duplicates = incoming_len - fresh.len();

        let mut master = master;
        master.extend_sorted(fresh);

        debug!(
            incoming = incoming_len,
            duplicates,
            merged = master.len(),
            "windowed merge done"
        );

        master
    }

    /// `true` if a record of `master` within the search window of `flow`
    /// matches it.
    pub fn is_duplicate(&self, master: &MergeBatch, flow: &FlowRecord) -> bool {
        let margin = i64::try_from(self.margin.as_micros()).unwrap_or(i64::MAX);
        let lower = flow.t_first.shifted(-margin);
        let upper = flow.t_first.shifted(margin);

        let start = master.lower_bound(lower).saturating_sub(1);

        master.as_slice()[start..]
            .iter()
            .take_while(|candidate| candidate.t_first < upper)
            .any(|candidate| self.matcher.matches(candidate, flow))
    }
}
