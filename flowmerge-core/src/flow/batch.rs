use super::{FlowRecord, Timestamp};
use serde::Serialize;
use std::ops::Index;

/// A sequence of [`FlowRecord`]s kept in their total order
/// (see [`FlowRecord::sort_key`]).
///
/// A batch is the unit exchanged by the reduction scheduler: the loader
/// produces one per collector and every merge consumes two batches and
/// produces a new one.
///
/// ```
/// # use flowmerge_core::{FlowRecord, MergeBatch};
/// let batch = MergeBatch::new(Vec::<FlowRecord>::new());
/// assert!(batch.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MergeBatch {
    flows: Vec<FlowRecord>,
}

impl MergeBatch {
    /// Build a batch from records in any order.
    pub fn new(flows: Vec<FlowRecord>) -> Self {
        let mut batch = Self { flows };
        batch.sort();
        batch
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FlowRecord> {
        self.flows.iter()
    }

    pub fn as_slice(&self) -> &[FlowRecord] {
        &self.flows
    }

    pub fn into_inner(self) -> Vec<FlowRecord> {
        self.flows
    }

    /// Index of the first record whose `t_first` is not before `t`.
    ///
    /// Returns [`MergeBatch::len`] if every record starts before `t`.
    pub fn lower_bound(&self, t: Timestamp) -> usize {
        self.flows.partition_point(|flow| flow.t_first < t)
    }

    /// Append records and restore the total order.
    pub(crate) fn extend_sorted(&mut self, flows: impl IntoIterator<Item = FlowRecord>) {
        let len = self.flows.len();
        self.flows.extend(flows);
        if self.flows.len() != len {
            self.sort();
        }
    }

    /// Keep only the records for which `keep` returns `true`, visiting
    /// them in order.
    pub(crate) fn retain(&mut self, keep: impl FnMut(&FlowRecord) -> bool) {
        self.flows.retain(keep);
    }

    fn sort(&mut self) {
        self.flows.sort_by_cached_key(FlowRecord::sort_key);
    }
}

impl Index<usize> for MergeBatch {
    type Output = FlowRecord;
    fn index(&self, index: usize) -> &Self::Output {
        &self.flows[index]
    }
}

impl<'a> IntoIterator for &'a MergeBatch {
    type Item = &'a FlowRecord;
    type IntoIter = std::slice::Iter<'a, FlowRecord>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for MergeBatch {
    type Item = FlowRecord;
    type IntoIter = std::vec::IntoIter<FlowRecord>;
    fn into_iter(self) -> Self::IntoIter {
        self.flows.into_iter()
    }
}

impl FromIterator<FlowRecord> for MergeBatch {
    fn from_iter<I: IntoIterator<Item = FlowRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::tests::flow;

    #[test]
    fn new_sorts_records() {
        let batch = MergeBatch::new(vec![
            flow(300.0, 1, "x"),
            flow(100.0, 1, "x"),
            flow(200.0, 1, "x"),
        ]);

        let starts: Vec<_> = batch.iter().map(|f| f.t_first).collect();
        assert_eq!(
            starts,
            vec![
                Timestamp::from_millis_f64(100.0),
                Timestamp::from_millis_f64(200.0),
                Timestamp::from_millis_f64(300.0),
            ]
        );
    }

    #[test]
    fn ties_are_deterministic() {
        let a = MergeBatch::new(vec![flow(100.0, 1, "y"), flow(100.0, 1, "x")]);
        let b = MergeBatch::new(vec![flow(100.0, 1, "x"), flow(100.0, 1, "y")]);
        assert_eq!(a, b);
        assert_eq!(a[0].collector.as_ref().unwrap().as_str(), "x");
    }

    #[test]
    fn lower_bound() {
        let batch = MergeBatch::new(vec![
            flow(100.0, 1, "x"),
            flow(200.0, 1, "x"),
            flow(200.0, 2, "x"),
            flow(300.0, 1, "x"),
        ]);

        assert_eq!(batch.lower_bound(Timestamp::from_millis_f64(0.0)), 0);
        assert_eq!(batch.lower_bound(Timestamp::from_millis_f64(200.0)), 1);
        assert_eq!(batch.lower_bound(Timestamp::from_millis_f64(250.0)), 3);
        assert_eq!(batch.lower_bound(Timestamp::from_millis_f64(301.0)), 4);
        assert_eq!(MergeBatch::default().lower_bound(Timestamp::EPOCH), 0);
    }

    #[test]
    fn extend_restores_order() {
        let mut batch = MergeBatch::new(vec![flow(100.0, 1, "x"), flow(300.0, 1, "x")]);
        batch.extend_sorted([flow(200.0, 1, "y")]);

        assert_eq!(batch.len(), 3);
        assert_eq!(batch[1].collector.as_ref().unwrap().as_str(), "y");
    }

    #[test]
    fn serialize_as_array() {
        let batch = MergeBatch::new(vec![flow(100.0, 1, "x")]);
        let json = serde_json::to_value(&batch).unwrap();
        assert!(json.is_array());
        assert_eq!(json.as_array().unwrap().len(), 1);
    }
}
