use crate::{Delay, FlowRecord, Timestamp, routing::DelayCache};
use std::time::Duration;

/// How far two observations of the same physical flow may drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tolerances {
    /// maximum difference of `in_packets` between the two records
    pub packet_loss: u64,
    /// maximum timestamp skew left once the propagation delay between
    /// the two collectors has been compensated
    pub time_difference: Delay,
}

impl Tolerances {
    /// Tolerances as expressed in the run configuration: a number of
    /// packets and a number of milliseconds.
    ///
    /// ```
    /// # use flowmerge_core::Tolerances;
    /// let tolerances = Tolerances::new(5, 10);
    /// assert_eq!(tolerances.time_difference.to_string(), "10ms");
    /// ```
    pub const fn new(max_packet_loss: u64, max_time_difference_ms: u64) -> Self {
        Self {
            packet_loss: max_packet_loss,
            time_difference: Delay::new(Duration::from_millis(max_time_difference_ms)),
        }
    }
}

/// Decides whether two flow records are observations of the same
/// physical flow.
///
/// `a` and `b` match when
///
/// 1. they share addresses and protocol, and their ports wherever both
///    records carry one;
/// 2. `b.in_packets` is within `a.in_packets ± packet_loss`;
/// 3. `b.t_first` is within `a.t_first ± time_difference` once shifted
///    by `+delay` or by `-delay`, where `delay` is the propagation delay
///    from `a`'s collector to `b`'s collector;
/// 4. the same holds for `t_last`.
///
/// Both signs of the delay are accepted as either record may be the
/// upstream observation.
///
/// Matching never fails: records that cannot be compared (collector
/// pair without a known delay, one record untagged) simply do not match.
#[derive(Debug, Clone)]
pub struct FlowMatcher {
    tolerances: Tolerances,
    delays: DelayCache,
}

impl FlowMatcher {
    pub fn new(tolerances: Tolerances, delays: DelayCache) -> Self {
        Self { tolerances, delays }
    }

    pub fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }

    pub fn matches(&self, a: &FlowRecord, b: &FlowRecord) -> bool {
        if !a.same_five_tuple(b) {
            return false;
        }

        if a.in_packets.abs_diff(b.in_packets) > self.tolerances.packet_loss {
            return false;
        }

        let Some(delay) = self.delay_between(a, b) else {
            return false;
        };

        let delay = i64::try_from(delay.as_micros()).unwrap_or(i64::MAX);
        let jitter =
            i64::try_from(self.tolerances.time_difference.as_micros()).unwrap_or(i64::MAX);

        compensated(a.t_first, b.t_first, delay, jitter)
            && compensated(a.t_last, b.t_last, delay, jitter)
    }

    fn delay_between(&self, a: &FlowRecord, b: &FlowRecord) -> Option<Delay> {
        match (&a.collector, &b.collector) {
            (Some(from), Some(to)) => self.delays.get(from, to),
            (None, None) => Some(Delay::ZERO),
            _ => None,
        }
    }
}

/// `true` if `observed` is within `expected ± jitter` after shifting
/// `expected` by `+delay` or by `-delay`.
fn compensated(expected: Timestamp, observed: Timestamp, delay: i64, jitter: i64) -> bool {
    [delay, -delay].into_iter().any(|shift| {
        let centre = expected.shifted(shift);
        observed >= centre.shifted(-jitter) && observed <= centre.shifted(jitter)
    })
}
