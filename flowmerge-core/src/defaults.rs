use crate::delay::Delay;
use std::time::Duration;

/// Default half-width of the candidate search window used by the
/// windowed merge.
///
/// Only records of the master batch whose `t_first` falls within
/// `t_first ± DEFAULT_SEARCH_MARGIN` of the incoming record are compared
/// with the fuzzy matcher.
///
/// ```
/// # use flowmerge_core::defaults::*;
/// assert_eq!(
///     DEFAULT_SEARCH_MARGIN.to_string(),
///     "20ms"
/// );
/// ```
pub const DEFAULT_SEARCH_MARGIN: Delay = Delay::new(Duration::from_millis(20));

/// Default maximum number of hops a routing-table walk may take before
/// the table is considered corrupt (cyclic or truncated).
///
/// See [`PathResolver`] for more details.
///
/// [`PathResolver`]: crate::routing::PathResolver
pub const DEFAULT_MAX_HOPS: usize = 25;

/// Default upper bound on the number of worker threads of the
/// [`WorkerPool`].
///
/// The pool is sized from [`std::thread::available_parallelism`] and
/// falls back to this value if the parallelism cannot be queried.
///
/// [`WorkerPool`]: crate::scheduler::WorkerPool
pub const DEFAULT_WORKERS: usize = 4;

/// Timestamp format used when writing flow records, matching nfdump's
/// JSON exporter.
///
/// Parsing is more lenient and accepts any number of fractional digits
/// (including none).
///
/// ```
/// # use flowmerge_core::defaults::*;
/// assert_eq!(TIMESTAMP_FORMAT, "%Y-%m-%dT%H:%M:%S%.6f");
/// ```
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
