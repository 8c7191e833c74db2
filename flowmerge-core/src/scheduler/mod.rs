//! Bottom-up pairwise reduction of [`MergeBatch`]es on a [`WorkerPool`].
//!
//! The scheduler keeps a FIFO of pending batches. As long as two batches
//! are pending they are handed to a worker as one merge task; completed
//! merges come back through a [results channel](result_channel) and
//! join the end of the pending list. The reduction is over when nothing
//! is in flight and fewer than two batches are pending.

mod channel;
mod pool;

pub use self::{
    channel::{Received, ResultReceiver, ResultSender, result_channel},
    pool::{PoolError, WorkerPool},
};
use crate::{MergeBatch, merge::WindowedMerge};
use std::{
    any::Any,
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error(
        "Merge of {master_len} and {incoming_len} flows panicked ({message}), the run needs to be rerun"
    )]
    Panicked {
        master_len: usize,
        incoming_len: usize,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum ReduceError {
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

type TaskResult = Result<MergeBatch, TaskError>;

/// Reduce `batches` to a single batch with the windowed merge.
///
/// An empty input reduces to an empty batch.
pub fn reduce(
    batches: Vec<MergeBatch>,
    merge: Arc<WindowedMerge>,
    pool: &WorkerPool,
) -> Result<MergeBatch, ReduceError> {
    reduce_with(batches, move |master, incoming| merge.merge(master, incoming), pool)
}

/// Reduce `batches` to a single batch with any pairwise `merge`.
pub fn reduce_with<F>(
    batches: Vec<MergeBatch>,
    merge: F,
    pool: &WorkerPool,
) -> Result<MergeBatch, ReduceError>
where
    F: Fn(MergeBatch, MergeBatch) -> MergeBatch + Send + Sync + 'static,
{
    let merge = Arc::new(merge);
    let (sender, receiver) = result_channel::<TaskResult>();

    let mut pending: VecDeque<MergeBatch> = batches.into();
    let mut in_flight = 0usize;

    loop {
        while let Some(received) = receiver.try_receive() {
            collect(received, &mut pending, &mut in_flight)?;
        }

        while pending.len() >= 2 {
            let (Some(master), Some(incoming)) = (pending.pop_front(), pending.pop_front()) else {
                break;
            };
            submit(pool, &sender, Arc::clone(&merge), master, incoming)?;
            in_flight += 1;
        }

        info!(pending = pending.len(), in_flight, "reduction progress");

        if in_flight == 0 {
            break;
        }

        collect(receiver.receive(), &mut pending, &mut in_flight)?;
    }

    let result = pending.pop_front().unwrap_or_default();
    info!(flows = result.len(), "reduction complete");
    Ok(result)
}

fn submit<F>(
    pool: &WorkerPool,
    sender: &ResultSender<TaskResult>,
    merge: Arc<F>,
    master: MergeBatch,
    incoming: MergeBatch,
) -> Result<(), PoolError>
where
    F: Fn(MergeBatch, MergeBatch) -> MergeBatch + Send + Sync + 'static,
{
    let sender = sender.clone();
    pool.execute(move || {
        let master_len = master.len();
        let incoming_len = incoming.len();

        let result = panic::catch_unwind(AssertUnwindSafe(|| merge(master, incoming)))
            .map_err(|payload| TaskError::Panicked {
                master_len,
                incoming_len,
                message: panic_message(payload.as_ref()),
            });

        // the scheduler is gone only if it already failed
        let _ = sender.send(result);
    })
}

fn collect(
    received: Received<TaskResult>,
    pending: &mut VecDeque<MergeBatch>,
    in_flight: &mut usize,
) -> Result<(), ReduceError> {
    match received {
        Received::Value(Ok(batch)) => {
            *in_flight -= 1;
            info!(flows = batch.len(), "merge completed");
            pending.push_back(batch);
            Ok(())
        }
        Received::Value(Err(task)) => {
            error!(%task, "merge task failed");
            Err(task.into())
        }
        Received::Disconnected => Err(PoolError::Disconnected {
            in_flight: *in_flight,
        }
        .into()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Collector, Delay, DelayCache, FlowMatcher, Tolerances, flow::tests::flow};

    fn windowed() -> Arc<WindowedMerge> {
        let mut delays = DelayCache::default();
        let five = Delay::from_millis_f64(5.0).unwrap();
        for (a, b) in [("x", "y"), ("y", "z"), ("x", "z")] {
            delays.insert(Collector::new(a), Collector::new(b), five);
            delays.insert(Collector::new(b), Collector::new(a), five);
        }
        Arc::new(WindowedMerge::new(FlowMatcher::new(
            Tolerances::new(5, 10),
            delays,
        )))
    }

    #[test]
    fn empty_input() {
        let pool = WorkerPool::new(2).unwrap();
        let result = reduce(Vec::new(), windowed(), &pool).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn single_batch_is_returned() {
        let pool = WorkerPool::new(2).unwrap();
        let batch = MergeBatch::new(vec![flow(100.0, 1, "x")]);
        let result = reduce(vec![batch.clone()], windowed(), &pool).unwrap();
        assert_eq!(result, batch);
    }

    #[test]
    fn duplicates_across_collectors_collapse() {
        let pool = WorkerPool::new(4).unwrap();
        let batches = vec![
            MergeBatch::new(vec![flow(100_000.0, 50, "x"), flow(300_000.0, 9, "x")]),
            MergeBatch::new(vec![flow(100_005.0, 48, "y")]),
            MergeBatch::new(vec![flow(100_010.0, 49, "z"), flow(500_000.0, 3, "z")]),
        ];

        let result = reduce(batches, windowed(), &pool).unwrap();

        assert_eq!(result.len(), 3);
        let starts: Vec<_> = result.iter().map(|f| f.t_first.as_micros()).collect();
        assert_eq!(starts[1..], [300_000_000, 500_000_000]);
    }

    #[test]
    fn many_batches() {
        let pool = WorkerPool::new(3).unwrap();
        let batches: Vec<_> = (0..17)
            .map(|i| MergeBatch::new(vec![flow(1_000.0 * f64::from(i), 1, "x")]))
            .collect();

        let result = reduce(batches, windowed(), &pool).unwrap();
        assert_eq!(result.len(), 17);
    }

    #[test]
    fn panicking_task_fails_the_reduction() {
        let pool = WorkerPool::new(2).unwrap();
        let batches = vec![
            MergeBatch::new(vec![flow(100.0, 1, "x"), flow(200.0, 1, "x")]),
            MergeBatch::new(vec![flow(100.0, 1, "y")]),
        ];

        let err = reduce_with(batches, |_, _| panic!("corrupt batch"), &pool).unwrap_err();

        match err {
            ReduceError::Task(TaskError::Panicked {
                master_len,
                incoming_len,
                message,
            }) => {
                assert_eq!(master_len, 2);
                assert_eq!(incoming_len, 1);
                assert_eq!(message, "corrupt batch");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
