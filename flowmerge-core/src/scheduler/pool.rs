use crate::defaults::DEFAULT_WORKERS;
use crossbeam_channel::{Sender, unbounded};
use std::{
    io,
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    thread::{self, JoinHandle},
};
use thiserror::Error;
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Cannot spawn worker thread {index}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },
    #[error("Worker pool is shut down")]
    ShutDown,
    #[error("Results channel disconnected with {in_flight} task(s) in flight")]
    Disconnected { in_flight: usize },
}

/// A fixed set of worker threads consuming jobs from a shared queue.
///
/// Dropping the pool closes the queue and waits for the queued jobs to
/// complete.
pub struct WorkerPool {
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one).
    pub fn new(size: usize) -> Result<Self, PoolError> {
        let size = size.max(1);
        let (jobs, queue) = unbounded::<Job>();

        let workers = (0..size)
            .map(|index| {
                let queue = queue.clone();
                thread::Builder::new()
                    .name(format!("flowmerge-worker-{index}"))
                    .spawn(move || {
                        for job in queue.iter() {
                            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                                error!(worker = index, "job panicked");
                            }
                        }
                    })
                    .map_err(|source| PoolError::Spawn { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(workers = size, "worker pool started");

        Ok(Self {
            jobs: Some(jobs),
            workers,
        })
    }

    /// One worker per available CPU core.
    pub fn with_available_parallelism() -> Result<Self, PoolError> {
        let size = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(DEFAULT_WORKERS);
        Self::new(size)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job; it runs on the first idle worker.
    pub fn execute<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(jobs) = &self.jobs else {
            return Err(PoolError::ShutDown);
        };
        jobs.send(Box::new(job)).map_err(|_| PoolError::ShutDown)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // closing the queue ends the workers' loops
        self.jobs.take();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    #[test]
    fn runs_every_job() {
        let counter = Arc::new(AtomicUsize::new(0));

        let pool = WorkerPool::new(3).unwrap();
        assert_eq!(pool.size(), 3);
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        drop(pool);

        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn at_least_one_worker() {
        let pool = WorkerPool::new(0).unwrap();
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn survives_a_panicking_job() {
        let counter = Arc::new(AtomicUsize::new(0));

        let pool = WorkerPool::new(1).unwrap();
        pool.execute(|| panic!("boom")).unwrap();
        let c = Arc::clone(&counter);
        pool.execute(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        drop(pool);

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
