//! Fixed-size pool of resolver threads draining one FIFO queue.

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors produced by [`WorkerPool`].
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool has shut down")]
    /// The queue no longer accepts work.
    ShutDown,

    #[error("failed to spawn worker thread: {0}")]
    /// The operating system refused to start a worker.
    Spawn(#[from] io::Error),
}

/// Worker threads named `pkl-import-{n}`, fed in submission order.
///
/// A job that panics is logged and the worker moves on to the next one. Dropping the pool
/// closes the queue, lets the workers finish what is already queued, and joins them.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `threads` workers (at least one).
    pub fn new(threads: usize) -> Result<Self, PoolError> {
        let (sender, receiver) = unbounded::<Job>();
        let workers = (0..threads.max(1))
            .map(|n| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("pkl-import-{n}"))
                    .spawn(move || worker_loop(receiver))
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(threads = workers.len(), "started import workers");

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Queue a job.
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(PoolError::ShutDown)?;
        sender.send(Box::new(job)).map_err(|_| PoolError::ShutDown)
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Jobs waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.sender.as_ref().map_or(0, Sender::len)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("import worker exited abnormally");
            }
        }
    }
}

fn worker_loop(receiver: Receiver<Job>) {
    for job in receiver {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            let name = thread::current().name().unwrap_or("pkl-import").to_string();
            error!(worker = %name, "import job panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn test_single_worker_runs_jobs_in_order() {
        let pool = WorkerPool::new(1).unwrap();
        let (tx, rx) = unbounded();
        for n in 0..5 {
            let tx = tx.clone();
            pool.submit(move || tx.send(n).unwrap()).unwrap();
        }
        let seen: Vec<i32> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(seen, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_workers_are_named_and_survive_panics() {
        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.threads(), 2);

        pool.submit(|| panic!("bad module")).unwrap();

        let (tx, rx) = bounded(4);
        for _ in 0..4 {
            let tx = tx.clone();
            pool.submit(move || {
                let name = thread::current().name().map(str::to_string);
                tx.send(name).unwrap();
            })
            .unwrap();
        }
        let names: HashSet<_> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap())
            .collect();
        assert!(names.iter().all(|n| n.starts_with("pkl-import-")));
    }

    #[test]
    fn test_drop_drains_queue() {
        let (tx, rx) = unbounded();
        {
            let pool = WorkerPool::new(2).unwrap();
            for n in 0..10 {
                let tx = tx.clone();
                pool.submit(move || tx.send(n).unwrap()).unwrap();
            }
        }
        drop(tx);
        assert_eq!(rx.iter().count(), 10);
    }
}
