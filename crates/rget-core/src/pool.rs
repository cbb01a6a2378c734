//! Bounded worker pool with explicit acquire/release.
//!
//! Each acquired `Worker` is exclusively owned until released; the pool
//! capacity equals the number of probed endpoints, so the pool doubles as
//! the concurrency limit for in-flight fetches. Misuse (releasing more
//! workers than the pool holds) is surfaced as an error instead of being
//! silently absorbed.

use std::fmt;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use url::Url;

/// A validated, currently fetchable source endpoint for the target object.
#[derive(Debug, Clone)]
pub struct Worker {
    pub url: Url,
}

/// Pool misuse error.
#[derive(Debug, PartialEq, Eq)]
pub enum PoolError {
    /// More releases than acquisitions: the pool is already full.
    ReleaseOverflow,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::ReleaseOverflow => write!(f, "worker released into a full pool"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Fixed-capacity pool of workers for one transfer.
pub struct WorkerPool {
    slots: Mutex<mpsc::Receiver<Worker>>,
    returns: mpsc::Sender<Worker>,
    capacity: usize,
}

impl WorkerPool {
    /// Build a pool holding exactly `workers`; capacity is fixed at their count.
    pub fn new(workers: Vec<Worker>) -> Self {
        let capacity = workers.len();
        let (returns, slots) = mpsc::channel(capacity.max(1));
        for w in workers {
            // Cannot fail: the channel was sized to hold every worker.
            returns
                .try_send(w)
                .expect("pool channel sized below worker count");
        }
        Self {
            slots: Mutex::new(slots),
            returns,
            capacity,
        }
    }

    /// Take exclusive ownership of a worker, waiting until one is free.
    ///
    /// Cancel-safe: dropping the future before completion loses no worker.
    pub async fn acquire(&self) -> Worker {
        self.slots
            .lock()
            .await
            .recv()
            .await
            // The pool always holds its own return sender, so the channel
            // can never report closed.
            .expect("worker pool channel closed")
    }

    /// Return a previously acquired worker.
    pub fn release(&self, worker: Worker) -> Result<(), PoolError> {
        self.returns
            .try_send(worker)
            .map_err(|_| PoolError::ReleaseOverflow)
    }

    /// Number of workers this pool was built with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn worker(port: u16) -> Worker {
        Worker {
            url: Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap(),
        }
    }

    #[tokio::test]
    async fn acquire_release_cycle() {
        let pool = WorkerPool::new(vec![worker(8001), worker(8002)]);
        assert_eq!(pool.capacity(), 2);

        let a = pool.acquire().await;
        let b = pool.acquire().await;
        pool.release(a).unwrap();
        pool.release(b).unwrap();

        // Both workers are available again.
        let _ = pool.acquire().await;
        let _ = pool.acquire().await;
    }

    #[tokio::test]
    async fn acquire_blocks_on_exhausted_pool() {
        let pool = WorkerPool::new(vec![worker(8001)]);
        let held = pool.acquire().await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(blocked.is_err(), "acquire must block while all workers are held");

        pool.release(held).unwrap();
        let again = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(again.is_ok(), "acquire must wake after a release");
    }

    #[tokio::test]
    async fn release_beyond_capacity_is_an_error() {
        let pool = WorkerPool::new(vec![worker(8001)]);
        // Never acquired, so the pool is full; a stray release must not pass.
        assert_eq!(pool.release(worker(8002)), Err(PoolError::ReleaseOverflow));
    }
}
