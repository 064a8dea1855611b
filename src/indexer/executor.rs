use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use crossbeam::channel::{self, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};
use crate::core::error::{Error, Result};

/// Work for one key; `Ok(true)` when the key was reindexed
pub type ReindexJob = Box<dyn FnOnce() -> Result<bool> + Send>;

/// Outcome of a queued reindex, shared by every submitter of the same key
#[derive(Clone)]
pub struct ReindexHandle {
    slot: Arc<(Mutex<Option<Result<bool>>>, Condvar)>,
}

impl ReindexHandle {
    fn new() -> Self {
        ReindexHandle {
            slot: Arc::new((Mutex::new(None), Condvar::new())),
        }
    }

    fn complete(&self, outcome: Result<bool>) {
        let (lock, done) = &*self.slot;
        *lock.lock() = Some(outcome);
        done.notify_all();
    }

    pub fn is_done(&self) -> bool {
        self.slot.0.lock().is_some()
    }

    pub fn wait(&self) -> Result<bool> {
        let (lock, done) = &*self.slot;
        let mut outcome = lock.lock();
        while outcome.is_none() {
            done.wait(&mut outcome);
        }
        outcome.clone().unwrap_or_else(|| Err(Error::internal("reindex outcome missing")))
    }

    /// `None` if the work has not finished within `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<bool>> {
        let (lock, done) = &*self.slot;
        let mut outcome = lock.lock();
        if outcome.is_none() {
            done.wait_for(&mut outcome, timeout);
        }
        outcome.clone()
    }
}

impl fmt::Debug for ReindexHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ReindexHandle").field("done", &self.is_done()).finish()
    }
}

struct Task<K> {
    key: K,
    job: ReindexJob,
    handle: ReindexHandle,
}

/// Fixed pool of threads draining an unbounded queue. Submissions are never
/// rejected; a key already waiting in the queue is not queued twice.
pub struct ReindexExecutor<K> {
    sender: Option<Sender<Task<K>>>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<Mutex<HashMap<K, ReindexHandle>>>,
}

impl<K> ReindexExecutor<K>
where
    K: Clone + Eq + Hash + fmt::Display + Send + 'static,
{
    pub fn new(name: &str, threads: usize) -> Result<Self> {
        let (sender, receiver) = channel::unbounded::<Task<K>>();
        let pending: Arc<Mutex<HashMap<K, ReindexHandle>>> = Arc::new(Mutex::new(HashMap::new()));

        let mut workers = Vec::with_capacity(threads.max(1));
        for i in 0..threads.max(1) {
            let receiver = receiver.clone();
            let pending = pending.clone();
            let worker = thread::Builder::new()
                .name(format!("{}-reindex-{}", name, i))
                .spawn(move || {
                    for task in receiver.iter() {
                        // Leaving the pending set first lets a change that
                        // lands while this runs queue a fresh check.
                        pending.lock().remove(&task.key);
                        // A panicking job must not strand its waiters or the worker.
                        let outcome = panic::catch_unwind(AssertUnwindSafe(task.job)).unwrap_or_else(|_| {
                            Err(Error::internal(format!("reindex job for {} panicked", task.key)))
                        });
                        match &outcome {
                            Ok(reindexed) => debug!(key = %task.key, reindexed, "async reindex finished"),
                            Err(e) => warn!(key = %task.key, error = %e, "async reindex failed"),
                        }
                        task.handle.complete(outcome);
                    }
                })?;
            workers.push(worker);
        }

        Ok(ReindexExecutor {
            sender: Some(sender),
            workers,
            pending,
        })
    }

    pub fn submit(&self, key: K, job: ReindexJob) -> ReindexHandle {
        let mut pending = self.pending.lock();
        if let Some(handle) = pending.get(&key) {
            debug!(%key, "reindex already queued");
            return handle.clone();
        }

        let handle = ReindexHandle::new();
        let task = Task {
            key: key.clone(),
            job,
            handle: handle.clone(),
        };
        let sent = self.sender.as_ref().map(|s| s.send(task).is_ok()).unwrap_or(false);
        if sent {
            pending.insert(key, handle.clone());
        } else {
            handle.complete(Err(Error::internal("reindex executor is shut down")));
        }
        handle
    }

    /// Keys queued but not yet picked up by a worker
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

impl<K> Drop for ReindexExecutor<K> {
    fn drop(&mut self) {
        // Closing the channel ends each worker once the queue is drained.
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("reindex worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn queued_key_is_coalesced() {
        let executor = ReindexExecutor::<u32>::new("test", 1).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));

        // Park the only worker so later submissions stay queued.
        let (release, parked) = mpsc::channel::<()>();
        let blocker = executor.submit(0, Box::new(move || {
            parked.recv().ok();
            Ok(false)
        }));

        let first = {
            let runs = runs.clone();
            executor.submit(7, Box::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }))
        };
        let second = {
            let runs = runs.clone();
            executor.submit(7, Box::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }))
        };

        release.send(()).unwrap();
        assert!(!blocker.wait().unwrap());
        assert!(first.wait().unwrap());
        assert!(second.wait().unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failures_reach_the_handle() {
        let executor = ReindexExecutor::<u32>::new("test", 2).unwrap();
        let handle = executor.submit(1, Box::new(|| Err(Error::backend("index unavailable"))));
        let err = handle.wait().unwrap_err();
        assert!(err.is_retryable());
        assert!(handle.wait_timeout(Duration::from_millis(10)).is_some());
    }

    #[test]
    fn panicking_job_completes_its_handle() {
        let executor = ReindexExecutor::<u32>::new("test", 1).unwrap();
        let handle = executor.submit(3, Box::new(|| panic!("index writer blew up")));
        let err = handle.wait().unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::Internal);
        assert_eq!(err.context, "reindex job for 3 panicked");

        // the only worker survived and keeps serving
        let next = executor.submit(3, Box::new(|| Ok(true)));
        assert!(next.wait().unwrap());
        assert_eq!(executor.pending(), 0);
    }

    #[test]
    fn drop_drains_the_queue() {
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let executor = ReindexExecutor::<u32>::new("test", 2).unwrap();
            for key in 0..50 {
                let runs = runs.clone();
                executor.submit(key, Box::new(move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                }));
            }
        }
        assert_eq!(runs.load(Ordering::SeqCst), 50);
    }
}
