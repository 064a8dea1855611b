use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{info, warn};
use crate::core::error::{Error, Result};
use crate::index::document::{Entity, Index};
use crate::indexer::indexer::Indexer;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl BatchResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Reindexes whole entity types on a dedicated rayon pool. A failing key
/// is logged and counted; it never aborts the batch.
pub struct BatchReindexer<V: Entity> {
    pub indexer: Indexer<V>,
    pub pool: ThreadPool,
    pub progress: Arc<AtomicUsize>,
}

impl<V: Entity> BatchReindexer<V> {
    pub fn new(indexer: Indexer<V>, threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("batch-reindex-{}", i))
            .build()
            .map_err(|e| Error::configuration(format!("cannot start batch pool: {}", e)))?;

        Ok(BatchReindexer {
            indexer: indexer.without_executor(),
            pool,
            progress: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Keys processed by the running batch
    pub fn get_progress(&self) -> usize {
        self.progress.load(Ordering::Relaxed)
    }

    /// Reindex every key of the store into every write index
    pub fn reindex_all(&self) -> Result<BatchResult> {
        let keys = self.indexer.source.keys()?;
        Ok(self.run(keys, |key| self.indexer.index(key)))
    }

    /// Reindex every key of the store into `target` only. Each key is
    /// evicted from the entity cache before it is read.
    pub fn reindex_into(&self, target: &Arc<dyn Index<V>>) -> Result<BatchResult> {
        let keys = self.indexer.source.keys()?;
        let source = &self.indexer.source;
        let cache = &self.indexer.cache;
        let metrics = &self.indexer.metrics;
        Ok(self.run(keys, |key| {
            cache.evict(key);
            let result = match source.get(key) {
                Ok(Some(entity)) => target.replace(&entity),
                Ok(None) => target.delete(key),
                Err(e) => Err(e),
            };
            metrics.record_reindex(target.name(), result.is_ok());
            result
        }))
    }

    fn run<F>(&self, keys: Vec<V::Key>, op: F) -> BatchResult
    where
        F: Fn(&V::Key) -> Result<()> + Sync,
    {
        let started = Instant::now();
        let total = keys.len();
        self.progress.store(0, Ordering::Relaxed);
        info!(index = self.indexer.indexes.name(), total, "batch reindex started");

        let succeeded = self.pool.install(|| {
            keys.par_iter()
                .filter(|key| {
                    let result = op(key);
                    let current = self.progress.fetch_add(1, Ordering::Relaxed) + 1;
                    if current % 1000 == 0 {
                        info!(
                            index = self.indexer.indexes.name(),
                            done = current,
                            total,
                            percent = current * 100 / total,
                            "batch reindex progress"
                        );
                    }
                    match result {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(index = self.indexer.indexes.name(), %key, error = %e, "failed to reindex");
                            false
                        }
                    }
                })
                .count()
        });

        let result = BatchResult {
            attempted: total,
            succeeded,
            failed: total - succeeded,
            elapsed: started.elapsed(),
        };
        info!(
            index = self.indexer.indexes.name(),
            succeeded = result.succeeded,
            failed = result.failed,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "batch reindex finished"
        );
        result
    }
}
