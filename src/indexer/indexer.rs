use std::sync::Arc;
use tracing::{debug, warn};
use crate::core::error::Result;
use crate::core::stats::QueryMetrics;
use crate::index::collection::IndexCollection;
use crate::index::document::{Entity, Index};
use crate::indexer::executor::{ReindexExecutor, ReindexHandle};
use crate::indexer::staleness::StalenessChecker;
use crate::indexer::store::{EntityCache, EntitySource};

/// Keeps every write index in step with the authoritative store
pub struct Indexer<V: Entity> {
    pub indexes: Arc<IndexCollection<V>>,
    pub source: Arc<dyn EntitySource<V>>,
    pub cache: Arc<dyn EntityCache<V::Key>>,
    pub staleness: Arc<StalenessChecker<V>>,
    pub metrics: Arc<dyn QueryMetrics>,
    executor: Option<Arc<ReindexExecutor<V::Key>>>,
    auto_reindex_if_stale: bool,
}

impl<V: Entity> Clone for Indexer<V> {
    fn clone(&self) -> Self {
        Indexer {
            indexes: self.indexes.clone(),
            source: self.source.clone(),
            cache: self.cache.clone(),
            staleness: self.staleness.clone(),
            metrics: self.metrics.clone(),
            executor: self.executor.clone(),
            auto_reindex_if_stale: self.auto_reindex_if_stale,
        }
    }
}

impl<V: Entity> Indexer<V> {
    pub fn new(
        indexes: Arc<IndexCollection<V>>,
        source: Arc<dyn EntitySource<V>>,
        cache: Arc<dyn EntityCache<V::Key>>,
        staleness: Arc<StalenessChecker<V>>,
        metrics: Arc<dyn QueryMetrics>,
    ) -> Self {
        Indexer {
            indexes,
            source,
            cache,
            staleness,
            metrics,
            executor: None,
            auto_reindex_if_stale: false,
        }
    }

    /// Run staleness checks on `executor`; with `auto_reindex_if_stale`
    /// one is scheduled after every `index` call.
    pub fn with_executor(mut self, executor: Arc<ReindexExecutor<V::Key>>, auto_reindex_if_stale: bool) -> Self {
        self.executor = Some(executor);
        self.auto_reindex_if_stale = auto_reindex_if_stale;
        self
    }

    /// Same indexer writing synchronously only. Jobs queued on the
    /// executor hold this form so they never keep the executor alive.
    pub fn without_executor(&self) -> Self {
        Indexer {
            executor: None,
            auto_reindex_if_stale: false,
            ..self.clone()
        }
    }

    /// Re-fetch `key` and write it to every write index, or delete it
    /// everywhere if the store no longer has it.
    pub fn index(&self, key: &V::Key) -> Result<()> {
        self.cache.evict(key);
        let result = match self.source.get(key) {
            Ok(Some(entity)) => self.each_write_index(|index| index.replace(&entity)),
            Ok(None) => self.each_write_index(|index| index.delete(key)),
            Err(e) => Err(e),
        };
        self.metrics.record_reindex(self.indexes.name(), result.is_ok());
        match &result {
            Ok(()) => debug!(index = self.indexes.name(), %key, "indexed"),
            Err(e) => warn!(index = self.indexes.name(), %key, error = %e, "indexing failed"),
        }
        result?;

        // Fire and forget; a writer racing this one shows up as stale.
        if self.auto_reindex_if_stale {
            self.reindex_if_stale(key);
        }
        Ok(())
    }

    pub fn is_stale(&self, key: &V::Key) -> Result<bool> {
        self.staleness.is_stale(key)
    }

    /// Queue an asynchronous check that reindexes `key` if it is stale.
    /// `None` when no executor is configured.
    pub fn reindex_if_stale(&self, key: &V::Key) -> Option<ReindexHandle> {
        let executor = self.executor.as_ref()?;
        let worker = self.without_executor();
        let job_key = key.clone();
        Some(executor.submit(
            key.clone(),
            Box::new(move || {
                if worker.is_stale(&job_key)? {
                    worker.index(&job_key)?;
                    return Ok(true);
                }
                Ok(false)
            }),
        ))
    }

    // Every index is attempted; the first failure is reported.
    fn each_write_index<F>(&self, op: F) -> Result<()>
    where
        F: Fn(&Arc<dyn Index<V>>) -> Result<()>,
    {
        let mut first_error = None;
        for index in self.indexes.write_indexes() {
            if let Err(e) = op(&index) {
                warn!(index = index.name(), version = index.version(), error = %e, "write failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
