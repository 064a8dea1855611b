use std::sync::Arc;
use parking_lot::Mutex;
use tracing::info;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::stats::QueryMetrics;
use crate::core::types::CurrentUser;
use crate::index::collection::IndexCollection;
use crate::index::document::{Entity, Index};
use crate::index::factory::IndexFactory;
use crate::index::status::IndexStatus;
use crate::index::versions::VersionManager;
use crate::indexer::batch::{BatchReindexer, BatchResult};
use crate::indexer::executor::ReindexExecutor;
use crate::indexer::indexer::Indexer;
use crate::indexer::online::OnlineReindexer;
use crate::indexer::staleness::StalenessChecker;
use crate::indexer::store::{EntityCache, EntitySource, LruEntityCache, NoCache, RefDatabase};
use crate::query::processor::{PermissionBackend, QueryContext, QueryLimits, QueryProcessor};
use crate::schema::definitions::SchemaDefinitions;

/// Systems the index layer consults but does not own
pub struct Collaborators<V: Entity> {
    pub source: Arc<dyn EntitySource<V>>,
    pub refs: Arc<dyn RefDatabase>,
    pub permissions: Arc<dyn PermissionBackend<V>>,
    pub limits: Arc<dyn QueryLimits>,
    pub metrics: Arc<dyn QueryMetrics>,
}

impl<V: Entity> Clone for Collaborators<V> {
    fn clone(&self) -> Self {
        Collaborators {
            source: self.source.clone(),
            refs: self.refs.clone(),
            permissions: self.permissions.clone(),
            limits: self.limits.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Index, query and reindex machinery of one entity type
pub struct IndexEngine<V: Entity> {
    config: Config,
    status: Arc<IndexStatus>,
    indexes: Arc<IndexCollection<V>>,
    pending: Mutex<Option<Arc<dyn Index<V>>>>,
    queries: QueryContext<V>,
    indexer: Indexer<V>,
    batch: Arc<BatchReindexer<V>>,
    cache: Option<Arc<LruEntityCache<V>>>,
}

impl<V: Entity> IndexEngine<V> {
    /// Open the newest ready version for searching. Fails with a
    /// configuration error when no version of `defs` is ready.
    pub fn open(
        config: Config,
        defs: Arc<SchemaDefinitions<V>>,
        factory: Arc<dyn IndexFactory<V>>,
        collaborators: Collaborators<V>,
    ) -> Result<Self> {
        let status = Arc::new(IndexStatus::load(&config.index_dir())?);
        let versions = VersionManager::new(defs, factory, status.clone(), config.online_reindex);
        let opened = versions.open()?;
        Self::assemble(config, status, opened.collection, opened.pending, collaborators)
    }

    /// Build the latest version from scratch and mark it ready, for a site
    /// with no ready version yet. Nothing serves reads meanwhile.
    pub fn reindex_offline(
        config: &Config,
        defs: Arc<SchemaDefinitions<V>>,
        factory: Arc<dyn IndexFactory<V>>,
        collaborators: Collaborators<V>,
    ) -> Result<BatchResult> {
        let status = Arc::new(IndexStatus::load(&config.index_dir())?);
        let versions = VersionManager::new(defs.clone(), factory, status.clone(), false);
        let index = versions.create_latest()?;

        let indexes = Arc::new(IndexCollection::new(defs.name()));
        indexes.add_write_index(index.clone());
        let staleness = Arc::new(StalenessChecker::new(indexes.clone(), collaborators.refs.clone()));
        let indexer = Indexer::new(
            indexes,
            collaborators.source.clone(),
            Arc::new(NoCache),
            staleness,
            collaborators.metrics.clone(),
        );
        let batch = BatchReindexer::new(indexer, config.batch_threads)?;

        let result = batch.reindex_into(&index)?;
        index.mark_ready(result.success())?;
        info!(index = defs.name(), version = index.version(), ready = result.success(), "offline reindex finished");
        Ok(result)
    }

    fn assemble(
        config: Config,
        status: Arc<IndexStatus>,
        indexes: Arc<IndexCollection<V>>,
        pending: Option<Arc<dyn Index<V>>>,
        collaborators: Collaborators<V>,
    ) -> Result<Self> {
        let lru = match config.entity_cache_size {
            0 => None,
            size => Some(Arc::new(LruEntityCache::new(collaborators.source.clone(), size)?)),
        };
        let source: Arc<dyn EntitySource<V>> = match &lru {
            Some(cache) => cache.clone(),
            None => collaborators.source.clone(),
        };
        let cache: Arc<dyn EntityCache<V::Key>> = match &lru {
            Some(cache) => cache.clone(),
            None => Arc::new(NoCache),
        };

        let staleness = Arc::new(StalenessChecker::new(indexes.clone(), collaborators.refs.clone()));
        let executor = Arc::new(ReindexExecutor::new(indexes.name(), config.reindex_threads)?);
        let indexer = Indexer::new(indexes.clone(), source, cache, staleness, collaborators.metrics.clone())
            .with_executor(executor, config.auto_reindex_if_stale);
        let batch = Arc::new(BatchReindexer::new(indexer.clone(), config.batch_threads)?);

        let queries = QueryContext {
            indexes: indexes.clone(),
            permissions: collaborators.permissions,
            limits: collaborators.limits,
            metrics: collaborators.metrics,
            config: config.clone(),
            default_field: None,
        };

        Ok(IndexEngine {
            config,
            status,
            indexes,
            pending: Mutex::new(pending),
            queries,
            indexer,
            batch,
            cache: lru,
        })
    }

    /// Field used by query strings for terms without `field:`
    pub fn with_default_field(mut self, field: &str) -> Self {
        self.queries.default_field = Some(field.to_string());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> &Arc<IndexStatus> {
        &self.status
    }

    pub fn indexes(&self) -> &Arc<IndexCollection<V>> {
        &self.indexes
    }

    pub fn search_version(&self) -> Option<u32> {
        self.indexes.search_index().map(|i| i.version())
    }

    /// Version being built by online reindexing, if any
    pub fn pending_version(&self) -> Option<u32> {
        self.pending.lock().as_ref().map(|i| i.version())
    }

    pub fn entity_cache(&self) -> Option<&Arc<LruEntityCache<V>>> {
        self.cache.as_ref()
    }

    /// Fresh one-shot processor for `user`
    pub fn processor(&self, user: CurrentUser) -> QueryProcessor<'_, V> {
        self.queries.processor(user)
    }

    pub fn indexer(&self) -> &Indexer<V> {
        &self.indexer
    }

    pub fn reindex_all(&self) -> Result<BatchResult> {
        self.batch.reindex_all()
    }

    /// Build the pending version and switch searches to it. `None` when
    /// the search index is already the latest version.
    pub fn run_online_reindex(&self) -> Result<Option<BatchResult>> {
        let Some(target) = self.pending.lock().clone() else {
            return Ok(None);
        };
        if !self.config.online_reindex {
            return Err(Error::configuration("online reindexing is disabled"));
        }

        let online = OnlineReindexer::new(self.indexes.clone(), target, self.batch.clone());
        let result = online.run()?;
        if result.success() {
            self.pending.lock().take();
        }
        Ok(Some(result))
    }
}
