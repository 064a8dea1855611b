use std::sync::Arc;
use tracing::{info, warn};
use crate::core::error::Result;
use crate::index::collection::IndexCollection;
use crate::index::document::{Entity, Index};
use crate::indexer::batch::{BatchReindexer, BatchResult};

/// Builds a new schema version while the previous one keeps serving reads,
/// then switches searches over to it.
pub struct OnlineReindexer<V: Entity> {
    indexes: Arc<IndexCollection<V>>,
    target: Arc<dyn Index<V>>,
    batch: Arc<BatchReindexer<V>>,
}

impl<V: Entity> OnlineReindexer<V> {
    pub fn new(indexes: Arc<IndexCollection<V>>, target: Arc<dyn Index<V>>, batch: Arc<BatchReindexer<V>>) -> Self {
        OnlineReindexer { indexes, target, batch }
    }

    pub fn version(&self) -> u32 {
        self.target.version()
    }

    /// On any failed key the new version stays not ready and reads keep
    /// using the old one.
    pub fn run(&self) -> Result<BatchResult> {
        let version = self.version();
        info!(index = self.indexes.name(), version, "starting online reindex");

        self.target.mark_ready(false)?;
        self.target.delete_all()?;
        self.indexes.add_write_index(self.target.clone());

        let result = self.batch.reindex_into(&self.target)?;
        if !result.success() {
            warn!(
                index = self.indexes.name(),
                version,
                failed = result.failed,
                "online reindex incomplete; version left not ready"
            );
            return Ok(result);
        }

        self.target.mark_ready(true)?;
        self.indexes.set_search_index(self.target.clone());
        for old in self.indexes.write_indexes() {
            if old.version() < version {
                self.indexes.remove_write_index(old.version());
                old.mark_ready(false)?;
                info!(index = self.indexes.name(), version = old.version(), "retired index version");
            }
        }
        info!(index = self.indexes.name(), version, "online reindex complete");
        Ok(result)
    }
}
