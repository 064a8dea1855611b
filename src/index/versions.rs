use std::sync::Arc;
use tracing::{info, warn};
use crate::core::error::{Error, Result};
use crate::index::collection::IndexCollection;
use crate::index::document::{Entity, Index};
use crate::index::factory::IndexFactory;
use crate::index::status::IndexStatus;
use crate::schema::definitions::SchemaDefinitions;

/// Indexes opened at startup
pub struct OpenedIndexes<V: Entity> {
    pub collection: Arc<IndexCollection<V>>,
    /// Latest version, receiving writes but not yet ready to serve reads
    pub pending: Option<Arc<dyn Index<V>>>,
}

/// Decides which schema versions serve reads and which receive writes
pub struct VersionManager<V: Entity> {
    pub defs: Arc<SchemaDefinitions<V>>,
    pub factory: Arc<dyn IndexFactory<V>>,
    pub status: Arc<IndexStatus>,
    pub online_reindex: bool,
}

impl<V: Entity> VersionManager<V> {
    pub fn new(
        defs: Arc<SchemaDefinitions<V>>,
        factory: Arc<dyn IndexFactory<V>>,
        status: Arc<IndexStatus>,
        online_reindex: bool,
    ) -> Self {
        VersionManager {
            defs,
            factory,
            status,
            online_reindex,
        }
    }

    /// Search with the newest ready version. When the latest version is
    /// newer and online reindexing is on, it is opened as an extra write
    /// index and returned as pending.
    pub fn open(&self) -> Result<OpenedIndexes<V>> {
        let name = self.defs.name();
        let search_schema = self
            .defs
            .schemas()
            .iter()
            .rev()
            .find(|s| self.status.is_ready(name, s.version()))
            .ok_or_else(|| {
                Error::configuration(format!(
                    "no index versions for {} ready; run a full reindex first",
                    name
                ))
            })?;

        let collection = Arc::new(IndexCollection::new(name));
        let search = self.factory.create(name, search_schema.clone(), self.status.clone())?;
        collection.set_search_index(search.clone());
        collection.add_write_index(search);

        let latest = self.defs.latest();
        let mut pending = None;
        if latest.version() != search_schema.version() {
            if self.online_reindex {
                info!(
                    index = name,
                    from = search_schema.version(),
                    to = latest.version(),
                    "latest index version not ready; writing to both versions"
                );
                let index = self.factory.create(name, latest.clone(), self.status.clone())?;
                collection.add_write_index(index.clone());
                pending = Some(index);
            } else {
                warn!(
                    index = name,
                    search = search_schema.version(),
                    latest = latest.version(),
                    "not using latest index version and online reindexing is disabled"
                );
            }
        }

        Ok(OpenedIndexes { collection, pending })
    }

    /// Fresh, not-ready index of the latest version for an offline rebuild
    pub fn create_latest(&self) -> Result<Arc<dyn Index<V>>> {
        self.factory.create(self.defs.name(), self.defs.latest().clone(), self.status.clone())
    }
}
