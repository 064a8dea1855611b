use std::sync::Arc;
use parking_lot::RwLock;
use tracing::info;
use crate::index::document::{Entity, Index};

/// The index serving reads plus every version that must receive writes.
/// During an online upgrade the write list holds two versions.
pub struct IndexCollection<V: Entity> {
    name: String,
    search: RwLock<Option<Arc<dyn Index<V>>>>,
    writes: RwLock<Vec<Arc<dyn Index<V>>>>,
}

impl<V: Entity> IndexCollection<V> {
    pub fn new(name: &str) -> Self {
        IndexCollection {
            name: name.to_string(),
            search: RwLock::new(None),
            writes: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn search_index(&self) -> Option<Arc<dyn Index<V>>> {
        self.search.read().clone()
    }

    pub fn set_search_index(&self, index: Arc<dyn Index<V>>) {
        info!(index = %self.name, version = index.version(), "using index version for searches");
        *self.search.write() = Some(index);
    }

    /// Snapshot of the current write indexes
    pub fn write_indexes(&self) -> Vec<Arc<dyn Index<V>>> {
        self.writes.read().clone()
    }

    /// Adds a write index, replacing any index of the same version
    pub fn add_write_index(&self, index: Arc<dyn Index<V>>) {
        let mut writes = self.writes.write();
        writes.retain(|i| i.version() != index.version());
        writes.push(index);
        writes.sort_by_key(|i| i.version());
    }

    pub fn remove_write_index(&self, version: u32) -> Option<Arc<dyn Index<V>>> {
        let mut writes = self.writes.write();
        let pos = writes.iter().position(|i| i.version() == version)?;
        Some(writes.remove(pos))
    }

    pub fn write_index(&self, version: u32) -> Option<Arc<dyn Index<V>>> {
        self.writes
            .read()
            .iter()
            .find(|i| i.version() == version)
            .cloned()
    }
}
