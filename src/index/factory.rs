use std::collections::HashSet;
use std::sync::Arc;
use crate::core::error::Result;
use crate::index::document::{Entity, Index};
use crate::index::memory::{InMemoryIndex, IndexSort};
use crate::index::status::IndexStatus;
use crate::schema::schema::Schema;

/// Builds the backend implementation of one entity type's index.
/// Chosen once at configuration time.
pub trait IndexFactory<V: Entity>: Send + Sync {
    fn create(&self, name: &str, schema: Arc<Schema<V>>, status: Arc<IndexStatus>) -> Result<Arc<dyn Index<V>>>;
}

pub struct MemoryIndexFactory {
    pub sort: IndexSort,
    pub skip_fields: HashSet<String>,
    pub max_limit: Option<usize>,
}

impl MemoryIndexFactory {
    pub fn new(sort: IndexSort) -> Self {
        MemoryIndexFactory {
            sort,
            skip_fields: HashSet::new(),
            max_limit: None,
        }
    }

    pub fn with_max_limit(mut self, max_limit: usize) -> Self {
        self.max_limit = Some(max_limit);
        self
    }

    pub fn with_skip_fields<I: IntoIterator<Item = String>>(mut self, skip: I) -> Self {
        self.skip_fields = skip.into_iter().collect();
        self
    }
}

impl<V: Entity> IndexFactory<V> for MemoryIndexFactory {
    fn create(&self, name: &str, schema: Arc<Schema<V>>, status: Arc<IndexStatus>) -> Result<Arc<dyn Index<V>>> {
        let mut index = InMemoryIndex::new(name, schema, self.sort.clone(), status)
            .with_skip_fields(self.skip_fields.clone());
        if let Some(max) = self.max_limit {
            index = index.with_max_limit(max);
        }
        Ok(Arc::new(index))
    }
}
