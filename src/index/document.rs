use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use crate::core::error::Result;
use crate::core::types::{FieldBundle, FieldValue};
use crate::query::options::{QueryOptions, SearchAfter};
use crate::query::predicate::Predicate;
use crate::schema::schema::Schema;

/// In-memory object that can be projected into an index document
pub trait Entity: Clone + Send + Sync + 'static {
    /// Its `FieldValue` form must order like the key itself; search-after
    /// cursors compare keys through it.
    type Key: Clone + Eq + Hash + Ord + Into<FieldValue> + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Stable identity used for replace and delete
    fn key(&self) -> Self::Key;
}

/// One schema version of the document index of one entity type.
///
/// Implementations must be safe to share between threads. A `get_source`
/// call observes a single point-in-time view of the index.
pub trait Index<V: Entity>: Send + Sync {
    /// Entity type name, e.g. "changes"
    fn name(&self) -> &str;

    fn schema(&self) -> &Arc<Schema<V>>;

    fn version(&self) -> u32 {
        self.schema().version()
    }

    /// Idempotent upsert keyed by `entity.key()`
    fn replace(&self, entity: &V) -> Result<()>;

    /// Deleting an absent key is a no-op
    fn delete(&self, key: &V::Key) -> Result<()>;

    fn delete_all(&self) -> Result<()>;

    /// Lazy source for an index-only predicate. An empty result is a
    /// source with cardinality 0, never an error.
    fn get_source(&self, predicate: &Predicate<V>, opts: &QueryOptions) -> Result<Box<dyn DataSource<V>>>;

    /// Point lookup by identity
    fn get(&self, key: &V::Key, opts: &QueryOptions) -> Result<Option<V>>;

    /// Point lookup of the stored fields named in `opts.fields`
    fn get_raw(&self, key: &V::Key, opts: &QueryOptions) -> Result<Option<FieldBundle>>;

    /// Persist whether this version may serve reads
    fn mark_ready(&self, ready: bool) -> Result<()>;

    /// Hard cap on rows per request, if the backend has one
    fn max_limit(&self) -> Option<usize> {
        None
    }

    fn supports_search_after(&self) -> bool {
        false
    }
}

/// Result of one index request: the page and the total match count
pub trait DataSource<V: Entity>: Send {
    /// Number of matching documents, independent of the page
    fn cardinality(&self) -> usize;

    /// Rows of this page as hydrated entities
    fn read(&self) -> Result<ResultSet<V>>;

    /// Rows of this page as raw stored fields
    fn read_raw(&self) -> Result<ResultSet<FieldBundle>>;

    /// Cursor positioned after the last row of this page
    fn next_cursor(&self) -> Option<SearchAfter>;
}

/// Pull-based stream of results
pub struct ResultSet<T> {
    iter: Box<dyn Iterator<Item = T> + Send>,
}

impl<T: 'static> ResultSet<T> {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = T> + Send + 'static,
    {
        ResultSet { iter: Box::new(iter) }
    }

    pub fn empty() -> Self
    where
        T: Send,
    {
        ResultSet::new(std::iter::empty())
    }

    pub fn to_list(self) -> Vec<T> {
        self.iter.collect()
    }
}

impl<T> Iterator for ResultSet<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.iter.next()
    }
}
