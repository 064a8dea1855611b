use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use parking_lot::RwLock;
use tracing::trace;
use crate::core::error::{Error, Result};
use crate::core::types::{FieldBundle, FieldValue};
use crate::index::document::{DataSource, Entity, Index, ResultSet};
use crate::index::status::IndexStatus;
use crate::query::options::{PaginationType, QueryOptions, SearchAfter};
use crate::query::predicate::Predicate;
use crate::schema::schema::Schema;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

/// Result order of one entity type. Documents missing a sort field go
/// last; identity breaks remaining ties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSort {
    pub keys: Vec<SortKey>,
}

impl IndexSort {
    pub fn new() -> Self {
        IndexSort { keys: Vec::new() }
    }

    pub fn asc(mut self, field: &str) -> Self {
        self.keys.push(SortKey {
            field: field.to_string(),
            descending: false,
        });
        self
    }

    pub fn desc(mut self, field: &str) -> Self {
        self.keys.push(SortKey {
            field: field.to_string(),
            descending: true,
        });
        self
    }

    pub fn sort_values(&self, doc: &FieldBundle) -> Vec<Option<FieldValue>> {
        self.keys
            .iter()
            .map(|k| doc.first(&k.field).cloned())
            .collect()
    }

    pub fn compare_values(&self, a: &[Option<FieldValue>], b: &[Option<FieldValue>]) -> Ordering {
        for (i, key) in self.keys.iter().enumerate() {
            let ord = match (a.get(i).and_then(|v| v.as_ref()), b.get(i).and_then(|v| v.as_ref())) {
                (Some(x), Some(y)) => {
                    let ord = x.compare(y).unwrap_or(Ordering::Equal);
                    if key.descending { ord.reverse() } else { ord }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    pub fn compare(&self, a: &FieldBundle, b: &FieldBundle) -> Ordering {
        self.compare_values(&self.sort_values(a), &self.sort_values(b))
    }
}

/// One indexed document
pub struct StoredDocument<V: Entity> {
    pub key: V::Key,
    pub entity: V,
    pub fields: FieldBundle,
    pub sort_values: Vec<Option<FieldValue>>,
}

/// Backend-agnostic index holding every document in a single lock-guarded
/// map. Filtering and sorting for a query happen under one read lock, so a
/// source never observes a half-applied write.
pub struct InMemoryIndex<V: Entity> {
    name: String,
    schema: Arc<Schema<V>>,
    sort: IndexSort,
    documents: RwLock<BTreeMap<V::Key, Arc<StoredDocument<V>>>>,
    status: Arc<IndexStatus>,
    skip_fields: HashSet<String>,
    max_limit: Option<usize>,
}

impl<V: Entity> InMemoryIndex<V> {
    pub fn new(name: &str, schema: Arc<Schema<V>>, sort: IndexSort, status: Arc<IndexStatus>) -> Self {
        InMemoryIndex {
            name: name.to_string(),
            schema,
            sort,
            documents: RwLock::new(BTreeMap::new()),
            status,
            skip_fields: HashSet::new(),
            max_limit: None,
        }
    }

    /// Fields that are declared but not written into documents
    pub fn with_skip_fields(mut self, skip: HashSet<String>) -> Self {
        self.skip_fields = skip;
        self
    }

    pub fn with_max_limit(mut self, max_limit: usize) -> Self {
        self.max_limit = Some(max_limit);
        self
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    // Same order as the result sort: sort values, then ascending key.
    fn after_cursor(&self, doc: &StoredDocument<V>, cursor: &SearchAfter) -> bool {
        let key: FieldValue = doc.key.clone().into();
        self.sort
            .compare_values(&doc.sort_values, &cursor.values)
            .then_with(|| key.compare(&cursor.key).unwrap_or(Ordering::Equal))
            == Ordering::Greater
    }

    /// Stored fields the caller asked for; every stored field by default
    fn projection(&self, opts: &QueryOptions) -> BTreeSet<String> {
        let stored: BTreeSet<String> = self.schema.stored_field_names().cloned().collect();
        match &opts.fields {
            Some(requested) => requested.intersection(&stored).cloned().collect(),
            None => stored,
        }
    }
}

impl<V: Entity> Index<V> for InMemoryIndex<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Arc<Schema<V>> {
        &self.schema
    }

    fn replace(&self, entity: &V) -> Result<()> {
        let fields = self.schema.build_fields(entity, &self.skip_fields)?;
        let doc = StoredDocument {
            key: entity.key(),
            entity: entity.clone(),
            sort_values: self.sort.sort_values(&fields),
            fields,
        };
        trace!(index = %self.name, version = self.version(), key = %doc.key, "replace");
        self.documents.write().insert(doc.key.clone(), Arc::new(doc));
        Ok(())
    }

    fn delete(&self, key: &V::Key) -> Result<()> {
        trace!(index = %self.name, version = self.version(), key = %key, "delete");
        self.documents.write().remove(key);
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        self.documents.write().clear();
        Ok(())
    }

    fn get_source(&self, predicate: &Predicate<V>, opts: &QueryOptions) -> Result<Box<dyn DataSource<V>>> {
        if predicate.has_post_filter() {
            return Err(Error::internal(format!(
                "{} index received a predicate with post filters: {}",
                self.name, predicate
            )));
        }

        let documents = self.documents.read();
        let mut matched = Vec::new();
        for doc in documents.values() {
            if predicate.matches_document(&doc.fields)? {
                matched.push(doc.clone());
            }
        }
        matched.sort_by(|a, b| {
            self.sort
                .compare_values(&a.sort_values, &b.sort_values)
                .then_with(|| a.key.cmp(&b.key))
        });
        drop(documents);

        let cardinality = matched.len();
        let limit = match self.max_limit {
            Some(max) => opts.limit.min(max),
            None => opts.limit,
        };
        let skip = match (&opts.pagination, &opts.search_after) {
            (PaginationType::SearchAfter, Some(cursor)) => matched
                .iter()
                .position(|d| self.after_cursor(d, cursor))
                .unwrap_or(cardinality),
            _ => opts.start.min(cardinality),
        };
        let rows: Vec<_> = matched.into_iter().skip(skip).take(limit).collect();

        Ok(Box::new(MemorySource {
            rows: Arc::new(rows),
            cardinality,
            projection: Arc::new(self.projection(opts)),
        }))
    }

    fn get(&self, key: &V::Key, _opts: &QueryOptions) -> Result<Option<V>> {
        Ok(self.documents.read().get(key).map(|d| d.entity.clone()))
    }

    fn get_raw(&self, key: &V::Key, opts: &QueryOptions) -> Result<Option<FieldBundle>> {
        let projection = self.projection(opts);
        Ok(self
            .documents
            .read()
            .get(key)
            .map(|d| d.fields.project(&projection)))
    }

    fn mark_ready(&self, ready: bool) -> Result<()> {
        self.status.set_ready(&self.name, self.version(), ready)
    }

    fn max_limit(&self) -> Option<usize> {
        self.max_limit
    }

    fn supports_search_after(&self) -> bool {
        true
    }
}

struct MemorySource<V: Entity> {
    rows: Arc<Vec<Arc<StoredDocument<V>>>>,
    cardinality: usize,
    projection: Arc<BTreeSet<String>>,
}

impl<V: Entity> DataSource<V> for MemorySource<V> {
    fn cardinality(&self) -> usize {
        self.cardinality
    }

    fn read(&self) -> Result<ResultSet<V>> {
        let rows = self.rows.clone();
        Ok(ResultSet::new(
            (0..rows.len()).map(move |i| rows[i].entity.clone()),
        ))
    }

    fn read_raw(&self) -> Result<ResultSet<FieldBundle>> {
        let rows = self.rows.clone();
        let projection = self.projection.clone();
        Ok(ResultSet::new(
            (0..rows.len()).map(move |i| rows[i].fields.project(projection.iter())),
        ))
    }

    fn next_cursor(&self) -> Option<SearchAfter> {
        self.rows.last().map(|d| SearchAfter {
            values: d.sort_values.clone(),
            key: d.key.clone().into(),
        })
    }
}
