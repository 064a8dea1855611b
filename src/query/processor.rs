use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::QueryMetrics;
use crate::core::types::CurrentUser;
use crate::index::collection::IndexCollection;
use crate::index::document::Entity;
use crate::query::builder::QueryBuilder;
use crate::query::options::{PaginationType, QueryOptions};
use crate::query::predicate::{PostFilter, Predicate};
use crate::query::rewriter::IndexRewriter;

/// Decides whether a user may see an entity
pub trait PermissionBackend<V>: Send + Sync {
    fn can_see(&self, user: &CurrentUser, entity: &V) -> Result<bool>;
}

/// Per-user cap on rows per query; 0 disables queries for that user
pub trait QueryLimits: Send + Sync {
    fn query_limit(&self, user: &CurrentUser) -> usize;
}

/// Same limit for every user
pub struct FixedQueryLimits(pub usize);

impl QueryLimits for FixedQueryLimits {
    fn query_limit(&self, _user: &CurrentUser) -> usize {
        self.0
    }
}

/// Keeps only entities the user can see
pub struct IsVisible<V> {
    user: CurrentUser,
    permissions: Arc<dyn PermissionBackend<V>>,
}

impl<V> IsVisible<V> {
    pub fn new(user: CurrentUser, permissions: Arc<dyn PermissionBackend<V>>) -> Self {
        IsVisible { user, permissions }
    }
}

impl<V> PostFilter<V> for IsVisible<V> {
    fn label(&self) -> String {
        format!("is_visible_to({})", self.user)
    }

    fn matches(&self, entity: &V) -> Result<bool> {
        self.permissions
            .can_see(&self.user, entity)
            .map_err(|e| e.with_kind(ErrorKind::PermissionCheck))
    }

    fn cost(&self) -> u32 {
        20
    }
}

/// Page of results for one predicate
#[derive(Debug)]
pub struct QueryResult<V> {
    pub predicate: Predicate<V>,
    pub entities: Vec<V>,
    /// More rows exist past this page
    pub more: bool,
    pub start: usize,
    pub limit: usize,
    /// Index matches before visibility filtering
    pub cardinality: usize,
}

/// Everything a processor needs, shared by all queries of one entity type
pub struct QueryContext<V: Entity> {
    pub indexes: Arc<IndexCollection<V>>,
    pub permissions: Arc<dyn PermissionBackend<V>>,
    pub limits: Arc<dyn QueryLimits>,
    pub metrics: Arc<dyn QueryMetrics>,
    pub config: Config,
    pub default_field: Option<String>,
}

impl<V: Entity> QueryContext<V> {
    pub fn processor(&self, user: CurrentUser) -> QueryProcessor<'_, V> {
        QueryProcessor {
            ctx: self,
            user,
            start: 0,
            limit: None,
            fields: None,
            pagination: PaginationType::Offset,
        }
    }
}

/// One-shot query execution on behalf of a user. Consumed by the query call.
pub struct QueryProcessor<'a, V: Entity> {
    ctx: &'a QueryContext<V>,
    user: CurrentUser,
    start: usize,
    limit: Option<usize>,
    fields: Option<BTreeSet<String>>,
    pagination: PaginationType,
}

impl<'a, V: Entity> QueryProcessor<'a, V> {
    pub fn set_start(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    pub fn set_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn set_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// How the index is paged while post filters drop rows
    pub fn set_pagination(mut self, pagination: PaginationType) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn query(self, predicate: Predicate<V>) -> Result<QueryResult<V>> {
        self.query_many(vec![predicate])?
            .pop()
            .ok_or_else(|| Error::internal("no result for query"))
    }

    pub fn query_str(self, query: &str) -> Result<QueryResult<V>> {
        let index = self.ctx.indexes.search_index().ok_or_else(|| {
            Error::configuration(format!("no search index available for {}", self.ctx.indexes.name()))
        })?;
        let mut builder = QueryBuilder::new(index.schema().clone());
        if let Some(field) = &self.ctx.default_field {
            builder = builder.with_default_field(field);
        }
        let predicate = builder.parse(query)?;
        self.query(predicate)
    }

    /// Run several queries; every one is planned before any hits the index
    pub fn query_many(self, predicates: Vec<Predicate<V>>) -> Result<Vec<QueryResult<V>>> {
        let started = Instant::now();
        let limit = self.effective_limit()?;
        let rewriter = IndexRewriter::new(self.ctx.indexes.clone());

        let visible = Predicate::post_filter(Arc::new(IsVisible::new(
            self.user.clone(),
            self.ctx.permissions.clone(),
        )));
        let mut plans = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            let enforced = Predicate::and(vec![predicate.clone(), visible.clone()]);
            plans.push((predicate, rewriter.rewrite(&enforced)?));
        }

        // One extra row tells whether another page exists.
        let opts = QueryOptions {
            start: self.start,
            limit: limit.saturating_add(1),
            pagination: self.pagination,
            search_after: None,
            fields: self.fields.clone(),
        };

        let mut results = Vec::with_capacity(plans.len());
        let mut total = 0;
        for (predicate, plan) in plans {
            let mut fetched = plan.execute(&opts)?;
            let more = fetched.entities.len() > limit;
            fetched.entities.truncate(limit);
            total += fetched.entities.len();
            debug!(
                user = %self.user,
                query = %predicate,
                plan = %plan,
                rows = fetched.entities.len(),
                scanned = fetched.scanned,
                more,
                "query executed"
            );
            results.push(QueryResult {
                predicate,
                entities: fetched.entities,
                more,
                start: self.start,
                limit,
                cardinality: fetched.cardinality,
            });
        }

        self.ctx
            .metrics
            .record_query(self.ctx.indexes.name(), started.elapsed(), total);
        Ok(results)
    }

    fn effective_limit(&self) -> Result<usize> {
        let permitted = self.ctx.limits.query_limit(&self.user);
        if permitted == 0 {
            return Err(Error::query_parse(format!("query disabled for {}", self.user)));
        }

        let mut limit = self
            .limit
            .unwrap_or(self.ctx.config.default_query_limit)
            .min(permitted)
            .min(self.ctx.config.max_query_limit);
        if let Some(max) = self.ctx.indexes.search_index().and_then(|i| i.max_limit()) {
            limit = limit.min(max);
        }
        Ok(limit)
    }
}
