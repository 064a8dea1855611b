use std::fmt;
use std::sync::Arc;
use tracing::trace;
use crate::core::error::{Error, Result};
use crate::index::collection::IndexCollection;
use crate::index::document::{Entity, Index};
use crate::query::options::{PaginationType, QueryOptions};
use crate::query::predicate::{IndexPredicate, Predicate};
use crate::schema::schema::Schema;

/// A predicate split into the part the index evaluates and the part
/// checked against hydrated entities afterwards.
pub struct QueryPlan<V: Entity> {
    pub index: Arc<dyn Index<V>>,
    pub pushed: Predicate<V>,
    pub residual: Option<Predicate<V>>,
}

/// Rows of one executed plan
pub struct PlanResults<V> {
    pub entities: Vec<V>,
    /// Index matches before post filtering
    pub cardinality: usize,
    /// Rows read from the index, including those the residual rejected
    pub scanned: usize,
}

impl<V: Entity> QueryPlan<V> {
    pub fn cost(&self) -> u32 {
        self.pushed.cost() + self.residual.as_ref().map_or(0, |r| r.cost())
    }

    pub fn execute(&self, opts: &QueryOptions) -> Result<PlanResults<V>> {
        match &self.residual {
            None => {
                let source = self.index.get_source(&self.pushed, opts)?;
                let entities = source.read()?.to_list();
                Ok(PlanResults {
                    scanned: entities.len(),
                    cardinality: source.cardinality(),
                    entities,
                })
            }
            Some(residual) => self.execute_filtered(residual, opts),
        }
    }

    // The residual may reject rows, so the index is paged until enough
    // rows survive or it runs dry. Skipping `start` happens after filtering.
    fn execute_filtered(&self, residual: &Predicate<V>, opts: &QueryOptions) -> Result<PlanResults<V>> {
        let mut results = PlanResults {
            entities: Vec::new(),
            cardinality: 0,
            scanned: 0,
        };
        if opts.limit == 0 {
            return Ok(results);
        }

        let wanted = opts.start.saturating_add(opts.limit);
        let page_size = match self.index.max_limit() {
            Some(max) => wanted.min(max),
            None => wanted,
        }
        .max(1);
        let use_cursor = opts.pagination == PaginationType::SearchAfter && self.index.supports_search_after();

        let mut matched = 0usize;
        let mut offset = 0usize;
        let mut cursor = opts.search_after.clone();
        let mut first = true;
        loop {
            let page = if use_cursor {
                opts.next_page(0, page_size, cursor.clone())
            } else {
                let mut page = opts.next_page(offset, page_size, None);
                page.pagination = PaginationType::Offset;
                page
            };
            let source = self.index.get_source(&self.pushed, &page)?;
            if first {
                results.cardinality = source.cardinality();
                first = false;
            }

            let rows = source.read()?.to_list();
            let read = rows.len();
            for entity in rows {
                results.scanned += 1;
                if !residual.matches(&entity)? {
                    continue;
                }
                if matched >= opts.start {
                    results.entities.push(entity);
                    if results.entities.len() >= opts.limit {
                        return Ok(results);
                    }
                }
                matched += 1;
            }

            if read < page_size {
                return Ok(results);
            }
            offset += read;
            cursor = source.next_cursor();
            trace!(index = self.index.name(), offset, "fetching next page for post filtering");
        }
    }
}

impl<V: Entity> fmt::Display for QueryPlan<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "index[v{}]({})", self.index.version(), self.pushed)?;
        if let Some(residual) = &self.residual {
            write!(f, " filter({})", residual)?;
        }
        Ok(())
    }
}

/// Turns a predicate into a plan against the current search index
pub struct IndexRewriter<V: Entity> {
    indexes: Arc<IndexCollection<V>>,
}

impl<V: Entity> IndexRewriter<V> {
    pub fn new(indexes: Arc<IndexCollection<V>>) -> Self {
        IndexRewriter { indexes }
    }

    pub fn rewrite(&self, predicate: &Predicate<V>) -> Result<QueryPlan<V>> {
        let index = self.indexes.search_index().ok_or_else(|| {
            Error::configuration(format!("no search index available for {}", self.indexes.name()))
        })?;

        let mut pushed = Vec::new();
        let mut residual = Vec::new();
        split(predicate, &mut pushed, &mut residual);

        let pushed = match pushed.len() {
            0 => Predicate::Any,
            _ => resolve(&Predicate::and(pushed), index.schema())?,
        };
        let residual = match residual.len() {
            0 => None,
            _ => Some(Predicate::and(residual)),
        };

        let plan = QueryPlan { index, pushed, residual };
        trace!(query = %predicate, plan = %plan, "rewrote query");
        Ok(plan)
    }
}

// Index-only conjuncts are pushed down. Any other subtree stays whole in
// the residual: an OR or NOT over a post filter cannot be split.
fn split<V>(predicate: &Predicate<V>, pushed: &mut Vec<Predicate<V>>, residual: &mut Vec<Predicate<V>>) {
    if predicate.is_index_only() {
        if !matches!(predicate, Predicate::Any) {
            pushed.push(predicate.clone());
        }
        return;
    }
    match predicate {
        Predicate::And(children) => {
            for child in children {
                split(child, pushed, residual);
            }
        }
        _ => residual.push(predicate.clone()),
    }
}

/// Rebind every leaf to the index schema's definition of its field,
/// rejecting fields or operators that version cannot answer.
fn resolve<V>(predicate: &Predicate<V>, schema: &Schema<V>) -> Result<Predicate<V>> {
    let children = |c: &[Predicate<V>]| -> Result<Vec<Predicate<V>>> {
        c.iter().map(|p| resolve(p, schema)).collect()
    };
    match predicate {
        Predicate::Any => Ok(Predicate::Any),
        Predicate::Field(leaf) => {
            let name = leaf.field.name();
            let field = schema.field(name).filter(|f| f.is_searchable()).ok_or_else(|| {
                Error::query_parse(format!(
                    "field {} is not searchable in index version {}",
                    name,
                    schema.version()
                ))
            })?;
            if !leaf.op.supported_by(field.field_type) {
                return Err(Error::query_parse(format!(
                    "operator {:?} is not supported on field {}",
                    leaf.op, name
                )));
            }
            Ok(Predicate::Field(IndexPredicate {
                field: field.clone(),
                op: leaf.op,
                value: leaf.value.clone(),
            }))
        }
        Predicate::And(c) => Ok(Predicate::And(children(c)?)),
        Predicate::Or(c) => Ok(Predicate::Or(children(c)?)),
        Predicate::Not(c) => Ok(Predicate::not(resolve(c, schema)?)),
        Predicate::PostFilter(f) => Err(Error::internal(format!(
            "post filter {} reached index resolution",
            f.label()
        ))),
    }
}
