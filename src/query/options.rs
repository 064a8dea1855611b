use std::collections::BTreeSet;
use crate::core::types::FieldValue;

/// Position of the last row of a page: its sort values plus its key,
/// which breaks ties between rows with equal sort values. The scan
/// resumes right after it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchAfter {
    pub values: Vec<Option<FieldValue>>,
    pub key: FieldValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationType {
    Offset,
    SearchAfter,
}

/// Per-query value object handed to the index
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub start: usize,
    pub limit: usize,
    pub pagination: PaginationType,
    pub search_after: Option<SearchAfter>,
    pub fields: Option<BTreeSet<String>>,   // None = every stored field
}

impl QueryOptions {
    pub fn new(start: usize, limit: usize) -> Self {
        QueryOptions {
            start,
            limit,
            pagination: PaginationType::Offset,
            search_after: None,
            fields: None,
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_search_after(mut self, cursor: Option<SearchAfter>) -> Self {
        self.pagination = PaginationType::SearchAfter;
        self.search_after = cursor;
        self
    }

    /// Same options for the next page
    pub fn next_page(&self, start: usize, limit: usize, cursor: Option<SearchAfter>) -> Self {
        QueryOptions {
            start,
            limit,
            pagination: self.pagination,
            search_after: cursor,
            fields: self.fields.clone(),
        }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions::new(0, usize::MAX)
    }
}
