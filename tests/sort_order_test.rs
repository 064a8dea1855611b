mod common;

use std::cmp::Reverse;
use std::sync::Arc;
use proptest::prelude::*;
use common::{Change, ChangeFields, change, change_schemas, change_sort, ts};
use docindex::index::document::Index;
use docindex::index::memory::{InMemoryIndex, IndexSort};
use docindex::index::status::IndexStatus;
use docindex::query::options::{QueryOptions, SearchAfter};
use docindex::query::predicate::Predicate;

fn index_of(changes: &[Change]) -> InMemoryIndex<Change> {
    sorted_index_of(changes, change_sort())
}

fn sorted_index_of(changes: &[Change], sort: IndexSort) -> InMemoryIndex<Change> {
    let defs = change_schemas(&ChangeFields::new());
    let index = InMemoryIndex::new(
        "changes",
        defs.latest().clone(),
        sort,
        Arc::new(IndexStatus::in_memory()),
    );
    for c in changes {
        index.replace(c).unwrap();
    }
    index
}

fn changes_strategy() -> impl Strategy<Value = Vec<Change>> {
    prop::collection::btree_map(1..500i32, (0..20i64, prop::option::of(0..20i64)), 0..40).prop_map(|rows| {
        rows.into_iter()
            .map(|(id, (updated, merged))| {
                let mut c = change(id, "NEW", 7, updated);
                c.merged = merged.map(ts);
                c
            })
            .collect()
    })
}

// updated desc, merged desc with unmerged last, id desc
fn expected_order(changes: &[Change]) -> Vec<i32> {
    let mut sorted: Vec<&Change> = changes.iter().collect();
    sorted.sort_by_key(|c| (Reverse(c.updated), c.merged.is_none(), Reverse(c.merged), Reverse(c.id)));
    sorted.iter().map(|c| c.id).collect()
}

fn page_through(index: &InMemoryIndex<Change>, page: usize) -> Vec<i32> {
    let mut seen = Vec::new();
    let mut cursor: Option<SearchAfter> = None;
    loop {
        let opts = QueryOptions::new(0, page).with_search_after(cursor.clone());
        let source = index.get_source(&Predicate::Any, &opts).unwrap();
        let rows: Vec<i32> = source.read().unwrap().map(|c| c.id).collect();
        let read = rows.len();
        seen.extend(rows);
        if read < page {
            return seen;
        }
        cursor = source.next_cursor();
    }
}

proptest! {
    #[test]
    fn results_come_back_in_change_order(changes in changes_strategy()) {
        let index = index_of(&changes);
        let source = index.get_source(&Predicate::Any, &QueryOptions::default()).unwrap();
        let ids: Vec<i32> = source.read().unwrap().map(|c| c.id).collect();
        prop_assert_eq!(source.cardinality(), changes.len());
        prop_assert_eq!(ids, expected_order(&changes));
    }

    #[test]
    fn search_after_pages_cover_the_offset_order(changes in changes_strategy(), page in 1..7usize) {
        let index = index_of(&changes);
        prop_assert_eq!(page_through(&index, page), expected_order(&changes));
    }

    #[test]
    fn search_after_keeps_rows_with_equal_sort_values(changes in changes_strategy(), page in 1..7usize) {
        // only `updated` is sorted on, so many rows tie and the key decides
        let index = sorted_index_of(&changes, IndexSort::new().desc("updated"));
        let mut expected: Vec<&Change> = changes.iter().collect();
        expected.sort_by_key(|c| (Reverse(c.updated), c.id));
        let expected: Vec<i32> = expected.iter().map(|c| c.id).collect();
        prop_assert_eq!(page_through(&index, page), expected);
    }
}
