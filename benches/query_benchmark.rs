use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use docindex::core::config::Config;
use docindex::core::engine::{Collaborators, IndexEngine};
use docindex::core::error::Result;
use docindex::core::stats::NoopMetrics;
use docindex::core::types::{AccountId, CurrentUser, FieldValue, ObjectId};
use docindex::index::document::Entity;
use docindex::index::factory::MemoryIndexFactory;
use docindex::index::memory::IndexSort;
use docindex::index::status::IndexStatus;
use docindex::indexer::store::{EntitySource, RefDatabase};
use docindex::query::parser::parse_query;
use docindex::query::processor::{FixedQueryLimits, PermissionBackend};
use docindex::schema::definitions::SchemaDefinitions;
use docindex::schema::field::FieldDefBuilder;
use docindex::schema::schema::Schema;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Ticket {
    id: i32,
    status: &'static str,
    owner: u32,
    title: String,
    hidden: bool,
}

impl Entity for Ticket {
    type Key = i32;

    fn key(&self) -> i32 {
        self.id
    }
}

struct Store(BTreeMap<i32, Ticket>);

impl EntitySource<Ticket> for Store {
    fn get(&self, key: &i32) -> Result<Option<Ticket>> {
        Ok(self.0.get(key).cloned())
    }

    fn keys(&self) -> Result<Vec<i32>> {
        Ok(self.0.keys().copied().collect())
    }
}

struct NoRefs;

impl RefDatabase for NoRefs {
    fn head(&self, _project: &str, _ref_name: &str) -> Result<Option<ObjectId>> {
        Ok(None)
    }

    fn refs_by_prefix(&self, _project: &str, _prefix: &str) -> Result<Vec<(String, ObjectId)>> {
        Ok(Vec::new())
    }
}

struct HiddenFromOthers;

impl PermissionBackend<Ticket> for HiddenFromOthers {
    fn can_see(&self, user: &CurrentUser, ticket: &Ticket) -> Result<bool> {
        Ok(!ticket.hidden || user.account_id() == Some(AccountId(ticket.owner)))
    }
}

/// Helper to create a store of random tickets
fn create_tickets(count: i32) -> Store {
    let mut rng = rand::thread_rng();
    let words = ["submit", "rebase", "replication", "flaky", "index", "query", "timeout", "merge"];
    let statuses = ["NEW", "MERGED", "ABANDONED"];
    let tickets = (1..=count)
        .map(|id| {
            let title = (0..6)
                .map(|_| words[rng.gen_range(0..words.len())])
                .collect::<Vec<_>>()
                .join(" ");
            let ticket = Ticket {
                id,
                status: statuses[rng.gen_range(0..statuses.len())],
                owner: rng.gen_range(1..50),
                title,
                hidden: rng.gen_bool(0.2),
            };
            (id, ticket)
        })
        .collect();
    Store(tickets)
}

fn open_engine(count: i32) -> (tempfile::TempDir, IndexEngine<Ticket>) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        site_path: dir.path().to_path_buf(),
        auto_reindex_if_stale: false,
        ..Config::default()
    };

    let schema = Schema::builder(1)
        .add(FieldDefBuilder::integer("id").stored().required().build(|t: &Ticket| Some(FieldValue::Int(t.id))))
        .add(FieldDefBuilder::exact("status").build(|t: &Ticket| Some(FieldValue::from(t.status))))
        .add(FieldDefBuilder::integer_range("owner").build(|t: &Ticket| Some(FieldValue::Int(t.owner as i32))))
        .add(FieldDefBuilder::full_text("title").stored().build(|t: &Ticket| Some(FieldValue::from(t.title.as_str()))))
        .build()
        .unwrap();
    let defs = Arc::new(SchemaDefinitions::new("tickets", vec![schema]).unwrap());
    IndexStatus::load(&config.index_dir())
        .unwrap()
        .set_ready("tickets", 1, true)
        .unwrap();

    let collaborators = Collaborators {
        source: Arc::new(create_tickets(count)),
        refs: Arc::new(NoRefs),
        permissions: Arc::new(HiddenFromOthers),
        limits: Arc::new(FixedQueryLimits(1000)),
        metrics: Arc::new(NoopMetrics),
    };
    let factory = Arc::new(MemoryIndexFactory::new(IndexSort::new().desc("id")));
    let engine = IndexEngine::open(config, defs, factory, collaborators)
        .unwrap()
        .with_default_field("title");
    engine.reindex_all().unwrap();
    (dir, engine)
}

/// Benchmark query string parsing alone
fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_query", |b| {
        b.iter(|| parse_query(black_box("status:NEW (owner:>=10 OR -flaky) title:repl*")).unwrap());
    });
}

/// Benchmark full queries through rewriting, the index and visibility filtering
fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    for size in [1_000, 10_000].iter() {
        let (_dir, engine) = open_engine(*size);
        let user = CurrentUser::Identified(AccountId(7));

        group.bench_with_input(BenchmarkId::new("exact_and_range", size), size, |b, _| {
            b.iter(|| {
                engine
                    .processor(user.clone())
                    .set_limit(50)
                    .query_str(black_box("status:NEW owner:<=20"))
                    .unwrap()
            });
        });

        group.bench_with_input(BenchmarkId::new("full_text", size), size, |b, _| {
            b.iter(|| {
                engine
                    .processor(user.clone())
                    .set_limit(50)
                    .query_str(black_box("flaky replication"))
                    .unwrap()
            });
        });
    }

    group.finish();
}

/// Benchmark a full rebuild on the batch pool
fn bench_reindex_all(c: &mut Criterion) {
    let (_dir, engine) = open_engine(5_000);

    c.bench_function("reindex_all_5000", |b| {
        b.iter(|| engine.reindex_all().unwrap());
    });
}

criterion_group!(benches, bench_parse, bench_query, bench_reindex_all);
criterion_main!(benches);
