pub mod core;
pub mod schema;
pub mod index;
pub mod query;
pub mod indexer;

pub use crate::core::config::Config;
pub use crate::core::engine::{Collaborators, IndexEngine};
pub use crate::core::error::{Error, ErrorKind, Result};

/*
┌──────────────────────────────────── DOCINDEX ARCHITECTURE ───────────────────────────────────┐
│                                                                                              │
│  ┌──────────────────────────────── struct IndexEngine<V> ───────────────────────────────┐   │
│  │ config: Config                      // limits, threads, site path                    │   │
│  │ status: Arc<IndexStatus>            // <site>/index/index_status.toml ready flags    │   │
│  │ indexes: Arc<IndexCollection<V>>    // one search index + every write index         │   │
│  │ pending: Option<Arc<dyn Index<V>>>  // latest version while online reindexing       │   │
│  │ queries: QueryContext<V>            // hands out one-shot QueryProcessors           │   │
│  │ indexer: Indexer<V>                 // sync index(key) + async reindex_if_stale     │   │
│  │ batch: Arc<BatchReindexer<V>>       // rayon pool for full reindexes                │   │
│  └──────────────────────────────────────────────────────────────────────────────────────┘   │
│                                                                                              │
│  ┌──────── SCHEMA ─────────┐  ┌────────── INDEX ───────────┐  ┌────────── QUERY ───────────┐ │
│  │ FieldDef<V>             │  │ trait Index<V>             │  │ parse_query -> QueryNode   │ │
│  │ • name, FieldType       │  │ • replace / delete         │  │ QueryBuilder -> Predicate  │ │
│  │ • extractor: &V -> data │  │ • get_source -> DataSource │  │ Predicate<V>               │ │
│  │ Schema<V> (version)     │  │ InMemoryIndex<V>           │  │ • Field / And / Or / Not   │ │
│  │ SchemaDefinitions<V>    │  │ • RwLock<BTreeMap<K, Doc>> │  │ • PostFilter (visibility)  │ │
│  │ • ordered versions      │  │ VersionManager::open       │  │ IndexRewriter -> QueryPlan │ │
│  └─────────────────────────┘  └────────────────────────────┘  │ QueryProcessor -> Result   │ │
│                                                               └────────────────────────────┘ │
│  ┌─────────────────────────────────────── INDEXER ──────────────────────────────────────┐   │
│  │ EntitySource / RefDatabase / EntityCache   // authoritative store collaborators      │   │
│  │ StalenessChecker                           // stored ref_state vs live ref heads     │   │
│  │ ReindexExecutor<K>                         // crossbeam queue, coalesced per key     │   │
│  │ BatchReindexer / OnlineReindexer           // full rebuilds, version activation      │   │
│  └──────────────────────────────────────────────────────────────────────────────────────┘   │
└──────────────────────────────────────────────────────────────────────────────────────────────┘
*/
