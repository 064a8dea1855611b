#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tempfile::TempDir;

use docindex::core::config::Config;
use docindex::core::engine::{Collaborators, IndexEngine};
use docindex::core::error::{Error, Result};
use docindex::core::stats::IndexMetrics;
use docindex::core::types::{CurrentUser, FieldValue, ObjectId};
use docindex::index::document::Entity;
use docindex::index::factory::MemoryIndexFactory;
use docindex::index::memory::IndexSort;
use docindex::index::status::IndexStatus;
use docindex::indexer::staleness::{REF_STATE_FIELD, REF_STATE_PATTERN_FIELD, RefState, RefStatePattern};
use docindex::indexer::store::{EntitySource, RefDatabase};
use docindex::query::processor::{FixedQueryLimits, PermissionBackend};
use docindex::schema::definitions::SchemaDefinitions;
use docindex::schema::field::{FieldDef, FieldDefBuilder};
use docindex::schema::schema::Schema;

pub const PROJECT: &str = "platform/build";

#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub id: i32,
    pub project: String,
    pub status: String,
    pub owner: u32,
    pub subject: String,
    pub updated: DateTime<Utc>,
    pub merged: Option<DateTime<Utc>>,
    pub private: bool,
    pub meta: ObjectId,
}

impl Entity for Change {
    type Key = i32;

    fn key(&self) -> i32 {
        self.id
    }
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn oid(n: u32) -> ObjectId {
    let mut bytes = [0u8; 20];
    bytes[16..].copy_from_slice(&n.to_be_bytes());
    bytes[0] = 0xab;
    ObjectId(bytes)
}

pub fn meta_ref(id: i32) -> String {
    format!("refs/changes/{:02}/{}/meta", id % 100, id)
}

pub fn change(id: i32, status: &str, owner: u32, updated: i64) -> Change {
    Change {
        id,
        project: PROJECT.to_string(),
        status: status.to_string(),
        owner,
        subject: format!("Change number {}", id),
        updated: ts(updated),
        merged: None,
        private: false,
        meta: oid(id as u32),
    }
}

pub struct ChangeFields {
    pub id: Arc<FieldDef<Change>>,
    pub project: Arc<FieldDef<Change>>,
    pub status: Arc<FieldDef<Change>>,
    pub owner: Arc<FieldDef<Change>>,
    pub subject: Arc<FieldDef<Change>>,
    pub updated: Arc<FieldDef<Change>>,
    pub merged: Arc<FieldDef<Change>>,
    pub ref_state: Arc<FieldDef<Change>>,
    pub ref_state_pattern: Arc<FieldDef<Change>>,
}

impl ChangeFields {
    pub fn new() -> Self {
        ChangeFields {
            id: FieldDefBuilder::integer("id")
                .stored()
                .required()
                .build(|c: &Change| Some(FieldValue::Int(c.id))),
            project: FieldDefBuilder::prefix("project")
                .stored()
                .build(|c: &Change| Some(FieldValue::from(c.project.as_str()))),
            status: FieldDefBuilder::exact("status").build(|c: &Change| Some(FieldValue::from(c.status.as_str()))),
            owner: FieldDefBuilder::integer_range("owner").build(|c: &Change| Some(FieldValue::Int(c.owner as i32))),
            subject: FieldDefBuilder::full_text("subject")
                .stored()
                .build(|c: &Change| Some(FieldValue::from(c.subject.as_str()))),
            updated: FieldDefBuilder::timestamp("updated")
                .required()
                .build(|c: &Change| Some(FieldValue::timestamp(c.updated))),
            merged: FieldDefBuilder::timestamp("merged").build(|c: &Change| c.merged.map(FieldValue::timestamp)),
            ref_state: FieldDefBuilder::stored_only(REF_STATE_FIELD).build_repeatable(|c: &Change| {
                vec![FieldValue::Bytes(RefState::new(&c.project, &meta_ref(c.id), c.meta).to_bytes())]
            }),
            ref_state_pattern: FieldDefBuilder::stored_only(REF_STATE_PATTERN_FIELD).build_repeatable(
                |c: &Change| match RefStatePattern::new(&c.project, &format!("refs/users/*/edit-{}/*", c.id)) {
                    Ok(pattern) => vec![FieldValue::Bytes(pattern.to_bytes())],
                    Err(_) => Vec::new(),
                },
            ),
        }
    }
}

pub fn change_sort() -> IndexSort {
    IndexSort::new().desc("updated").desc("merged").desc("id")
}

/// Version 2 has no ref state; version 3 adds it
pub fn change_schemas(fields: &ChangeFields) -> Arc<SchemaDefinitions<Change>> {
    let v2 = Schema::builder(2)
        .add(fields.id.clone())
        .add(fields.project.clone())
        .add(fields.status.clone())
        .add(fields.owner.clone())
        .add(fields.subject.clone())
        .add(fields.updated.clone())
        .add(fields.merged.clone())
        .build()
        .unwrap();
    let v3 = Schema::builder(3)
        .extend(&v2)
        .add(fields.ref_state.clone())
        .add(fields.ref_state_pattern.clone())
        .build()
        .unwrap();
    Arc::new(SchemaDefinitions::new("changes", vec![v2, v3]).unwrap())
}

/// Authoritative store plus its ref database
#[derive(Default)]
pub struct World {
    pub changes: Mutex<BTreeMap<i32, Change>>,
    pub refs: Mutex<BTreeMap<(String, String), ObjectId>>,
    pub broken: Mutex<HashSet<i32>>,
    pub reads: Mutex<Vec<i32>>,
}

impl World {
    pub fn put(&self, change: Change) {
        self.refs
            .lock()
            .insert((change.project.clone(), meta_ref(change.id)), change.meta);
        self.changes.lock().insert(change.id, change);
    }

    pub fn remove(&self, id: i32) {
        if let Some(c) = self.changes.lock().remove(&id) {
            self.refs.lock().remove(&(c.project, meta_ref(id)));
        }
    }

    /// Move the meta ref without telling the index
    pub fn advance(&self, id: i32, meta: ObjectId) {
        let mut changes = self.changes.lock();
        if let Some(c) = changes.get_mut(&id) {
            c.meta = meta;
            self.refs.lock().insert((c.project.clone(), meta_ref(id)), meta);
        }
    }

    pub fn set_ref(&self, name: &str, id: ObjectId) {
        self.refs.lock().insert((PROJECT.to_string(), name.to_string()), id);
    }

    pub fn break_change(&self, id: i32) {
        self.broken.lock().insert(id);
    }
}

impl EntitySource<Change> for World {
    fn get(&self, key: &i32) -> Result<Option<Change>> {
        self.reads.lock().push(*key);
        if self.broken.lock().contains(key) {
            return Err(Error::backend(format!("cannot load change {}", key)));
        }
        Ok(self.changes.lock().get(key).cloned())
    }

    fn keys(&self) -> Result<Vec<i32>> {
        Ok(self.changes.lock().keys().copied().collect())
    }
}

impl RefDatabase for World {
    fn head(&self, project: &str, ref_name: &str) -> Result<Option<ObjectId>> {
        Ok(self.refs.lock().get(&(project.to_string(), ref_name.to_string())).copied())
    }

    fn refs_by_prefix(&self, project: &str, prefix: &str) -> Result<Vec<(String, ObjectId)>> {
        Ok(self
            .refs
            .lock()
            .iter()
            .filter(|((p, name), _)| p == project && name.starts_with(prefix))
            .map(|((_, name), id)| (name.clone(), *id))
            .collect())
    }
}

/// Private changes are visible to their owner only
#[derive(Default)]
pub struct OwnerVisibility {
    pub failing: Mutex<bool>,
}

impl PermissionBackend<Change> for OwnerVisibility {
    fn can_see(&self, user: &CurrentUser, change: &Change) -> Result<bool> {
        if *self.failing.lock() {
            return Err(Error::backend("permission backend unavailable"));
        }
        Ok(!change.private || user.account_id().map(|a| a.0) == Some(change.owner))
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub config: Config,
    pub fields: ChangeFields,
    pub defs: Arc<SchemaDefinitions<Change>>,
    pub world: Arc<World>,
    pub visibility: Arc<OwnerVisibility>,
    pub metrics: Arc<IndexMetrics>,
    pub factory: Arc<MemoryIndexFactory>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            site_path: dir.path().to_path_buf(),
            batch_threads: 2,
            reindex_threads: 1,
            auto_reindex_if_stale: false,
            entity_cache_size: 16,
            ..Config::default()
        };
        let fields = ChangeFields::new();
        let defs = change_schemas(&fields);
        Harness {
            dir,
            config,
            fields,
            defs,
            world: Arc::new(World::default()),
            visibility: Arc::new(OwnerVisibility::default()),
            metrics: Arc::new(IndexMetrics::new()),
            factory: Arc::new(MemoryIndexFactory::new(change_sort())),
        }
    }

    pub fn collaborators(&self) -> Collaborators<Change> {
        Collaborators {
            source: self.world.clone(),
            refs: self.world.clone(),
            permissions: self.visibility.clone(),
            limits: Arc::new(FixedQueryLimits(1000)),
            metrics: self.metrics.clone(),
        }
    }

    pub fn mark_ready(&self, version: u32) {
        IndexStatus::load(&self.config.index_dir())
            .unwrap()
            .set_ready("changes", version, true)
            .unwrap();
    }

    /// Engine searching `version`, filled from the world
    pub fn engine(&self, version: u32) -> IndexEngine<Change> {
        self.mark_ready(version);
        let engine = IndexEngine::open(
            self.config.clone(),
            self.defs.clone(),
            self.factory.clone(),
            self.collaborators(),
        )
        .unwrap();
        assert!(engine.reindex_all().unwrap().success());
        engine
    }
}
