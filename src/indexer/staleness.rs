use std::fmt;
use std::sync::Arc;
use regex::Regex;
use tracing::{debug, info};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::ObjectId;
use crate::index::collection::IndexCollection;
use crate::index::document::Entity;
use crate::indexer::store::RefDatabase;
use crate::query::options::QueryOptions;

pub const REF_STATE_FIELD: &str = "ref_state";
pub const REF_STATE_PATTERN_FIELD: &str = "ref_state_pattern";

fn stored_value_error(what: &str, raw: &[u8]) -> Error {
    Error::new(
        ErrorKind::StalenessCheck,
        format!("invalid stored {}: {:?}", what, String::from_utf8_lossy(raw)),
    )
}

/// Head of one ref as seen when a document was indexed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefState {
    pub project: String,
    pub ref_name: String,
    pub id: ObjectId,
}

impl RefState {
    pub fn new(project: &str, ref_name: &str, id: ObjectId) -> Self {
        RefState {
            project: project.to_string(),
            ref_name: ref_name.to_string(),
            id,
        }
    }

    /// `project:refs/name:hexsha`
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw).map_err(|_| stored_value_error("ref state", raw))?;
        let (rest, hex) = text.rsplit_once(':').ok_or_else(|| stored_value_error("ref state", raw))?;
        let (project, ref_name) = rest.split_once(':').ok_or_else(|| stored_value_error("ref state", raw))?;
        if project.is_empty() || ref_name.is_empty() {
            return Err(stored_value_error("ref state", raw));
        }
        let id = ObjectId::from_hex(hex).map_err(|_| stored_value_error("ref state", raw))?;
        Ok(RefState::new(project, ref_name, id))
    }
}

impl fmt::Display for RefState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.project, self.ref_name, self.id)
    }
}

/// Wildcard over ref names, e.g. `refs/users/*/edit-42/*`. Any live ref
/// matching it must have been recorded as a [`RefState`].
#[derive(Debug, Clone)]
pub struct RefStatePattern {
    pub project: String,
    pub pattern: String,
    regex: Regex,
}

impl RefStatePattern {
    pub fn new(project: &str, pattern: &str) -> Result<Self> {
        if !pattern.starts_with("refs/") {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("ref pattern must start with refs/: {}", pattern),
            ));
        }
        let body: Vec<String> = pattern.split('*').map(regex::escape).collect();
        let regex = Regex::new(&format!("^{}$", body.join(".*")))
            .map_err(|e| Error::internal(format!("ref pattern {}: {}", pattern, e)))?;
        Ok(RefStatePattern {
            project: project.to_string(),
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// `project:refs/pattern/*`
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}:{}", self.project, self.pattern).into_bytes()
    }

    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw).map_err(|_| stored_value_error("ref pattern", raw))?;
        let (project, pattern) = text
            .split_once(':')
            .ok_or_else(|| stored_value_error("ref pattern", raw))?;
        RefStatePattern::new(project, pattern).map_err(|_| stored_value_error("ref pattern", raw))
    }

    /// Literal part before the first wildcard
    pub fn prefix(&self) -> &str {
        match self.pattern.find('*') {
            Some(pos) => &self.pattern[..pos],
            None => &self.pattern,
        }
    }

    pub fn matches(&self, ref_name: &str) -> bool {
        self.regex.is_match(ref_name)
    }
}

impl PartialEq for RefStatePattern {
    fn eq(&self, other: &Self) -> bool {
        self.project == other.project && self.pattern == other.pattern
    }
}

/// Compare recorded ref heads against the live ref database.
///
/// A recorded state whose ref is gone compares against the zero id, so a
/// deleted ref makes the document stale.
pub fn refs_are_stale(states: &[RefState], patterns: &[RefStatePattern], refs: &dyn RefDatabase) -> Result<bool> {
    let as_check_error = |e: Error| e.with_kind(ErrorKind::StalenessCheck);

    for state in states {
        let live = refs
            .head(&state.project, &state.ref_name)
            .map_err(as_check_error)?
            .unwrap_or_else(ObjectId::zero);
        if live != state.id {
            debug!(%state, %live, "ref moved since indexing");
            return Ok(true);
        }
    }

    for pattern in patterns {
        let live = refs
            .refs_by_prefix(&pattern.project, pattern.prefix())
            .map_err(as_check_error)?;
        for (name, _) in live {
            let recorded = states
                .iter()
                .any(|s| s.project == pattern.project && s.ref_name == name);
            if pattern.matches(&name) && !recorded {
                debug!(project = %pattern.project, ref_name = %name, "unrecorded ref matches pattern");
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Decides whether an indexed document has drifted from its source
pub struct StalenessChecker<V: Entity> {
    indexes: Arc<IndexCollection<V>>,
    refs: Arc<dyn RefDatabase>,
}

impl<V: Entity> StalenessChecker<V> {
    pub fn new(indexes: Arc<IndexCollection<V>>, refs: Arc<dyn RefDatabase>) -> Self {
        StalenessChecker { indexes, refs }
    }

    pub fn is_stale(&self, key: &V::Key) -> Result<bool> {
        let index = self.indexes.search_index().ok_or_else(|| {
            Error::configuration(format!("no search index available for {}", self.indexes.name()))
        })?;

        // Versions without the ref state field cannot be checked; such
        // documents are reported fresh until the next full reindex.
        if !index.schema().has_field_named(REF_STATE_FIELD) {
            debug!(index = index.name(), version = index.version(), "no ref state field; assuming fresh");
            return Ok(false);
        }

        let opts = QueryOptions::default().with_fields([REF_STATE_FIELD, REF_STATE_PATTERN_FIELD]);
        let Some(doc) = index.get_raw(key, &opts)? else {
            info!(index = index.name(), %key, "document missing from index; stale");
            return Ok(true);
        };

        let states = doc
            .values(REF_STATE_FIELD)
            .iter()
            .map(|v| v.as_bytes().ok_or_else(|| stored_value_error("ref state", v.to_string().as_bytes())))
            .map(|raw| raw.and_then(RefState::parse))
            .collect::<Result<Vec<_>>>()?;
        let patterns = doc
            .values(REF_STATE_PATTERN_FIELD)
            .iter()
            .map(|v| v.as_bytes().ok_or_else(|| stored_value_error("ref pattern", v.to_string().as_bytes())))
            .map(|raw| raw.and_then(RefStatePattern::parse))
            .collect::<Result<Vec<_>>>()?;

        let stale = refs_are_stale(&states, &patterns, self.refs.as_ref())?;
        if stale {
            info!(index = index.name(), %key, "document is stale");
        }
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn oid(byte: u8) -> ObjectId {
        ObjectId([byte; 20])
    }

    #[derive(Default)]
    struct Refs(BTreeMap<(String, String), ObjectId>);

    impl Refs {
        fn with(mut self, project: &str, name: &str, id: ObjectId) -> Self {
            self.0.insert((project.to_string(), name.to_string()), id);
            self
        }
    }

    impl RefDatabase for Refs {
        fn head(&self, project: &str, ref_name: &str) -> Result<Option<ObjectId>> {
            Ok(self.0.get(&(project.to_string(), ref_name.to_string())).copied())
        }

        fn refs_by_prefix(&self, project: &str, prefix: &str) -> Result<Vec<(String, ObjectId)>> {
            Ok(self
                .0
                .iter()
                .filter(|((p, name), _)| p == project && name.starts_with(prefix))
                .map(|((_, name), id)| (name.clone(), *id))
                .collect())
        }
    }

    #[test]
    fn ref_state_parses_its_own_bytes() {
        let state = RefState::new("plugins/replication", "refs/changes/42/42/meta", oid(7));
        assert_eq!(RefState::parse(&state.to_bytes()).unwrap(), state);

        for bad in ["", "project", "p:refs/x", "p:refs/x:zz", ":refs/x:0707070707070707070707070707070707070707"] {
            let err = RefState::parse(bad.as_bytes()).unwrap_err();
            assert_eq!(err.kind, ErrorKind::StalenessCheck);
        }
    }

    #[test]
    fn pattern_wildcards() {
        let pattern = RefStatePattern::new("p", "refs/users/*/edit-42/*").unwrap();
        assert_eq!(pattern.prefix(), "refs/users/");
        assert!(pattern.matches("refs/users/01/1000001/edit-42/1"));
        assert!(!pattern.matches("refs/users/01/1000001/edit-43/1"));
        assert!(!pattern.matches("refs/heads/master"));
        assert_eq!(RefStatePattern::parse(&pattern.to_bytes()).unwrap(), pattern);
        assert!(RefStatePattern::new("p", "heads/*").is_err());
    }

    #[test]
    fn moved_or_deleted_refs_are_stale() {
        let states = vec![RefState::new("p", "refs/changes/01/1/meta", oid(1))];
        let refs = Refs::default().with("p", "refs/changes/01/1/meta", oid(1));
        assert!(!refs_are_stale(&states, &[], &refs).unwrap());

        let moved = Refs::default().with("p", "refs/changes/01/1/meta", oid(2));
        assert!(refs_are_stale(&states, &[], &moved).unwrap());

        assert!(refs_are_stale(&states, &[], &Refs::default()).unwrap());
    }

    #[test]
    fn unrecorded_ref_matching_a_pattern_is_stale() {
        let patterns = vec![RefStatePattern::new("p", "refs/users/*/edit-1/*").unwrap()];
        let states = vec![RefState::new("p", "refs/users/01/1000001/edit-1/2", oid(3))];
        let refs = Refs::default().with("p", "refs/users/01/1000001/edit-1/2", oid(3));
        assert!(!refs_are_stale(&states, &patterns, &refs).unwrap());

        let refs = refs.with("p", "refs/users/02/1000002/edit-1/2", oid(4));
        assert!(refs_are_stale(&states, &patterns, &refs).unwrap());
    }

    struct Unreachable;

    impl RefDatabase for Unreachable {
        fn head(&self, _: &str, _: &str) -> Result<Option<ObjectId>> {
            Err(Error::backend("repository unavailable"))
        }

        fn refs_by_prefix(&self, _: &str, _: &str) -> Result<Vec<(String, ObjectId)>> {
            Err(Error::backend("repository unavailable"))
        }
    }

    #[test]
    fn ref_database_failures_are_not_reported_fresh() {
        let states = vec![RefState::new("p", "refs/changes/01/1/meta", oid(1))];
        let err = refs_are_stale(&states, &[], &Unreachable).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StalenessCheck);
        assert_eq!(err.context, "repository unavailable");
    }
}
