use std::sync::Arc;
use crate::core::error::{Error, Result};
use crate::schema::schema::Schema;

/// Every published schema version of one entity type, oldest first
pub struct SchemaDefinitions<V> {
    name: String,
    schemas: Vec<Arc<Schema<V>>>,
}

impl<V> SchemaDefinitions<V> {
    /// Versions must be strictly increasing; gaps are allowed
    pub fn new(name: &str, schemas: Vec<Schema<V>>) -> Result<Self> {
        if schemas.is_empty() {
            return Err(Error::configuration(format!("no schema versions for {}", name)));
        }
        for pair in schemas.windows(2) {
            if pair[1].version() <= pair[0].version() {
                return Err(Error::configuration(format!(
                    "schema versions for {} are not increasing: {} then {}",
                    name,
                    pair[0].version(),
                    pair[1].version()
                )));
            }
        }

        Ok(SchemaDefinitions {
            name: name.to_string(),
            schemas: schemas.into_iter().map(Arc::new).collect(),
        })
    }

    /// Entity type name, e.g. "changes"
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn latest(&self) -> &Arc<Schema<V>> {
        // non-empty by construction
        &self.schemas[self.schemas.len() - 1]
    }

    pub fn get(&self, version: u32) -> Option<&Arc<Schema<V>>> {
        self.schemas.iter().find(|s| s.version() == version)
    }

    /// The version published right before the latest one
    pub fn previous(&self) -> Option<&Arc<Schema<V>>> {
        self.schemas.iter().rev().nth(1)
    }

    pub fn schemas(&self) -> &[Arc<Schema<V>>] {
        &self.schemas
    }

    pub fn versions(&self) -> Vec<u32> {
        self.schemas.iter().map(|s| s.version()).collect()
    }
}
