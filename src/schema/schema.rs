use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use crate::core::error::{Error, Result};
use crate::core::types::{FieldBundle, FieldData};
use crate::schema::field::{is_valid_field_name, FieldDef};

/// Immutable, versioned set of fields one entity type exposes to the index
pub struct Schema<V> {
    version: u32,
    fields: BTreeMap<String, Arc<FieldDef<V>>>,
}

impl<V> Schema<V> {
    pub fn builder(version: u32) -> SchemaBuilder<V> {
        SchemaBuilder {
            version,
            fields: Vec::new(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn fields(&self) -> &BTreeMap<String, Arc<FieldDef<V>>> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Arc<FieldDef<V>>> {
        self.fields.get(name)
    }

    /// True when this version declares an identical field
    pub fn has_field(&self, field: &FieldDef<V>) -> bool {
        self.fields
            .get(field.name())
            .map(|f| f.same_as(field))
            .unwrap_or(false)
    }

    pub fn has_field_named(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn stored_field_names(&self) -> impl Iterator<Item = &String> {
        self.fields
            .iter()
            .filter(|(_, f)| f.is_stored())
            .map(|(name, _)| name)
    }

    /// Project an entity into its document. Absent values are omitted;
    /// a required field without a value, or a value of the wrong type,
    /// makes the document malformed.
    pub fn build_fields(&self, entity: &V, skip: &HashSet<String>) -> Result<FieldBundle> {
        let mut bundle = FieldBundle::new();

        for (name, field) in &self.fields {
            if skip.contains(name) {
                continue;
            }

            let data = match field.get(entity) {
                Some(data) if !data.is_empty() => data,
                _ => {
                    if field.required {
                        return Err(Error::malformed(format!(
                            "required field {} has no value",
                            name
                        )));
                    }
                    continue;
                }
            };

            if !field.repeatable && matches!(data, FieldData::Repeated(_)) {
                return Err(Error::malformed(format!(
                    "field {} is not repeatable but produced several values",
                    name
                )));
            }
            if let Some(bad) = data.values().iter().find(|v| !field.field_type.accepts(v)) {
                return Err(Error::malformed(format!(
                    "field {} of type {:?} cannot hold {:?}",
                    name, field.field_type, bad
                )));
            }

            bundle.insert(name, data);
        }

        Ok(bundle)
    }
}

impl<V> fmt::Debug for Schema<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Schema")
            .field("version", &self.version)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct SchemaBuilder<V> {
    version: u32,
    fields: Vec<Arc<FieldDef<V>>>,
}

impl<V> SchemaBuilder<V> {
    pub fn add(mut self, field: Arc<FieldDef<V>>) -> Self {
        self.fields.push(field);
        self
    }

    /// Start from every field of an earlier version
    pub fn extend(mut self, previous: &Schema<V>) -> Self {
        self.fields.extend(previous.fields.values().cloned());
        self
    }

    pub fn remove(mut self, name: &str) -> Self {
        self.fields.retain(|f| f.name() != name);
        self
    }

    /// Duplicate or illegal field names are configuration errors
    pub fn build(self) -> Result<Schema<V>> {
        let mut fields = BTreeMap::new();

        for field in self.fields {
            if !is_valid_field_name(field.name()) {
                return Err(Error::configuration(format!(
                    "illegal field name {:?} in schema version {}",
                    field.name(),
                    self.version
                )));
            }
            if fields.contains_key(field.name()) {
                return Err(Error::configuration(format!(
                    "duplicate field {} in schema version {}",
                    field.name(),
                    self.version
                )));
            }
            fields.insert(field.name().to_string(), field);
        }

        Ok(Schema {
            version: self.version,
            fields,
        })
    }
}
