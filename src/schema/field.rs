use std::fmt;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use crate::core::types::{FieldData, FieldValue};

/// How a field can be searched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Bool,
    Integer,        // exact match on i32
    IntegerRange,   // i32 with range operators
    Long,
    Timestamp,
    Exact,          // whole-string equality
    FullText,       // tokenized, word containment
    Prefix,         // string prefix
    StoredOnly,     // retrievable, never searchable (e.g. byte arrays)
}

impl FieldType {
    pub fn is_searchable(&self) -> bool {
        !matches!(self, FieldType::StoredOnly)
    }

    pub fn supports_range(&self) -> bool {
        matches!(self, FieldType::IntegerRange | FieldType::Long | FieldType::Timestamp)
    }

    /// Whether a stored value has the variant this field type expects
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match self {
            FieldType::Bool => matches!(value, FieldValue::Bool(_)),
            FieldType::Integer | FieldType::IntegerRange => matches!(value, FieldValue::Int(_)),
            FieldType::Long => matches!(value, FieldValue::Long(_) | FieldValue::Int(_)),
            FieldType::Timestamp => matches!(value, FieldValue::Timestamp(_)),
            FieldType::Exact | FieldType::FullText | FieldType::Prefix => {
                matches!(value, FieldValue::Str(_))
            }
            FieldType::StoredOnly => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageMode {
    Indexed,
    Stored,
    IndexedAndStored,
}

pub type Extractor<V> = Arc<dyn Fn(&V) -> Option<FieldData> + Send + Sync>;

/// Declaration of one field: a stable name plus a projection from the entity
pub struct FieldDef<V> {
    pub name: String,
    pub field_type: FieldType,
    pub repeatable: bool,
    pub storage: StorageMode,
    pub required: bool,
    extractor: Extractor<V>,
}

impl<V> FieldDef<V> {
    /// Project the entity; `None` means the value is absent
    pub fn get(&self, entity: &V) -> Option<FieldData> {
        (self.extractor)(entity)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_stored(&self) -> bool {
        matches!(self.storage, StorageMode::Stored | StorageMode::IndexedAndStored)
    }

    pub fn is_searchable(&self) -> bool {
        self.field_type.is_searchable()
            && matches!(self.storage, StorageMode::Indexed | StorageMode::IndexedAndStored)
    }

    /// Same declaration as far as an index is concerned
    pub fn same_as(&self, other: &FieldDef<V>) -> bool {
        self.name == other.name
            && self.field_type == other.field_type
            && self.repeatable == other.repeatable
    }
}

impl<V> fmt::Debug for FieldDef<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("repeatable", &self.repeatable)
            .field("storage", &self.storage)
            .field("required", &self.required)
            .finish()
    }
}

pub struct FieldDefBuilder {
    name: String,
    field_type: FieldType,
    storage: StorageMode,
    required: bool,
}

impl FieldDefBuilder {
    pub fn new(name: &str, field_type: FieldType) -> FieldDefBuilder {
        let storage = if field_type == FieldType::StoredOnly {
            StorageMode::Stored
        } else {
            StorageMode::Indexed
        };
        FieldDefBuilder {
            name: name.to_string(),
            field_type,
            storage,
            required: false,
        }
    }

    pub fn exact(name: &str) -> FieldDefBuilder {
        Self::new(name, FieldType::Exact)
    }

    pub fn full_text(name: &str) -> FieldDefBuilder {
        Self::new(name, FieldType::FullText)
    }

    pub fn prefix(name: &str) -> FieldDefBuilder {
        Self::new(name, FieldType::Prefix)
    }

    pub fn integer(name: &str) -> FieldDefBuilder {
        Self::new(name, FieldType::Integer)
    }

    pub fn integer_range(name: &str) -> FieldDefBuilder {
        Self::new(name, FieldType::IntegerRange)
    }

    pub fn long(name: &str) -> FieldDefBuilder {
        Self::new(name, FieldType::Long)
    }

    pub fn timestamp(name: &str) -> FieldDefBuilder {
        Self::new(name, FieldType::Timestamp)
    }

    pub fn boolean(name: &str) -> FieldDefBuilder {
        Self::new(name, FieldType::Bool)
    }

    pub fn stored_only(name: &str) -> FieldDefBuilder {
        Self::new(name, FieldType::StoredOnly)
    }

    /// Also keep the value retrievable from the index
    pub fn stored(mut self) -> Self {
        self.storage = if self.field_type == FieldType::StoredOnly {
            StorageMode::Stored
        } else {
            StorageMode::IndexedAndStored
        };
        self
    }

    /// Indexing fails with a malformed-document error when the value is absent
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn build<V, F>(self, get: F) -> Arc<FieldDef<V>>
    where
        V: 'static,
        F: Fn(&V) -> Option<FieldValue> + Send + Sync + 'static,
    {
        self.finish(false, Arc::new(move |v: &V| get(v).map(FieldData::Single)))
    }

    pub fn build_repeatable<V, F>(self, get: F) -> Arc<FieldDef<V>>
    where
        V: 'static,
        F: Fn(&V) -> Vec<FieldValue> + Send + Sync + 'static,
    {
        self.finish(
            true,
            Arc::new(move |v: &V| {
                let values = get(v);
                if values.is_empty() {
                    None
                } else {
                    Some(FieldData::Repeated(values))
                }
            }),
        )
    }

    fn finish<V>(self, repeatable: bool, extractor: Extractor<V>) -> Arc<FieldDef<V>> {
        Arc::new(FieldDef {
            name: self.name,
            field_type: self.field_type,
            repeatable,
            storage: self.storage,
            required: self.required,
            extractor,
        })
    }
}

/// Field names are restricted to `[a-z0-9_]+`
pub fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
