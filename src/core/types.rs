use serde::{Serialize, Deserialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use chrono::{DateTime, Utc};
use crate::core::error::{Error, ErrorKind, Result};

/// A single typed value stored in or searched against the index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Str(String),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Compare two values of compatible types. Int and Long compare numerically,
    /// everything else only against its own variant.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => Some(a.cmp(b)),
            (FieldValue::Int(a), FieldValue::Int(b)) => Some(a.cmp(b)),
            (FieldValue::Long(a), FieldValue::Long(b)) => Some(a.cmp(b)),
            (FieldValue::Int(a), FieldValue::Long(b)) => Some(i64::from(*a).cmp(b)),
            (FieldValue::Long(a), FieldValue::Int(b)) => Some(a.cmp(&i64::from(*b))),
            (FieldValue::Str(a), FieldValue::Str(b)) => Some(a.cmp(b)),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => Some(a.cmp(b)),
            (FieldValue::Bytes(a), FieldValue::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Timestamps are kept at millisecond precision, like the index stores them
    pub fn timestamp(ts: DateTime<Utc>) -> FieldValue {
        let truncated = DateTime::<Utc>::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts);
        FieldValue::Timestamp(truncated)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Long(v) => write!(f, "{}", v),
            FieldValue::Str(s) if s.is_empty() || s.contains(char::is_whitespace) => {
                write!(f, "\"{}\"", s)
            }
            FieldValue::Str(s) => write!(f, "{}", s),
            FieldValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            FieldValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Long(i64::from(v))
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Long(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

/// Value of one field in a document: one value, or an unordered collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldData {
    Single(FieldValue),
    Repeated(Vec<FieldValue>),
}

impl FieldData {
    pub fn values(&self) -> &[FieldValue] {
        match self {
            FieldData::Single(v) => std::slice::from_ref(v),
            FieldData::Repeated(vs) => vs,
        }
    }

    pub fn first(&self) -> Option<&FieldValue> {
        self.values().first()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }
}

impl From<FieldValue> for FieldData {
    fn from(v: FieldValue) -> Self {
        FieldData::Single(v)
    }
}

/// Raw named field values of one indexed document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBundle {
    pub fields: BTreeMap<String, FieldData>,
}

impl FieldBundle {
    pub fn new() -> Self {
        FieldBundle {
            fields: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, data: FieldData) {
        self.fields.insert(name.to_string(), data);
    }

    pub fn get(&self, name: &str) -> Option<&FieldData> {
        self.fields.get(name)
    }

    /// All values of a field; empty when the field is absent
    pub fn values(&self, name: &str) -> &[FieldValue] {
        self.fields.get(name).map(|d| d.values()).unwrap_or(&[])
    }

    pub fn first(&self, name: &str) -> Option<&FieldValue> {
        self.values(name).first()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy of this bundle restricted to the named fields
    pub fn project<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> FieldBundle {
        let mut projected = FieldBundle::new();
        for name in names {
            if let Some(data) = self.fields.get(name) {
                projected.fields.insert(name.clone(), data.clone());
            }
        }
        projected
    }
}

/// 20-byte object id of a ref head; all zeros means the ref does not exist
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub [u8; 20]);

impl ObjectId {
    pub const LEN: usize = 20;

    pub fn zero() -> Self {
        ObjectId([0u8; 20])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != Self::LEN * 2 || !hex.is_ascii() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("invalid object id: {}", hex),
            ));
        }
        let mut bytes = [0u8; 20];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            // chunks of an ASCII string are valid UTF-8
            let pair = std::str::from_utf8(chunk).map_err(|e| Error::internal(e.to_string()))?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| {
                Error::new(ErrorKind::InvalidArgument, format!("invalid object id: {}", hex))
            })?;
        }
        Ok(ObjectId(bytes))
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u32);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Principal a query runs on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CurrentUser {
    Anonymous,
    Identified(AccountId),
}

impl CurrentUser {
    pub fn account_id(&self) -> Option<AccountId> {
        match self {
            CurrentUser::Anonymous => None,
            CurrentUser::Identified(id) => Some(*id),
        }
    }
}

impl fmt::Display for CurrentUser {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CurrentUser::Anonymous => f.write_str("anonymous"),
            CurrentUser::Identified(id) => write!(f, "account {}", id),
        }
    }
}
