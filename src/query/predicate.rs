use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;
use crate::core::error::{Error, Result};
use crate::core::types::{FieldBundle, FieldValue};
use crate::schema::field::{FieldDef, FieldType};

/// Comparison a leaf applies between a field value and its operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Prefix,     // value starts with operand, or one of its words does
    Contains,   // every word of the operand occurs in the value
}

impl Operator {
    pub fn is_range(&self) -> bool {
        matches!(self, Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge)
    }

    /// Whether an index can evaluate this operator on a field of `field_type`
    pub fn supported_by(&self, field_type: FieldType) -> bool {
        match self {
            Operator::Eq => field_type.is_searchable(),
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => field_type.supports_range(),
            Operator::Prefix => matches!(field_type, FieldType::Prefix | FieldType::FullText | FieldType::Exact),
            Operator::Contains => field_type == FieldType::FullText,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq | Operator::Prefix | Operator::Contains => "",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }

    /// Apply to a single stored value
    pub fn apply(&self, stored: &FieldValue, operand: &FieldValue) -> bool {
        use std::cmp::Ordering::*;

        match self {
            Operator::Eq => stored.compare(operand) == Some(Equal),
            Operator::Lt => stored.compare(operand) == Some(Less),
            Operator::Le => matches!(stored.compare(operand), Some(Less | Equal)),
            Operator::Gt => stored.compare(operand) == Some(Greater),
            Operator::Ge => matches!(stored.compare(operand), Some(Greater | Equal)),
            Operator::Prefix => match (stored.as_str(), operand.as_str()) {
                (Some(text), Some(prefix)) => {
                    text.starts_with(prefix)
                        || text.unicode_words().any(|w| w.starts_with(prefix))
                }
                _ => false,
            },
            Operator::Contains => match (stored.as_str(), operand.as_str()) {
                (Some(text), Some(query)) => {
                    let words: Vec<String> =
                        text.unicode_words().map(|w| w.to_lowercase()).collect();
                    let mut wanted = query.unicode_words().map(|w| w.to_lowercase()).peekable();
                    wanted.peek().is_some() && wanted.all(|w| words.contains(&w))
                }
                _ => false,
            },
        }
    }
}

/// Leaf bound to a field definition, an operator and an operand
pub struct IndexPredicate<V> {
    pub field: Arc<FieldDef<V>>,
    pub op: Operator,
    pub value: FieldValue,
}

impl<V> IndexPredicate<V> {
    /// Re-derive the field from a hydrated entity and compare
    pub fn matches(&self, entity: &V) -> bool {
        match self.field.get(entity) {
            Some(data) => data.values().iter().any(|v| self.op.apply(v, &self.value)),
            None => false,
        }
    }

    /// Compare against the values stored in an indexed document
    pub fn matches_document(&self, doc: &FieldBundle) -> bool {
        doc.values(self.field.name())
            .iter()
            .any(|v| self.op.apply(v, &self.value))
    }
}

impl<V> Clone for IndexPredicate<V> {
    fn clone(&self) -> Self {
        IndexPredicate {
            field: self.field.clone(),
            op: self.op,
            value: self.value.clone(),
        }
    }
}

/// Condition that is matchable in memory but never pushed into an index
/// query, such as whether the querying principal can see an entity.
pub trait PostFilter<V>: Send + Sync {
    /// Operator and arguments; identifies the filter for equality and display
    fn label(&self) -> String;

    fn matches(&self, entity: &V) -> Result<bool>;

    fn cost(&self) -> u32 {
        10
    }
}

/// Immutable boolean condition tree over documents of type `V`
pub enum Predicate<V> {
    Any,
    Field(IndexPredicate<V>),
    And(Vec<Predicate<V>>),
    Or(Vec<Predicate<V>>),
    Not(Box<Predicate<V>>),
    PostFilter(Arc<dyn PostFilter<V>>),
}

impl<V> Predicate<V> {
    pub fn field(field: &Arc<FieldDef<V>>, op: Operator, value: impl Into<FieldValue>) -> Self {
        Predicate::Field(IndexPredicate {
            field: field.clone(),
            op,
            value: value.into(),
        })
    }

    pub fn equal(field: &Arc<FieldDef<V>>, value: impl Into<FieldValue>) -> Self {
        Self::field(field, Operator::Eq, value)
    }

    /// Conjunction; a single child is returned unwrapped
    pub fn and(mut children: Vec<Predicate<V>>) -> Self {
        if children.len() == 1 {
            return children.remove(0);
        }
        Predicate::And(children)
    }

    pub fn or(mut children: Vec<Predicate<V>>) -> Self {
        if children.len() == 1 {
            return children.remove(0);
        }
        Predicate::Or(children)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Predicate<V>) -> Self {
        Predicate::Not(Box::new(child))
    }

    pub fn post_filter(filter: Arc<dyn PostFilter<V>>) -> Self {
        Predicate::PostFilter(filter)
    }

    pub fn children(&self) -> &[Predicate<V>] {
        match self {
            Predicate::And(c) | Predicate::Or(c) => c,
            Predicate::Not(c) => std::slice::from_ref(c.as_ref()),
            _ => &[],
        }
    }

    /// True when every node can be translated into an index query
    pub fn is_index_only(&self) -> bool {
        match self {
            Predicate::Any | Predicate::Field(_) => true,
            Predicate::PostFilter(_) => false,
            _ => self.children().iter().all(|c| c.is_index_only()),
        }
    }

    pub fn has_post_filter(&self) -> bool {
        !self.is_index_only()
    }

    /// Relative evaluation cost; leaves are cheap, post filters are not
    pub fn cost(&self) -> u32 {
        match self {
            Predicate::Any => 0,
            Predicate::Field(_) => 1,
            Predicate::PostFilter(f) => f.cost(),
            _ => self.children().iter().map(|c| c.cost()).sum(),
        }
    }

    /// Evaluate against a hydrated entity. AND stops at the first false
    /// child, OR at the first true one.
    pub fn matches(&self, entity: &V) -> Result<bool> {
        match self {
            Predicate::Any => Ok(true),
            Predicate::Field(p) => Ok(p.matches(entity)),
            Predicate::And(children) => {
                for child in children {
                    if !child.matches(entity)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(children) => {
                for child in children {
                    if child.matches(entity)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::Not(child) => Ok(!child.matches(entity)?),
            Predicate::PostFilter(f) => f.matches(entity),
        }
    }

    /// Evaluate against an indexed document. Post filters have no
    /// document form; reaching one here is a planning bug.
    pub fn matches_document(&self, doc: &FieldBundle) -> Result<bool> {
        match self {
            Predicate::Any => Ok(true),
            Predicate::Field(p) => Ok(p.matches_document(doc)),
            Predicate::And(children) => {
                for child in children {
                    if !child.matches_document(doc)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(children) => {
                for child in children {
                    if child.matches_document(doc)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::Not(child) => Ok(!child.matches_document(doc)?),
            Predicate::PostFilter(f) => Err(Error::internal(format!(
                "post filter {} cannot be evaluated by the index",
                f.label()
            ))),
        }
    }
}

impl<V> Clone for Predicate<V> {
    fn clone(&self) -> Self {
        match self {
            Predicate::Any => Predicate::Any,
            Predicate::Field(p) => Predicate::Field(p.clone()),
            Predicate::And(c) => Predicate::And(c.clone()),
            Predicate::Or(c) => Predicate::Or(c.clone()),
            Predicate::Not(c) => Predicate::Not(c.clone()),
            Predicate::PostFilter(f) => Predicate::PostFilter(f.clone()),
        }
    }
}

// Structural equality: operator, field name, value and ordered children.
impl<V> PartialEq for Predicate<V> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Predicate::Any, Predicate::Any) => true,
            (Predicate::Field(a), Predicate::Field(b)) => {
                a.field.name() == b.field.name() && a.op == b.op && a.value == b.value
            }
            (Predicate::And(a), Predicate::And(b)) | (Predicate::Or(a), Predicate::Or(b)) => a == b,
            (Predicate::Not(a), Predicate::Not(b)) => a == b,
            (Predicate::PostFilter(a), Predicate::PostFilter(b)) => a.label() == b.label(),
            _ => false,
        }
    }
}

impl<V> Eq for Predicate<V> {}

impl<V> Hash for Predicate<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Predicate::Any => {}
            Predicate::Field(p) => {
                p.field.name().hash(state);
                p.op.hash(state);
                p.value.hash(state);
            }
            Predicate::And(c) | Predicate::Or(c) => c.hash(state),
            Predicate::Not(c) => c.hash(state),
            Predicate::PostFilter(f) => f.label().hash(state),
        }
    }
}

impl<V> fmt::Display for Predicate<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Predicate::Any => f.write_str("*"),
            Predicate::Field(p) => {
                write!(f, "{}:{}{}", p.field.name(), p.op.symbol(), p.value)?;
                if p.op == Operator::Prefix {
                    f.write_str("*")?;
                }
                Ok(())
            }
            Predicate::And(c) | Predicate::Or(c) => {
                let sep = if matches!(self, Predicate::And(_)) { " AND " } else { " OR " };
                f.write_str("(")?;
                for (i, child) in c.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{}", child)?;
                }
                f.write_str(")")
            }
            Predicate::Not(c) => write!(f, "-{}", c),
            Predicate::PostFilter(p) => f.write_str(&p.label()),
        }
    }
}

impl<V> fmt::Debug for Predicate<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Predicate({})", self)
    }
}
