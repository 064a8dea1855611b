use std::sync::Arc;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use crate::core::error::{Error, Result};
use crate::core::types::FieldValue;
use crate::query::parser::{QueryNode, Term, parse_query};
use crate::query::predicate::{Operator, Predicate};
use crate::schema::field::FieldType;
use crate::schema::schema::Schema;

/// Resolves parsed queries against a schema into predicates
pub struct QueryBuilder<V> {
    schema: Arc<Schema<V>>,
    default_field: Option<String>,
}

impl<V> QueryBuilder<V> {
    pub fn new(schema: Arc<Schema<V>>) -> Self {
        QueryBuilder {
            schema,
            default_field: None,
        }
    }

    /// Field used for terms written without `field:`
    pub fn with_default_field(mut self, field: &str) -> Self {
        self.default_field = Some(field.to_string());
        self
    }

    pub fn parse(&self, query: &str) -> Result<Predicate<V>> {
        self.build(&parse_query(query)?)
    }

    pub fn build(&self, node: &QueryNode) -> Result<Predicate<V>> {
        match node {
            QueryNode::Term(term) => self.term(term),
            QueryNode::And(children) => Ok(Predicate::and(self.build_all(children)?)),
            QueryNode::Or(children) => Ok(Predicate::or(self.build_all(children)?)),
            QueryNode::Not(child) => Ok(Predicate::not(self.build(child)?)),
        }
    }

    fn build_all(&self, nodes: &[QueryNode]) -> Result<Vec<Predicate<V>>> {
        nodes.iter().map(|n| self.build(n)).collect()
    }

    fn term(&self, term: &Term) -> Result<Predicate<V>> {
        let name = term
            .field
            .as_deref()
            .or(self.default_field.as_deref())
            .ok_or_else(|| Error::query_parse(format!("no field given for {:?}", term.value)))?;
        let field = self
            .schema
            .field(name)
            .ok_or_else(|| Error::query_parse(format!("unsupported field: {}", name)))?;
        if !field.is_searchable() {
            return Err(Error::query_parse(format!("field {} is not searchable", name)));
        }

        let op = match (term.op, field.field_type) {
            (Operator::Eq, FieldType::FullText) => Operator::Contains,
            (Operator::Eq, FieldType::Prefix) => Operator::Prefix,
            (op, _) => op,
        };
        if !op.supported_by(field.field_type) {
            return Err(Error::query_parse(format!(
                "operator {:?} not supported on {} field {}",
                op, type_name(field.field_type), name
            )));
        }

        let value = coerce(field.field_type, &term.value)
            .ok_or_else(|| Error::query_parse(format!("invalid value for {}: {:?}", name, term.value)))?;
        Ok(Predicate::field(field, op, value))
    }
}

fn type_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Bool => "boolean",
        FieldType::Integer | FieldType::IntegerRange => "integer",
        FieldType::Long => "long",
        FieldType::Timestamp => "timestamp",
        FieldType::Exact => "exact",
        FieldType::FullText => "full text",
        FieldType::Prefix => "prefix",
        FieldType::StoredOnly => "stored",
    }
}

fn coerce(field_type: FieldType, text: &str) -> Option<FieldValue> {
    match field_type {
        FieldType::Bool => match text {
            "true" | "1" => Some(FieldValue::Bool(true)),
            "false" | "0" => Some(FieldValue::Bool(false)),
            _ => None,
        },
        FieldType::Integer | FieldType::IntegerRange => text.parse().ok().map(FieldValue::Int),
        FieldType::Long => text.parse().ok().map(FieldValue::Long),
        FieldType::Timestamp => parse_timestamp(text).map(FieldValue::timestamp),
        FieldType::Exact | FieldType::FullText | FieldType::Prefix => Some(FieldValue::Str(text.to_string())),
        FieldType::StoredOnly => None,
    }
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` or a bare date, all in UTC
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crate::core::error::ErrorKind;
    use crate::schema::field::FieldDefBuilder;

    struct Doc;

    fn schema() -> Arc<Schema<Doc>> {
        Arc::new(
            Schema::builder(1)
                .add(FieldDefBuilder::exact("status").build(|_: &Doc| None))
                .add(FieldDefBuilder::full_text("subject").build(|_: &Doc| None))
                .add(FieldDefBuilder::prefix("project").build(|_: &Doc| None))
                .add(FieldDefBuilder::integer("id").build(|_: &Doc| None))
                .add(FieldDefBuilder::timestamp("updated").build(|_: &Doc| None))
                .add(FieldDefBuilder::stored_only("ref_state").build(|_: &Doc| None))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn operators_follow_field_types() {
        let builder = QueryBuilder::new(schema()).with_default_field("subject");

        let p = builder.parse("status:new project:plat flaky").unwrap();
        assert_eq!(p.to_string(), "(status:new AND project:plat* AND subject:flaky)");

        let Predicate::Field(leaf) = builder.parse("updated:>2024-03-01").unwrap() else {
            panic!("expected a leaf");
        };
        assert_eq!(leaf.op, Operator::Gt);
        assert_eq!(leaf.value, FieldValue::Timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn unsupported_queries_are_parse_errors() {
        let builder = QueryBuilder::new(schema());
        for bad in ["flaky", "reviewer:7", "ref_state:x", "id:>3", "id:seven", "status:>a", "updated:yesterday"] {
            let err = builder.parse(bad).err().unwrap();
            assert_eq!(err.kind, ErrorKind::QueryParse, "{}", bad);
        }
    }

    #[test]
    fn timestamps_accept_several_layouts() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(parse_timestamp("2024-05-06T07:08:09Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-06 07:08:09"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-06"), Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).single());
        assert_eq!(parse_timestamp("May 6"), None);
    }
}
