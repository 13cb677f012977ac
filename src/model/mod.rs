//! Resource models for kafkalo
//!
//! Immutable values built once per run from the merged desired state:
//! - Topic: a topic with its partitioning, config overrides and schema references
//! - Schema: a schema-registry subject with its body and compatibility level
//! - Client: a principal and the grants it should hold

mod client;
mod schema;
mod topic;

pub use client::{Client, GroupGrant, Principal, PrincipalKind, TopicGrant, DEFAULT_GROUP_ROLE};
pub use schema::{normalize_compatibility, Schema, SCHEMA_TYPE_AVRO};
pub use topic::{SchemaReference, SchemaSide, SubjectSide, Topic};

/// Render a YAML scalar as the string a broker or registry would see.
///
/// Returns `None` for mappings and sequences, which have no scalar form.
pub fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        serde_yaml::Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        serde_yaml::Value::Sequence(_) | serde_yaml::Value::Mapping(_) => None,
    }
}
