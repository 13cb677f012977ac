//! Topic model
//!
//! Built from a `topics` entry in a desired-state document:
//!
//! ```yaml
//! topics:
//!   - name: SKATA.VROMIA.POLY
//!     partitions: 6
//!     replication_factor: 1
//!     configs:
//!       cleanup.policy: delete
//!     key:
//!       schema: "schema-key.json"
//!       compatibility: BACKWARD
//! ```

use super::scalar_to_string;
use crate::error::{KafkaloError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A topic as declared in the desired state
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Topic {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,

    /// Broker config overrides, values normalised to strings
    pub configs: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaReference>,
}

/// Key and/or value schema references of a topic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SchemaReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<SchemaSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SchemaSide>,
}

/// One side of a schema reference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaSide {
    /// Path of the file holding the schema body
    pub schema: String,

    #[serde(default)]
    pub compatibility: Option<String>,
}

/// Which half of a record a subject describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectSide {
    Key,
    Value,
}

impl SubjectSide {
    pub fn suffix(self) -> &'static str {
        match self {
            SubjectSide::Key => "key",
            SubjectSide::Value => "value",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TopicDocument {
    name: String,
    partitions: i64,
    replication_factor: i64,
    #[serde(default)]
    configs: Option<BTreeMap<String, serde_yaml::Value>>,
    #[serde(default)]
    key: Option<SchemaSide>,
    #[serde(default)]
    value: Option<SchemaSide>,
}

impl Topic {
    /// Create a topic without config overrides or schemas
    pub fn new(name: impl Into<String>, partitions: i32, replication_factor: i32) -> Self {
        Self {
            name: name.into(),
            partitions,
            replication_factor,
            configs: BTreeMap::new(),
            schema: None,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configs.insert(key.into(), value.into());
        self
    }

    pub fn with_schema(mut self, side: SubjectSide, file: impl Into<String>, compatibility: Option<&str>) -> Self {
        let reference = self.schema.get_or_insert_with(SchemaReference::default);
        let entry = SchemaSide {
            schema: file.into(),
            compatibility: compatibility.map(str::to_string),
        };
        match side {
            SubjectSide::Key => reference.key = Some(entry),
            SubjectSide::Value => reference.value = Some(entry),
        }
        self
    }

    /// Build a topic from one raw `topics` entry
    pub fn from_document(doc: &serde_yaml::Value) -> Result<Self> {
        let parsed: TopicDocument = serde_yaml::from_value(doc.clone())
            .map_err(|e| KafkaloError::InvalidResource(format!("topic {:?}: {}", doc, e)))?;

        if parsed.name.trim().is_empty() {
            return Err(KafkaloError::InvalidResource(
                "topic name must not be empty".to_string(),
            ));
        }
        let partitions = positive(&parsed.name, "partitions", parsed.partitions)?;
        let replication_factor =
            positive(&parsed.name, "replication_factor", parsed.replication_factor)?;

        let mut configs = BTreeMap::new();
        for (key, value) in parsed.configs.unwrap_or_default() {
            let value = scalar_to_string(&value).ok_or_else(|| {
                KafkaloError::InvalidResource(format!(
                    "topic {}: config {} must be a scalar",
                    parsed.name, key
                ))
            })?;
            configs.insert(key, value);
        }

        let schema = match (parsed.key, parsed.value) {
            (None, None) => None,
            (key, value) => Some(SchemaReference { key, value }),
        };

        Ok(Self {
            name: parsed.name,
            partitions,
            replication_factor,
            configs,
            schema,
        })
    }

    /// Subject name for one side of this topic
    pub fn subject_name(&self, side: SubjectSide) -> String {
        format!("{}-{}", self.name, side.suffix())
    }

    /// Declared schema sides, key first
    pub fn schema_sides(&self) -> Vec<(SubjectSide, &SchemaSide)> {
        let mut sides = Vec::new();
        if let Some(reference) = &self.schema {
            if let Some(key) = &reference.key {
                sides.push((SubjectSide::Key, key));
            }
            if let Some(value) = &reference.value {
                sides.push((SubjectSide::Value, value));
            }
        }
        sides
    }
}

fn positive(topic: &str, field: &str, value: i64) -> Result<i32> {
    match i32::try_from(value) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(KafkaloError::InvalidResource(format!(
            "topic {}: {} must be a positive integer, got {}",
            topic, field, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> serde_yaml::Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_topic_from_document() {
        let topic = Topic::from_document(&doc(
            r#"
name: SKATA.VROMIA.POLY
partitions: 6
replication_factor: 1
configs:
  cleanup.policy: delete
  retention.ms: 100
key:
  schema: schema-key.json
  compatibility: BACKWARD
"#,
        ))
        .unwrap();
        assert_eq!(topic.name, "SKATA.VROMIA.POLY");
        assert_eq!(topic.partitions, 6);
        assert_eq!(topic.replication_factor, 1);
        assert_eq!(topic.configs["cleanup.policy"], "delete");
        assert_eq!(topic.configs["retention.ms"], "100");
        let sides = topic.schema_sides();
        assert_eq!(sides.len(), 1);
        assert_eq!(sides[0].0, SubjectSide::Key);
        assert_eq!(topic.subject_name(SubjectSide::Key), "SKATA.VROMIA.POLY-key");
    }

    #[test]
    fn test_topic_without_configs_or_schema() {
        let topic =
            Topic::from_document(&doc("{name: t, partitions: 1, replication_factor: 3}")).unwrap();
        assert!(topic.configs.is_empty());
        assert!(topic.schema.is_none());
        assert!(topic.schema_sides().is_empty());
    }

    #[test]
    fn test_topic_rejects_non_positive_partitions() {
        let err = Topic::from_document(&doc("{name: t, partitions: 0, replication_factor: 1}"))
            .unwrap_err();
        assert!(err.to_string().contains("partitions"));
        let err = Topic::from_document(&doc("{name: t, partitions: 1, replication_factor: -1}"))
            .unwrap_err();
        assert!(err.to_string().contains("replication_factor"));
    }

    #[test]
    fn test_topic_rejects_missing_fields() {
        let err = Topic::from_document(&doc("{name: t}")).unwrap_err();
        assert!(matches!(err, KafkaloError::InvalidResource(_)));
    }

    #[test]
    fn test_topic_builder() {
        let topic = Topic::new("orders", 3, 2)
            .with_config("cleanup.policy", "compact")
            .with_schema(SubjectSide::Value, "orders.avsc", Some("none"));
        assert_eq!(topic.configs.len(), 1);
        assert_eq!(topic.subject_name(SubjectSide::Value), "orders-value");
        assert_eq!(topic.schema_sides()[0].1.compatibility.as_deref(), Some("none"));
    }
}
