//! Schema model

use serde::Serialize;

/// The only schema format kafkalo registers
pub const SCHEMA_TYPE_AVRO: &str = "AVRO";

/// A schema-registry subject as declared in the desired state
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Schema {
    pub subject_name: String,
    /// Raw schema body, sent verbatim to the registry
    pub schema: String,
    pub schema_type: String,
    /// Lower-cased, trimmed compatibility level; `None` keeps the registry default
    pub compatibility: Option<String>,
}

impl Schema {
    pub fn new(
        subject_name: impl Into<String>,
        schema: impl Into<String>,
        compatibility: Option<&str>,
    ) -> Self {
        Self {
            subject_name: subject_name.into(),
            schema: schema.into(),
            schema_type: SCHEMA_TYPE_AVRO.to_string(),
            compatibility: compatibility
                .map(normalize_compatibility)
                .filter(|c| !c.is_empty()),
        }
    }
}

/// Case and whitespace insensitive form of a compatibility level
pub fn normalize_compatibility(level: &str) -> String {
    level.trim().to_lowercase()
}
