//! Typed reconciliation outcomes
//!
//! Every reconciler records one entry per resource it touched. The same
//! records back the dry-run report and the apply-mode summary.

use crate::model::{Schema, Topic};
use crate::remote::RoleBinding;
use serde::Serialize;
use std::collections::BTreeMap;

/// Overall result for one resource
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
    Failed { reason: String },
}

impl Outcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Outcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::Unchanged => "unchanged",
            Outcome::Failed { .. } => "failed",
        }
    }
}

/// Result of one remote call made for a resource
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum Step {
    Success,
    Failed { reason: String },
}

impl Step {
    pub fn from_result<E: ToString>(result: std::result::Result<(), E>) -> Self {
        match result {
            Ok(()) => Step::Success,
            Err(e) => Step::Failed {
                reason: e.to_string(),
            },
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Step::Success => None,
            Step::Failed { reason } => Some(reason),
        }
    }
}

/// One changed config key. An addition carries only the new value.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ConfigChange {
    Added(String),
    Changed { before: String, after: String },
}

/// Config keys that differ between live and desired state
pub type ConfigDelta = BTreeMap<String, ConfigChange>;

/// Diff desired config `after` against live config `before`.
///
/// Keys only present in `before` are not reported.
pub fn config_diff(
    before: &BTreeMap<String, String>,
    after: &BTreeMap<String, String>,
) -> ConfigDelta {
    let mut delta = ConfigDelta::new();
    for (key, new) in after {
        match before.get(key) {
            None => {
                delta.insert(key.clone(), ConfigChange::Added(new.clone()));
            }
            Some(old) if old.trim() != new.trim() => {
                delta.insert(
                    key.clone(),
                    ConfigChange::Changed {
                        before: old.clone(),
                        after: new.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }
    delta
}

/// Everything recorded for one topic
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TopicOutcome {
    pub topic: Topic,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create: Option<Step>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub config_delta: ConfigDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alter: Option<Step>,
}

impl TopicOutcome {
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            create: None,
            config_delta: ConfigDelta::new(),
            alter: None,
        }
    }

    /// Fold the recorded steps into one outcome
    pub fn status(&self) -> Outcome {
        if let Some(reason) = self.create.as_ref().and_then(Step::reason) {
            return Outcome::failed(reason);
        }
        if let Some(reason) = self.alter.as_ref().and_then(Step::reason) {
            return Outcome::failed(reason);
        }
        if self.create.is_some() {
            Outcome::Created
        } else if !self.config_delta.is_empty() {
            Outcome::Updated
        } else {
            Outcome::Unchanged
        }
    }
}

/// Before/after pair of a compatibility level
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CompatibilityChange {
    pub before: String,
    pub after: String,
}

/// Everything recorded for one subject
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SchemaOutcome {
    pub schema: Schema,
    pub registration: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<CompatibilityChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility_error: Option<String>,
}

impl SchemaOutcome {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            registration: Outcome::Unchanged,
            compatibility: None,
            compatibility_error: None,
        }
    }

    /// Fold registration and compatibility into one outcome. A failed
    /// registration wins over a failed compatibility change.
    pub fn status(&self) -> Outcome {
        if self.registration.is_failed() {
            return self.registration.clone();
        }
        if let Some(reason) = &self.compatibility_error {
            return Outcome::failed(format!("compatibility: {}", reason));
        }
        if self.registration != Outcome::Unchanged {
            return self.registration.clone();
        }
        if self.compatibility.is_some() {
            Outcome::Updated
        } else {
            Outcome::Unchanged
        }
    }
}

/// Topic outcomes keyed by topic name
pub type TopicPlan = BTreeMap<String, TopicOutcome>;
/// Schema outcomes keyed by subject name
pub type SchemaPlan = BTreeMap<String, SchemaOutcome>;
/// Role bindings that a dry run would have created
pub type RoleBindingPlan = Vec<RoleBinding>;

/// A binding that was rejected or could not be built
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedBinding {
    pub binding: RoleBinding,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_get_config_diff() {
        let before = map(&[("retention.ms", "100"), ("message.max.bytes", "1337")]);
        let after = map(&[("retention.ms", "1"), ("message.max.bytes", "1337")]);

        let delta = config_diff(&before, &after);
        assert!(!delta.contains_key("message.max.bytes"));
        assert_eq!(
            delta["retention.ms"],
            ConfigChange::Changed {
                before: "100".to_string(),
                after: "1".to_string()
            }
        );
    }

    #[test]
    fn test_config_diff_shape() {
        let before = map(&[("a", "1"), ("b", "2")]);
        let after = map(&[("a", "1"), ("b", "3"), ("c", "4")]);

        let delta = config_diff(&before, &after);
        assert_eq!(delta.len(), 2);
        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"b": {"before": "2", "after": "3"}, "c": "4"})
        );
    }

    #[test]
    fn test_config_diff_ignores_whitespace_and_live_only_keys() {
        let before = map(&[("a", " 1 "), ("live.only", "x")]);
        let after = map(&[("a", "1")]);
        assert!(config_diff(&before, &after).is_empty());
    }

    #[test]
    fn test_topic_outcome_status() {
        let mut outcome = TopicOutcome::new(Topic::new("t", 1, 1));
        assert_eq!(outcome.status(), Outcome::Unchanged);

        outcome
            .config_delta
            .insert("a".to_string(), ConfigChange::Added("1".to_string()));
        assert_eq!(outcome.status(), Outcome::Updated);

        outcome.create = Some(Step::Success);
        assert_eq!(outcome.status(), Outcome::Created);

        outcome.alter = Some(Step::Failed {
            reason: "boom".to_string(),
        });
        assert_eq!(outcome.status(), Outcome::failed("boom"));
    }

    #[test]
    fn test_schema_outcome_status() {
        let mut outcome = SchemaOutcome::new(Schema::new("t-key", "{}", None));
        assert_eq!(outcome.status(), Outcome::Unchanged);

        outcome.compatibility = Some(CompatibilityChange {
            before: "backward".to_string(),
            after: "none".to_string(),
        });
        assert_eq!(outcome.status(), Outcome::Updated);

        outcome.registration = Outcome::Created;
        assert_eq!(outcome.status(), Outcome::Created);

        outcome.compatibility_error = Some("422 Invalid compatibility level".to_string());
        assert_eq!(
            outcome.status(),
            Outcome::failed("compatibility: 422 Invalid compatibility level")
        );

        outcome.registration = Outcome::failed("incompatible");
        assert_eq!(outcome.status(), Outcome::failed("incompatible"));
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(Outcome::failed("nope")).unwrap();
        assert_eq!(json, serde_json::json!({"status": "failed", "reason": "nope"}));
        let json = serde_json::to_value(Step::Success).unwrap();
        assert_eq!(json, serde_json::json!({"result": "success"}));
    }
}
