//! Reconcilers for kafkalo
//!
//! Each reconciler fetches the remote state it needs, diffs it against the
//! desired state and applies the difference, or only records it on a dry run:
//! - TopicReconciler: topics and their config overrides
//! - SchemaReconciler: schema registry subjects and compatibility levels
//! - RoleBindingReconciler: RBAC role bindings for declared clients

mod rolebinding;
mod schema;
mod topic;

pub use rolebinding::{
    ClusterIds, RoleBindingReconciler, CONSUMER_ROLES, PRODUCER_SUBJECT_ROLES,
    PRODUCER_TOPIC_ROLES, RESOURCE_OWNER_ROLES, STRICT_PRODUCER_SUBJECT_ROLES,
};
pub use schema::{SchemaReconcileResult, SchemaReconciler};
pub use topic::{
    sanitize_topic_config, FailedTopic, TopicReconcileResult, TopicReconciler, BANNED_CONFIG_KEYS,
};
