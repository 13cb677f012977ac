//! Remote collaborators
//!
//! The reconcilers only talk to the outside world through these traits:
//! - `TopicAdmin`: broker admin operations
//! - `SchemaRegistry`: subject lookup, registration and compatibility
//! - `RbacService`: role-binding creation against the metadata service
//!
//! `kafka`, `registry` and `mds` hold the network implementations; `memory`
//! holds in-process implementations with the same observable behaviour.

mod kafka;
mod mds;
pub mod memory;
mod registry;

pub use kafka::KafkaAdmin;
pub use mds::MdsClient;
pub use registry::RegistryClient;

use crate::error::Result;
use crate::model::Schema;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Topic creation request: no config overrides, those are altered afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopicRequest {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,
}

/// Per-topic result of a batched create or delete request
pub type TopicResult = (String, std::result::Result<(), String>);

/// Broker admin operations
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    /// Names of every topic in the cluster
    async fn list_topics(&self) -> Result<Vec<String>>;

    /// Create topics in one request. With `validate_only` nothing is committed.
    ///
    /// An `Err` means the request as a whole failed.
    async fn create_topics(
        &self,
        topics: &[NewTopicRequest],
        validate_only: bool,
    ) -> Result<Vec<TopicResult>>;

    /// Live config of one topic
    async fn describe_topic_config(&self, topic: &str) -> Result<BTreeMap<String, String>>;

    /// Replace the config of one topic with `configs`
    async fn alter_topic_config(
        &self,
        topic: &str,
        configs: &BTreeMap<String, String>,
        validate_only: bool,
    ) -> Result<()>;

    /// Delete topics in one request. Nothing in a pass plans deletions; this
    /// is here for callers that drive the admin client directly.
    async fn delete_topics(&self, topics: &[String]) -> Result<Vec<TopicResult>>;
}

/// A schema as stored under a subject
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisteredSchema {
    pub subject: String,
    pub id: u32,
    pub version: u32,
    pub schema: String,
}

/// Result of looking a schema up by content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaLookup {
    /// The subject holds exactly this schema
    Found(RegisteredSchema),
    /// The subject does not exist or does not hold this schema
    NotFound,
    /// The registry could not answer (outage, timeout, 5xx)
    TransientError(String),
    /// The registry rejected the lookup itself
    PermanentError(String),
}

/// Schema registry operations
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    async fn list_subjects(&self) -> Result<Vec<String>>;

    async fn lookup_schema(&self, subject: &str, schema: &Schema) -> SchemaLookup;

    /// Register `schema` under `subject`, returning the schema id
    async fn register_schema(&self, subject: &str, schema: &Schema) -> Result<u32>;

    async fn global_compatibility(&self) -> Result<String>;

    /// Per-subject compatibility override, `None` when the subject uses the global level
    async fn subject_compatibility(&self, subject: &str) -> Result<Option<String>>;

    async fn set_compatibility(&self, subject: &str, level: &str) -> Result<()>;
}

/// Cluster a role binding is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterContext {
    Kafka,
    SchemaRegistry,
    Ksql,
    Connect,
}

impl ClusterContext {
    /// Key of this context's own cluster id inside a scope
    pub fn scope_key(self) -> &'static str {
        match self {
            ClusterContext::Kafka => "kafka-cluster",
            ClusterContext::SchemaRegistry => "schema-registry-cluster",
            ClusterContext::Ksql => "ksql-cluster",
            ClusterContext::Connect => "connect-cluster",
        }
    }
}

/// Cluster identifiers a binding applies to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scope {
    pub clusters: BTreeMap<String, String>,
}

/// Resource types a binding can target
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResourceType {
    Topic,
    Group,
    Cluster,
    Subject,
}

/// How a resource name is matched
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PatternType {
    Literal,
    Prefixed,
}

impl PatternType {
    pub fn from_prefixed(prefixed: bool) -> Self {
        if prefixed {
            PatternType::Prefixed
        } else {
            PatternType::Literal
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePattern {
    pub resource_type: ResourceType,
    pub name: String,
    pub pattern_type: PatternType,
}

/// One role granted to one principal on a set of resource patterns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    pub principal: String,
    pub role: String,
    pub scope: Scope,
    pub resource_patterns: Vec<ResourcePattern>,
}

/// RBAC metadata service operations
#[async_trait]
pub trait RbacService: Send + Sync {
    /// Id of the Kafka cluster the metadata service manages
    async fn kafka_cluster_id(&self) -> Result<String>;

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<()>;

    /// Role names bound to `principal` within `scope`
    async fn role_names(&self, principal: &str, scope: &Scope) -> Result<Vec<String>>;
}
