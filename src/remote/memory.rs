//! In-process collaborators
//!
//! Behave like a broker, a schema registry and a metadata service closely
//! enough to drive the reconcilers without a network. Failures can be
//! injected per resource, and every mutating call is counted.

use super::{
    NewTopicRequest, RbacService, RegisteredSchema, RoleBinding, SchemaLookup, SchemaRegistry,
    Scope, TopicAdmin, TopicResult,
};
use crate::error::{KafkaloError, Result};
use crate::model::Schema;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

/// A topic held by `MemoryTopicAdmin`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryTopic {
    pub partitions: i32,
    pub replication_factor: i32,
    pub configs: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct TopicState {
    topics: BTreeMap<String, MemoryTopic>,
    create_attempts: usize,
    alter_attempts: usize,
}

/// In-memory broker
#[derive(Debug, Default)]
pub struct MemoryTopicAdmin {
    state: Mutex<TopicState>,
    /// Keys the broker adds to every describe response
    injected_configs: BTreeMap<String, String>,
    create_failures: BTreeMap<String, String>,
    alter_failures: BTreeMap<String, String>,
    unavailable: bool,
}

impl MemoryTopicAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing topic
    pub fn with_topic(mut self, name: &str, partitions: i32, configs: &[(&str, &str)]) -> Self {
        self.state.get_mut().topics.insert(
            name.to_string(),
            MemoryTopic {
                partitions,
                replication_factor: 1,
                configs: to_map(configs),
            },
        );
        self
    }

    /// Make describe responses carry a config key the broker manages itself
    pub fn with_injected_config(mut self, key: &str, value: &str) -> Self {
        self.injected_configs.insert(key.to_string(), value.to_string());
        self
    }

    pub fn fail_create(mut self, topic: &str, reason: &str) -> Self {
        self.create_failures.insert(topic.to_string(), reason.to_string());
        self
    }

    pub fn fail_alter(mut self, topic: &str, reason: &str) -> Self {
        self.alter_failures.insert(topic.to_string(), reason.to_string());
        self
    }

    /// Fail every request as if the cluster were unreachable
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub async fn topic(&self, name: &str) -> Option<MemoryTopic> {
        self.state.lock().await.topics.get(name).cloned()
    }

    /// Topics submitted to create requests, validate-only included
    pub async fn create_attempts(&self) -> usize {
        self.state.lock().await.create_attempts
    }

    /// Alter requests received, validate-only included
    pub async fn alter_attempts(&self) -> usize {
        self.state.lock().await.alter_attempts
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(KafkaloError::Kafka("Broker transport failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TopicAdmin for MemoryTopicAdmin {
    async fn list_topics(&self) -> Result<Vec<String>> {
        self.check_available()?;
        Ok(self.state.lock().await.topics.keys().cloned().collect())
    }

    async fn create_topics(
        &self,
        topics: &[NewTopicRequest],
        validate_only: bool,
    ) -> Result<Vec<TopicResult>> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.create_attempts += topics.len();

        let mut results = Vec::with_capacity(topics.len());
        for request in topics {
            let outcome = if state.topics.contains_key(&request.name) {
                Err(format!("Topic '{}' already exists.", request.name))
            } else if let Some(reason) = self.create_failures.get(&request.name) {
                Err(reason.clone())
            } else if request.partitions <= 0 || request.replication_factor <= 0 {
                Err("Invalid partitions or replication factor".to_string())
            } else {
                if !validate_only {
                    state.topics.insert(
                        request.name.clone(),
                        MemoryTopic {
                            partitions: request.partitions,
                            replication_factor: request.replication_factor,
                            configs: BTreeMap::new(),
                        },
                    );
                }
                Ok(())
            };
            results.push((request.name.clone(), outcome));
        }
        Ok(results)
    }

    async fn describe_topic_config(&self, topic: &str) -> Result<BTreeMap<String, String>> {
        self.check_available()?;
        let state = self.state.lock().await;
        let found = state
            .topics
            .get(topic)
            .ok_or_else(|| KafkaloError::Kafka(format!("Unknown topic {}", topic)))?;
        let mut configs = self.injected_configs.clone();
        configs.extend(found.configs.clone());
        Ok(configs)
    }

    async fn alter_topic_config(
        &self,
        topic: &str,
        configs: &BTreeMap<String, String>,
        validate_only: bool,
    ) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.alter_attempts += 1;
        if let Some(reason) = self.alter_failures.get(topic) {
            return Err(KafkaloError::Kafka(reason.clone()));
        }
        if let Some(key) = configs.keys().find(|k| self.injected_configs.contains_key(*k)) {
            return Err(KafkaloError::Kafka(format!("Unknown config {}", key)));
        }
        let found = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| KafkaloError::Kafka(format!("Unknown topic {}", topic)))?;
        if !validate_only {
            found.configs = configs.clone();
        }
        Ok(())
    }

    async fn delete_topics(&self, topics: &[String]) -> Result<Vec<TopicResult>> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(topics
            .iter()
            .map(|name| match state.topics.remove(name) {
                Some(_) => (name.clone(), Ok(())),
                None => (
                    name.clone(),
                    Err("Broker: Unknown topic or partition".to_string()),
                ),
            })
            .collect())
    }
}

#[derive(Debug, Default)]
struct Subject {
    /// Schema id per version, version 1 first
    versions: Vec<u32>,
    compatibility: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Schema bodies, id is index + 1
    schemas: Vec<String>,
    subjects: BTreeMap<String, Subject>,
    global_compatibility: String,
    calls: Vec<String>,
}

/// In-memory schema registry
#[derive(Debug)]
pub struct MemorySchemaRegistry {
    state: Mutex<RegistryState>,
    lookup_failures: BTreeMap<String, SchemaLookup>,
    register_failures: BTreeMap<String, String>,
    compatibility_failures: BTreeMap<String, String>,
}

impl Default for MemorySchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySchemaRegistry {
    /// Empty registry with global compatibility `BACKWARD`
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                global_compatibility: "BACKWARD".to_string(),
                ..Default::default()
            }),
            lookup_failures: BTreeMap::new(),
            register_failures: BTreeMap::new(),
            compatibility_failures: BTreeMap::new(),
        }
    }

    /// Seed a subject holding `schema` as version 1
    pub fn with_subject(mut self, subject: &str, schema: &str, compatibility: Option<&str>) -> Self {
        let state = self.state.get_mut();
        let id = add_schema(state, schema);
        state.subjects.insert(
            subject.to_string(),
            Subject {
                versions: vec![id],
                compatibility: compatibility.map(str::to_string),
            },
        );
        self
    }

    pub fn with_global_compatibility(mut self, level: &str) -> Self {
        self.state.get_mut().global_compatibility = level.to_string();
        self
    }

    /// Answer lookups of `subject` with `lookup` instead of searching
    pub fn fail_lookup(mut self, subject: &str, lookup: SchemaLookup) -> Self {
        self.lookup_failures.insert(subject.to_string(), lookup);
        self
    }

    pub fn fail_register(mut self, subject: &str, reason: &str) -> Self {
        self.register_failures.insert(subject.to_string(), reason.to_string());
        self
    }

    /// Reject every compatibility change on `subject`
    pub fn fail_compatibility(mut self, subject: &str, reason: &str) -> Self {
        self.compatibility_failures
            .insert(subject.to_string(), reason.to_string());
        self
    }

    /// Mutating calls received so far, as `register:<subject>` / `set_compatibility:<subject>`
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    /// Number of versions registered under `subject`
    pub async fn version_count(&self, subject: &str) -> usize {
        self.state
            .lock()
            .await
            .subjects
            .get(subject)
            .map(|s| s.versions.len())
            .unwrap_or(0)
    }
}

fn add_schema(state: &mut RegistryState, schema: &str) -> u32 {
    if let Some(pos) = state.schemas.iter().position(|s| s == schema) {
        return pos as u32 + 1;
    }
    state.schemas.push(schema.to_string());
    state.schemas.len() as u32
}

#[async_trait]
impl SchemaRegistry for MemorySchemaRegistry {
    async fn list_subjects(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().await.subjects.keys().cloned().collect())
    }

    async fn lookup_schema(&self, subject: &str, schema: &Schema) -> SchemaLookup {
        if let Some(lookup) = self.lookup_failures.get(subject) {
            return lookup.clone();
        }
        let state = self.state.lock().await;
        let Some(found) = state.subjects.get(subject) else {
            return SchemaLookup::NotFound;
        };
        for (idx, id) in found.versions.iter().enumerate() {
            if state.schemas[*id as usize - 1] == schema.schema {
                return SchemaLookup::Found(RegisteredSchema {
                    subject: subject.to_string(),
                    id: *id,
                    version: idx as u32 + 1,
                    schema: schema.schema.clone(),
                });
            }
        }
        SchemaLookup::NotFound
    }

    async fn register_schema(&self, subject: &str, schema: &Schema) -> Result<u32> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("register:{}", subject));
        if let Some(reason) = self.register_failures.get(subject) {
            return Err(KafkaloError::Registry(reason.clone()));
        }
        let id = add_schema(&mut state, &schema.schema);
        state
            .subjects
            .entry(subject.to_string())
            .or_default()
            .versions
            .push(id);
        Ok(id)
    }

    async fn global_compatibility(&self) -> Result<String> {
        Ok(self.state.lock().await.global_compatibility.clone())
    }

    async fn subject_compatibility(&self, subject: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        match state.subjects.get(subject) {
            Some(found) => Ok(found.compatibility.clone()),
            None => Ok(None),
        }
    }

    async fn set_compatibility(&self, subject: &str, level: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("set_compatibility:{}", subject));
        if let Some(reason) = self.compatibility_failures.get(subject) {
            return Err(KafkaloError::Registry(reason.clone()));
        }
        let found = state
            .subjects
            .get_mut(subject)
            .ok_or_else(|| KafkaloError::Registry(format!("Subject '{}' not found", subject)))?;
        found.compatibility = Some(level.to_uppercase());
        Ok(())
    }
}

/// In-memory metadata service
#[derive(Debug)]
pub struct MemoryRbac {
    cluster_id: String,
    bindings: Mutex<Vec<RoleBinding>>,
    failing_roles: BTreeSet<String>,
}

impl MemoryRbac {
    pub fn new(cluster_id: &str) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            bindings: Mutex::new(Vec::new()),
            failing_roles: BTreeSet::new(),
        }
    }

    /// Reject every binding request for `role`
    pub fn fail_role(mut self, role: &str) -> Self {
        self.failing_roles.insert(role.to_string());
        self
    }

    pub async fn bindings(&self) -> Vec<RoleBinding> {
        self.bindings.lock().await.clone()
    }
}

#[async_trait]
impl RbacService for MemoryRbac {
    async fn kafka_cluster_id(&self) -> Result<String> {
        Ok(self.cluster_id.clone())
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<()> {
        if self.failing_roles.contains(&binding.role) {
            return Err(KafkaloError::Http(format!(
                "403 Forbidden: cannot bind {}",
                binding.role
            )));
        }
        let mut bindings = self.bindings.lock().await;
        if !bindings.contains(binding) {
            bindings.push(binding.clone());
        }
        Ok(())
    }

    async fn role_names(&self, principal: &str, scope: &Scope) -> Result<Vec<String>> {
        let bindings = self.bindings.lock().await;
        let mut roles: Vec<String> = bindings
            .iter()
            .filter(|b| b.principal == principal && &b.scope == scope)
            .map(|b| b.role.clone())
            .collect();
        roles.sort();
        roles.dedup();
        Ok(roles)
    }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_lookup_round_trip() {
        let registry = MemorySchemaRegistry::new();
        let schema = Schema::new("SKATA-value", r#"{"type": "string"}"#, None);

        assert_eq!(
            registry.lookup_schema("SKATA-value", &schema).await,
            SchemaLookup::NotFound
        );

        let id = registry.register_schema("SKATA-value", &schema).await.unwrap();
        match registry.lookup_schema("SKATA-value", &schema).await {
            SchemaLookup::Found(found) => {
                assert_eq!(found.subject, "SKATA-value");
                assert_eq!(found.id, id);
                assert_eq!(found.version, 1);
            }
            other => panic!("expected Found, got {:?}", other),
        }

        let other = Schema::new("SKATA-value", r#"{"type": "long"}"#, None);
        assert_eq!(
            registry.lookup_schema("SKATA-value", &other).await,
            SchemaLookup::NotFound
        );
        assert_eq!(
            registry.lookup_schema("NEVER-value", &schema).await,
            SchemaLookup::NotFound
        );
    }

    #[tokio::test]
    async fn test_registry_versions_share_ids() {
        let registry = MemorySchemaRegistry::new();
        let a = Schema::new("a-value", "A", None);
        let b = Schema::new("a-value", "B", None);
        let id_a = registry.register_schema("a-value", &a).await.unwrap();
        let id_b = registry.register_schema("a-value", &b).await.unwrap();
        let id_again = registry.register_schema("b-value", &a).await.unwrap();
        assert_ne!(id_a, id_b);
        assert_eq!(id_a, id_again);
        assert_eq!(registry.version_count("a-value").await, 2);
        match registry.lookup_schema("a-value", &b).await {
            SchemaLookup::Found(found) => assert_eq!(found.version, 2),
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_registry_compatibility() {
        let registry = MemorySchemaRegistry::new().with_subject("s", "{}", None);
        assert_eq!(registry.global_compatibility().await.unwrap(), "BACKWARD");
        assert_eq!(registry.subject_compatibility("s").await.unwrap(), None);
        assert!(registry.set_compatibility("missing", "none").await.is_err());
        registry.set_compatibility("s", "none").await.unwrap();
        assert_eq!(
            registry.subject_compatibility("s").await.unwrap().as_deref(),
            Some("NONE")
        );
    }

    #[tokio::test]
    async fn test_topic_admin_validate_only() {
        let admin = MemoryTopicAdmin::new();
        let request = NewTopicRequest {
            name: "t".to_string(),
            partitions: 1,
            replication_factor: 1,
        };
        let results = admin.create_topics(&[request.clone()], true).await.unwrap();
        assert!(results[0].1.is_ok());
        assert!(admin.topic("t").await.is_none());

        admin.create_topics(&[request.clone()], false).await.unwrap();
        assert!(admin.topic("t").await.is_some());
        let results = admin.create_topics(&[request], false).await.unwrap();
        assert!(results[0].1.is_err());
        assert_eq!(admin.create_attempts().await, 3);
    }

    #[tokio::test]
    async fn test_topic_admin_delete() {
        let admin = MemoryTopicAdmin::new()
            .with_topic("old", 1, &[])
            .with_topic("kept", 1, &[]);
        let results = admin
            .delete_topics(&["old".to_string(), "never".to_string()])
            .await
            .unwrap();
        assert_eq!(results[0], ("old".to_string(), Ok(())));
        assert_eq!(results[1].0, "never");
        assert!(results[1].1.is_err());
        assert!(admin.topic("old").await.is_none());
        assert!(admin.topic("kept").await.is_some());

        let down = MemoryTopicAdmin::new().unavailable();
        assert!(down.delete_topics(&["old".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn test_rbac_records_bindings() {
        let rbac = MemoryRbac::new("cluster-1").fail_role("ResourceOwner");
        let mut clusters = BTreeMap::new();
        clusters.insert("kafka-cluster".to_string(), "cluster-1".to_string());
        let binding = RoleBinding {
            principal: "User:a".to_string(),
            role: "DeveloperRead".to_string(),
            scope: Scope { clusters },
            resource_patterns: vec![],
        };
        rbac.create_role_binding(&binding).await.unwrap();
        let roles = rbac.role_names("User:a", &binding.scope).await.unwrap();
        assert_eq!(roles, vec!["DeveloperRead".to_string()]);

        let owner = RoleBinding {
            role: "ResourceOwner".to_string(),
            ..binding
        };
        assert!(rbac.create_role_binding(&owner).await.is_err());
    }
}
