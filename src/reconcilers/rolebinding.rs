//! Access-Binding Reconciler
//!
//! Expands the grants declared on each client into role bindings and sends
//! them to the RBAC metadata service. Topic grants bind the topic in the
//! Kafka context and the matching subjects in the schema registry context.

use crate::config::MdsConnection;
use crate::error::{KafkaloError, Result};
use crate::model::{Client, DEFAULT_GROUP_ROLE};
use crate::plan::{FailedBinding, RoleBindingPlan};
use crate::remote::{
    ClusterContext, PatternType, RbacService, ResourcePattern, ResourceType, RoleBinding, Scope,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Roles bound for a consumer grant, on topic and subject alike
pub const CONSUMER_ROLES: &[&str] = &["DeveloperRead"];
/// Roles bound on the topic for a producer grant
pub const PRODUCER_TOPIC_ROLES: &[&str] = &["DeveloperWrite"];
/// Roles bound on the subject for a producer grant
pub const PRODUCER_SUBJECT_ROLES: &[&str] = &["DeveloperRead", "DeveloperWrite"];
/// Roles bound on the subject for a strict producer grant
pub const STRICT_PRODUCER_SUBJECT_ROLES: &[&str] = &["DeveloperRead"];
/// Roles bound for a resource-owner grant, on topic and subject alike
pub const RESOURCE_OWNER_ROLES: &[&str] = &["ResourceOwner"];

/// Cluster ids of the non-Kafka contexts, as configured
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterIds {
    pub schema_registry: Option<String>,
    pub ksql: Option<String>,
    pub connect: Option<String>,
}

impl From<&MdsConnection> for ClusterIds {
    fn from(connection: &MdsConnection) -> Self {
        Self {
            schema_registry: connection.schema_registry_cluster_id.clone(),
            ksql: connection.ksql_cluster_id.clone(),
            connect: connection.connect_cluster_id.clone(),
        }
    }
}

/// Issues role bindings for declared clients.
///
/// The Kafka cluster id is looked up once, when the reconciler is created.
pub struct RoleBindingReconciler {
    rbac: Arc<dyn RbacService>,
    kafka_cluster_id: String,
    cluster_ids: ClusterIds,
    plan: RoleBindingPlan,
    failed: Vec<FailedBinding>,
}

impl RoleBindingReconciler {
    /// Create a reconciler, resolving the Kafka cluster id
    pub async fn new(rbac: Arc<dyn RbacService>, cluster_ids: ClusterIds) -> Result<Self> {
        let kafka_cluster_id = rbac.kafka_cluster_id().await?;
        info!("RBAC metadata service manages Kafka cluster {}", kafka_cluster_id);
        Ok(Self {
            rbac,
            kafka_cluster_id,
            cluster_ids,
            plan: RoleBindingPlan::new(),
            failed: Vec::new(),
        })
    }

    pub fn kafka_cluster_id(&self) -> &str {
        &self.kafka_cluster_id
    }

    /// Bindings a dry run would have created
    pub fn plan(&self) -> &RoleBindingPlan {
        &self.plan
    }

    pub fn into_plan(self) -> RoleBindingPlan {
        self.plan
    }

    /// Bindings rejected while applying
    pub fn failed(&self) -> &[FailedBinding] {
        &self.failed
    }

    /// Scope of a binding in `context`
    pub fn scope(&self, context: ClusterContext) -> Result<Scope> {
        let mut clusters = BTreeMap::new();
        clusters.insert(
            ClusterContext::Kafka.scope_key().to_string(),
            self.kafka_cluster_id.clone(),
        );
        let own_id = match context {
            ClusterContext::Kafka => None,
            ClusterContext::SchemaRegistry => Some(&self.cluster_ids.schema_registry),
            ClusterContext::Ksql => Some(&self.cluster_ids.ksql),
            ClusterContext::Connect => Some(&self.cluster_ids.connect),
        };
        if let Some(id) = own_id {
            let id = id.as_ref().ok_or_else(|| {
                KafkaloError::Configuration(format!(
                    "connections.mds has no cluster id for {}",
                    context.scope_key()
                ))
            })?;
            clusters.insert(context.scope_key().to_string(), id.clone());
        }
        Ok(Scope { clusters })
    }

    /// Issue one binding per role for `principal` on one resource pattern.
    ///
    /// Dry runs append the bindings to the plan instead. Failures are logged
    /// and recorded, and the remaining roles are still attempted.
    #[allow(clippy::too_many_arguments)]
    pub async fn set_role_binding(
        &mut self,
        context: ClusterContext,
        resource_type: ResourceType,
        resource_name: &str,
        principal: &str,
        roles: &[&str],
        prefixed: bool,
        dry_run: bool,
    ) {
        let pattern = ResourcePattern {
            resource_type,
            name: resource_name.to_string(),
            pattern_type: PatternType::from_prefixed(prefixed),
        };
        let scope = match self.scope(context) {
            Ok(scope) => scope,
            Err(e) => {
                error!(
                    "Skipping {:?} {} bindings for {}: {}",
                    resource_type, resource_name, principal, e
                );
                for role in roles {
                    self.failed.push(FailedBinding {
                        binding: RoleBinding {
                            principal: principal.to_string(),
                            role: role.to_string(),
                            scope: Scope {
                                clusters: BTreeMap::new(),
                            },
                            resource_patterns: vec![pattern.clone()],
                        },
                        reason: e.to_string(),
                    });
                }
                return;
            }
        };

        for role in roles {
            let binding = RoleBinding {
                principal: principal.to_string(),
                role: role.to_string(),
                scope: scope.clone(),
                resource_patterns: vec![pattern.clone()],
            };
            if dry_run {
                debug!(
                    "Would bind {} to {} on {:?} {}",
                    role, principal, resource_type, resource_name
                );
                self.plan.push(binding);
                continue;
            }
            match self.rbac.create_role_binding(&binding).await {
                Ok(()) => info!(
                    "Bound {} to {} on {:?} {}",
                    role, principal, resource_type, resource_name
                ),
                Err(e) => {
                    error!("Failed to set RBAC {} for {} with error {}", role, principal, e);
                    self.failed.push(FailedBinding {
                        binding,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Read access to a topic and its subjects
    pub async fn consumer_grant(&mut self, topic: &str, principal: &str, prefixed: bool, dry_run: bool) {
        self.set_role_binding(
            ClusterContext::Kafka,
            ResourceType::Topic,
            topic,
            principal,
            CONSUMER_ROLES,
            prefixed,
            dry_run,
        )
        .await;
        self.set_role_binding(
            ClusterContext::SchemaRegistry,
            ResourceType::Subject,
            topic,
            principal,
            CONSUMER_ROLES,
            prefixed,
            dry_run,
        )
        .await;
    }

    /// Write access to a topic. Strict producers may read but not change
    /// the topic's subjects.
    pub async fn producer_grant(
        &mut self,
        topic: &str,
        principal: &str,
        prefixed: bool,
        strict: bool,
        dry_run: bool,
    ) {
        self.set_role_binding(
            ClusterContext::Kafka,
            ResourceType::Topic,
            topic,
            principal,
            PRODUCER_TOPIC_ROLES,
            prefixed,
            dry_run,
        )
        .await;
        let subject_roles = if strict {
            STRICT_PRODUCER_SUBJECT_ROLES
        } else {
            PRODUCER_SUBJECT_ROLES
        };
        self.set_role_binding(
            ClusterContext::SchemaRegistry,
            ResourceType::Subject,
            topic,
            principal,
            subject_roles,
            prefixed,
            dry_run,
        )
        .await;
    }

    /// Ownership (read, write and delegate) of a topic and its subjects
    pub async fn resource_owner_grant(
        &mut self,
        topic: &str,
        principal: &str,
        prefixed: bool,
        dry_run: bool,
    ) {
        self.set_role_binding(
            ClusterContext::Kafka,
            ResourceType::Topic,
            topic,
            principal,
            RESOURCE_OWNER_ROLES,
            prefixed,
            dry_run,
        )
        .await;
        self.set_role_binding(
            ClusterContext::SchemaRegistry,
            ResourceType::Subject,
            topic,
            principal,
            RESOURCE_OWNER_ROLES,
            prefixed,
            dry_run,
        )
        .await;
    }

    /// Consumer-group access, `DeveloperRead` unless roles are given
    pub async fn group_grant(
        &mut self,
        name: &str,
        principal: &str,
        prefixed: bool,
        roles: &[String],
        dry_run: bool,
    ) {
        let roles: Vec<&str> = if roles.is_empty() {
            vec![DEFAULT_GROUP_ROLE]
        } else {
            roles.iter().map(String::as_str).collect()
        };
        self.set_role_binding(
            ClusterContext::Kafka,
            ResourceType::Group,
            name,
            principal,
            &roles,
            prefixed,
            dry_run,
        )
        .await;
    }

    /// Issue the bindings for every grant of every client
    pub async fn reconcile_roles(&mut self, clients: &[Client], dry_run: bool) {
        for client in clients {
            if client.is_empty() {
                debug!("Client {} declares no grants", client.principal);
                continue;
            }
            let principal = client.principal.to_string();
            for grant in &client.consumer_for {
                self.consumer_grant(&grant.topic, &principal, grant.prefixed, dry_run)
                    .await;
            }
            for grant in &client.producer_for {
                self.producer_grant(&grant.topic, &principal, grant.prefixed, grant.strict, dry_run)
                    .await;
            }
            for grant in &client.resourceowner_for {
                self.resource_owner_grant(&grant.topic, &principal, grant.prefixed, dry_run)
                    .await;
            }
            for group in &client.groups {
                self.group_grant(&group.name, &principal, group.prefixed, &group.roles, dry_run)
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupGrant, TopicGrant};
    use crate::remote::memory::MemoryRbac;

    fn cluster_ids() -> ClusterIds {
        ClusterIds {
            schema_registry: Some("schemaregistry".to_string()),
            ..Default::default()
        }
    }

    async fn reconciler(rbac: &Arc<MemoryRbac>) -> RoleBindingReconciler {
        RoleBindingReconciler::new(rbac.clone(), cluster_ids())
            .await
            .unwrap()
    }

    fn topic_grant(topic: &str, prefixed: bool, strict: bool) -> TopicGrant {
        TopicGrant {
            topic: topic.to_string(),
            prefixed,
            strict,
        }
    }

    fn roles_on(plan: &[RoleBinding], resource_type: ResourceType) -> Vec<String> {
        plan.iter()
            .filter(|b| b.resource_patterns[0].resource_type == resource_type)
            .map(|b| b.role.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_scopes() {
        let rbac = Arc::new(MemoryRbac::new("kafka-1"));
        let reconciler = reconciler(&rbac).await;
        assert_eq!(reconciler.kafka_cluster_id(), "kafka-1");

        let kafka = reconciler.scope(ClusterContext::Kafka).unwrap();
        assert_eq!(kafka.clusters.len(), 1);
        assert_eq!(kafka.clusters["kafka-cluster"], "kafka-1");

        let sr = reconciler.scope(ClusterContext::SchemaRegistry).unwrap();
        assert_eq!(sr.clusters["kafka-cluster"], "kafka-1");
        assert_eq!(sr.clusters["schema-registry-cluster"], "schemaregistry");

        assert!(reconciler.scope(ClusterContext::Connect).is_err());
    }

    #[tokio::test]
    async fn test_consumer_grant_dry_run() {
        let rbac = Arc::new(MemoryRbac::new("kafka-1"));
        let mut reconciler = reconciler(&rbac).await;
        reconciler
            .consumer_grant("SKATA", "User:poutanaola", true, true)
            .await;

        let plan = reconciler.plan();
        assert_eq!(plan.len(), 2);
        assert_eq!(roles_on(plan, ResourceType::Topic), vec!["DeveloperRead"]);
        assert_eq!(roles_on(plan, ResourceType::Subject), vec!["DeveloperRead"]);
        assert!(plan.iter().all(|b| b.principal == "User:poutanaola"));
        assert!(plan
            .iter()
            .all(|b| b.resource_patterns[0].pattern_type == PatternType::Prefixed));
        assert!(rbac.bindings().await.is_empty());
    }

    #[tokio::test]
    async fn test_producer_grant_strict() {
        let rbac = Arc::new(MemoryRbac::new("kafka-1"));
        let mut reconciler = reconciler(&rbac).await;
        reconciler
            .producer_grant("SKATA", "User:p", false, false, true)
            .await;
        assert_eq!(
            roles_on(reconciler.plan(), ResourceType::Subject),
            vec!["DeveloperRead", "DeveloperWrite"]
        );
        assert_eq!(
            reconciler.plan()[0].resource_patterns[0].pattern_type,
            PatternType::Literal
        );

        let mut strict = RoleBindingReconciler::new(rbac.clone(), cluster_ids())
            .await
            .unwrap();
        strict.producer_grant("SKATA", "User:p", true, true, true).await;
        assert_eq!(roles_on(strict.plan(), ResourceType::Topic), vec!["DeveloperWrite"]);
        assert_eq!(roles_on(strict.plan(), ResourceType::Subject), vec!["DeveloperRead"]);
    }

    #[tokio::test]
    async fn test_group_grant_default_role() {
        let rbac = Arc::new(MemoryRbac::new("kafka-1"));
        let mut reconciler = reconciler(&rbac).await;
        reconciler.group_grant("cg-", "User:p", true, &[], true).await;
        reconciler
            .group_grant(
                "cg2",
                "User:p",
                true,
                &["DeveloperRead".to_string(), "DeveloperManage".to_string()],
                true,
            )
            .await;
        assert_eq!(
            roles_on(reconciler.plan(), ResourceType::Group),
            vec!["DeveloperRead", "DeveloperRead", "DeveloperManage"]
        );
    }

    #[tokio::test]
    async fn test_reconcile_roles_applies_bindings() {
        let rbac = Arc::new(MemoryRbac::new("kafka-1"));
        let mut reconciler = reconciler(&rbac).await;

        let mut client = Client::new("User:poutanaola").unwrap();
        client.consumer_for.push(topic_grant("SKATA", true, false));
        client.resourceowner_for.push(topic_grant("OWNED", true, false));
        client.groups.push(GroupGrant {
            name: "cg-".to_string(),
            prefixed: true,
            roles: vec![DEFAULT_GROUP_ROLE.to_string()],
        });
        let idle = Client::new("Group:malakes").unwrap();

        reconciler.reconcile_roles(&[client, idle], false).await;
        assert!(reconciler.plan().is_empty());
        assert!(reconciler.failed().is_empty());

        // consumer: 2, resource owner: 2, group: 1
        let bindings = rbac.bindings().await;
        assert_eq!(bindings.len(), 5);
        let kafka = reconciler.scope(ClusterContext::Kafka).unwrap();
        let roles = rbac.role_names("User:poutanaola", &kafka).await.unwrap();
        assert_eq!(roles, vec!["DeveloperRead".to_string(), "ResourceOwner".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_role_does_not_stop_others() {
        let rbac = Arc::new(MemoryRbac::new("kafka-1").fail_role("DeveloperRead"));
        let mut reconciler = reconciler(&rbac).await;
        reconciler
            .producer_grant("SKATA", "User:p", true, false, false)
            .await;

        // DeveloperRead on the subject fails, DeveloperWrite on topic and subject succeed
        assert_eq!(reconciler.failed().len(), 1);
        assert_eq!(reconciler.failed()[0].binding.role, "DeveloperRead");
        assert!(reconciler.failed()[0].reason.contains("403"));
        assert_eq!(rbac.bindings().await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_context_id_skips_binding() {
        let rbac = Arc::new(MemoryRbac::new("kafka-1"));
        let mut reconciler = RoleBindingReconciler::new(rbac.clone(), ClusterIds::default())
            .await
            .unwrap();
        reconciler.consumer_grant("SKATA", "User:p", true, false).await;

        assert_eq!(rbac.bindings().await.len(), 1);
        assert_eq!(reconciler.failed().len(), 1);
        assert!(reconciler.failed()[0]
            .reason
            .contains("schema-registry-cluster"));
    }
}
