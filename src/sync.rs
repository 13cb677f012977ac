//! One reconciliation pass
//!
//! Runs the reconcilers in order (topics, schemas, role bindings) against a
//! set of remote collaborators. Every resource is parsed from the desired
//! state before the first remote call, so invalid input never leaves the
//! cluster half-changed.

use crate::config::{Config, LookupFailurePolicy};
use crate::error::Result;
use crate::loader::DesiredState;
use crate::reconcilers::{ClusterIds, RoleBindingReconciler, SchemaReconciler, TopicReconciler};
use crate::remote::{
    KafkaAdmin, MdsClient, RbacService, RegistryClient, SchemaRegistry, TopicAdmin,
};
use crate::report::Report;
use std::sync::Arc;
use tracing::{info, warn};

/// The three remote systems a pass talks to
#[derive(Clone)]
pub struct Remotes {
    pub admin: Arc<dyn TopicAdmin>,
    pub registry: Arc<dyn SchemaRegistry>,
    pub rbac: Arc<dyn RbacService>,
}

impl Remotes {
    /// Build network clients from the `connections` section
    pub fn connect(config: &Config) -> Result<Self> {
        Ok(Self {
            admin: Arc::new(KafkaAdmin::new(&config.kafka)?),
            registry: Arc::new(RegistryClient::new(&config.schema_registry)?),
            rbac: Arc::new(MdsClient::new(&config.mds)?),
        })
    }
}

/// Knobs of one pass
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
    pub respect_existing_config: bool,
    pub lookup_failure_policy: LookupFailurePolicy,
    pub cluster_ids: ClusterIds,
}

impl SyncOptions {
    pub fn from_config(config: &Config, dry_run: bool) -> Self {
        Self {
            dry_run,
            respect_existing_config: config.settings.respect_existing_config,
            lookup_failure_policy: config.settings.schema_lookup_failure,
            cluster_ids: ClusterIds::from(&config.mds),
        }
    }
}

/// Reconcile `desired` against `remotes`.
///
/// Returns the combined outcomes. An `Err` means the pass stopped before or
/// while reading remote state; per-resource failures are in the report.
pub async fn sync(desired: &DesiredState, remotes: &Remotes, options: &SyncOptions) -> Result<Report> {
    let topics = desired.topics()?;
    let schemas = desired.schemas()?;
    let clients = desired.clients()?;
    info!(
        "Desired state: {} topic(s), {} schema(s), {} client(s){}",
        topics.len(),
        schemas.len(),
        clients.len(),
        if options.dry_run { " (dry run)" } else { "" }
    );

    let mut topic_reconciler = TopicReconciler::new(remotes.admin.clone())
        .respect_existing_config(options.respect_existing_config);
    let topic_result = topic_reconciler
        .reconcile_topics(&topics, options.dry_run)
        .await?;
    if !topic_result.failed.is_empty() {
        warn!("{} topic(s) could not be created", topic_result.failed.len());
    }

    let mut schema_reconciler = SchemaReconciler::new(remotes.registry.clone())
        .await?
        .lookup_failure_policy(options.lookup_failure_policy);
    let schema_result = schema_reconciler.reconcile(&schemas, options.dry_run).await;
    if !schema_result.failed.is_empty() {
        warn!("{} schema(s) could not be registered", schema_result.failed.len());
    }

    let mut binding_reconciler =
        RoleBindingReconciler::new(remotes.rbac.clone(), options.cluster_ids.clone()).await?;
    binding_reconciler.reconcile_roles(&clients, options.dry_run).await;
    if !binding_reconciler.failed().is_empty() {
        warn!(
            "{} role binding(s) could not be created",
            binding_reconciler.failed().len()
        );
    }

    let failed_bindings = binding_reconciler.failed().to_vec();
    Ok(Report::new(
        topic_reconciler.into_plan(),
        schema_reconciler.into_plan(),
        binding_reconciler.into_plan(),
        failed_bindings,
    ))
}
