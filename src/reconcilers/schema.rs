//! Schema Reconciler
//!
//! Registers declared schemas whose exact content is not yet stored under
//! their subject and brings per-subject compatibility levels in line.
//!
//! Compatibility is set before and again after registration: a relaxed level
//! has to be in place before the registry validates the new version, and
//! some registries only accept a per-subject level once the subject exists.

use crate::config::LookupFailurePolicy;
use crate::error::Result;
use crate::model::{normalize_compatibility, Schema};
use crate::plan::{CompatibilityChange, Outcome, SchemaOutcome, SchemaPlan};
use crate::remote::{SchemaLookup, SchemaRegistry};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Subjects registered and subjects that failed during one pass
#[derive(Debug, Clone, Default)]
pub struct SchemaReconcileResult {
    pub registered: Vec<String>,
    pub failed: BTreeMap<String, String>,
}

/// Reconciles declared schemas against one schema registry.
///
/// The subject list and the global compatibility level are read once, when
/// the reconciler is created, and are not refreshed afterwards.
pub struct SchemaReconciler {
    registry: Arc<dyn SchemaRegistry>,
    subject_cache: BTreeSet<String>,
    global_compatibility: String,
    lookup_failure_policy: LookupFailurePolicy,
    plan: SchemaPlan,
}

impl SchemaReconciler {
    /// Create a reconciler, fetching the subject list and global compatibility
    pub async fn new(registry: Arc<dyn SchemaRegistry>) -> Result<Self> {
        let subjects = registry.list_subjects().await?;
        let global_compatibility = normalize_compatibility(&registry.global_compatibility().await?);
        info!(
            "Schema registry holds {} subject(s), global compatibility {}",
            subjects.len(),
            global_compatibility
        );
        Ok(Self {
            registry,
            subject_cache: subjects.into_iter().collect(),
            global_compatibility,
            lookup_failure_policy: LookupFailurePolicy::default(),
            plan: SchemaPlan::new(),
        })
    }

    /// How to treat lookups that fail for reasons other than "not found"
    pub fn lookup_failure_policy(mut self, policy: LookupFailurePolicy) -> Self {
        self.lookup_failure_policy = policy;
        self
    }

    pub fn subject_cache(&self) -> &BTreeSet<String> {
        &self.subject_cache
    }

    pub fn global_compatibility(&self) -> &str {
        &self.global_compatibility
    }

    /// Outcomes recorded so far, keyed by subject name
    pub fn plan(&self) -> &SchemaPlan {
        &self.plan
    }

    pub fn into_plan(self) -> SchemaPlan {
        self.plan
    }

    /// Schemas whose exact content is not registered under their subject
    pub async fn subjects_needing_update<'a>(&mut self, desired: &'a [Schema]) -> Vec<&'a Schema> {
        let mut missing = Vec::new();
        for schema in desired {
            match self.registry.lookup_schema(&schema.subject_name, schema).await {
                SchemaLookup::Found(found) => {
                    debug!(
                        "Subject {} already holds this schema (id {}, version {})",
                        found.subject, found.id, found.version
                    );
                }
                SchemaLookup::NotFound => missing.push(schema),
                SchemaLookup::TransientError(reason) | SchemaLookup::PermanentError(reason) => {
                    match self.lookup_failure_policy {
                        LookupFailurePolicy::Register => {
                            warn!(
                                "Lookup of {} failed, registering anyway: {}",
                                schema.subject_name, reason
                            );
                            missing.push(schema);
                        }
                        LookupFailurePolicy::Skip => {
                            error!("Lookup of {} failed, skipping: {}", schema.subject_name, reason);
                            self.outcome(schema).registration =
                                Outcome::failed(format!("lookup failed: {}", reason));
                        }
                    }
                }
            }
        }
        missing
    }

    /// Register every schema that needs it and reconcile compatibility levels.
    ///
    /// Per-subject failures are recorded in the plan and never abort the pass.
    pub async fn reconcile(&mut self, desired: &[Schema], dry_run: bool) -> SchemaReconcileResult {
        for schema in desired {
            self.plan
                .insert(schema.subject_name.clone(), SchemaOutcome::new(schema.clone()));
        }

        let needing_update = self.subjects_needing_update(desired).await;
        info!(
            "{} of {} declared subject(s) need registration",
            needing_update.len(),
            desired.len()
        );
        let pending: BTreeSet<&str> = needing_update
            .iter()
            .map(|s| s.subject_name.as_str())
            .collect();

        let mut result = SchemaReconcileResult::default();
        for schema in needing_update {
            self.set_compatibility(schema, dry_run).await;
            match self.register(schema, dry_run).await {
                Ok(true) => result.registered.push(schema.subject_name.clone()),
                Ok(false) => {}
                Err(reason) => {
                    result.failed.insert(schema.subject_name.clone(), reason);
                }
            }
            self.set_compatibility(schema, dry_run).await;
        }

        for schema in desired {
            if pending.contains(schema.subject_name.as_str()) {
                continue;
            }
            if self.outcome(schema).registration.is_failed() {
                continue;
            }
            self.set_compatibility(schema, dry_run).await;
        }

        result
    }

    /// Register one schema. Returns whether the registry was actually called
    /// successfully; dry runs only record the would-be status.
    async fn register(&mut self, schema: &Schema, dry_run: bool) -> std::result::Result<bool, String> {
        let status = if self.subject_cache.contains(&schema.subject_name) {
            Outcome::Updated
        } else {
            Outcome::Created
        };

        if dry_run {
            info!("Schema for {} would be {}", schema.subject_name, status.label());
            self.outcome(schema).registration = status;
            return Ok(false);
        }

        match self.registry.register_schema(&schema.subject_name, schema).await {
            Ok(id) => {
                info!("Registered schema for {} with id {}", schema.subject_name, id);
                self.outcome(schema).registration = status;
                Ok(true)
            }
            Err(e) => {
                error!("Error registering schema for {}: {}", schema.subject_name, e);
                let reason = e.to_string();
                self.outcome(schema).registration = Outcome::failed(reason.clone());
                Err(reason)
            }
        }
    }

    /// Level the registry currently applies to `subject`
    async fn current_compatibility(&self, subject: &str) -> String {
        match self.registry.subject_compatibility(subject).await {
            Ok(Some(level)) => normalize_compatibility(&level),
            Ok(None) => self.global_compatibility.clone(),
            Err(e) => {
                debug!("No compatibility for {}, using global default: {}", subject, e);
                self.global_compatibility.clone()
            }
        }
    }

    /// Set the declared compatibility of one subject if it differs from the
    /// registry's current level. Does nothing when none is declared.
    pub async fn set_compatibility(&mut self, schema: &Schema, dry_run: bool) {
        let Some(desired) = schema.compatibility.as_deref() else {
            return;
        };
        let current = self.current_compatibility(&schema.subject_name).await;
        if current == desired {
            debug!("Compatibility of {} already {}", schema.subject_name, desired);
            return;
        }

        info!(
            "Compatibility of {} changes from {} to {}",
            schema.subject_name, current, desired
        );
        let change = CompatibilityChange {
            before: current,
            after: desired.to_string(),
        };
        if dry_run {
            self.outcome(schema).compatibility = Some(change);
            return;
        }

        match self.registry.set_compatibility(&schema.subject_name, desired).await {
            Ok(()) => {
                let outcome = self.outcome(schema);
                outcome.compatibility = Some(change);
                outcome.compatibility_error = None;
            }
            Err(e) => {
                warn!(
                    "Failed to set compatibility to {} for {}: {}",
                    desired, schema.subject_name, e
                );
                self.outcome(schema).compatibility_error = Some(e.to_string());
            }
        }
    }

    fn outcome(&mut self, schema: &Schema) -> &mut SchemaOutcome {
        self.plan
            .entry(schema.subject_name.clone())
            .or_insert_with(|| SchemaOutcome::new(schema.clone()))
    }
}
