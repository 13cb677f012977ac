//! Topic Reconciler
//!
//! Creates declared topics that are missing from the cluster, then brings
//! the config overrides of every declared topic in line with the desired
//! state. Dry runs send the same requests in validate-only mode.

use crate::error::Result;
use crate::model::Topic;
use crate::plan::{config_diff, Step, TopicOutcome, TopicPlan};
use crate::remote::{NewTopicRequest, TopicAdmin};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Keys the broker reports in a topic's config but rejects when sent back
pub const BANNED_CONFIG_KEYS: &[&str] = &[
    "confluent.ssl.truststore.password",
    "confluent.ssl.truststore.location",
];

/// A topic whose creation was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTopic {
    pub topic: Topic,
    pub reason: String,
}

/// Disjoint sets of created and failed topics from one pass
#[derive(Debug, Clone, Default)]
pub struct TopicReconcileResult {
    pub created: BTreeMap<String, Topic>,
    pub failed: BTreeMap<String, FailedTopic>,
}

/// Reconciles declared topics against one cluster
pub struct TopicReconciler {
    admin: Arc<dyn TopicAdmin>,
    topics_cache: BTreeSet<String>,
    respect_existing_config: bool,
    plan: TopicPlan,
}

impl TopicReconciler {
    /// Create a new topic reconciler
    pub fn new(admin: Arc<dyn TopicAdmin>) -> Self {
        Self {
            admin,
            topics_cache: BTreeSet::new(),
            respect_existing_config: false,
            plan: TopicPlan::new(),
        }
    }

    /// Resubmit live config keys that the desired state does not mention
    pub fn respect_existing_config(mut self, respect: bool) -> Self {
        self.respect_existing_config = respect;
        self
    }

    /// Fetch current topic names and refresh the name cache
    pub async fn list_current_topics(&mut self) -> Result<&BTreeSet<String>> {
        let names = self.admin.list_topics().await?;
        self.topics_cache = names.into_iter().collect();
        Ok(&self.topics_cache)
    }

    /// Outcomes recorded so far, keyed by topic name
    pub fn plan(&self) -> &TopicPlan {
        &self.plan
    }

    pub fn into_plan(self) -> TopicPlan {
        self.plan
    }

    /// Create missing topics, then alter configs of every topic that exists
    /// or was just created.
    ///
    /// Only the initial topic listing can fail the call; every per-topic
    /// failure is recorded in the plan.
    pub async fn reconcile_topics(
        &mut self,
        desired: &[Topic],
        dry_run: bool,
    ) -> Result<TopicReconcileResult> {
        self.list_current_topics().await?;

        for topic in desired {
            self.plan
                .insert(topic.name.clone(), TopicOutcome::new(topic.clone()));
        }

        let missing: Vec<&Topic> = desired
            .iter()
            .filter(|t| !self.topics_cache.contains(&t.name))
            .collect();
        info!(
            "{} of {} declared topic(s) missing from the cluster",
            missing.len(),
            desired.len()
        );

        let result = self.create_topics(&missing, dry_run).await;

        for topic in desired {
            if result.failed.contains_key(&topic.name) {
                continue;
            }
            if topic.configs.is_empty() {
                continue;
            }
            let exists = self.topics_cache.contains(&topic.name);
            self.alter_config_for_topic(topic, exists, dry_run).await;
        }

        Ok(result)
    }

    /// Create `topics` in one batched request
    pub async fn create_topics(&mut self, topics: &[&Topic], dry_run: bool) -> TopicReconcileResult {
        let mut result = TopicReconcileResult::default();
        if topics.is_empty() {
            return result;
        }

        let by_name: BTreeMap<&str, &Topic> = topics.iter().map(|t| (t.name.as_str(), *t)).collect();
        let requests: Vec<NewTopicRequest> = topics
            .iter()
            .map(|t| NewTopicRequest {
                name: t.name.clone(),
                partitions: t.partitions,
                replication_factor: t.replication_factor,
            })
            .collect();

        let responses = match self.admin.create_topics(&requests, dry_run).await {
            Ok(responses) => responses,
            Err(e) => {
                error!("Create topics request failed: {}", e);
                requests
                    .iter()
                    .map(|r| (r.name.clone(), Err(e.to_string())))
                    .collect()
            }
        };

        for (name, response) in responses {
            let Some(topic) = by_name.get(name.as_str()) else {
                warn!("Broker answered for undeclared topic {}", name);
                continue;
            };
            match &response {
                Ok(()) if dry_run => info!("Topic {} would be created", name),
                Ok(()) => info!("Created topic {}", name),
                Err(reason) => error!("Failed to create topic {}: {}", name, reason),
            }
            let step = Step::from_result(response.clone());
            self.outcome(topic).create = Some(step);
            match response {
                Ok(()) => {
                    result.created.insert(name, (*topic).clone());
                }
                Err(reason) => {
                    result.failed.insert(
                        name,
                        FailedTopic {
                            topic: (*topic).clone(),
                            reason,
                        },
                    );
                }
            }
        }

        result
    }

    /// Diff and alter the config of one topic.
    ///
    /// `exists` is false for a topic that only passed validation in a dry
    /// run: its delta is computed against an empty config and no alter
    /// request is sent.
    async fn alter_config_for_topic(&mut self, topic: &Topic, exists: bool, dry_run: bool) {
        let live = if exists || !dry_run {
            match self.admin.describe_topic_config(&topic.name).await {
                Ok(configs) => configs,
                Err(e) => {
                    warn!("Failed to describe config for {}: {}", topic.name, e);
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        let live = sanitize_topic_config(live);
        let desired = sanitize_topic_config(topic.configs.clone());

        let delta = config_diff(&live, &desired);
        let respect_existing_config = self.respect_existing_config;
        let outcome = self.outcome(topic);
        outcome.config_delta = delta;

        if outcome.config_delta.is_empty() {
            debug!("Config of topic {} is up to date", topic.name);
            return;
        }
        if !exists && dry_run {
            return;
        }

        let mut submitted = if respect_existing_config {
            live
        } else {
            BTreeMap::new()
        };
        submitted.extend(desired);

        let response = self
            .admin
            .alter_topic_config(&topic.name, &submitted, dry_run)
            .await;
        match &response {
            Ok(()) if dry_run => info!("Config of topic {} validated", topic.name),
            Ok(()) => info!("Altered config of topic {}", topic.name),
            Err(e) => error!("Failed to alter config of topic {}: {}", topic.name, e),
        }
        self.outcome(topic).alter = Some(Step::from_result(response));
    }

    fn outcome(&mut self, topic: &Topic) -> &mut TopicOutcome {
        self.plan
            .entry(topic.name.clone())
            .or_insert_with(|| TopicOutcome::new(topic.clone()))
    }
}

/// Drop keys that must never be diffed or submitted
pub fn sanitize_topic_config(mut config: BTreeMap<String, String>) -> BTreeMap<String, String> {
    for key in BANNED_CONFIG_KEYS {
        config.remove(*key);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ConfigChange, Outcome};
    use crate::remote::memory::MemoryTopicAdmin;

    fn sample_topic() -> Topic {
        Topic::new("SKATA.VROMIA.POLY", 6, 1).with_config("cleanup.policy", "delete")
    }

    #[tokio::test]
    async fn test_create_missing_topic() {
        let admin = Arc::new(MemoryTopicAdmin::new());
        let mut reconciler = TopicReconciler::new(admin.clone());

        let result = reconciler
            .reconcile_topics(&[sample_topic()], false)
            .await
            .unwrap();
        assert!(result.created.contains_key("SKATA.VROMIA.POLY"));
        assert!(result.failed.is_empty());

        let outcome = &reconciler.plan()["SKATA.VROMIA.POLY"];
        assert_eq!(outcome.create, Some(Step::Success));
        assert_eq!(outcome.alter, Some(Step::Success));
        assert_eq!(outcome.status(), Outcome::Created);

        let live = admin.topic("SKATA.VROMIA.POLY").await.unwrap();
        assert_eq!(live.partitions, 6);
        assert_eq!(live.configs["cleanup.policy"], "delete");
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let admin = Arc::new(MemoryTopicAdmin::new());
        let topics = vec![sample_topic(), Topic::new("plain", 1, 1)];

        let mut first = TopicReconciler::new(admin.clone());
        first.reconcile_topics(&topics, false).await.unwrap();
        assert_eq!(admin.create_attempts().await, 2);
        let alters = admin.alter_attempts().await;

        let mut second = TopicReconciler::new(admin.clone());
        let result = second.reconcile_topics(&topics, false).await.unwrap();
        assert!(result.created.is_empty());
        assert!(result.failed.is_empty());
        assert_eq!(admin.create_attempts().await, 2);
        assert_eq!(admin.alter_attempts().await, alters);
        for outcome in second.plan().values() {
            assert!(outcome.config_delta.is_empty());
            assert_eq!(outcome.status(), Outcome::Unchanged);
        }
    }

    #[tokio::test]
    async fn test_failed_create_skips_config() {
        let admin = Arc::new(
            MemoryTopicAdmin::new().fail_create("SKATA.VROMIA.POLY", "Invalid replication factor"),
        );
        let mut reconciler = TopicReconciler::new(admin.clone());
        let other = Topic::new("other", 1, 1).with_config("retention.ms", "100");

        let result = reconciler
            .reconcile_topics(&[sample_topic(), other], false)
            .await
            .unwrap();
        assert_eq!(result.failed["SKATA.VROMIA.POLY"].reason, "Invalid replication factor");
        assert!(result.created.contains_key("other"));

        let failed = &reconciler.plan()["SKATA.VROMIA.POLY"];
        assert!(failed.alter.is_none());
        assert!(failed.status().is_failed());
        assert_eq!(reconciler.plan()["other"].alter, Some(Step::Success));
        // one alter, for "other" only
        assert_eq!(admin.alter_attempts().await, 1);
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let admin = Arc::new(
            MemoryTopicAdmin::new().with_topic("existing", 3, &[("retention.ms", "100")]),
        );
        let mut reconciler = TopicReconciler::new(admin.clone());
        let existing = Topic::new("existing", 3, 1).with_config("retention.ms", "1");

        let result = reconciler
            .reconcile_topics(&[sample_topic(), existing], true)
            .await
            .unwrap();
        assert!(result.created.contains_key("SKATA.VROMIA.POLY"));
        assert!(admin.topic("SKATA.VROMIA.POLY").await.is_none());
        assert_eq!(admin.topic("existing").await.unwrap().configs["retention.ms"], "100");

        let new = &reconciler.plan()["SKATA.VROMIA.POLY"];
        assert_eq!(
            new.config_delta["cleanup.policy"],
            ConfigChange::Added("delete".to_string())
        );
        assert!(new.alter.is_none());

        let updated = &reconciler.plan()["existing"];
        assert_eq!(
            updated.config_delta["retention.ms"],
            ConfigChange::Changed {
                before: "100".to_string(),
                after: "1".to_string()
            }
        );
        assert_eq!(updated.alter, Some(Step::Success));
        assert_eq!(updated.status(), Outcome::Updated);
    }

    #[tokio::test]
    async fn test_banned_keys_are_filtered() {
        let admin = Arc::new(
            MemoryTopicAdmin::new()
                .with_topic("t", 1, &[("retention.ms", "100")])
                .with_injected_config("confluent.ssl.truststore.location", "/etc/ssl"),
        );
        let mut reconciler = TopicReconciler::new(admin.clone()).respect_existing_config(true);
        let topic = Topic::new("t", 1, 1)
            .with_config("retention.ms", "1")
            .with_config("confluent.ssl.truststore.password", "secret");

        reconciler.reconcile_topics(&[topic], false).await.unwrap();
        let outcome = &reconciler.plan()["t"];
        assert_eq!(outcome.config_delta.len(), 1);
        assert!(outcome.config_delta.contains_key("retention.ms"));
        assert_eq!(outcome.alter, Some(Step::Success));
        assert_eq!(admin.topic("t").await.unwrap().configs["retention.ms"], "1");
    }

    #[tokio::test]
    async fn test_alter_failure_is_recorded() {
        let admin = Arc::new(
            MemoryTopicAdmin::new()
                .with_topic("a", 1, &[])
                .with_topic("b", 1, &[])
                .fail_alter("a", "Policy violation"),
        );
        let mut reconciler = TopicReconciler::new(admin.clone());
        let topics = vec![
            Topic::new("a", 1, 1).with_config("retention.ms", "1"),
            Topic::new("b", 1, 1).with_config("retention.ms", "1"),
        ];
        reconciler.reconcile_topics(&topics, false).await.unwrap();
        assert_eq!(reconciler.plan()["a"].status(), Outcome::failed("Kafka error: Policy violation"));
        assert_eq!(reconciler.plan()["b"].status(), Outcome::Updated);
    }

    #[tokio::test]
    async fn test_unreachable_cluster_fails_listing() {
        let admin = Arc::new(MemoryTopicAdmin::new().unavailable());
        let mut reconciler = TopicReconciler::new(admin);
        assert!(reconciler.reconcile_topics(&[sample_topic()], false).await.is_err());
    }

    #[test]
    fn test_sanitize_topic_config() {
        let mut config = BTreeMap::new();
        config.insert("confluent.ssl.truststore.password".to_string(), "x".to_string());
        config.insert("retention.ms".to_string(), "1".to_string());
        let config = sanitize_topic_config(config);
        assert_eq!(config.len(), 1);
    }
}
