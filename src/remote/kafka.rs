//! Broker admin client backed by librdkafka

use super::{NewTopicRequest, TopicAdmin, TopicResult};
use crate::error::{KafkaloError, Result};
use async_trait::async_trait;
use rdkafka::admin::{
    AdminClient, AdminOptions, AlterConfig, NewTopic, ResourceSpecifier, TopicReplication,
};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Timeout for topic metadata requests
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for create-topics requests
pub const CREATE_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for describe-configs requests
pub const DESCRIBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for alter-configs requests
pub const ALTER_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for delete-topics requests
pub const DELETE_TIMEOUT: Duration = Duration::from_secs(30);

/// `TopicAdmin` over an rdkafka `AdminClient`
pub struct KafkaAdmin {
    admin: Arc<AdminClient<DefaultClientContext>>,
}

impl KafkaAdmin {
    /// Build an admin client from librdkafka properties (`bootstrap.servers`, SASL, ...)
    pub fn new(properties: &BTreeMap<String, String>) -> Result<Self> {
        let mut config = ClientConfig::new();
        for (key, value) in properties {
            config.set(key, value);
        }
        let admin = config
            .create()
            .map_err(|e| KafkaloError::Kafka(format!("Failed to create admin client: {}", e)))?;
        Ok(Self {
            admin: Arc::new(admin),
        })
    }
}

#[async_trait]
impl TopicAdmin for KafkaAdmin {
    async fn list_topics(&self) -> Result<Vec<String>> {
        // fetch_metadata blocks; keep it off the runtime's worker threads
        let admin = Arc::clone(&self.admin);
        let topics = tokio::task::spawn_blocking(move || {
            admin
                .inner()
                .fetch_metadata(None, METADATA_TIMEOUT)
                .map(|metadata| {
                    metadata
                        .topics()
                        .iter()
                        .map(|t| t.name().to_string())
                        .collect::<Vec<String>>()
                })
        })
        .await
        .map_err(|e| KafkaloError::Kafka(format!("Metadata request did not complete: {}", e)))??;
        debug!("Cluster reports {} topic(s)", topics.len());
        Ok(topics)
    }

    async fn create_topics(
        &self,
        topics: &[NewTopicRequest],
        validate_only: bool,
    ) -> Result<Vec<TopicResult>> {
        let new_topics: Vec<NewTopic<'_>> = topics
            .iter()
            .map(|t| {
                NewTopic::new(
                    &t.name,
                    t.partitions,
                    TopicReplication::Fixed(t.replication_factor),
                )
            })
            .collect();
        let opts = AdminOptions::new()
            .operation_timeout(Some(CREATE_TIMEOUT))
            .validate_only(validate_only);

        let results = self.admin.create_topics(new_topics.iter(), &opts).await?;
        Ok(results
            .into_iter()
            .map(|result| match result {
                Ok(name) => (name, Ok(())),
                Err((name, code)) => (name, Err(code.to_string())),
            })
            .collect())
    }

    async fn describe_topic_config(&self, topic: &str) -> Result<BTreeMap<String, String>> {
        let resource = ResourceSpecifier::Topic(topic);
        let opts = AdminOptions::new().request_timeout(Some(DESCRIBE_TIMEOUT));

        let mut results = self.admin.describe_configs([&resource], &opts).await?;
        if results.len() != 1 {
            return Err(KafkaloError::Kafka(format!(
                "describe_configs for topic {} did not return a single response",
                topic
            )));
        }
        match results.remove(0) {
            Ok(config) => Ok(config
                .entries
                .into_iter()
                .filter_map(|entry| entry.value.map(|value| (entry.name, value)))
                .collect()),
            Err(code) => Err(KafkaloError::Kafka(format!(
                "Failed to describe config for topic {}: {}",
                topic, code
            ))),
        }
    }

    async fn alter_topic_config(
        &self,
        topic: &str,
        configs: &BTreeMap<String, String>,
        validate_only: bool,
    ) -> Result<()> {
        let mut alter = AlterConfig::new(ResourceSpecifier::Topic(topic));
        for (key, value) in configs {
            alter = alter.set(key, value);
        }
        let opts = AdminOptions::new()
            .request_timeout(Some(ALTER_TIMEOUT))
            .validate_only(validate_only);

        let results = self.admin.alter_configs([&alter], &opts).await?;
        for result in results {
            if let Err((_, code)) = result {
                return Err(KafkaloError::Kafka(format!(
                    "Failed to alter config for topic {}: {}",
                    topic, code
                )));
            }
        }
        Ok(())
    }

    async fn delete_topics(&self, topics: &[String]) -> Result<Vec<TopicResult>> {
        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        let opts = AdminOptions::new().operation_timeout(Some(DELETE_TIMEOUT));

        let results = self.admin.delete_topics(&names, &opts).await?;
        Ok(results
            .into_iter()
            .map(|result| match result {
                Ok(name) => (name, Ok(())),
                Err((name, code)) => (name, Err(code.to_string())),
            })
            .collect())
    }
}
