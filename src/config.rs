//! Top-level configuration document
//!
//! ```yaml
//! connections:
//!   kafka:
//!     bootstrap.servers: "localhost:9093"
//!   schemaregistry:
//!     url: "http://localhost:8081"
//!     basic.auth.user.info: "user:password"
//!   mds:
//!     url: "http://localhost:8090"
//!     username: "username"
//!     password: "password"
//!     schema-registry-cluster-id: "schemaregistry"
//! kafkalo:
//!   input_dirs:
//!     - "data/*.yaml"
//! ```

use crate::error::{KafkaloError, Result};
use crate::model::scalar_to_string;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Validated configuration: all three connection sections are present.
#[derive(Debug, Clone)]
pub struct Config {
    pub kafka: BTreeMap<String, String>,
    pub schema_registry: RegistryConnection,
    pub mds: MdsConnection,
    pub settings: KafkaloSettings,
}

/// Schema registry connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConnection {
    pub url: String,

    /// `user:password` pair for basic authentication
    #[serde(default, rename = "basic.auth.user.info")]
    pub basic_auth_user_info: Option<String>,
}

impl RegistryConnection {
    /// Split `basic.auth.user.info` into username and password
    pub fn credentials(&self) -> Option<(String, String)> {
        let info = self.basic_auth_user_info.as_deref()?;
        let (user, password) = info.split_once(':')?;
        Some((user.to_string(), password.to_string()))
    }
}

/// RBAC metadata service connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdsConnection {
    pub url: String,
    pub username: String,
    pub password: String,

    #[serde(default, rename = "schema-registry-cluster-id")]
    pub schema_registry_cluster_id: Option<String>,

    #[serde(default, rename = "connect-cluster-id")]
    pub connect_cluster_id: Option<String>,

    #[serde(default, rename = "ksql-cluster-id")]
    pub ksql_cluster_id: Option<String>,
}

/// What the schema reconciler does when a content lookup fails with
/// something other than "not registered".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LookupFailurePolicy {
    /// Queue the subject for registration anyway
    #[default]
    Register,
    /// Leave the subject alone and record the lookup error
    Skip,
}

/// The optional `kafkalo` section
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KafkaloSettings {
    /// Glob patterns of desired-state documents
    #[serde(default)]
    pub input_dirs: Vec<String>,

    #[serde(default)]
    pub schema_lookup_failure: LookupFailurePolicy,

    /// Resubmit live topic config alongside the desired keys on alter
    #[serde(default)]
    pub respect_existing_config: bool,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    connections: Option<RawConnections>,
    #[serde(default)]
    kafkalo: Option<KafkaloSettings>,
}

#[derive(Debug, Deserialize)]
struct RawConnections {
    #[serde(default)]
    kafka: Option<BTreeMap<String, serde_yaml::Value>>,
    #[serde(default)]
    schemaregistry: Option<RegistryConnection>,
    #[serde(default)]
    mds: Option<MdsConnection>,
}

impl Config {
    /// Read and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            KafkaloError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    /// Parse and validate a configuration document
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(text)
            .map_err(|e| KafkaloError::Configuration(e.to_string()))?;

        let connections = raw
            .connections
            .ok_or_else(|| KafkaloError::Configuration("connections key missing".to_string()))?;

        let kafka = match connections.kafka {
            Some(props) if !props.is_empty() => props
                .iter()
                .filter_map(|(k, v)| scalar_to_string(v).map(|v| (k.clone(), v)))
                .collect(),
            _ => {
                return Err(KafkaloError::Configuration(
                    "connections.kafka key missing".to_string(),
                ))
            }
        };
        let schema_registry = connections.schemaregistry.ok_or_else(|| {
            KafkaloError::Configuration("connections.schemaregistry key missing".to_string())
        })?;
        let mds = connections
            .mds
            .ok_or_else(|| KafkaloError::Configuration("connections.mds key missing".to_string()))?;

        Ok(Self {
            kafka,
            schema_registry,
            mds,
            settings: raw.kafkalo.unwrap_or_default(),
        })
    }

    /// Glob patterns for the desired-state loader
    pub fn input_patterns(&self) -> &[String] {
        &self.settings.input_dirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
connections:
  kafka:
    bootstrap.servers: "localhost:9093"
    group.id: "kafkalo_consumer"
    socket.timeout.ms: 1000
  schemaregistry:
    url: "http://localhost:8081"
    basic.auth.user.info: "user:password"
  mds:
    url: "http://localhost:8090"
    username: "username"
    password: "password"
    schema-registry-cluster-id: "schemaregistry"
kafkalo:
  input_dirs:
    - "data/*.yaml"
  schema_lookup_failure: skip
"#;

    #[test]
    fn test_config_load() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.kafka["bootstrap.servers"], "localhost:9093");
        assert_eq!(config.kafka["group.id"], "kafkalo_consumer");
        assert_eq!(config.kafka["socket.timeout.ms"], "1000");
        assert_eq!(config.input_patterns(), &["data/*.yaml".to_string()]);
        assert_eq!(
            config.settings.schema_lookup_failure,
            LookupFailurePolicy::Skip
        );
        assert!(!config.settings.respect_existing_config);
    }

    #[test]
    fn test_get_sr_config() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.schema_registry.url, "http://localhost:8081");
        assert_eq!(
            config.schema_registry.credentials(),
            Some(("user".to_string(), "password".to_string()))
        );
    }

    #[test]
    fn test_get_mds_config() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.mds.url, "http://localhost:8090");
        assert_eq!(config.mds.username, "username");
        assert_eq!(
            config.mds.schema_registry_cluster_id.as_deref(),
            Some("schemaregistry")
        );
        assert!(config.mds.connect_cluster_id.is_none());
    }

    #[test]
    fn test_missing_sections_are_fatal() {
        let err = Config::parse("other: 1").unwrap_err();
        assert!(err.to_string().contains("connections key missing"));

        let no_kafka = r#"
connections:
  schemaregistry: { url: "http://sr" }
  mds: { url: "http://mds", username: u, password: p }
"#;
        let err = Config::parse(no_kafka).unwrap_err();
        assert!(err.to_string().contains("connections.kafka"));

        let no_sr = r#"
connections:
  kafka: { bootstrap.servers: "b:9092" }
  mds: { url: "http://mds", username: u, password: p }
"#;
        let err = Config::parse(no_sr).unwrap_err();
        assert!(err.to_string().contains("connections.schemaregistry"));

        let no_mds = r#"
connections:
  kafka: { bootstrap.servers: "b:9092" }
  schemaregistry: { url: "http://sr" }
"#;
        let err = Config::parse(no_mds).unwrap_err();
        assert!(err.to_string().contains("connections.mds"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_input_dirs_default_empty() {
        let minimal = r#"
connections:
  kafka: { bootstrap.servers: "b:9092" }
  schemaregistry: { url: "http://sr" }
  mds: { url: "http://mds", username: u, password: p }
"#;
        let config = Config::parse(minimal).unwrap();
        assert!(config.input_patterns().is_empty());
        assert!(config.schema_registry.credentials().is_none());
        assert_eq!(
            config.settings.schema_lookup_failure,
            LookupFailurePolicy::Register
        );
    }
}
