//! Client model
//!
//! Built from a `clients` entry in a desired-state document:
//!
//! ```yaml
//! clients:
//!   - principal: User:poutanaola
//!     consumer_for:
//!       - topic: SKATA.VROMIA.POLY
//!     producer_for:
//!       - topic: SKATA.VROMIA.POLY
//!         strict: true
//!     groups:
//!       - name: consumer-group-
//!         roles: ["DeveloperRead"]
//! ```

use crate::error::{KafkaloError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role bound on a group when no explicit roles are declared
pub const DEFAULT_GROUP_ROLE: &str = "DeveloperRead";

/// Kind part of a principal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PrincipalKind {
    User,
    Group,
}

/// A `<Kind>:<name>` principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub kind: PrincipalKind,
    pub name: String,
}

impl FromStr for Principal {
    type Err = KafkaloError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            KafkaloError::InvalidResource(format!(
                "Principal {} not in the form User/Group:<name>",
                s
            ))
        };
        let (kind, name) = s.split_once(':').ok_or_else(invalid)?;
        let kind = match kind {
            "User" => PrincipalKind::User,
            "Group" => PrincipalKind::Group,
            _ => return Err(invalid()),
        };
        if name.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            kind,
            name: name.to_string(),
        })
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            PrincipalKind::User => "User",
            PrincipalKind::Group => "Group",
        };
        write!(f, "{}:{}", kind, self.name)
    }
}

impl Serialize for Principal {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A consumer, producer or resource-owner grant on a topic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicGrant {
    pub topic: String,

    #[serde(default = "default_prefixed")]
    pub prefixed: bool,

    /// Producer only: read-only access to the topic's subjects
    #[serde(default)]
    pub strict: bool,
}

/// A consumer-group grant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupGrant {
    pub name: String,

    #[serde(default = "default_prefixed")]
    pub prefixed: bool,

    #[serde(default = "default_group_roles")]
    pub roles: Vec<String>,
}

/// A principal together with its declared grants
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Client {
    pub principal: Principal,
    pub consumer_for: Vec<TopicGrant>,
    pub producer_for: Vec<TopicGrant>,
    pub resourceowner_for: Vec<TopicGrant>,
    pub groups: Vec<GroupGrant>,
}

#[derive(Debug, Deserialize)]
struct ClientDocument {
    principal: String,
    #[serde(default)]
    consumer_for: Option<Vec<TopicGrant>>,
    #[serde(default)]
    producer_for: Option<Vec<TopicGrant>>,
    #[serde(default)]
    resourceowner_for: Option<Vec<TopicGrant>>,
    #[serde(default)]
    groups: Option<Vec<GroupGrant>>,
}

impl Client {
    /// Create a client with no grants. Fails on a malformed principal.
    pub fn new(principal: &str) -> Result<Self> {
        Ok(Self {
            principal: principal.parse()?,
            consumer_for: Vec::new(),
            producer_for: Vec::new(),
            resourceowner_for: Vec::new(),
            groups: Vec::new(),
        })
    }

    /// Build a client from one raw `clients` entry
    pub fn from_document(doc: &serde_yaml::Value) -> Result<Self> {
        let parsed: ClientDocument = serde_yaml::from_value(doc.clone())
            .map_err(|e| KafkaloError::InvalidResource(format!("client {:?}: {}", doc, e)))?;
        let mut client = Self::new(&parsed.principal)?;
        client.consumer_for = parsed.consumer_for.unwrap_or_default();
        client.producer_for = parsed.producer_for.unwrap_or_default();
        client.resourceowner_for = parsed.resourceowner_for.unwrap_or_default();
        client.groups = parsed.groups.unwrap_or_default();
        Ok(client)
    }

    /// True when the client declares no grants at all
    pub fn is_empty(&self) -> bool {
        self.consumer_for.is_empty()
            && self.producer_for.is_empty()
            && self.resourceowner_for.is_empty()
            && self.groups.is_empty()
    }
}

fn default_prefixed() -> bool {
    true
}

fn default_group_roles() -> Vec<String> {
    vec![DEFAULT_GROUP_ROLE.to_string()]
}
