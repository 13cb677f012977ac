//! kafkalo
//!
//! Declarative reconciler for Kafka topics, schema registry subjects and
//! RBAC role bindings.
//!
//! ## Desired state
//!
//! - `topics`: name, partitions, replication factor, config overrides and
//!   optional key/value schemas
//! - `clients`: a principal with consumer, producer, resource-owner and
//!   consumer-group grants
//!
//! ## Example
//!
//! ```yaml
//! topics:
//!   - name: SKATA.VROMIA.POLY
//!     partitions: 6
//!     replication_factor: 1
//!     configs:
//!       cleanup.policy: delete
//!     value:
//!       schema: "schema-value.json"
//!       compatibility: BACKWARD
//! clients:
//!   - principal: User:poutanaola
//!     consumer_for:
//!       - topic: SKATA.VROMIA.POLY
//! ```

pub mod config;
pub mod error;
pub mod loader;
pub mod model;
pub mod plan;
pub mod reconcilers;
pub mod remote;
pub mod report;
pub mod sync;

pub use config::{Config, LookupFailurePolicy};
pub use error::{KafkaloError, Result};
pub use loader::DesiredState;
pub use model::{Client, Schema, Topic};
pub use reconcilers::{RoleBindingReconciler, SchemaReconciler, TopicReconciler};
pub use report::{OutputFormat, Report};
pub use sync::{sync, Remotes, SyncOptions};
