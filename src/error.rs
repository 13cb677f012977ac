//! Error types for kafkalo

use std::fmt;

/// Result type alias for kafkalo operations
pub type Result<T> = std::result::Result<T, KafkaloError>;

/// Errors that can occur while loading desired state or talking to remote systems
#[derive(Debug)]
pub enum KafkaloError {
    /// Configuration document is missing or malformed
    Configuration(String),
    /// The same resource definition was declared in more than one place
    DuplicateResource(String),
    /// A resource document could not be turned into a model
    InvalidResource(String),
    /// A referenced schema file could not be resolved or read
    SchemaFile(String),
    /// Broker admin error
    Kafka(String),
    /// Schema registry error
    Registry(String),
    /// HTTP client error (RBAC metadata service)
    Http(String),
    /// Serialization error
    Serialization(String),
    /// Local I/O error
    Io(String),
}

impl KafkaloError {
    /// Whether this error aborts the run before any remote mutation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KafkaloError::Configuration(_)
                | KafkaloError::DuplicateResource(_)
                | KafkaloError::InvalidResource(_)
                | KafkaloError::SchemaFile(_)
        )
    }
}

impl fmt::Display for KafkaloError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KafkaloError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            KafkaloError::DuplicateResource(msg) => write!(f, "Duplicate resource: {}", msg),
            KafkaloError::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            KafkaloError::SchemaFile(msg) => write!(f, "Schema file error: {}", msg),
            KafkaloError::Kafka(msg) => write!(f, "Kafka error: {}", msg),
            KafkaloError::Registry(msg) => write!(f, "Schema registry error: {}", msg),
            KafkaloError::Http(msg) => write!(f, "HTTP error: {}", msg),
            KafkaloError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            KafkaloError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for KafkaloError {}

impl From<rdkafka::error::KafkaError> for KafkaloError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        KafkaloError::Kafka(err.to_string())
    }
}

impl From<reqwest::Error> for KafkaloError {
    fn from(err: reqwest::Error) -> Self {
        KafkaloError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for KafkaloError {
    fn from(err: serde_json::Error) -> Self {
        KafkaloError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for KafkaloError {
    fn from(err: serde_yaml::Error) -> Self {
        KafkaloError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for KafkaloError {
    fn from(err: std::io::Error) -> Self {
        KafkaloError::Io(err.to_string())
    }
}
