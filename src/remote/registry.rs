//! Confluent-compatible schema registry client

use super::{RegisteredSchema, SchemaLookup, SchemaRegistry};
use crate::config::RegistryConnection;
use crate::error::{KafkaloError, Result};
use crate::model::Schema;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ERROR_SUBJECT_NOT_FOUND: i64 = 40401;
const ERROR_SCHEMA_NOT_FOUND: i64 = 40403;
const ERROR_SUBJECT_COMPATIBILITY_NOT_CONFIGURED: i64 = 40408;

#[derive(Debug, Serialize)]
struct SchemaRequest<'a> {
    schema: &'a str,
    #[serde(rename = "schemaType")]
    schema_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterSchemaResponse {
    id: u32,
}

#[derive(Debug, Deserialize)]
struct ConfigResponse {
    #[serde(rename = "compatibilityLevel")]
    compatibility_level: String,
}

#[derive(Debug, Serialize)]
struct ConfigUpdateRequest<'a> {
    compatibility: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    message: String,
}

/// Registry error with the HTTP status and registry error code kept apart
struct ApiError {
    status: StatusCode,
    error_code: i64,
    message: String,
}

impl ApiError {
    fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
            && matches!(
                self.error_code,
                ERROR_SUBJECT_NOT_FOUND
                    | ERROR_SCHEMA_NOT_FOUND
                    | ERROR_SUBJECT_COMPATIBILITY_NOT_CONFIGURED
            )
    }

    fn is_transient(&self) -> bool {
        self.status.is_server_error()
            || self.status == StatusCode::REQUEST_TIMEOUT
            || self.status == StatusCode::TOO_MANY_REQUESTS
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (error code {}): {}", self.status, self.error_code, self.message)
    }
}

/// `SchemaRegistry` over the registry's REST API
pub struct RegistryClient {
    client: Client,
    base_url: Url,
    credentials: Option<(String, String)>,
}

impl RegistryClient {
    pub fn new(connection: &RegistryConnection) -> Result<Self> {
        let base_url = Url::parse(&connection.url).map_err(|e| {
            KafkaloError::Configuration(format!(
                "invalid schema registry url {}: {}",
                connection.url, e
            ))
        })?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url,
            credentials: connection.credentials(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                KafkaloError::Configuration(format!("invalid schema registry url {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let mut builder = self
            .client
            .request(method, self.url(segments)?)
            .header(reqwest::header::ACCEPT, CONTENT_TYPE);
        if let Some((username, password)) = &self.credentials {
            builder = builder.basic_auth(username, Some(password));
        }
        Ok(builder)
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        builder: RequestBuilder,
    ) -> std::result::Result<std::result::Result<T, ApiError>, reqwest::Error> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(Ok(response.json::<T>().await?));
        }
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<ErrorResponse> = serde_json::from_str(&body).ok();
        let (error_code, message) = match parsed {
            Some(err) => (err.error_code, err.message),
            None => (i64::from(status.as_u16()), body),
        };
        Ok(Err(ApiError {
            status,
            error_code,
            message,
        }))
    }

    async fn call<T: for<'de> Deserialize<'de>>(&self, builder: RequestBuilder) -> Result<T> {
        match self.send(builder).await? {
            Ok(value) => Ok(value),
            Err(err) => Err(KafkaloError::Registry(err.to_string())),
        }
    }
}

#[async_trait]
impl SchemaRegistry for RegistryClient {
    async fn list_subjects(&self) -> Result<Vec<String>> {
        self.call(self.request(Method::GET, &["subjects"])?).await
    }

    async fn lookup_schema(&self, subject: &str, schema: &Schema) -> SchemaLookup {
        let body = SchemaRequest {
            schema: &schema.schema,
            schema_type: &schema.schema_type,
        };
        let builder = match self.request(Method::POST, &["subjects", subject]) {
            Ok(builder) => builder.json(&body),
            Err(e) => return SchemaLookup::PermanentError(e.to_string()),
        };
        match self.send::<RegisteredSchema>(builder).await {
            Ok(Ok(found)) => SchemaLookup::Found(found),
            Ok(Err(err)) if err.is_not_found() => {
                debug!("Lookup of {}: {}", subject, err);
                SchemaLookup::NotFound
            }
            Ok(Err(err)) if err.is_transient() => SchemaLookup::TransientError(err.to_string()),
            Ok(Err(err)) => SchemaLookup::PermanentError(err.to_string()),
            Err(e) => SchemaLookup::TransientError(e.to_string()),
        }
    }

    async fn register_schema(&self, subject: &str, schema: &Schema) -> Result<u32> {
        let body = SchemaRequest {
            schema: &schema.schema,
            schema_type: &schema.schema_type,
        };
        let builder = self
            .request(Method::POST, &["subjects", subject, "versions"])?
            .json(&body);
        let response: RegisterSchemaResponse = self.call(builder).await?;
        Ok(response.id)
    }

    async fn global_compatibility(&self) -> Result<String> {
        let response: ConfigResponse = self.call(self.request(Method::GET, &["config"])?).await?;
        Ok(response.compatibility_level)
    }

    async fn subject_compatibility(&self, subject: &str) -> Result<Option<String>> {
        let builder = self.request(Method::GET, &["config", subject])?;
        match self.send::<ConfigResponse>(builder).await? {
            Ok(config) => Ok(Some(config.compatibility_level)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(KafkaloError::Registry(err.to_string())),
        }
    }

    async fn set_compatibility(&self, subject: &str, level: &str) -> Result<()> {
        let level = level.to_uppercase();
        let builder = self
            .request(Method::PUT, &["config", subject])?
            .json(&ConfigUpdateRequest {
                compatibility: &level,
            });
        let _: serde_json::Value = self.call(builder).await?;
        Ok(())
    }
}
