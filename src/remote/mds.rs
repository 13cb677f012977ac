//! RBAC metadata service (MDS) client

use super::{RbacService, ResourcePattern, RoleBinding, Scope};
use crate::config::MdsConnection;
use crate::error::{KafkaloError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Serialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BindingRequest<'a> {
    scope: &'a Scope,
    resource_patterns: &'a [ResourcePattern],
}

/// `RbacService` over the MDS `security/1.0` REST API with basic auth
pub struct MdsClient {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
}

impl MdsClient {
    pub fn new(connection: &MdsConnection) -> Result<Self> {
        let base_url = Url::parse(&connection.url).map_err(|e| {
            KafkaloError::Configuration(format!("invalid mds url {}: {}", connection.url, e))
        })?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url,
            username: connection.username.clone(),
            password: connection.password.clone(),
        })
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| KafkaloError::Configuration(format!("invalid mds url {}", self.base_url)))?
            .pop_if_empty()
            .extend(["security", "1.0"])
            .extend(segments);
        Ok(self
            .client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password)))
    }
}

#[async_trait]
impl RbacService for MdsClient {
    async fn kafka_cluster_id(&self) -> Result<String> {
        let response = self
            .request(Method::GET, &["metadataClusterId"])?
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        Ok(text.trim().trim_matches('"').to_string())
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<()> {
        let body = BindingRequest {
            scope: &binding.scope,
            resource_patterns: &binding.resource_patterns,
        };
        let response = self
            .request(
                Method::POST,
                &[
                    "principals",
                    binding.principal.as_str(),
                    "roles",
                    binding.role.as_str(),
                    "bindings",
                ],
            )?
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(KafkaloError::Http(format!("{}: {}", status, text)));
        }
        Ok(())
    }

    async fn role_names(&self, principal: &str, scope: &Scope) -> Result<Vec<String>> {
        let response = self
            .request(Method::POST, &["lookup", "principals", principal, "roleNames"])?
            .json(scope)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}
