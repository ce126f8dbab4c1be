use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::azure::auth::Credential;
use crate::azure::error::ArmError;
use crate::azure::lro::Poller;
use crate::azure::types::{CloudError, ErrorDetail};
use crate::client::CLIENT;

/// Public-cloud Azure Resource Manager.
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The resource types this tool manages, with the API version used for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    VirtualMachine,
    Disk,
    NetworkInterface,
}

impl ResourceKind {
    pub fn provider_path(self) -> &'static str {
        match self {
            ResourceKind::VirtualMachine => "Microsoft.Compute/virtualMachines",
            ResourceKind::Disk => "Microsoft.Compute/disks",
            ResourceKind::NetworkInterface => "Microsoft.Network/networkInterfaces",
        }
    }

    pub fn api_version(self) -> &'static str {
        match self {
            ResourceKind::VirtualMachine => "2024-07-01",
            ResourceKind::Disk => "2024-03-02",
            ResourceKind::NetworkInterface => "2024-05-01",
        }
    }
}

/// ARM resource ID of `name`, e.g.
/// `/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks/vm1-disk`.
pub fn resource_id(
    subscription_id: &str,
    resource_group: &str,
    kind: ResourceKind,
    name: &str,
) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
        subscription_id,
        resource_group,
        kind.provider_path(),
        name
    )
}

/// Authenticated client for one subscription of Azure Resource Manager.
pub struct ArmClient {
    http: reqwest::Client,
    endpoint: String,
    subscription_id: String,
    credential: Credential,
    poll_interval: Duration,
}

impl ArmClient {
    pub fn new(endpoint: &str, subscription_id: &str, credential: Credential) -> Self {
        ArmClient {
            http: CLIENT.clone(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            subscription_id: subscription_id.to_string(),
            credential,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Replaces the process-wide HTTP client.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Delay between polls when the service does not send `Retry-After`.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Full request URL, api-version included, for a resource in this subscription.
    pub fn resource_url(&self, resource_group: &str, kind: ResourceKind, name: &str) -> String {
        format!(
            "{}{}?api-version={}",
            self.endpoint,
            resource_id(&self.subscription_id, resource_group, kind, name),
            kind.api_version()
        )
    }

    fn scope(&self) -> String {
        format!("{}/.default", self.endpoint)
    }

    /// Starts a create-or-update (`PUT`) of the resource at `url`.
    pub async fn begin_create_or_update<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Poller<'_>> {
        let body = serde_json::to_value(body).context("Failed to serialize request body")?;
        let response = self.send(Method::PUT, url, Some(&body)).await?;
        Poller::from_response(self, Method::PUT, url, response).await
    }

    /// Starts a `DELETE` of the resource at `url`.
    pub async fn begin_delete(&self, url: &str) -> Result<Poller<'_>> {
        let response = self.send(Method::DELETE, url, None).await?;
        Poller::from_response(self, Method::DELETE, url, response).await
    }

    pub async fn get(&self, url: &str) -> Result<Value> {
        let response = self.send(Method::GET, url, None).await?;
        read_json(response).await
    }

    /// Sends an authenticated request and turns non-success statuses into [`ArmError::Http`].
    pub(crate) async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response> {
        let token = self
            .credential
            .access_token(&self.scope())
            .await
            .context("Failed to get access token")?;

        let mut request = self.http.request(method.clone(), url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        tracing::debug!(%method, url, "sending ARM request");
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to call {} {}", method, url))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<CloudError>(&error_text)
            .ok()
            .and_then(|e| e.error)
            .unwrap_or_else(|| ErrorDetail {
                code: status.canonical_reason().unwrap_or("Unknown").to_string(),
                message: error_text,
            });
        Err(ArmError::Http {
            method: method.to_string(),
            url: url.to_string(),
            status,
            code: detail.code,
            message: detail.message,
        }
        .into())
    }
}

/// Reads a JSON body; empty bodies (e.g. `204 No Content`) read as `null`.
pub(crate) async fn read_json(response: reqwest::Response) -> Result<Value> {
    if response.status() == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    let text = response.text().await.context("Failed to read response body")?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).context("Failed to parse response JSON")
}
