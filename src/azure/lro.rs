//! # Long-Running Operations
//!
//! ARM answers create and delete calls before the work is done. The response
//! names where to watch progress: an `Azure-AsyncOperation` status URL, a
//! `Location` URL that returns `202` until finished, or, failing both, the
//! resource's own `provisioningState`. [`Poller`] follows whichever one the
//! service chose until a terminal state.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::azure::client::{ArmClient, read_json};
use crate::azure::error::ArmError;
use crate::azure::types::{ErrorDetail, OperationStatus, ResourceEnvelope};

/// Deadline and cancellation applied to one remote operation, begin through completion.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl OperationContext {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        OperationContext { timeout, cancel }
    }

    /// Runs `work`, failing with [`ArmError::Timeout`] or [`ArmError::Cancelled`]
    /// if it does not finish first.
    pub async fn run<T, F>(&self, resource: &str, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ArmError::Cancelled {
                resource: resource.to_string(),
            }
            .into()),
            result = tokio::time::timeout(self.timeout, work) => match result {
                Ok(result) => result,
                Err(_) => Err(ArmError::Timeout {
                    resource: resource.to_string(),
                    timeout: self.timeout,
                }
                .into()),
            },
        }
    }
}

#[derive(Debug)]
enum Tracking {
    Done(Value),
    AsyncOperation(Url),
    Location(Url),
    ProvisioningState,
}

/// Handle on an operation started by [`ArmClient::begin_create_or_update`] or
/// [`ArmClient::begin_delete`].
pub struct Poller<'a> {
    client: &'a ArmClient,
    method: Method,
    resource_url: String,
    tracking: Tracking,
    retry_after: Option<Duration>,
}

impl<'a> Poller<'a> {
    pub(crate) async fn from_response(
        client: &'a ArmClient,
        method: Method,
        resource_url: &str,
        response: reqwest::Response,
    ) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let async_operation = header_url(&headers, "azure-asyncoperation", resource_url)?;
        let body = read_json(response).await?;

        let tracking = if let Some(url) = async_operation {
            Tracking::AsyncOperation(url)
        } else if status == StatusCode::ACCEPTED {
            match header_url(&headers, "location", resource_url)? {
                Some(url) => Tracking::Location(url),
                None if method == Method::PUT => Tracking::ProvisioningState,
                None => {
                    return Err(ArmError::InvalidPollingUrl {
                        resource: strip_query(resource_url).to_string(),
                        url: String::new(),
                    }
                    .into());
                }
            }
        } else if method == Method::PUT {
            match provisioning_state(&body) {
                Some(state) if state.eq_ignore_ascii_case("Succeeded") => Tracking::Done(body),
                Some(state) if is_failure(&state) => {
                    return Err(operation_failed(resource_url, &state, None));
                }
                Some(_) => Tracking::ProvisioningState,
                None => Tracking::Done(body),
            }
        } else {
            Tracking::Done(body)
        };

        Ok(Poller {
            client,
            method,
            resource_url: resource_url.to_string(),
            tracking,
            retry_after: retry_after(&headers),
        })
    }

    pub fn is_done(&self) -> bool {
        matches!(self.tracking, Tracking::Done(_))
    }

    /// Waits for the operation to reach a terminal state. Returns the final
    /// resource body for create-or-update and `null` for most deletes.
    pub async fn poll_until_done(mut self) -> Result<Value> {
        loop {
            if let Tracking::Done(body) = self.tracking {
                return Ok(body);
            }
            let delay = self.retry_after.unwrap_or(self.client.poll_interval());
            tokio::time::sleep(delay).await;
            self.poll().await?;
        }
    }

    /// One round trip to the service.
    async fn poll(&mut self) -> Result<()> {
        match &self.tracking {
            Tracking::Done(_) => Ok(()),
            Tracking::AsyncOperation(url) => {
                let response = self.client.send(Method::GET, url.as_str(), None).await?;
                self.retry_after = retry_after(response.headers());
                let status: OperationStatus = serde_json::from_value(read_json(response).await?)
                    .context("Invalid async operation status")?;
                tracing::debug!(resource = %self.resource_url, status = %status.status, "polled operation");

                if status.status.eq_ignore_ascii_case("Succeeded") {
                    self.finish(Value::Null).await
                } else if is_failure(&status.status) {
                    Err(operation_failed(&self.resource_url, &status.status, status.error))
                } else {
                    Ok(())
                }
            }
            Tracking::Location(url) => {
                let response = self.client.send(Method::GET, url.as_str(), None).await?;
                let headers = response.headers().clone();
                self.retry_after = retry_after(&headers);
                tracing::debug!(resource = %self.resource_url, status = %response.status(), "polled location");

                if response.status() == StatusCode::ACCEPTED {
                    if let Some(next) = header_url(&headers, "location", &self.resource_url)? {
                        self.tracking = Tracking::Location(next);
                    }
                    return Ok(());
                }
                let body = read_json(response).await?;
                self.finish(body).await
            }
            Tracking::ProvisioningState => {
                let body = self.client.get(&self.resource_url).await?;
                let state = provisioning_state(&body).unwrap_or_default();
                tracing::debug!(resource = %self.resource_url, state = %state, "polled provisioning state");

                if state.eq_ignore_ascii_case("Succeeded") {
                    self.tracking = Tracking::Done(body);
                    Ok(())
                } else if is_failure(&state) {
                    Err(operation_failed(&self.resource_url, &state, None))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// A finished create-or-update re-reads the resource for its final state.
    async fn finish(&mut self, body: Value) -> Result<()> {
        let body = if self.method == Method::PUT {
            self.client.get(&self.resource_url).await?
        } else {
            body
        };
        self.tracking = Tracking::Done(body);
        Ok(())
    }
}

fn is_failure(state: &str) -> bool {
    state.eq_ignore_ascii_case("Failed") || state.eq_ignore_ascii_case("Canceled")
}

fn provisioning_state(body: &Value) -> Option<String> {
    let envelope: ResourceEnvelope = serde_json::from_value(body.clone()).ok()?;
    envelope.properties?.provisioning_state
}

fn operation_failed(resource_url: &str, status: &str, error: Option<ErrorDetail>) -> anyhow::Error {
    let error = error.unwrap_or_default();
    ArmError::OperationFailed {
        resource: strip_query(resource_url).to_string(),
        status: status.to_string(),
        code: error.code,
        message: error.message,
    }
    .into()
}

fn strip_query(url: &str) -> &str {
    url.split_once('?').map(|(path, _)| path).unwrap_or(url)
}

fn header_url(headers: &HeaderMap, name: &str, resource_url: &str) -> Result<Option<Url>> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let invalid = || ArmError::InvalidPollingUrl {
        resource: strip_query(resource_url).to_string(),
        url: String::from_utf8_lossy(value.as_bytes()).into_owned(),
    };
    let text = value.to_str().map_err(|_| invalid())?;
    let url = Url::parse(text).map_err(|_| invalid())?;
    Ok(Some(url))
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
