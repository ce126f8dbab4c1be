use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Failures reported by Azure Resource Manager or by waiting on it.
#[derive(Debug, Error)]
pub enum ArmError {
    /// The service rejected a request.
    #[error("{method} {url} failed ({status}): {code}: {message}")]
    Http {
        method: String,
        url: String,
        status: StatusCode,
        code: String,
        message: String,
    },

    /// A long-running operation reached a terminal state other than success.
    #[error("operation on {resource} ended as {status}: {code}: {message}")]
    OperationFailed {
        resource: String,
        status: String,
        code: String,
        message: String,
    },

    #[error("operation on {resource} did not finish within {timeout:?}")]
    Timeout { resource: String, timeout: Duration },

    #[error("operation on {resource} was cancelled")]
    Cancelled { resource: String },

    #[error("invalid polling URL from {resource}: {url}")]
    InvalidPollingUrl { resource: String, url: String },
}

impl ArmError {
    /// HTTP status of a rejected request, if that is what this error is.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ArmError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
