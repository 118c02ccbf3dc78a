pub mod api_client;
pub mod manager;
pub mod polling;
pub mod retry;

pub use api_client::{ApiClient, API_VERSION};
pub use manager::{ApiClientManager, DEFAULT_API_PORT};
pub use polling::{PollingIntervals, DEFAULT_POLLING_TIMEOUT};
pub use retry::{RetryPolicies, RetryPolicy};

use anyhow::Result;
use serde::de::DeserializeOwned;

use crate::errors::{ErrorReason, OrchestrationError};

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Turns a non-success response into an Api error carrying the status and body.
    pub fn ensure_success(self, override_reason: Option<ErrorReason>) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }

        let message = if self.body.is_empty() {
            format!("API request failed with status {}.", self.status)
        } else {
            format!(
                "API request failed with status {}. Response: {}",
                self.status, self.body
            )
        };
        Err(OrchestrationError::from_status(self.status, message, override_reason).into())
    }
}

/// Connection failures and timeouts, as opposed to HTTP-level or parsing failures.
pub fn is_transport_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.is::<reqwest::Error>())
}
