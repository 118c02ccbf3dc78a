use anyhow::Result;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::polling::PollingIntervals;
use super::retry::{RetryPolicies, RetryPolicy};
use super::ApiResponse;
use crate::errors::{ErrorReason, OrchestrationError};
use crate::types::{Instructions, StateItem};

pub const API_VERSION: &str = "2.0";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for one peer agent's coordination API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    pub(crate) retry: RetryPolicies,
    pub(crate) polling: PollingIntervals,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("tandem/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicies::default(),
            polling: PollingIntervals::default(),
        })
    }

    pub fn with_retry_policies(mut self, retry: RetryPolicies) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_polling_intervals(mut self, polling: PollingIntervals) -> Self {
        self.polling = polling;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn state_url(&self, state_id: &str) -> String {
        format!("{}/api/state/{}", self.base_url, state_id)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http.request(method, url)
    }

    async fn send(request: RequestBuilder) -> Result<ApiResponse> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }

    async fn execute(
        &self,
        policy: &RetryPolicy,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<ApiResponse> {
        policy.execute(|| Self::send(build())).await
    }

    /// POST the document as a new state. 409 when the id already exists.
    pub async fn create_state<T: Serialize + ?Sized + Sync>(
        &self,
        state_id: &str,
        definition: &T,
    ) -> Result<ApiResponse> {
        let url = self.state_url(state_id);
        self.execute(&self.retry.post, || {
            self.request(Method::POST, &url).json(definition)
        })
        .await
    }

    pub async fn get_state(&self, state_id: &str) -> Result<ApiResponse> {
        let url = self.state_url(state_id);
        self.execute(&self.retry.get, || self.request(Method::GET, &url))
            .await
    }

    /// PUT a full state envelope over an existing state.
    pub async fn update_state<T: Serialize + Sync>(
        &self,
        state: &StateItem<T>,
    ) -> Result<ApiResponse> {
        let url = self.state_url(&state.id);
        self.execute(&self.retry.put, || self.request(Method::PUT, &url).json(state))
            .await
    }

    pub async fn delete_state(&self, state_id: &str) -> Result<ApiResponse> {
        let url = self.state_url(state_id);
        self.execute(&self.retry.delete, || self.request(Method::DELETE, &url))
            .await
    }

    pub async fn get_heartbeat(&self) -> Result<ApiResponse> {
        let url = format!("{}/api/heartbeat", self.base_url);
        self.execute(&self.retry.get, || self.request(Method::GET, &url))
            .await
    }

    /// HEAD on the events endpoint. 200 once the peer has signalled it is online.
    pub async fn get_server_online_status(&self) -> Result<ApiResponse> {
        let url = format!("{}/api/events", self.base_url);
        self.execute(&self.retry.head, || self.request(Method::HEAD, &url))
            .await
    }

    /// Sends typed instructions (`api-version=2.0`).
    pub async fn send_instructions(&self, instructions: &Instructions) -> Result<ApiResponse> {
        let url = format!("{}/api/events?api-version={}", self.base_url, API_VERSION);
        self.execute(&self.retry.post, || {
            self.request(Method::POST, &url).json(instructions)
        })
        .await
    }

    /// Sends an untyped instructions document.
    pub async fn send_instructions_document(
        &self,
        document: &serde_json::Value,
    ) -> Result<ApiResponse> {
        let url = format!("{}/api/events", self.base_url);
        self.execute(&self.retry.post, || self.request(Method::POST, &url).json(document))
            .await
    }

    /// Reads the state and creates it from `default` when the read is not a success.
    /// Returns whichever response came last.
    pub async fn get_or_create_state(
        &self,
        state_id: &str,
        default: &serde_json::Value,
    ) -> Result<ApiResponse> {
        let response = self.get_state(state_id).await?;
        if response.is_success() {
            return Ok(response);
        }

        log::debug!(
            "State '{}' not readable ({}), creating it",
            state_id,
            response.status
        );
        self.create_state(state_id, default).await
    }

    /// `None` on 404. Any other non-success status is an error.
    pub async fn get_state_typed<T: DeserializeOwned>(
        &self,
        state_id: &str,
    ) -> Result<Option<StateItem<T>>> {
        let response = self.get_state(state_id).await?;
        if response.status == 404 {
            return Ok(None);
        }
        Ok(Some(response.ensure_success(None)?.json()?))
    }

    pub async fn get_or_create_state_typed<T>(
        &self,
        state_id: &str,
        default: T,
    ) -> Result<StateItem<T>>
    where
        T: Serialize + DeserializeOwned + Sync,
    {
        if let Some(state) = self.get_state_typed(state_id).await? {
            return Ok(state);
        }

        let response = self.create_state(state_id, &default).await?;
        if !response.is_success() {
            return Err(OrchestrationError::api(
                format!(
                    "Failed to get or create state '{}'. Create returned status {}.",
                    state_id, response.status
                ),
                ErrorReason::HttpNonSuccessResponse,
            )
            .into());
        }
        response.json()
    }

    pub async fn update_state_typed<T>(&self, state: &StateItem<T>) -> Result<StateItem<T>>
    where
        T: Serialize + DeserializeOwned + Sync,
    {
        self.update_state(state).await?.ensure_success(None)?.json()
    }

    /// Writes `definition` as the state; the server creates it when absent.
    pub async fn upsert_state<T>(&self, state_id: &str, definition: T) -> Result<StateItem<T>>
    where
        T: Serialize + DeserializeOwned + Sync,
    {
        self.update_state_typed(&StateItem::new(state_id, definition))
            .await
    }
}
