use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use super::{ApiClient, PollingIntervals, RetryPolicies};
use crate::errors::{ErrorReason, OrchestrationError};
use crate::types::{ClientInstance, EnvironmentLayout};

pub const DEFAULT_API_PORT: u16 = 4500;

/// Keeps one `ApiClient` per peer address.
pub struct ApiClientManager {
    port: u16,
    retry: RetryPolicies,
    polling: PollingIntervals,
    clients: Mutex<HashMap<String, Arc<ApiClient>>>,
}

impl Default for ApiClientManager {
    fn default() -> Self {
        Self::new(DEFAULT_API_PORT)
    }
}

impl ApiClientManager {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            retry: RetryPolicies::default(),
            polling: PollingIntervals::default(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry_policies(mut self, retry: RetryPolicies) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_polling_intervals(mut self, polling: PollingIntervals) -> Self {
        self.polling = polling;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn get_or_create(&self, base_url: &str) -> Result<Arc<ApiClient>> {
        let key = base_url.trim_end_matches('/').to_lowercase();
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = Arc::new(
            ApiClient::new(base_url)?
                .with_retry_policies(self.retry.clone())
                .with_polling_intervals(self.polling),
        );
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// Client for this agent's own API.
    pub fn local_client(&self) -> Result<Arc<ApiClient>> {
        self.get_or_create(&format!("http://127.0.0.1:{}", self.port))
    }

    /// `http://{ip}:{port}`. An `ApiPort` extension on the instance overrides the port.
    pub fn base_url_for(&self, instance: &ClientInstance) -> Result<String> {
        let ip: IpAddr = instance.ip().ok_or_else(|| {
            OrchestrationError::environment_setup(
                format!(
                    "Client instance '{}' has an invalid IP address '{}'.",
                    instance.name, instance.ip_address
                ),
                ErrorReason::LayoutInvalid,
            )
        })?;

        let port = instance
            .extensions
            .get_i64("ApiPort")
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(self.port);

        Ok(match ip {
            IpAddr::V4(v4) => format!("http://{}:{}", v4, port),
            IpAddr::V6(v6) => format!("http://[{}]:{}", v6, port),
        })
    }

    pub fn client_for(&self, instance: &ClientInstance) -> Result<Arc<ApiClient>> {
        self.get_or_create(&self.base_url_for(instance)?)
    }

    pub fn clients_in_role(
        &self,
        layout: &EnvironmentLayout,
        role: &str,
    ) -> Result<Vec<Arc<ApiClient>>> {
        layout
            .instances_in_role(role)
            .map(|instance| self.client_for(instance))
            .collect()
    }
}
