use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{Component, ComponentContext, ComponentDependencies};
use crate::client::DEFAULT_POLLING_TIMEOUT;
use crate::errors::{ErrorReason, OrchestrationError};
use crate::types::{ClientServerState, ClientServerStatus, ParameterMap};

pub const SERVER_ROLE: &str = "Server";
pub const CLIENT_ROLE: &str = "Client";
pub const DEFAULT_STATE_ID: &str = "ServerState";

/// Client/server rendezvous.
///
/// On a server (or an agent without a layout role) this publishes a `Ready` state on the local
/// API and marks the agent online. On a client it waits for every server in the layout to answer
/// heartbeats, report online and publish `Ready`.
pub struct StateSynchronization {
    context: ComponentContext,
}

impl StateSynchronization {
    pub const TYPE_NAME: &'static str = "StateSynchronization";

    pub fn new(dependencies: ComponentDependencies, parameters: ParameterMap) -> Self {
        Self {
            context: ComponentContext::new(Self::TYPE_NAME, parameters, dependencies),
        }
    }

    pub fn state_id(&self) -> String {
        self.context
            .parameter("StateId")
            .map(|v| v.to_string())
            .unwrap_or_else(|| DEFAULT_STATE_ID.to_string())
    }

    pub fn timeout(&self) -> Duration {
        self.context
            .parameter("Timeout")
            .and_then(|v| v.as_duration())
            .unwrap_or(DEFAULT_POLLING_TIMEOUT)
    }

    fn local_role(&self) -> Option<String> {
        self.context
            .runtime()
            .layout()
            .and_then(|layout| layout.instance_for(self.context.agent_id()))
            .and_then(|instance| instance.role.clone())
    }

    async fn publish_ready(&self) -> Result<()> {
        let client = self.context.dependencies().api_clients.local_client()?;
        let state_id = self.state_id();

        client
            .upsert_state(&state_id, ClientServerState::new(ClientServerStatus::Ready))
            .await?;
        self.context.runtime().set_online(true);

        log::info!("Published '{}' as Ready; agent is online", state_id);
        Ok(())
    }

    async fn await_servers(&self, cancellation: &CancellationToken) -> Result<()> {
        let Some(layout) = self.context.runtime().layout() else {
            return Ok(());
        };

        let servers = self
            .context
            .dependencies()
            .api_clients
            .clients_in_role(layout, SERVER_ROLE)?;
        if servers.is_empty() {
            return Err(OrchestrationError::environment_setup(
                "The environment layout does not define any instance in the 'Server' role.",
                ErrorReason::LayoutInvalid,
            )
            .into());
        }

        let state_id = self.state_id();
        let timeout = self.timeout();
        for server in servers {
            log::info!("Waiting for server {}", server.base_url());
            server.poll_for_heartbeat(timeout, cancellation).await?;
            server.poll_for_server_online(timeout, cancellation).await?;
            server
                .synchronize_state(
                    &state_id,
                    || ClientServerState::new(ClientServerStatus::Ready),
                    Some(timeout),
                    cancellation,
                )
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Component for StateSynchronization {
    fn context(&self) -> &ComponentContext {
        &self.context
    }

    fn context_mut(&mut self) -> &mut ComponentContext {
        &mut self.context
    }

    async fn execute(&self, cancellation: &CancellationToken) -> Result<()> {
        match self.local_role() {
            Some(role) if role.eq_ignore_ascii_case(CLIENT_ROLE) => {
                self.await_servers(cancellation).await
            }
            _ => self.publish_ready().await,
        }
    }
}
