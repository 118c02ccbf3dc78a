use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{Component, ComponentContext, ComponentDependencies};
use crate::errors::OrchestrationError;
use crate::types::ParameterMap;

/// Sleeps for `Duration`, returning early on cancellation.
pub struct WaitExecutor {
    context: ComponentContext,
}

impl WaitExecutor {
    pub const TYPE_NAME: &'static str = "WaitExecutor";

    pub fn new(dependencies: ComponentDependencies, parameters: ParameterMap) -> Self {
        Self {
            context: ComponentContext::new(Self::TYPE_NAME, parameters, dependencies),
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.context
            .parameter("Duration")
            .and_then(|v| v.as_duration())
    }
}

#[async_trait]
impl Component for WaitExecutor {
    fn context(&self) -> &ComponentContext {
        &self.context
    }

    fn context_mut(&mut self) -> &mut ComponentContext {
        &mut self.context
    }

    fn validate(&self) -> Result<()> {
        if self.duration().is_none() {
            return Err(OrchestrationError::schema(
                "WaitExecutor requires a 'Duration' parameter (seconds or hh:mm:ss).",
            )
            .into());
        }
        Ok(())
    }

    async fn execute(&self, cancellation: &CancellationToken) -> Result<()> {
        let duration = self.duration().unwrap_or_default();
        log::debug!("Waiting {:?}", duration);

        tokio::select! {
            _ = cancellation.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
        Ok(())
    }
}
