use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{child_failure, Component, ComponentContext, ComponentDependencies};
use crate::errors::OrchestrationError;
use crate::lifecycle::run_component;
use crate::types::ParameterMap;

/// Runs its children one after another, `LoopCount` times.
pub struct SequentialExecution {
    context: ComponentContext,
    children: Vec<Arc<dyn Component>>,
}

impl SequentialExecution {
    pub const TYPE_NAME: &'static str = "SequentialExecution";

    pub fn new(dependencies: ComponentDependencies, parameters: ParameterMap) -> Self {
        Self {
            context: ComponentContext::new(Self::TYPE_NAME, parameters, dependencies),
            children: Vec::new(),
        }
    }

    pub fn loop_count(&self) -> i64 {
        self.context
            .parameter("LoopCount")
            .and_then(|v| v.as_i64())
            .unwrap_or(1)
    }
}

#[async_trait]
impl Component for SequentialExecution {
    fn context(&self) -> &ComponentContext {
        &self.context
    }

    fn context_mut(&mut self) -> &mut ComponentContext {
        &mut self.context
    }

    fn children(&self) -> &[Arc<dyn Component>] {
        &self.children
    }

    fn add_child(&mut self, child: Arc<dyn Component>) -> Result<()> {
        self.children.push(child);
        Ok(())
    }

    fn is_composite(&self) -> bool {
        true
    }

    fn validate(&self) -> Result<()> {
        if let Some(value) = self.context.parameter("LoopCount") {
            match value.as_i64() {
                Some(n) if n >= 1 => {}
                _ => {
                    return Err(OrchestrationError::schema(format!(
                        "Invalid 'LoopCount' value '{}'. Expected a whole number of 1 or more.",
                        value
                    ))
                    .into())
                }
            }
        }
        Ok(())
    }

    async fn execute(&self, cancellation: &CancellationToken) -> Result<()> {
        for repetition in 1..=self.loop_count() {
            if cancellation.is_cancelled() {
                break;
            }
            log::debug!("Sequential execution round {}", repetition);

            for child in &self.children {
                if cancellation.is_cancelled() {
                    break;
                }
                if !child.is_supported() {
                    log::info!(
                        "Skipping '{}': not applicable on this host or role",
                        child.context().type_name()
                    );
                    continue;
                }

                run_component(child.as_ref(), cancellation)
                    .await
                    .map_err(|e| child_failure(child.as_ref(), e))?;
            }
        }
        Ok(())
    }
}
