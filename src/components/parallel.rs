use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{child_failure, Component, ComponentContext, ComponentDependencies};
use crate::lifecycle::run_component;
use crate::types::ParameterMap;

/// Runs every child once, concurrently, and waits for all of them.
pub struct ParallelExecution {
    context: ComponentContext,
    children: Vec<Arc<dyn Component>>,
}

impl ParallelExecution {
    pub const TYPE_NAME: &'static str = "ParallelExecution";

    pub fn new(dependencies: ComponentDependencies, parameters: ParameterMap) -> Self {
        Self {
            context: ComponentContext::new(Self::TYPE_NAME, parameters, dependencies),
            children: Vec::new(),
        }
    }
}

#[async_trait]
impl Component for ParallelExecution {
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

    async fn execute(&self, cancellation: &CancellationToken) -> Result<()> {
        let mut tasks = JoinSet::new();
        for child in self.children.iter().filter(|c| c.is_supported()) {
            let child = child.clone();
            let cancellation = cancellation.clone();
            tasks.spawn(async move {
                run_component(child.as_ref(), &cancellation)
                    .await
                    .map_err(|e| child_failure(child.as_ref(), e))
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(anyhow::Error::from).and_then(|r| r);
            if let Err(e) = result {
                log::error!("Parallel execution branch failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
