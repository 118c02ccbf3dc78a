use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{child_failure, Component, ComponentContext, ComponentDependencies};
use crate::errors::OrchestrationError;
use crate::lifecycle::run_component;
use crate::types::ParameterMap;

/// Runs every child concurrently, each in its own loop, until a shared `Duration` elapses.
/// Each child completes at least `MinimumIteration` rounds even when the duration is zero.
pub struct ParallelLoopExecution {
    context: ComponentContext,
    children: Vec<Arc<dyn Component>>,
}

impl ParallelLoopExecution {
    pub const TYPE_NAME: &'static str = "ParallelLoopExecution";

    pub fn new(dependencies: ComponentDependencies, parameters: ParameterMap) -> Self {
        Self {
            context: ComponentContext::new(Self::TYPE_NAME, parameters, dependencies),
            children: Vec::new(),
        }
    }

    /// `None` means loop until cancelled.
    pub fn duration(&self) -> Option<Duration> {
        self.context
            .parameter("Duration")
            .and_then(|v| v.as_duration())
    }

    pub fn minimum_iterations(&self) -> u64 {
        self.context
            .parameter("MinimumIteration")
            .and_then(|v| v.as_i64())
            .map(|n| n.max(0) as u64)
            .unwrap_or(0)
    }
}

async fn run_loop(
    child: Arc<dyn Component>,
    deadline: Option<Instant>,
    minimum_iterations: u64,
    cancellation: CancellationToken,
) -> Result<u64> {
    let mut completed = 0u64;

    loop {
        if cancellation.is_cancelled() {
            break;
        }

        let floor_reached = completed >= minimum_iterations;
        match deadline {
            Some(deadline) if floor_reached && Instant::now() >= deadline => break,
            Some(deadline) if floor_reached => {
                // Past the floor the timer may interrupt the running iteration.
                let iteration = cancellation.child_token();
                let run = run_component(child.as_ref(), &iteration);
                tokio::pin!(run);

                let interrupted = tokio::select! {
                    result = &mut run => {
                        result.map_err(|e| child_failure(child.as_ref(), e))?;
                        false
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        iteration.cancel();
                        run.await.map_err(|e| child_failure(child.as_ref(), e))?;
                        true
                    }
                };

                if interrupted {
                    break;
                }
            }
            _ => {
                run_component(child.as_ref(), &cancellation)
                    .await
                    .map_err(|e| child_failure(child.as_ref(), e))?;
            }
        }

        completed += 1;
    }

    Ok(completed)
}

#[async_trait]
impl Component for ParallelLoopExecution {
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
        if let Some(value) = self.context.parameter("Duration") {
            if value.as_duration().is_none() {
                return Err(OrchestrationError::schema(format!(
                    "Invalid 'Duration' value '{}'. Expected seconds or a hh:mm:ss time span.",
                    value
                ))
                .into());
            }
        }
        if let Some(value) = self.context.parameter("MinimumIteration") {
            if value.as_i64().map_or(true, |n| n < 0) {
                return Err(OrchestrationError::schema(format!(
                    "Invalid 'MinimumIteration' value '{}'. Expected a whole number of 0 or more.",
                    value
                ))
                .into());
            }
        }
        Ok(())
    }

    async fn execute(&self, cancellation: &CancellationToken) -> Result<()> {
        let deadline = self.duration().map(|d| Instant::now() + d);
        let minimum_iterations = self.minimum_iterations();

        let mut loops = JoinSet::new();
        for child in &self.children {
            if !child.is_supported() {
                log::info!(
                    "Skipping '{}': not applicable on this host or role",
                    child.context().type_name()
                );
                continue;
            }
            loops.spawn(run_loop(
                child.clone(),
                deadline,
                minimum_iterations,
                cancellation.clone(),
            ));
        }

        let mut first_error = None;
        while let Some(joined) = loops.join_next().await {
            match joined {
                Ok(Ok(iterations)) => log::debug!("Parallel loop finished after {} iterations", iterations),
                Ok(Err(e)) => {
                    log::error!("Parallel loop stopped: {}", e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(anyhow::anyhow!("Parallel loop task failed: {}", e));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
