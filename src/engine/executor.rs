use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::components::Component;
use crate::definitions::{ExecutionProfile, ExpressionEvaluator, ProfileElement};
use crate::engine::runtime::RuntimeContext;
use crate::engine::timing::ProfileTiming;
use crate::errors::classify;
use crate::factory::ProfileComponents;
use crate::lifecycle::run_component;
use crate::types::ParameterMap;

const INTERVAL_POLL: Duration = Duration::from_millis(500);

/// Load-time options applied to a profile before components are created.
#[derive(Debug, Clone, Default)]
pub struct ProfileOptions {
    pub parameters: ParameterMap,
    pub scenarios: Vec<String>,
}

/// Resolves a loaded profile into its executable form: overrides, conditional sections,
/// parameter inlining, expression evaluation, scenario filtering and metadata propagation.
pub fn prepare_profile(
    mut profile: ExecutionProfile,
    options: &ProfileOptions,
    evaluator: &dyn ExpressionEvaluator,
) -> Result<ExecutionProfile> {
    profile.validate()?;
    profile.apply_parameter_overrides(&options.parameters);
    profile.evaluate_conditions(evaluator)?;
    profile.inline_parameters()?;

    fn evaluate(elements: &mut [ProfileElement], evaluator: &dyn ExpressionEvaluator) -> Result<()> {
        for element in elements {
            evaluator.evaluate(&mut element.parameters)?;
            evaluate(&mut element.components, evaluator)?;
        }
        Ok(())
    }
    evaluate(&mut profile.actions, evaluator)?;
    evaluate(&mut profile.dependencies, evaluator)?;
    evaluate(&mut profile.monitors, evaluator)?;

    if !options.scenarios.is_empty() {
        profile.filter_scenarios(&options.scenarios);
    }
    profile.propagate_metadata();
    profile.assign_categories();
    Ok(profile)
}

/// Configuration for the Profile Executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Stop on the first failed action
    pub fail_fast: bool,
    /// Grace period for monitors after actions finish
    pub exit_wait: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            exit_wait: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub iterations: u64,
    pub failed_actions: usize,
}

/// Runs a profile: dependencies once, monitors in the background, then actions in rounds.
pub struct ProfileExecutor {
    components: ProfileComponents,
    runtime: Arc<RuntimeContext>,
    minimum_execution_interval: Option<Duration>,
    config: ExecutorConfig,
}

impl ProfileExecutor {
    pub fn new(
        profile: &ExecutionProfile,
        components: ProfileComponents,
        runtime: Arc<RuntimeContext>,
        config: ExecutorConfig,
    ) -> Self {
        runtime.add_metadata(&profile.metadata);
        Self {
            components,
            runtime,
            minimum_execution_interval: profile.minimum_execution_interval,
            config,
        }
    }

    pub async fn execute(
        &self,
        timing: ProfileTiming,
        cancellation: &CancellationToken,
    ) -> Result<ExecutionSummary> {
        let token = cancellation.child_token();
        let timer = timing.deadline().map(|deadline| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(deadline) => {
                        log::info!("Profile timeout of {:?} reached, cancelling", deadline);
                        token.cancel();
                    }
                }
            })
        });

        let mut monitors = JoinSet::new();
        let outcome = self.run(timing, &token, &mut monitors).await;

        token.cancel();
        if let Some(timer) = timer {
            timer.abort();
        }
        self.wait_for_monitors(&mut monitors).await;

        let cleaned = self.runtime.run_cleanup_tasks();
        if cleaned > 0 {
            log::debug!("Ran {} runtime cleanup tasks", cleaned);
        }

        outcome
    }

    async fn run(
        &self,
        timing: ProfileTiming,
        token: &CancellationToken,
        monitors: &mut JoinSet<()>,
    ) -> Result<ExecutionSummary> {
        for dependency in &self.components.dependencies {
            if token.is_cancelled() {
                return Ok(ExecutionSummary::default());
            }
            log::info!("Installing dependency '{}'", dependency.context().type_name());
            run_component(dependency.as_ref(), token).await?;
        }

        for monitor in &self.components.monitors {
            let monitor = monitor.clone();
            let token = token.clone();
            monitors.spawn(async move {
                if let Err(e) = run_component(monitor.as_ref(), &token).await {
                    log::error!("Monitor '{}' failed: {}", monitor.context().type_name(), e);
                }
            });
        }

        if self.components.actions.is_empty() && !matches!(timing, ProfileTiming::Iterations(_)) {
            log::info!("Profile has no actions; waiting for cancellation");
            token.cancelled().await;
            return Ok(ExecutionSummary::default());
        }

        self.run_actions(timing, token).await
    }

    async fn run_actions(
        &self,
        timing: ProfileTiming,
        token: &CancellationToken,
    ) -> Result<ExecutionSummary> {
        let mut summary = ExecutionSummary::default();
        let mut round_started: Option<Instant> = None;

        while !token.is_cancelled() && !timing.is_complete(summary.iterations) {
            if let (Some(interval), Some(started)) = (self.minimum_execution_interval, round_started) {
                if !wait_for_interval(started, interval, token).await {
                    break;
                }
            }

            summary.iterations += 1;
            round_started = Some(Instant::now());
            log::info!("Profile iteration {}", summary.iterations);

            for action in &self.components.actions {
                if token.is_cancelled() {
                    break;
                }

                let context = action.context();
                context.set_parameter("ProfileIteration", summary.iterations);
                context.set_parameter("ProfileIterationStartTime", Utc::now());

                if let Err(e) = run_component(action.as_ref(), token).await {
                    summary.failed_actions += 1;
                    self.handle_failure(action.as_ref(), e)?;
                }
            }
        }

        Ok(summary)
    }

    /// Fatal reasons and fail-fast settings stop the run; anything else is logged.
    fn handle_failure(&self, action: &dyn Component, error: anyhow::Error) -> Result<()> {
        let fatal = classify(&error)
            .and_then(|e| e.reason())
            .map_or(false, |reason| reason.is_fatal());

        if fatal || self.config.fail_fast || action.context().fail_fast() {
            return Err(error);
        }

        log::error!(
            "Action '{}' failed, continuing: {}",
            action.context().type_name(),
            error
        );
        Ok(())
    }

    async fn wait_for_monitors(&self, monitors: &mut JoinSet<()>) {
        if monitors.is_empty() {
            return;
        }

        let drained = tokio::time::timeout(self.config.exit_wait, async {
            while monitors.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            log::warn!(
                "Monitors did not stop within {:?}; aborting them",
                self.config.exit_wait
            );
            monitors.abort_all();
        }
    }
}

/// Waits until `interval` has passed since `started`. Returns false when cancelled first.
async fn wait_for_interval(started: Instant, interval: Duration, token: &CancellationToken) -> bool {
    loop {
        let elapsed = started.elapsed();
        if elapsed >= interval {
            return true;
        }
        tokio::select! {
            _ = token.cancelled() => return false,
            _ = tokio::time::sleep(INTERVAL_POLL.min(interval - elapsed)) => {}
        }
    }
}
