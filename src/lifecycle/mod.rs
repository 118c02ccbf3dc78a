pub mod metrics;
pub mod state_machine;

pub use metrics::{LogMetricSink, MemoryMetricSink, MetricSink, Outcome, OutcomeMetric};
pub use state_machine::{ComponentState, ComponentStateMachine, LifecycleEvent};

use anyhow::Result;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::components::Component;

/// Runs one component through validate, initialize, execute and cleanup.
///
/// Unsupported hosts fail before anything runs. Components that are not applicable to this
/// host or role are skipped and report success. Errors from the body surface after cleanup,
/// unless cancellation was requested, in which case the run ends quietly.
pub async fn run_component(component: &dyn Component, cancellation: &CancellationToken) -> Result<()> {
    let context = component.context();
    context.runtime().platform()?;

    if !component.is_supported() {
        log::info!(
            "{}: not supported on this host or role, skipping",
            context.type_name()
        );
        context.transition(LifecycleEvent::Skip)?;
        return Ok(());
    }

    let start_time = Utc::now();
    let outcome = run_stages(component, cancellation).await;
    let end_time = Utc::now();

    context.transition(LifecycleEvent::Cleanup)?;
    if let Err(e) = component.cleanup().await {
        log::warn!("{}: cleanup failed: {}", context.type_name(), e);
    }
    for task in context.take_cleanup_tasks() {
        if let Err(e) = task() {
            log::warn!("{}: cleanup task failed: {}", context.type_name(), e);
        }
    }

    if component.emits_outcome_metrics() {
        if let Some(sink) = &context.dependencies().metrics {
            sink.record(&OutcomeMetric {
                outcome: if outcome.is_ok() {
                    Outcome::Succeeded
                } else {
                    Outcome::Failed
                },
                component: context.type_name().to_string(),
                scenario: context.scenario(),
                agent_id: context.agent_id().to_string(),
                experiment_id: context.experiment_id(),
                start_time,
                end_time,
            });
        }
    }

    match outcome {
        Ok(()) if cancellation.is_cancelled() => {
            context.transition(LifecycleEvent::Cancel)?;
            Ok(())
        }
        Ok(()) => {
            context.transition(LifecycleEvent::Complete)?;
            Ok(())
        }
        Err(e) if cancellation.is_cancelled() => {
            log::debug!(
                "{}: error during cancellation ignored: {}",
                context.type_name(),
                e
            );
            context.transition(LifecycleEvent::Cancel)?;
            Ok(())
        }
        Err(e) => {
            context.transition(LifecycleEvent::Fail)?;
            Err(e)
        }
    }
}

async fn run_stages(component: &dyn Component, cancellation: &CancellationToken) -> Result<()> {
    let context = component.context();

    context.transition(LifecycleEvent::Validate)?;
    component.validate()?;

    context.transition(LifecycleEvent::Initialize)?;
    component.initialize(cancellation).await?;

    context.transition(LifecycleEvent::Execute)?;
    component.execute(cancellation).await
}
