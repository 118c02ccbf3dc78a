pub mod parallel;
pub mod parallel_loop;
pub mod sequential;
pub mod synchronize;
pub mod wait;

pub use parallel::ParallelExecution;
pub use parallel_loop::ParallelLoopExecution;
pub use sequential::SequentialExecution;
pub use synchronize::StateSynchronization;
pub use wait::WaitExecutor;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::client::ApiClientManager;
use crate::definitions::{ExpressionEvaluator, ProfileExpressionEvaluator};
use crate::engine::runtime::{RuntimeContext, RuntimeTask};
use crate::errors::OrchestrationError;
use crate::lifecycle::metrics::MetricSink;
use crate::lifecycle::state_machine::{ComponentState, ComponentStateMachine, LifecycleEvent};
use crate::types::{ParameterMap, Scalar};

/// Services handed to every component at construction.
#[derive(Clone)]
pub struct ComponentDependencies {
    pub runtime: Arc<RuntimeContext>,
    pub api_clients: Arc<ApiClientManager>,
    pub evaluator: Arc<dyn ExpressionEvaluator>,
    pub metrics: Option<Arc<dyn MetricSink>>,
}

impl ComponentDependencies {
    pub fn new(runtime: Arc<RuntimeContext>, api_clients: Arc<ApiClientManager>) -> Self {
        Self {
            runtime,
            api_clients,
            evaluator: Arc::new(ProfileExpressionEvaluator::default()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }
}

/// State shared by every component: identity, resolved parameters and lifecycle state.
pub struct ComponentContext {
    type_name: String,
    parameters: RwLock<ParameterMap>,
    metadata: ParameterMap,
    seed: Option<u64>,
    dependencies: ComponentDependencies,
    state: Mutex<ComponentState>,
    cleanup_tasks: Mutex<Vec<RuntimeTask>>,
}

impl ComponentContext {
    pub fn new(
        type_name: impl Into<String>,
        parameters: ParameterMap,
        dependencies: ComponentDependencies,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            parameters: RwLock::new(parameters),
            metadata: ParameterMap::new(),
            seed: None,
            dependencies,
            state: Mutex::new(ComponentState::Created),
            cleanup_tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn dependencies(&self) -> &ComponentDependencies {
        &self.dependencies
    }

    pub fn runtime(&self) -> &RuntimeContext {
        &self.dependencies.runtime
    }

    pub fn agent_id(&self) -> &str {
        self.dependencies.runtime.agent_id()
    }

    pub fn experiment_id(&self) -> uuid::Uuid {
        self.dependencies.runtime.experiment_id()
    }

    pub fn parameter(&self, key: &str) -> Option<Scalar> {
        self.parameters.read().get(key).cloned()
    }

    pub fn parameters(&self) -> ParameterMap {
        self.parameters.read().clone()
    }

    pub fn set_parameter(&self, key: &str, value: impl Into<Scalar>) {
        self.parameters.write().insert(key, value);
    }

    pub fn metadata(&self) -> &ParameterMap {
        &self.metadata
    }

    pub fn set_metadata(&mut self, metadata: ParameterMap) {
        self.metadata = metadata;
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = Some(seed);
    }

    pub fn scenario(&self) -> Option<String> {
        self.parameter("Scenario").map(|s| s.to_string())
    }

    pub fn fail_fast(&self) -> bool {
        self.parameter("FailFast")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Roles from the `Role` or `Roles` parameter, split on `,` or `;`.
    pub fn roles(&self) -> Vec<String> {
        let parameters = self.parameters.read();
        parameters
            .get("Roles")
            .or_else(|| parameters.get("Role"))
            .map(|v| split_list(&v.to_string()))
            .unwrap_or_default()
    }

    /// `platform-architecture` names from the `SupportedPlatforms` parameter.
    pub fn supported_platforms(&self) -> Vec<String> {
        self.parameter("SupportedPlatforms")
            .map(|v| split_list(&v.to_string()))
            .unwrap_or_default()
    }

    pub fn state(&self) -> ComponentState {
        *self.state.lock()
    }

    pub fn transition(&self, event: LifecycleEvent) -> Result<ComponentState> {
        let mut state = self.state.lock();
        *state = ComponentStateMachine::transition(*state, event)?;
        Ok(*state)
    }

    pub fn add_cleanup_task(&self, task: RuntimeTask) {
        self.cleanup_tasks.lock().push(task);
    }

    pub(crate) fn take_cleanup_tasks(&self) -> Vec<RuntimeTask> {
        std::mem::take(&mut *self.cleanup_tasks.lock())
    }

    /// Default applicability: supported platforms first, then role gating when the layout has
    /// two or more instances and roles are declared.
    pub fn is_applicable(&self) -> bool {
        let platforms = self.supported_platforms();
        if !platforms.is_empty() {
            let Ok(host) = self.runtime().platform() else {
                return false;
            };
            let name = host.name();
            if !platforms.iter().any(|p| p.eq_ignore_ascii_case(&name)) {
                return false;
            }
        }

        let roles = self.roles();
        match self.runtime().layout() {
            Some(layout) if layout.client_count() >= 2 && !roles.is_empty() => layout
                .instance_for(self.agent_id())
                .and_then(|instance| instance.role.as_deref())
                .map(|role| roles.iter().any(|r| r.eq_ignore_ascii_case(role)))
                .unwrap_or(false),
            _ => true,
        }
    }
}

/// Wraps a child's failure as a workload failure naming the child. A reason already carried by
/// the child error is kept.
pub(crate) fn child_failure(child: &dyn Component, error: anyhow::Error) -> anyhow::Error {
    let reason = crate::errors::classify(&error)
        .and_then(|e| e.reason())
        .unwrap_or(crate::errors::ErrorReason::WorkloadFailed);

    OrchestrationError::workload(
        format!(
            "Component '{}' failed. {}",
            child.context().type_name(),
            error
        ),
        reason,
    )
    .into()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// A runtime unit created from a profile element. Leaf components implement `execute`;
/// composites also own children.
#[async_trait]
pub trait Component: Send + Sync {
    fn context(&self) -> &ComponentContext;

    fn context_mut(&mut self) -> &mut ComponentContext;

    fn children(&self) -> &[Arc<dyn Component>] {
        &[]
    }

    fn add_child(&mut self, _child: Arc<dyn Component>) -> Result<()> {
        Err(anyhow!(
            "Component '{}' is not a composite and cannot hold child components",
            self.context().type_name()
        ))
    }

    fn is_composite(&self) -> bool {
        false
    }

    /// Whether the component should run on this host and role.
    fn is_supported(&self) -> bool {
        self.context().is_applicable()
    }

    /// Composites leave outcome metrics to their children.
    fn emits_outcome_metrics(&self) -> bool {
        !self.is_composite()
    }

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    async fn initialize(&self, _cancellation: &CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, cancellation: &CancellationToken) -> Result<()>;

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_roles_parameter_forms() {
        let context = ComponentContext::new(
            "Stub",
            [("Roles", "Client; Server,Proxy")].into_iter().collect(),
            local_dependencies(),
        );
        assert_eq!(context.roles(), vec!["Client", "Server", "Proxy"]);

        let context = ComponentContext::new(
            "Stub",
            [("Role", "Server")].into_iter().collect(),
            local_dependencies(),
        );
        assert_eq!(context.roles(), vec!["Server"]);
    }

    #[test]
    fn test_role_gating_in_multi_instance_layout() {
        let runtime = RuntimeContext::new("agent-1", uuid::Uuid::new_v4())
            .with_layout(client_server_layout());
        let deps = dependencies(runtime);

        let server_only = ComponentContext::new(
            "Stub",
            [("Role", "Server")].into_iter().collect(),
            deps.clone(),
        );
        let client_only = ComponentContext::new(
            "Stub",
            [("Role", "Client")].into_iter().collect(),
            deps.clone(),
        );
        let any_role = ComponentContext::new("Stub", ParameterMap::new(), deps);

        assert!(!server_only.is_applicable());
        assert!(client_only.is_applicable());
        assert!(any_role.is_applicable());
    }

    #[test]
    fn test_single_instance_layout_ignores_roles() {
        let layout = crate::types::EnvironmentLayout::new(vec![crate::types::ClientInstance::new(
            "agent-1",
            "127.0.0.1",
            Some("Client"),
        )]);
        let runtime = RuntimeContext::new("agent-1", uuid::Uuid::new_v4()).with_layout(layout);
        let context = ComponentContext::new(
            "Stub",
            [("Role", "Server")].into_iter().collect(),
            dependencies(runtime),
        );
        assert!(context.is_applicable());
    }

    #[test]
    fn test_supported_platforms() {
        let linux = ComponentContext::new(
            "Stub",
            [("SupportedPlatforms", "linux-x64,linux-arm64")].into_iter().collect(),
            local_dependencies(),
        );
        let windows = ComponentContext::new(
            "Stub",
            [("SupportedPlatforms", "win-x64")].into_iter().collect(),
            local_dependencies(),
        );
        assert!(linux.is_applicable());
        assert!(!windows.is_applicable());
    }
}
