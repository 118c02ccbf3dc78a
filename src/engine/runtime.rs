use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::types::{EnvironmentLayout, Instructions, ParameterMap, PlatformSpecifics};

pub type RuntimeTask = Box<dyn FnOnce() -> Result<()> + Send>;

/// Receives instructions pushed to this agent.
#[async_trait]
pub trait InstructionsSubscriber: Send + Sync {
    async fn on_instructions(&self, instructions: &Instructions) -> Result<()>;
}

#[derive(Default)]
struct RuntimeState {
    cleanup_tasks: Vec<RuntimeTask>,
    exit_tasks: Vec<RuntimeTask>,
    subscribers: Vec<Arc<dyn InstructionsSubscriber>>,
    metadata: ParameterMap,
}

/// Process-level state shared by every component and protocol surface of one agent.
pub struct RuntimeContext {
    agent_id: String,
    experiment_id: Uuid,
    layout: Option<EnvironmentLayout>,
    host_os: String,
    host_arch: String,
    online: AtomicBool,
    state: Mutex<RuntimeState>,
    cancellation: CancellationToken,
}

impl RuntimeContext {
    pub fn new(agent_id: impl Into<String>, experiment_id: Uuid) -> Self {
        Self {
            agent_id: agent_id.into(),
            experiment_id,
            layout: None,
            host_os: std::env::consts::OS.to_string(),
            host_arch: std::env::consts::ARCH.to_string(),
            online: AtomicBool::new(false),
            state: Mutex::new(RuntimeState::default()),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_layout(mut self, layout: EnvironmentLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Overrides the host OS/architecture names (`std::env::consts` form).
    pub fn with_host(mut self, os: impl Into<String>, arch: impl Into<String>) -> Self {
        self.host_os = os.into();
        self.host_arch = arch.into();
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn experiment_id(&self) -> Uuid {
        self.experiment_id
    }

    pub fn layout(&self) -> Option<&EnvironmentLayout> {
        self.layout.as_ref()
    }

    pub fn platform(&self) -> Result<PlatformSpecifics> {
        PlatformSpecifics::from_names(&self.host_os, &self.host_arch)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    /// Marks the eventing surface ready (or not) to accept instructions.
    pub fn set_online(&self, online: bool) {
        let _guard = self.state.lock();
        self.online.store(online, Ordering::Relaxed);
    }

    pub fn add_metadata(&self, metadata: &ParameterMap) {
        self.state.lock().metadata.merge_override(metadata);
    }

    pub fn metadata(&self) -> ParameterMap {
        self.state.lock().metadata.clone()
    }

    pub fn add_cleanup_task(&self, task: RuntimeTask) {
        self.state.lock().cleanup_tasks.push(task);
    }

    pub fn add_exit_task(&self, task: RuntimeTask) {
        self.state.lock().exit_tasks.push(task);
    }

    /// Runs and drains cleanup tasks. Failures are logged.
    pub fn run_cleanup_tasks(&self) -> usize {
        let tasks = std::mem::take(&mut self.state.lock().cleanup_tasks);
        run_tasks(tasks, "cleanup")
    }

    /// Runs and drains exit tasks. Failures are logged.
    pub fn run_exit_tasks(&self) -> usize {
        let tasks = std::mem::take(&mut self.state.lock().exit_tasks);
        run_tasks(tasks, "exit")
    }

    pub fn subscribe(&self, subscriber: Arc<dyn InstructionsSubscriber>) {
        self.state.lock().subscribers.push(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Dispatches instructions to every subscriber in its own task.
    ///
    /// A failing subscriber is logged and does not affect the others.
    pub fn publish(&self, instructions: Instructions) -> Vec<JoinHandle<()>> {
        let subscribers = self.state.lock().subscribers.clone();
        let instructions = Arc::new(instructions);

        subscribers
            .into_iter()
            .map(|subscriber| {
                let instructions = instructions.clone();
                tokio::spawn(async move {
                    if let Err(e) = subscriber.on_instructions(&instructions).await {
                        log::warn!(
                            "Instructions subscriber failed handling '{}': {}",
                            instructions.instructions_type.as_str(),
                            e
                        );
                    }
                })
            })
            .collect()
    }

    /// Dispatches instructions and waits until every subscriber has finished.
    pub async fn publish_and_wait(&self, instructions: Instructions) {
        let handles = self.publish(instructions);
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                log::warn!("Instructions subscriber task aborted: {}", e);
            }
        }
    }
}

fn run_tasks(tasks: Vec<RuntimeTask>, kind: &str) -> usize {
    let total = tasks.len();
    for task in tasks {
        if let Err(e) = task() {
            log::warn!("Runtime {} task failed: {}", kind, e);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InstructionsType;
    use std::sync::atomic::AtomicUsize;

    struct CountingSubscriber {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl InstructionsSubscriber for CountingSubscriber {
        async fn on_instructions(&self, _instructions: &Instructions) -> Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSubscriber;

    #[async_trait]
    impl InstructionsSubscriber for FailingSubscriber {
        async fn on_instructions(&self, _instructions: &Instructions) -> Result<()> {
            anyhow::bail!("subscriber failure")
        }
    }

    #[tokio::test]
    async fn test_failing_subscriber_does_not_block_others() {
        let runtime = RuntimeContext::new("agent", Uuid::new_v4());
        let counter = Arc::new(CountingSubscriber {
            seen: AtomicUsize::new(0),
        });

        runtime.subscribe(Arc::new(FailingSubscriber));
        runtime.subscribe(counter.clone());
        runtime.subscribe(counter.clone());

        runtime
            .publish_and_wait(Instructions::new(
                InstructionsType::ClientServerReset,
                ParameterMap::new(),
            ))
            .await;

        assert_eq!(counter.seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_online_flag() {
        let runtime = RuntimeContext::new("agent", Uuid::new_v4());
        assert!(!runtime.is_online());
        runtime.set_online(true);
        assert!(runtime.is_online());
    }

    #[test]
    fn test_cleanup_tasks_are_best_effort_and_drained() {
        let runtime = RuntimeContext::new("agent", Uuid::new_v4());
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = ran.clone();
        runtime.add_cleanup_task(Box::new(|| -> Result<()> { anyhow::bail!("first fails") }));
        runtime.add_cleanup_task(Box::new(move || -> Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        assert_eq!(runtime.run_cleanup_tasks(), 2);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.run_cleanup_tasks(), 0);
    }

    #[test]
    fn test_tasks_may_call_back_into_the_runtime() {
        let runtime = Arc::new(RuntimeContext::new("agent", Uuid::new_v4()));
        runtime.set_online(true);

        let inner = runtime.clone();
        runtime.add_cleanup_task(Box::new(move || -> Result<()> {
            inner.set_online(false);
            inner.add_metadata(&[("CleanedUp", true)].into_iter().collect::<ParameterMap>());
            let again = inner.clone();
            inner.add_exit_task(Box::new(move || -> Result<()> {
                again.add_cleanup_task(Box::new(|| -> Result<()> { Ok(()) }));
                Ok(())
            }));
            Ok(())
        }));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let worker = runtime.clone();
        std::thread::spawn(move || {
            let cleaned = worker.run_cleanup_tasks();
            let exited = worker.run_exit_tasks();
            let _ = done_tx.send((cleaned, exited));
        });

        let (cleaned, exited) = done_rx
            .recv_timeout(std::time::Duration::from_secs(3))
            .expect("tasks finished without deadlocking");
        assert_eq!((cleaned, exited), (1, 1));
        assert!(!runtime.is_online());
        assert_eq!(runtime.metadata().get_bool("CleanedUp"), Some(true));
        assert_eq!(runtime.run_cleanup_tasks(), 1);
    }

    #[test]
    fn test_host_override() {
        let runtime = RuntimeContext::new("agent", Uuid::new_v4()).with_host("linux", "x86_64");
        assert_eq!(runtime.platform().unwrap().name(), "linux-x64");
    }
}
