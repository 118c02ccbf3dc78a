use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ComponentState {
    #[default]
    Created,
    Validating,
    Initializing,
    Executing,
    CleaningUp,
    Succeeded,
    Failed,
    Cancelled,
}

impl ComponentState {
    pub fn as_str(&self) -> &str {
        match self {
            ComponentState::Created => "Created",
            ComponentState::Validating => "Validating",
            ComponentState::Initializing => "Initializing",
            ComponentState::Executing => "Executing",
            ComponentState::CleaningUp => "CleaningUp",
            ComponentState::Succeeded => "Succeeded",
            ComponentState::Failed => "Failed",
            ComponentState::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ComponentState::Succeeded | ComponentState::Failed | ComponentState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Validate,
    Initialize,
    Execute,
    Cleanup,
    Complete,
    Fail,
    Cancel,
    // Not applicable on this host or role.
    Skip,
}

pub struct ComponentStateMachine;

impl ComponentStateMachine {
    pub fn transition(state: ComponentState, event: LifecycleEvent) -> Result<ComponentState> {
        let next = match (state, event) {
            (s, LifecycleEvent::Validate) if s == ComponentState::Created || s.is_terminal() => {
                ComponentState::Validating
            }
            (ComponentState::Validating, LifecycleEvent::Initialize) => ComponentState::Initializing,
            (ComponentState::Initializing, LifecycleEvent::Execute) => ComponentState::Executing,

            (
                ComponentState::Validating | ComponentState::Initializing | ComponentState::Executing,
                LifecycleEvent::Cleanup,
            ) => ComponentState::CleaningUp,

            (ComponentState::CleaningUp, LifecycleEvent::Complete) => ComponentState::Succeeded,
            (ComponentState::CleaningUp, LifecycleEvent::Fail) => ComponentState::Failed,
            (ComponentState::CleaningUp, LifecycleEvent::Cancel) => ComponentState::Cancelled,

            (s, LifecycleEvent::Skip) if s == ComponentState::Created || s.is_terminal() => {
                ComponentState::Succeeded
            }

            _ => {
                return Err(anyhow!(
                    "Invalid component state transition from {:?} with event {:?}",
                    state,
                    event
                ));
            }
        };

        Ok(next)
    }
}
