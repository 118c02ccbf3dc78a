use serde::{Deserialize, Serialize};

/// Envelope around a caller-defined state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateItem<T = serde_json::Value> {
    pub id: String,
    pub definition: T,
}

impl<T> StateItem<T> {
    pub fn new(id: impl Into<String>, definition: T) -> Self {
        Self {
            id: id.into(),
            definition,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClientServerStatus {
    #[default]
    Undefined,
    Ready,
    ExecutionStarted,
    ExecutionCompleted,
    Failed,
    ResetCompleted,
    ResetInProgress,
}

/// State a server-role agent publishes for its clients.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientServerState {
    pub status: ClientServerStatus,
}

impl ClientServerState {
    pub fn new(status: ClientServerStatus) -> Self {
        Self { status }
    }
}
