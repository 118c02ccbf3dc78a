pub mod instructions;
pub mod layout;
pub mod parameters;
pub mod platform;
pub mod state;

pub use instructions::{Instructions, InstructionsComponent, InstructionsType};
pub use layout::{ClientInstance, EnvironmentLayout};
pub use parameters::{ParameterMap, Scalar};
pub use platform::{Architecture, Platform, PlatformSpecifics};
pub use state::{ClientServerState, ClientServerStatus, StateItem};

pub type AgentId = String;
pub type ExperimentId = uuid::Uuid;
