pub mod types;
pub mod errors;
pub mod definitions;
pub mod lifecycle;
pub mod components;
pub mod factory;
pub mod engine;
pub mod client;
pub mod storage;
pub mod api;
pub mod config;

pub use config::Config;
pub use errors::{ErrorReason, OrchestrationError};
pub use types::*;
