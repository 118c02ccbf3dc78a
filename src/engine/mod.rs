pub mod executor;
pub mod runtime;
pub mod timing;

pub use executor::{prepare_profile, ExecutionSummary, ExecutorConfig, ProfileExecutor, ProfileOptions};
pub use runtime::{InstructionsSubscriber, RuntimeContext, RuntimeTask};
pub use timing::ProfileTiming;
