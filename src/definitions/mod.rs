pub mod conditions;
pub mod evaluator;
pub mod inline;
pub mod scenarios;
pub mod schema;

pub use conditions::ExpressionEvaluator;
pub use evaluator::ProfileExpressionEvaluator;
pub use inline::parameter_reference;
pub use scenarios::split_scenarios;
pub use schema::{ComponentCategory, ExecutionProfile, ProfileElement};
