use anyhow::Result;

use crate::definitions::ExecutionProfile;
use crate::errors::OrchestrationError;
use crate::types::ParameterMap;

const CONDITION: &str = "Condition";

/// Resolves expressions embedded in parameter values, in place.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, parameters: &mut ParameterMap) -> Result<()>;
}

impl ExecutionProfile {
    /// Selects the first conditional parameter section whose condition holds and makes its merged
    /// parameters the profile parameters. The section list is emptied either way.
    pub fn evaluate_conditions(&mut self, evaluator: &dyn ExpressionEvaluator) -> Result<bool> {
        let sections = std::mem::take(&mut self.parameters_on);

        for (index, section) in sections.iter().enumerate() {
            let mut merged = self.parameters.clone();
            merged.merge_override(section);
            evaluator.evaluate(&mut merged)?;

            let condition = merged.remove(CONDITION).ok_or_else(|| {
                OrchestrationError::schema(format!(
                    "Invalid conditional parameters. Section {} does not define a '{}'.",
                    index, CONDITION
                ))
            })?;

            let matched = condition.as_bool().ok_or_else(|| {
                OrchestrationError::schema(format!(
                    "Invalid conditional parameters. The condition '{}' of section {} does not evaluate to a boolean.",
                    condition, index
                ))
            })?;

            if matched {
                log::debug!("Conditional parameter section {} selected", index);
                self.parameters = merged;
                return Ok(true);
            }
        }

        Ok(false)
    }
}
