use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

use crate::definitions::{ExecutionProfile, ProfileElement};
use crate::errors::OrchestrationError;
use crate::types::{ParameterMap, Scalar};

fn reference_expression() -> &'static Regex {
    static EXPRESSION: OnceLock<Regex> = OnceLock::new();
    EXPRESSION.get_or_init(|| {
        Regex::new(r"^\s*\$\.[Pp]arameters\.([A-Za-z0-9_\-\.]+)\s*$").expect("valid reference pattern")
    })
}

/// Returns the referenced profile parameter name when `value` is a `$.Parameters.<name>` reference.
pub fn parameter_reference(value: &Scalar) -> Option<&str> {
    match value {
        Scalar::String(text) => reference_expression()
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str()),
        _ => None,
    }
}

impl ExecutionProfile {
    /// Replaces every `$.Parameters.<name>` component parameter with the profile parameter value.
    pub fn inline_parameters(&mut self) -> Result<()> {
        let parameters = self.parameters.clone();
        for element in self.elements_mut() {
            inline_element(element, &parameters)?;
        }
        Ok(())
    }
}

fn inline_element(element: &mut ProfileElement, parameters: &ParameterMap) -> Result<()> {
    for (key, value) in element.parameters.iter_mut() {
        let Some(name) = parameter_reference(value) else {
            continue;
        };

        match parameters.get(name) {
            Some(resolved) => *value = resolved.clone(),
            None => {
                return Err(OrchestrationError::schema(format!(
                    "Invalid parameter reference. The '{}' component parameter '{}' references a profile parameter '{}' that is not defined.",
                    element.type_name, key, name
                ))
                .into());
            }
        }
    }

    for child in &mut element.components {
        inline_element(child, parameters)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ExecutionProfile {
        let mut profile = ExecutionProfile::new("inline");
        profile.parameters.insert("Threads", 8);
        profile.parameters.insert("Scenario", "fio_randread");

        let child = ProfileElement::new(
            "WaitExecutor",
            [("Scenario", "$.Parameters.scenario")].into_iter().collect(),
        );
        let parent = ProfileElement::new(
            "SequentialExecution",
            [("Threads", "$.Parameters.Threads"), ("LoopCount", "2")]
                .into_iter()
                .collect(),
        )
        .with_children(vec![child]);

        profile.actions.push(parent);
        profile
    }

    #[test]
    fn test_inlines_recursively() {
        let mut profile = profile();
        profile.inline_parameters().unwrap();

        let parent = &profile.actions[0];
        assert_eq!(parent.parameters.get("Threads"), Some(&Scalar::Integer(8)));
        assert_eq!(parent.parameters.get("LoopCount"), Some(&Scalar::from("2")));
        assert_eq!(
            parent.components[0].parameters.get_string("Scenario"),
            Some("fio_randread".to_string())
        );
    }

    #[test]
    fn test_inlining_twice_is_a_no_op() {
        let mut profile = profile();
        profile.inline_parameters().unwrap();
        let once = profile.clone();

        profile.inline_parameters().unwrap();

        assert_eq!(profile, once);
        let remaining = profile
            .elements()
            .flat_map(|e| e.parameters.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>())
            .filter(|v| parameter_reference(v).is_some())
            .count();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_unresolvable_reference() {
        let mut profile = ExecutionProfile::new("missing");
        profile.dependencies.push(ProfileElement::new(
            "WaitExecutor",
            [("Duration", "$.Parameters.Missing")].into_iter().collect(),
        ));

        let err = profile.inline_parameters().unwrap_err();
        let message = err.to_string();
        let err = err.downcast_ref::<OrchestrationError>().unwrap();

        assert_eq!(err.kind(), "Schema");
        assert!(message.contains("WaitExecutor"));
        assert!(message.contains("Duration"));
        assert!(message.contains("Missing"));
    }
}
