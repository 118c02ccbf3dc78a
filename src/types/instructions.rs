use serde::{Deserialize, Serialize};

use crate::definitions::ProfileElement;
use crate::types::ParameterMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InstructionsType {
    #[default]
    Undefined,
    Profiling,
    ClientServerReset,
    ClientServerStartExecution,
    ClientServerStartStopExecution,
    ClientServerExit,
}

impl InstructionsType {
    pub fn as_str(&self) -> &str {
        match self {
            InstructionsType::Undefined => "Undefined",
            InstructionsType::Profiling => "Profiling",
            InstructionsType::ClientServerReset => "ClientServerReset",
            InstructionsType::ClientServerStartExecution => "ClientServerStartExecution",
            InstructionsType::ClientServerStartStopExecution => "ClientServerStartStopExecution",
            InstructionsType::ClientServerExit => "ClientServerExit",
        }
    }
}

/// Component carried inside instructions for remote invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionsComponent {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub parameters: ParameterMap,
}

impl InstructionsComponent {
    pub fn to_profile_element(&self) -> ProfileElement {
        ProfileElement::new(self.type_name.clone(), self.parameters.clone())
    }
}

/// A one-shot typed command pushed from one agent to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instructions {
    #[serde(rename = "type")]
    pub instructions_type: InstructionsType,
    #[serde(default)]
    pub properties: ParameterMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<InstructionsComponent>,
}

impl Instructions {
    pub fn new(instructions_type: InstructionsType, properties: ParameterMap) -> Self {
        Self {
            instructions_type,
            properties,
            component: None,
        }
    }

    pub fn with_component(mut self, element: &ProfileElement) -> Self {
        self.component = Some(InstructionsComponent {
            type_name: element.type_name.clone(),
            parameters: element.parameters.clone(),
        });
        self
    }
}

impl PartialEq for Instructions {
    fn eq(&self, other: &Self) -> bool {
        self.instructions_type == other.instructions_type && self.properties == other.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instructions_wire_shape() {
        let properties: ParameterMap = [("Duration", 60)].into_iter().collect();
        let element = ProfileElement::new("WaitExecutor", properties.clone());
        let instructions =
            Instructions::new(InstructionsType::ClientServerStartExecution, properties)
                .with_component(&element);

        let json = serde_json::to_value(&instructions).unwrap();
        assert_eq!(json["type"], "ClientServerStartExecution");
        assert_eq!(json["properties"]["Duration"], 60);
        assert_eq!(json["component"]["type"], "WaitExecutor");
    }

    #[test]
    fn test_equality_ignores_component() {
        let a = Instructions::new(InstructionsType::ClientServerReset, ParameterMap::new());
        let b = a
            .clone()
            .with_component(&ProfileElement::new("WaitExecutor", ParameterMap::new()));
        assert_eq!(a, b);

        let c = Instructions::new(InstructionsType::ClientServerExit, ParameterMap::new());
        assert_ne!(a, c);
    }
}
