use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::{ErrorReason, OrchestrationError};
use crate::types::{ParameterMap, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ComponentCategory {
    #[default]
    Action,
    Dependency,
    Monitor,
}

impl ComponentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentCategory::Action => "Action",
            ComponentCategory::Dependency => "Dependency",
            ComponentCategory::Monitor => "Monitor",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "action" => Some(ComponentCategory::Action),
            "dependency" => Some(ComponentCategory::Dependency),
            "monitor" => Some(ComponentCategory::Monitor),
            _ => None,
        }
    }
}

/// One declared unit of an execution profile. Elements with children are composites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileElement {
    #[serde(rename = "Type", alias = "type")]
    pub type_name: String,

    #[serde(
        rename = "Parameters",
        alias = "parameters",
        default,
        skip_serializing_if = "ParameterMap::is_empty"
    )]
    pub parameters: ParameterMap,

    #[serde(
        rename = "Metadata",
        alias = "metadata",
        default,
        skip_serializing_if = "ParameterMap::is_empty"
    )]
    pub metadata: ParameterMap,

    #[serde(
        rename = "Components",
        alias = "components",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub components: Vec<ProfileElement>,

    // Assigned from the element's position in the profile.
    #[serde(skip)]
    pub category: ComponentCategory,
}

impl ProfileElement {
    pub fn new(type_name: impl Into<String>, parameters: ParameterMap) -> Self {
        Self {
            type_name: type_name.into(),
            parameters,
            metadata: ParameterMap::new(),
            components: Vec::new(),
            category: ComponentCategory::default(),
        }
    }

    pub fn with_children(mut self, children: Vec<ProfileElement>) -> Self {
        self.components = children;
        self
    }

    pub fn with_metadata(mut self, metadata: ParameterMap) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_composite(&self) -> bool {
        !self.components.is_empty()
    }

    pub fn scenario(&self) -> Option<String> {
        self.parameters.get_string("Scenario")
    }

    fn set_category(&mut self, category: ComponentCategory) {
        self.category = category;
        for child in &mut self.components {
            child.set_category(category);
        }
    }

    /// Copies metadata down the tree. Keys already present on a parent win over the child's.
    pub fn propagate_metadata(&mut self, inherited: &ParameterMap) {
        self.metadata.merge_override(inherited);
        let own = self.metadata.clone();
        for child in &mut self.components {
            child.propagate_metadata(&own);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    #[serde(rename = "Description", alias = "description")]
    pub description: String,

    #[serde(
        rename = "MinimumExecutionInterval",
        alias = "minimumExecutionInterval",
        default,
        skip_serializing_if = "Option::is_none",
        with = "interval_text"
    )]
    pub minimum_execution_interval: Option<Duration>,

    #[serde(rename = "Metadata", alias = "metadata", default)]
    pub metadata: ParameterMap,

    #[serde(rename = "Parameters", alias = "parameters", default)]
    pub parameters: ParameterMap,

    #[serde(
        rename = "ParametersOn",
        alias = "parametersOn",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub parameters_on: Vec<ParameterMap>,

    #[serde(rename = "Actions", alias = "actions", default)]
    pub actions: Vec<ProfileElement>,

    #[serde(rename = "Dependencies", alias = "dependencies", default)]
    pub dependencies: Vec<ProfileElement>,

    #[serde(rename = "Monitors", alias = "monitors", default)]
    pub monitors: Vec<ProfileElement>,
}

impl ExecutionProfile {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            minimum_execution_interval: None,
            metadata: ParameterMap::new(),
            parameters: ParameterMap::new(),
            parameters_on: Vec::new(),
            actions: Vec::new(),
            dependencies: Vec::new(),
            monitors: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let profile: ExecutionProfile = serde_json::from_str(json).map_err(|e| {
            OrchestrationError::schema(format!("Invalid execution profile definition. {}", e))
        })?;
        profile.prepared()
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut profile: ExecutionProfile = serde_yaml::from_str(yaml).map_err(|e| {
            OrchestrationError::schema(format!("Invalid execution profile definition. {}", e))
        })?;
        profile.normalize_references();
        profile.prepared()
    }

    /// Loads a `.json`, `.yml` or `.yaml` profile from disk.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(OrchestrationError::dependency(
                format!("Profile '{}' does not exist.", path.display()),
                ErrorReason::ProfileNotFound,
            )
            .into());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile '{}'", path.display()))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml") => {
                Self::from_yaml(&content)
            }
            _ => Self::from_json(&content),
        }
    }

    fn prepared(mut self) -> Result<Self> {
        self.validate()?;
        self.assign_categories();
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            return Err(OrchestrationError::schema(
                "Invalid execution profile definition. A description is required.",
            )
            .into());
        }

        for section in &self.parameters_on {
            if !section.contains_key("Condition") {
                return Err(OrchestrationError::schema(
                    "Invalid execution profile definition. Every conditional parameter section must define a 'Condition'.",
                )
                .into());
            }
        }

        fn check(elements: &[ProfileElement]) -> Result<()> {
            for element in elements {
                if element.type_name.trim().is_empty() {
                    return Err(OrchestrationError::schema(
                        "Invalid execution profile definition. Every component must define a type.",
                    )
                    .into());
                }
                check(&element.components)?;
            }
            Ok(())
        }

        check(&self.actions)?;
        check(&self.dependencies)?;
        check(&self.monitors)
    }

    pub fn assign_categories(&mut self) {
        for element in &mut self.actions {
            element.set_category(ComponentCategory::Action);
        }
        for element in &mut self.dependencies {
            element.set_category(ComponentCategory::Dependency);
        }
        for element in &mut self.monitors {
            element.set_category(ComponentCategory::Monitor);
        }
    }

    /// Merges `other` into this profile. This profile's description, parameters and metadata
    /// win; the other profile's components are appended in order.
    pub fn merge(&mut self, other: ExecutionProfile) {
        self.parameters.merge_missing(&other.parameters);
        self.metadata.merge_missing(&other.metadata);
        if self.minimum_execution_interval.is_none() {
            self.minimum_execution_interval = other.minimum_execution_interval;
        }
        self.parameters_on.extend(other.parameters_on);
        self.actions.extend(other.actions);
        self.dependencies.extend(other.dependencies);
        self.monitors.extend(other.monitors);
        self.assign_categories();
    }

    /// Overrides profile-level parameters and any component parameter already declared
    /// under the same name.
    pub fn apply_parameter_overrides(&mut self, overrides: &ParameterMap) {
        if overrides.is_empty() {
            return;
        }

        self.parameters.merge_override(overrides);

        fn apply(elements: &mut [ProfileElement], overrides: &ParameterMap) {
            for element in elements {
                for (key, value) in overrides.iter() {
                    if element.parameters.contains_key(key) {
                        element.parameters.insert(key, value.clone());
                    }
                }
                apply(&mut element.components, overrides);
            }
        }

        apply(&mut self.actions, overrides);
        apply(&mut self.dependencies, overrides);
        apply(&mut self.monitors, overrides);
    }

    pub fn propagate_metadata(&mut self) {
        let metadata = self.metadata.clone();
        for element in self
            .actions
            .iter_mut()
            .chain(self.dependencies.iter_mut())
            .chain(self.monitors.iter_mut())
        {
            element.propagate_metadata(&metadata);
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &ProfileElement> {
        self.actions
            .iter()
            .chain(self.dependencies.iter())
            .chain(self.monitors.iter())
    }

    pub(crate) fn elements_mut(&mut self) -> impl Iterator<Item = &mut ProfileElement> {
        self.actions
            .iter_mut()
            .chain(self.dependencies.iter_mut())
            .chain(self.monitors.iter_mut())
    }

    // YAML profiles use `$.parameters.x`; inlining works on the JSON form.
    fn normalize_references(&mut self) {
        fn normalize(elements: &mut [ProfileElement]) {
            for element in elements {
                for (_, value) in element.parameters.iter_mut() {
                    if let Scalar::String(text) = value {
                        if let Some(name) = text.strip_prefix("$.parameters.") {
                            *text = format!("$.Parameters.{}", name);
                        }
                    }
                }
                normalize(&mut element.components);
            }
        }

        normalize(&mut self.actions);
        normalize(&mut self.dependencies);
        normalize(&mut self.monitors);
    }
}

mod interval_text {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    use crate::types::Scalar;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => {
                let total = duration.as_secs();
                serializer.serialize_str(&format!(
                    "{:02}:{:02}:{:02}",
                    total / 3600,
                    (total % 3600) / 60,
                    total % 60
                ))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let raw: Option<Scalar> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(scalar) => scalar.as_duration().map(Some).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid execution interval '{}'", scalar))
            }),
        }
    }
}
