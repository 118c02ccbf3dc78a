use anyhow::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::components::{
    Component, ComponentDependencies, ParallelExecution, ParallelLoopExecution,
    SequentialExecution, StateSynchronization, WaitExecutor,
};
use crate::definitions::{ExecutionProfile, ProfileElement};
use crate::errors::OrchestrationError;
use crate::types::{ParameterMap, Scalar};

/// Builds a component from its dependencies and resolved parameters.
pub type ComponentConstructor =
    fn(ComponentDependencies, ParameterMap) -> Result<Box<dyn Component>>;

fn boxed<C: Component + 'static>(component: C) -> Result<Box<dyn Component>> {
    Ok(Box::new(component))
}

/// Type-name to constructor table. Every type is reachable by its qualified name
/// (`crate::Type`) and its short name; the first registration of a name wins.
#[derive(Default)]
pub struct ComponentRegistry {
    constructors: RwLock<HashMap<String, ComponentConstructor>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_defaults();
        registry
    }

    /// Process-wide registry, populated with the built-in components on first use.
    pub fn global() -> Arc<ComponentRegistry> {
        static GLOBAL: OnceLock<Arc<ComponentRegistry>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(ComponentRegistry::with_defaults()))
            .clone()
    }

    pub fn register(&self, qualified_name: &str, constructor: ComponentConstructor) {
        let short_name = qualified_name
            .rsplit([':', '.'])
            .next()
            .unwrap_or(qualified_name);

        let mut constructors = self.constructors.write();
        for name in [qualified_name, short_name] {
            constructors.entry(name.to_string()).or_insert(constructor);
        }
    }

    pub fn register_defaults(&self) {
        self.register("tandem::SequentialExecution", |d, p| {
            boxed(SequentialExecution::new(d, p))
        });
        self.register("tandem::ParallelLoopExecution", |d, p| {
            boxed(ParallelLoopExecution::new(d, p))
        });
        self.register("tandem::ParallelExecution", |d, p| {
            boxed(ParallelExecution::new(d, p))
        });
        self.register("tandem::WaitExecutor", |d, p| boxed(WaitExecutor::new(d, p)));
        self.register("tandem::StateSynchronization", |d, p| {
            boxed(StateSynchronization::new(d, p))
        });
    }

    pub fn resolve(&self, type_name: &str) -> Option<ComponentConstructor> {
        self.constructors.read().get(type_name).copied()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.read().contains_key(type_name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FactoryConfig {
    pub fail_fast: bool,
    pub log_to_file: bool,
    pub seed: Option<u64>,
}

/// Runtime components built from the three sections of a profile.
#[derive(Default)]
pub struct ProfileComponents {
    pub actions: Vec<Arc<dyn Component>>,
    pub dependencies: Vec<Arc<dyn Component>>,
    pub monitors: Vec<Arc<dyn Component>>,
}

pub struct ComponentFactory {
    registry: Arc<ComponentRegistry>,
    dependencies: ComponentDependencies,
    config: FactoryConfig,
}

impl ComponentFactory {
    pub fn new(dependencies: ComponentDependencies, config: FactoryConfig) -> Self {
        Self {
            registry: ComponentRegistry::global(),
            dependencies,
            config,
        }
    }

    pub fn with_registry(mut self, registry: Arc<ComponentRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn create_component(&self, element: &ProfileElement) -> Result<Arc<dyn Component>> {
        Ok(Arc::from(self.build(element)?))
    }

    pub fn create_profile_components(&self, profile: &ExecutionProfile) -> Result<ProfileComponents> {
        let create = |elements: &[ProfileElement]| -> Result<Vec<Arc<dyn Component>>> {
            elements.iter().map(|e| self.create_component(e)).collect()
        };

        Ok(ProfileComponents {
            actions: create(&profile.actions)?,
            dependencies: create(&profile.dependencies)?,
            monitors: create(&profile.monitors)?,
        })
    }

    fn build(&self, element: &ProfileElement) -> Result<Box<dyn Component>> {
        let type_name = element.type_name.as_str();
        let constructor = self.registry.resolve(type_name).ok_or_else(|| {
            OrchestrationError::startup(
                format!(
                    "Component initialization failed. A component of type '{}' does not exist.",
                    type_name
                ),
                None,
            )
        })?;

        check_extensions(type_name, &element.metadata)?;

        let mut component = constructor(self.dependencies.clone(), self.host_parameters(element))
            .map_err(|e| initialization_failed(type_name, e))?;

        let context = component.context_mut();
        context.set_metadata(element.metadata.clone());
        if let Some(seed) = self.config.seed {
            context.set_seed(seed);
        }

        if element.is_composite() && !component.is_composite() {
            return Err(OrchestrationError::startup(
                format!(
                    "Component initialization failed. The component of type '{}' is not a valid \
                     instance of the required base type. Only composite components can have child components.",
                    type_name
                ),
                None,
            )
            .into());
        }

        for child in &element.components {
            let child = self.build(child)?;
            component
                .add_child(Arc::from(child))
                .map_err(|e| initialization_failed(type_name, e))?;
        }

        Ok(component)
    }

    fn host_parameters(&self, element: &ProfileElement) -> ParameterMap {
        let mut parameters = element.parameters.clone();
        let mut defaults = ParameterMap::new();
        defaults.insert("FailFast", self.config.fail_fast);
        defaults.insert("LogToFile", self.config.log_to_file);
        if let Some(seed) = self.config.seed {
            defaults.insert("Seed", seed);
        }
        parameters.merge_missing(&defaults);
        parameters
    }
}

fn initialization_failed(type_name: &str, error: anyhow::Error) -> anyhow::Error {
    if matches!(
        crate::errors::classify(&error),
        Some(OrchestrationError::Startup { .. })
    ) {
        return error;
    }

    let message = format!(
        "Component initialization failed for component of type '{}'. {}",
        type_name, error
    );
    OrchestrationError::startup(message, Some(error)).into()
}

// Metadata values written as JSON objects or arrays must parse.
fn check_extensions(type_name: &str, metadata: &ParameterMap) -> Result<()> {
    for (key, value) in metadata.iter() {
        let Scalar::String(text) = value else {
            continue;
        };
        let trimmed = text.trim_start();
        if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
            continue;
        }
        if let Err(e) = serde_json::from_str::<serde_json::Value>(text) {
            return Err(OrchestrationError::startup(
                format!(
                    "Component initialization failed. The component of type '{}' contains extensions \
                     that are NOT valid JSON-formatted content (extension '{}').",
                    type_name, key
                ),
                Some(e.into()),
            )
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing::local_dependencies;
    use crate::errors::classify;

    fn factory(config: FactoryConfig) -> ComponentFactory {
        ComponentFactory::new(local_dependencies(), config)
    }

    fn startup_message(result: Result<Arc<dyn Component>>) -> String {
        let err = result.err().expect("expected a startup error");
        let classified = classify(&err).unwrap();
        assert_eq!(classified.kind(), "Startup");
        classified.to_string()
    }

    #[test]
    fn test_factory_config_default() {
        let config = FactoryConfig::default();
        assert!(!config.fail_fast);
        assert!(!config.log_to_file);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_short_and_qualified_names_resolve() {
        let registry = ComponentRegistry::with_defaults();
        assert!(registry.contains("SequentialExecution"));
        assert!(registry.contains("tandem::SequentialExecution"));
        assert!(registry.contains("WaitExecutor"));
        assert!(!registry.contains("sequentialexecution"));
    }

    #[test]
    fn test_first_registration_wins() {
        let registry = ComponentRegistry::new();
        registry.register("a::Wait", |d, p| boxed(WaitExecutor::new(d, p)));
        registry.register("b::Wait", |d, p| boxed(SequentialExecution::new(d, p)));

        let factory = factory(FactoryConfig::default()).with_registry(Arc::new(registry));
        let component = factory
            .create_component(&ProfileElement::new("Wait", ParameterMap::new()))
            .unwrap();
        assert_eq!(component.context().type_name(), WaitExecutor::TYPE_NAME);
    }

    #[test]
    fn test_unknown_type_fails() {
        let message = startup_message(
            factory(FactoryConfig::default())
                .create_component(&ProfileElement::new("NoSuchThing", ParameterMap::new())),
        );
        assert!(message.contains("A component of type 'NoSuchThing' does not exist"));
    }

    #[test]
    fn test_composite_children_and_seed() {
        let element = ProfileElement::new(
            "SequentialExecution",
            [("LoopCount", 2i64)].into_iter().collect(),
        )
        .with_children(vec![
            ProfileElement::new("WaitExecutor", [("Duration", 0i64)].into_iter().collect()),
            ProfileElement::new("tandem::WaitExecutor", [("Duration", 1i64)].into_iter().collect()),
        ]);

        let component = factory(FactoryConfig {
            seed: Some(42),
            ..Default::default()
        })
        .create_component(&element)
        .unwrap();

        assert!(component.is_composite());
        assert_eq!(component.context().seed(), Some(42));
        assert_eq!(component.children().len(), 2);
        for child in component.children() {
            assert_eq!(child.context().seed(), Some(42));
            assert_eq!(child.context().parameter("Seed").and_then(|v| v.as_i64()), Some(42));
        }
    }

    #[test]
    fn test_leaf_type_with_children_fails() {
        let element = ProfileElement::new("WaitExecutor", ParameterMap::new())
            .with_children(vec![ProfileElement::new("WaitExecutor", ParameterMap::new())]);

        let message = startup_message(factory(FactoryConfig::default()).create_component(&element));
        assert!(message.contains("not a valid instance of the required base type"));
    }

    #[test]
    fn test_child_failure_names_child_type() {
        let element = ProfileElement::new("SequentialExecution", ParameterMap::new())
            .with_children(vec![ProfileElement::new("Missing", ParameterMap::new())]);

        let message = startup_message(factory(FactoryConfig::default()).create_component(&element));
        assert!(message.contains("'Missing'"));
    }

    #[test]
    fn test_malformed_extensions_fail() {
        let element = ProfileElement::new("WaitExecutor", ParameterMap::new())
            .with_metadata([("Extra", "{ not json")].into_iter().collect());

        let message = startup_message(factory(FactoryConfig::default()).create_component(&element));
        assert!(message.contains("NOT valid JSON-formatted content"));
    }

    #[test]
    fn test_host_settings_copied_when_absent() {
        let element = ProfileElement::new(
            "WaitExecutor",
            [("FailFast", false)].into_iter().collect(),
        );
        let component = factory(FactoryConfig {
            fail_fast: true,
            log_to_file: true,
            seed: Some(7),
        })
        .create_component(&element)
        .unwrap();

        let context = component.context();
        assert!(!context.fail_fast());
        assert_eq!(context.parameter("LogToFile").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(context.parameter("Seed").and_then(|v| v.as_i64()), Some(7));
    }

    #[test]
    fn test_profile_components() {
        let mut profile = ExecutionProfile::new("profile");
        profile.actions.push(ProfileElement::new("WaitExecutor", ParameterMap::new()));
        profile.monitors.push(ProfileElement::new("WaitExecutor", ParameterMap::new()));

        let components = factory(FactoryConfig::default())
            .create_profile_components(&profile)
            .unwrap();
        assert_eq!(components.actions.len(), 1);
        assert!(components.dependencies.is_empty());
        assert_eq!(components.monitors.len(), 1);
    }
}
