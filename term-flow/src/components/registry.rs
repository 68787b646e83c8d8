//! Component descriptors and the registry mapping type ids to them.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{
    builtin, Analyzer, ComponentConfig, ComponentContext, ComponentInstance, Filter, Transformer,
};
use crate::error::{FlowError, Result};
use crate::result::ResultReducer;

/// The kind of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ComponentRole {
    Filter,
    Transformer,
    Analyzer,
}

/// Number of output columns a transformer publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputArity {
    None,
    Fixed(usize),
    PerInput,
}

impl OutputArity {
    pub fn expected(&self, inputs: usize) -> usize {
        match self {
            OutputArity::None => 0,
            OutputArity::Fixed(n) => *n,
            OutputArity::PerInput => inputs,
        }
    }
}

/// Static facts about a component type, checked when jobs are built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentMetadata {
    pub min_inputs: usize,
    pub max_inputs: Option<usize>,
    pub outputs: OutputArity,
    /// Filter categories. Empty for transformers and analyzers.
    pub categories: Vec<String>,
    /// Whether the component may carry its own requirement.
    pub accepts_requirement: bool,
    /// Whether a filter's effect can be folded into the source query.
    pub query_optimizable: bool,
    /// Names of output data streams the component publishes.
    pub output_streams: Vec<String>,
}

impl Default for ComponentMetadata {
    fn default() -> Self {
        Self {
            min_inputs: 1,
            max_inputs: None,
            outputs: OutputArity::None,
            categories: Vec::new(),
            accepts_requirement: true,
            query_optimizable: false,
            output_streams: Vec::new(),
        }
    }
}

type FactoryFn<T> = dyn Fn(&ComponentConfig, &ComponentContext) -> Result<Box<T>> + Send + Sync;

/// Creates runtime instances of one component type.
#[derive(Clone)]
pub enum ComponentFactory {
    Filter(Arc<FactoryFn<dyn Filter>>),
    Transformer(Arc<FactoryFn<dyn Transformer>>),
    Analyzer(Arc<FactoryFn<dyn Analyzer>>),
}

/// A component type: its factory, metadata and optional reducer.
#[derive(Clone)]
pub struct ComponentDescriptor {
    type_id: String,
    factory: ComponentFactory,
    metadata: ComponentMetadata,
    reducer: Option<Arc<dyn ResultReducer>>,
}

impl ComponentDescriptor {
    /// Describes a filter producing one of `categories` per row.
    pub fn filter<F, C>(type_id: impl Into<String>, categories: &[&str], factory: F) -> Self
    where
        F: Fn(&ComponentConfig, &ComponentContext) -> Result<C> + Send + Sync + 'static,
        C: Filter + 'static,
    {
        let factory = move |config: &ComponentConfig, ctx: &ComponentContext| -> Result<Box<dyn Filter>> {
            Ok(Box::new(factory(config, ctx)?))
        };
        Self {
            type_id: type_id.into(),
            factory: ComponentFactory::Filter(Arc::new(factory)),
            metadata: ComponentMetadata {
                categories: categories.iter().map(|c| c.to_string()).collect(),
                ..ComponentMetadata::default()
            },
            reducer: None,
        }
    }

    /// Describes a transformer publishing `outputs` virtual columns.
    pub fn transformer<F, C>(type_id: impl Into<String>, outputs: OutputArity, factory: F) -> Self
    where
        F: Fn(&ComponentConfig, &ComponentContext) -> Result<C> + Send + Sync + 'static,
        C: Transformer + 'static,
    {
        let factory =
            move |config: &ComponentConfig, ctx: &ComponentContext| -> Result<Box<dyn Transformer>> {
                Ok(Box::new(factory(config, ctx)?))
            };
        Self {
            type_id: type_id.into(),
            factory: ComponentFactory::Transformer(Arc::new(factory)),
            metadata: ComponentMetadata {
                outputs,
                ..ComponentMetadata::default()
            },
            reducer: None,
        }
    }

    /// Describes an analyzer.
    pub fn analyzer<F, C>(type_id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ComponentConfig, &ComponentContext) -> Result<C> + Send + Sync + 'static,
        C: Analyzer + 'static,
    {
        let factory = move |config: &ComponentConfig, ctx: &ComponentContext| -> Result<Box<dyn Analyzer>> {
            Ok(Box::new(factory(config, ctx)?))
        };
        Self {
            type_id: type_id.into(),
            factory: ComponentFactory::Analyzer(Arc::new(factory)),
            metadata: ComponentMetadata::default(),
            reducer: None,
        }
    }

    pub fn with_inputs(mut self, min: usize, max: Option<usize>) -> Self {
        self.metadata.min_inputs = min;
        self.metadata.max_inputs = max;
        self
    }

    pub fn query_optimizable(mut self) -> Self {
        self.metadata.query_optimizable = true;
        self
    }

    pub fn without_requirement(mut self) -> Self {
        self.metadata.accepts_requirement = false;
        self
    }

    pub fn with_output_streams(mut self, names: &[&str]) -> Self {
        self.metadata.output_streams = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_reducer(mut self, reducer: impl ResultReducer + 'static) -> Self {
        self.reducer = Some(Arc::new(reducer));
        self
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn role(&self) -> ComponentRole {
        match self.factory {
            ComponentFactory::Filter(_) => ComponentRole::Filter,
            ComponentFactory::Transformer(_) => ComponentRole::Transformer,
            ComponentFactory::Analyzer(_) => ComponentRole::Analyzer,
        }
    }

    pub fn metadata(&self) -> &ComponentMetadata {
        &self.metadata
    }

    pub fn reducer(&self) -> Option<&Arc<dyn ResultReducer>> {
        self.reducer.as_ref()
    }

    /// Creates a runtime instance. Invalid configuration surfaces here.
    pub fn instantiate(
        &self,
        config: &ComponentConfig,
        ctx: &ComponentContext,
    ) -> Result<ComponentInstance> {
        let instance = match &self.factory {
            ComponentFactory::Filter(f) => ComponentInstance::Filter(f(config, ctx)?),
            ComponentFactory::Transformer(f) => ComponentInstance::Transformer(f(config, ctx)?),
            ComponentFactory::Analyzer(f) => ComponentInstance::Analyzer(f(config, ctx)?),
        };
        Ok(instance)
    }

    /// Validates a category against the declared ones.
    pub fn has_category(&self, category: &str) -> bool {
        self.metadata.categories.is_empty() || self.metadata.categories.iter().any(|c| c == category)
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("type_id", &self.type_id)
            .field("role", &self.role())
            .field("metadata", &self.metadata)
            .field("reducer", &self.reducer.is_some())
            .finish()
    }
}

static BUILTIN: Lazy<ComponentRegistry> = Lazy::new(|| {
    let mut registry = ComponentRegistry::new();
    for descriptor in builtin::descriptors() {
        registry.insert(descriptor);
    }
    registry
});

/// Explicit mapping from component type id to descriptor.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    descriptors: BTreeMap<String, Arc<ComponentDescriptor>>,
}

impl ComponentRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared registry of builtin components.
    pub fn builtin() -> &'static ComponentRegistry {
        &BUILTIN
    }

    /// A registry seeded with the builtin components, open for extension.
    pub fn with_builtins() -> Self {
        BUILTIN.clone()
    }

    /// Registers a descriptor. Type ids must be unique.
    pub fn register(&mut self, descriptor: ComponentDescriptor) -> Result<Arc<ComponentDescriptor>> {
        if self.descriptors.contains_key(descriptor.type_id()) {
            return Err(FlowError::configuration(format!(
                "Component type '{}' is already registered",
                descriptor.type_id()
            )));
        }
        Ok(self.insert(descriptor))
    }

    fn insert(&mut self, descriptor: ComponentDescriptor) -> Arc<ComponentDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.descriptors
            .insert(descriptor.type_id().to_string(), Arc::clone(&descriptor));
        descriptor
    }

    pub fn get(&self, type_id: &str) -> Result<Arc<ComponentDescriptor>> {
        self.descriptors
            .get(type_id)
            .cloned()
            .ok_or_else(|| FlowError::ComponentNotFound(type_id.to_string()))
    }

    pub fn type_ids(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_contents() {
        let registry = ComponentRegistry::builtin();
        let ids: Vec<&str> = registry.type_ids().collect();
        for expected in [
            "completeness",
            "convert_to_number",
            "max_rows",
            "null_check",
            "number",
            "regex_match",
            "string_length",
            "value_distribution",
        ] {
            assert!(ids.contains(&expected), "missing {expected}");
        }

        let max_rows = registry.get("max_rows").unwrap();
        assert_eq!(max_rows.role(), ComponentRole::Filter);
        assert!(max_rows.metadata().query_optimizable);
        assert!(max_rows.has_category("VALID"));
        assert!(!max_rows.has_category("MAYBE"));

        assert!(registry.get("number").unwrap().reducer().is_some());
    }

    #[test]
    fn test_unknown_type_is_typed_error() {
        let err = ComponentRegistry::builtin().get("no_such_component").unwrap_err();
        assert_eq!(err, FlowError::ComponentNotFound("no_such_component".to_string()));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ComponentRegistry::with_builtins();
        let duplicate = registry.get("number").unwrap().as_ref().clone();
        assert!(registry.register(duplicate).is_err());
    }
}
