//! Mutable construction of jobs.

use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::sorter::{requirement_dependencies, sort_components};
use super::{
    ColumnId, ComponentDefinition, ComponentId, FilterOutcome, InputColumn, Job, OutputDataStream,
    Requirement,
};
use crate::components::{
    ComponentConfig, ComponentDescriptor, ComponentRegistry, ComponentRole, OutputArity,
};
use crate::error::{FlowError, Result};

/// Id counters shared by a job builder and the builders of its nested jobs,
/// so that ids are unique across the whole job tree.
#[derive(Debug, Clone, Default)]
struct IdAllocator {
    columns: Arc<AtomicU32>,
    components: Arc<AtomicU32>,
}

impl IdAllocator {
    fn column(&self) -> ColumnId {
        ColumnId::new(self.columns.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn component(&self) -> ComponentId {
        ComponentId::new(self.components.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// How to add one component to a job.
#[derive(Debug, Clone)]
pub struct ComponentSpec {
    descriptor: Arc<ComponentDescriptor>,
    name: Option<String>,
    inputs: Vec<InputColumn>,
    output_names: Vec<String>,
    config: ComponentConfig,
    requirement: Requirement,
}

impl ComponentSpec {
    pub fn new(descriptor: Arc<ComponentDescriptor>) -> Self {
        Self {
            descriptor,
            name: None,
            inputs: Vec::new(),
            output_names: Vec::new(),
            config: ComponentConfig::new(),
            requirement: Requirement::None,
        }
    }

    pub fn from_registry(registry: &ComponentRegistry, type_id: &str) -> Result<Self> {
        Ok(Self::new(registry.get(type_id)?))
    }

    /// Display name. Defaults to the type id.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_input(mut self, column: &InputColumn) -> Self {
        self.inputs.push(column.clone());
        self
    }

    pub fn with_inputs<'a>(mut self, columns: impl IntoIterator<Item = &'a InputColumn>) -> Self {
        self.inputs.extend(columns.into_iter().cloned());
        self
    }

    /// Names the next output column. Unnamed outputs get a derived name.
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.output_names.push(name.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.config.set(key, value);
        self
    }

    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requirement = requirement;
        self
    }
}

/// Reference to a component added to a [`JobBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentHandle {
    id: ComponentId,
    name: String,
    outputs: Vec<InputColumn>,
}

impl ComponentHandle {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `index`-th output column of a transformer.
    pub fn output(&self, index: usize) -> Option<&InputColumn> {
        self.outputs.get(index)
    }

    pub fn outputs(&self) -> &[InputColumn] {
        &self.outputs
    }

    /// One outcome of a filter, for use in requirements.
    pub fn outcome(&self, category: impl Into<String>) -> FilterOutcome {
        FilterOutcome::new(self.id, category)
    }
}

struct PendingComponent {
    id: ComponentId,
    name: String,
    spec: ComponentSpec,
    outputs: Vec<InputColumn>,
    streams: BTreeMap<String, Arc<Job>>,
}

/// Builds a [`Job`].
///
/// Structural mistakes that can be detected locally (unknown component types,
/// input arity) fail when the component is added; everything depending on the
/// whole graph fails in [`build`](Self::build).
///
/// # Examples
///
/// ```rust
/// use term_flow::prelude::*;
///
/// let registry = ComponentRegistry::builtin();
/// let mut builder = JobBuilder::new("customers");
/// let email = builder.add_source_column("email");
/// let present = builder.add_component(
///     ComponentSpec::from_registry(registry, "null_check").unwrap().with_input(&email),
/// ).unwrap();
/// builder.add_component(
///     ComponentSpec::from_registry(registry, "value_distribution")
///         .unwrap()
///         .with_input(&email)
///         .requires(Requirement::Outcome(present.outcome("NOT_NULL"))),
/// ).unwrap();
/// let job = builder.build().unwrap();
/// assert_eq!(job.components().len(), 2);
/// ```
pub struct JobBuilder {
    name: String,
    ids: IdAllocator,
    source_columns: Vec<InputColumn>,
    components: Vec<PendingComponent>,
}

impl JobBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ids: IdAllocator::default(),
            source_columns: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_source_column(&mut self, name: impl Into<String>) -> InputColumn {
        let column = InputColumn::physical(self.ids.column(), name);
        self.source_columns.push(column.clone());
        column
    }

    pub fn add_source_columns(&mut self, names: &[&str]) -> Vec<InputColumn> {
        names.iter().map(|n| self.add_source_column(*n)).collect()
    }

    pub fn source_column(&self, name: &str) -> Option<&InputColumn> {
        self.source_columns.iter().find(|c| c.name == name)
    }

    pub fn source_columns(&self) -> &[InputColumn] {
        &self.source_columns
    }

    pub fn add_component(&mut self, spec: ComponentSpec) -> Result<ComponentHandle> {
        let metadata = spec.descriptor.metadata();
        let type_id = spec.descriptor.type_id().to_string();
        let inputs = spec.inputs.len();
        if inputs < metadata.min_inputs || metadata.max_inputs.is_some_and(|max| inputs > max) {
            return Err(FlowError::configuration(format!(
                "'{type_id}' takes {}..{} input columns, got {inputs}",
                metadata.min_inputs,
                metadata.max_inputs.map_or("*".to_string(), |m| m.to_string())
            )));
        }

        let expected = metadata.outputs.expected(inputs);
        if !spec.output_names.is_empty() && spec.output_names.len() != expected {
            return Err(FlowError::configuration(format!(
                "'{type_id}' publishes {expected} output columns, {} names given",
                spec.output_names.len()
            )));
        }

        let id = self.ids.component();
        let outputs = (0..expected)
            .map(|i| {
                let name = spec
                    .output_names
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| default_output_name(&type_id, metadata.outputs, &spec.inputs, i));
                InputColumn::virtual_column(self.ids.column(), name, id)
            })
            .collect::<Vec<_>>();

        let name = spec.name.clone().unwrap_or_else(|| type_id.clone());
        debug!(job = %self.name, component = %name, %id, "Component added");
        let handle = ComponentHandle {
            id,
            name: name.clone(),
            outputs: outputs.clone(),
        };
        self.components.push(PendingComponent {
            id,
            name,
            spec,
            outputs,
            streams: BTreeMap::new(),
        });
        Ok(handle)
    }

    /// Replaces the requirement of an added component.
    pub fn set_requirement(&mut self, component: ComponentId, requirement: Requirement) -> Result<()> {
        let pending = self.pending_mut(component)?;
        pending.spec.requirement = requirement;
        Ok(())
    }

    fn pending_mut(&mut self, component: ComponentId) -> Result<&mut PendingComponent> {
        self.components
            .iter_mut()
            .find(|c| c.id == component)
            .ok_or_else(|| FlowError::ComponentNotFound(component.to_string()))
    }

    fn declared_stream(&self, component: ComponentId, stream: &str) -> Result<&PendingComponent> {
        let pending = self
            .components
            .iter()
            .find(|c| c.id == component)
            .ok_or_else(|| FlowError::ComponentNotFound(component.to_string()))?;
        if !pending
            .spec
            .descriptor
            .metadata()
            .output_streams
            .iter()
            .any(|s| s == stream)
        {
            return Err(FlowError::configuration(format!(
                "'{}' does not publish an output data stream named '{stream}'",
                pending.name
            )));
        }
        Ok(pending)
    }

    /// A builder for the nested job consuming `stream` of `component`.
    ///
    /// Its source columns are the columns the stream carries: the names of
    /// the publishing component's input columns.
    pub fn stream_builder(&self, component: &ComponentHandle, stream: &str) -> Result<JobBuilder> {
        let pending = self.declared_stream(component.id(), stream)?;
        let mut child = JobBuilder {
            name: format!("{}/{}:{stream}", self.name, pending.name),
            ids: self.ids.clone(),
            source_columns: Vec::new(),
            components: Vec::new(),
        };
        for input in &pending.spec.inputs {
            child.add_source_column(input.name.clone());
        }
        Ok(child)
    }

    /// Builds `child` and attaches it as the consumer of `stream`.
    pub fn attach_stream(&mut self, component: &ComponentHandle, stream: &str, child: JobBuilder) -> Result<()> {
        self.declared_stream(component.id(), stream)?;
        let job = child.build()?;
        let pending = self.pending_mut(component.id())?;
        pending.streams.insert(stream.to_string(), job);
        Ok(())
    }

    /// Validates the graph and freezes it.
    pub fn build(self) -> Result<Arc<Job>> {
        let mut known: HashSet<ColumnId> = self.source_columns.iter().map(|c| c.id).collect();
        known.extend(self.components.iter().flat_map(|c| c.outputs.iter().map(|o| o.id)));
        let roles: HashMap<ComponentId, &PendingComponent> =
            self.components.iter().map(|c| (c.id, c)).collect();

        let mut edges = Vec::with_capacity(self.components.len());
        for pending in &self.components {
            for input in &pending.spec.inputs {
                if !known.contains(&input.id) {
                    return Err(FlowError::ColumnNotFound {
                        job: self.name.clone(),
                        column: input.name.clone(),
                    });
                }
            }
            self.check_requirement(pending, &roles)?;

            let mut dependencies: Vec<ComponentId> =
                pending.spec.inputs.iter().filter_map(|c| c.producer()).collect();
            dependencies.extend(requirement_dependencies(&pending.spec.requirement));
            edges.push((pending.id, dependencies));
        }
        let order = sort_components(&edges)?;

        let mut by_id: HashMap<ComponentId, PendingComponent> =
            self.components.into_iter().map(|c| (c.id, c)).collect();
        let mut components = Vec::with_capacity(order.len());
        for id in order {
            let Some(pending) = by_id.remove(&id) else {
                continue;
            };
            components.push(Arc::new(definition(pending)));
        }
        let index = components.iter().enumerate().map(|(i, c)| (c.id(), i)).collect();

        debug!(job = %self.name, components = components.len(), "Job built");
        Ok(Arc::new(Job {
            name: self.name,
            source_columns: self.source_columns,
            components,
            index,
        }))
    }

    fn check_requirement(
        &self,
        pending: &PendingComponent,
        components: &HashMap<ComponentId, &PendingComponent>,
    ) -> Result<()> {
        let requirement = &pending.spec.requirement;
        if !requirement.is_none() && !pending.spec.descriptor.metadata().accepts_requirement {
            return Err(FlowError::configuration(format!(
                "'{}' does not accept a requirement",
                pending.name
            )));
        }
        for outcome in requirement.outcomes() {
            let filter = components
                .get(&outcome.filter)
                .filter(|c| c.spec.descriptor.role() == ComponentRole::Filter)
                .ok_or_else(|| {
                    FlowError::configuration(format!(
                        "Requirement of '{}' refers to {}, which is not a filter of job '{}'",
                        pending.name, outcome.filter, self.name
                    ))
                })?;
            if !filter.spec.descriptor.has_category(&outcome.category) {
                return Err(FlowError::configuration(format!(
                    "Filter '{}' has no category '{}'",
                    filter.name, outcome.category
                )));
            }
        }
        Ok(())
    }
}

fn default_output_name(type_id: &str, arity: OutputArity, inputs: &[InputColumn], index: usize) -> String {
    match (arity, inputs) {
        (OutputArity::PerInput, _) | (OutputArity::Fixed(1), [_]) => {
            let input = inputs.get(index).or(inputs.first()).map_or("", |c| c.name.as_str());
            format!("{input} ({type_id})")
        }
        _ => format!("{type_id} {}", index + 1),
    }
}

fn definition(pending: PendingComponent) -> ComponentDefinition {
    let PendingComponent {
        id,
        name,
        spec,
        outputs,
        mut streams,
    } = pending;
    let stream_columns: Vec<String> = spec.inputs.iter().map(|c| c.name.clone()).collect();
    let output_streams = spec
        .descriptor
        .metadata()
        .output_streams
        .iter()
        .map(|stream| OutputDataStream {
            name: stream.clone(),
            columns: stream_columns.clone(),
            job: streams.remove(stream),
        })
        .collect();

    ComponentDefinition {
        id,
        name,
        descriptor: spec.descriptor,
        inputs: spec.inputs,
        outputs,
        config: spec.config,
        requirement: spec.requirement,
        output_streams,
    }
}
