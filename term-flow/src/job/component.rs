//! Frozen component definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::{InputColumn, Job, Requirement};
use crate::components::{ComponentConfig, ComponentDescriptor, ComponentRole};

/// Identity of a component, unique across a job tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(u32);

impl ComponentId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component#{}", self.0)
    }
}

/// A named virtual table published by a component.
///
/// Only streams with an attached job are materialized during a run.
#[derive(Debug, Clone)]
pub struct OutputDataStream {
    pub(crate) name: String,
    pub(crate) columns: Vec<String>,
    pub(crate) job: Option<Arc<Job>>,
}

impl OutputDataStream {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn job(&self) -> Option<&Arc<Job>> {
        self.job.as_ref()
    }

    pub fn is_consumed(&self) -> bool {
        self.job.is_some()
    }
}

/// A configured filter, transformer or analyzer inside a [`Job`].
pub struct ComponentDefinition {
    pub(crate) id: ComponentId,
    pub(crate) name: String,
    pub(crate) descriptor: Arc<ComponentDescriptor>,
    pub(crate) inputs: Vec<InputColumn>,
    pub(crate) outputs: Vec<InputColumn>,
    pub(crate) config: ComponentConfig,
    pub(crate) requirement: Requirement,
    pub(crate) output_streams: Vec<OutputDataStream>,
}

impl ComponentDefinition {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &Arc<ComponentDescriptor> {
        &self.descriptor
    }

    pub fn role(&self) -> ComponentRole {
        self.descriptor.role()
    }

    pub fn is_filter(&self) -> bool {
        self.role() == ComponentRole::Filter
    }

    pub fn is_analyzer(&self) -> bool {
        self.role() == ComponentRole::Analyzer
    }

    pub fn inputs(&self) -> &[InputColumn] {
        &self.inputs
    }

    /// Virtual columns published by a transformer.
    pub fn outputs(&self) -> &[InputColumn] {
        &self.outputs
    }

    pub fn config(&self) -> &ComponentConfig {
        &self.config
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn output_streams(&self) -> &[OutputDataStream] {
        &self.output_streams
    }

    pub fn output_stream(&self, name: &str) -> Option<&OutputDataStream> {
        self.output_streams.iter().find(|s| s.name == name)
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type", &self.descriptor.type_id())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("requirement", &self.requirement)
            .field("output_streams", &self.output_streams)
            .finish()
    }
}

impl fmt::Display for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.descriptor.type_id())
    }
}
