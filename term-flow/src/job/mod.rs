//! The component model: jobs, component definitions, columns and requirements.
//!
//! A [`Job`] is built with a [`JobBuilder`] and frozen before execution. The
//! engine never mutates a job; the same `Arc<Job>` can be run many times.

mod builder;
mod column;
mod component;
mod requirement;
mod sorter;
mod value;

pub use builder::{ComponentHandle, ComponentSpec, JobBuilder};
pub use column::{ColumnId, ColumnOrigin, InputColumn};
pub use component::{ComponentDefinition, ComponentId, OutputDataStream};
pub use requirement::{FilterOutcome, FilterOutcomes, Requirement};
pub use sorter::sort_components;
pub use value::Value;

use std::collections::HashMap;
use std::sync::Arc;

/// An immutable graph of components over a set of source columns.
#[derive(Debug)]
pub struct Job {
    pub(crate) name: String,
    pub(crate) source_columns: Vec<InputColumn>,
    /// Components in dependency order.
    pub(crate) components: Vec<Arc<ComponentDefinition>>,
    pub(crate) index: HashMap<ComponentId, usize>,
}

impl Job {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_columns(&self) -> &[InputColumn] {
        &self.source_columns
    }

    /// Components in an order where producers precede consumers.
    pub fn components(&self) -> &[Arc<ComponentDefinition>] {
        &self.components
    }

    pub fn component(&self, id: ComponentId) -> Option<&Arc<ComponentDefinition>> {
        self.index.get(&id).map(|&i| &self.components[i])
    }

    pub fn analyzers(&self) -> impl Iterator<Item = &Arc<ComponentDefinition>> {
        self.components.iter().filter(|c| c.is_analyzer())
    }

    /// Nested jobs attached to output data streams of this job's components.
    pub fn stream_jobs(&self) -> impl Iterator<Item = &Arc<Job>> {
        self.components
            .iter()
            .flat_map(|c| c.output_streams().iter())
            .filter_map(|s| s.job())
    }

    /// This job's components followed by those of every nested job, depth first.
    pub fn all_components(&self) -> Vec<Arc<ComponentDefinition>> {
        let mut all = self.components.clone();
        for child in self.stream_jobs() {
            all.extend(child.all_components());
        }
        all
    }
}
