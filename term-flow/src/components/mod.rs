//! The component contract: filters, transformers and analyzers.
//!
//! Components are created per execution by the factory of their
//! [`ComponentDescriptor`], with configuration passed explicitly as a
//! [`ComponentConfig`] and collaborators injected through a
//! [`ComponentContext`]. All methods take `&self`: row tasks may call a
//! component concurrently, so per-execution state lives behind atomics or
//! fine-grained locks inside the component.
//!
//! Lifecycle: `init` once, the per-row method zero or more times, `close`
//! exactly once. The engine enforces this ordering; components do not need to
//! guard against it themselves.

pub mod annotation;
pub mod builtin;
pub mod collections;
mod config;
mod registry;

pub use annotation::{
    AnnotatedRows, InMemoryRowAnnotationFactory, RowAnnotation, RowAnnotationFactory, SampleRow,
};
pub use collections::{BoundedCollectionFactory, BoundedMap};
pub use config::ComponentConfig;
pub use registry::{
    ComponentDescriptor, ComponentFactory, ComponentMetadata, ComponentRegistry, ComponentRole,
    OutputArity,
};

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{InputRow, OutputRowCollector};
use crate::error::Result;
use crate::job::{InputColumn, Value};
use crate::result::ResultHandle;
use crate::sources::RowQuery;

/// Classifies each row into exactly one category.
pub trait Filter: Send + Sync {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn categorize(&self, row: &InputRow) -> Result<String>;

    /// Folds the effect of requiring `category` into the source query, when
    /// that effect is a bounded window over the physical rows.
    fn optimize_query(&self, _query: &RowQuery, _category: &str) -> Option<RowQuery> {
        None
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Computes virtual column values for each row.
pub trait Transformer: Send + Sync {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    /// One value per declared output column.
    fn transform(&self, row: &InputRow) -> Result<Vec<Value>>;

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Accumulates statistics over rows and produces a final result.
pub trait Analyzer: Send + Sync {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Processes one row. `weight` is the row's multiplicity.
    fn run(&self, row: &InputRow, weight: u64) -> Result<()>;

    /// The result, either immediate or as a future resolved later.
    fn result(&self) -> Result<ResultHandle>;

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A runtime instance of a component, created for one execution.
pub enum ComponentInstance {
    Filter(Box<dyn Filter>),
    Transformer(Box<dyn Transformer>),
    Analyzer(Box<dyn Analyzer>),
}

impl ComponentInstance {
    pub fn role(&self) -> ComponentRole {
        match self {
            ComponentInstance::Filter(_) => ComponentRole::Filter,
            ComponentInstance::Transformer(_) => ComponentRole::Transformer,
            ComponentInstance::Analyzer(_) => ComponentRole::Analyzer,
        }
    }

    pub(crate) fn init(&self) -> Result<()> {
        match self {
            ComponentInstance::Filter(c) => c.init(),
            ComponentInstance::Transformer(c) => c.init(),
            ComponentInstance::Analyzer(c) => c.init(),
        }
    }

    pub(crate) fn close(&self) -> Result<()> {
        match self {
            ComponentInstance::Filter(c) => c.close(),
            ComponentInstance::Transformer(c) => c.close(),
            ComponentInstance::Analyzer(c) => c.close(),
        }
    }
}

/// Collaborators provided to a component factory.
pub struct ComponentContext {
    name: String,
    inputs: Vec<InputColumn>,
    outputs: Vec<InputColumn>,
    annotations: Arc<dyn RowAnnotationFactory>,
    collections: BoundedCollectionFactory,
    streams: HashMap<String, Arc<OutputRowCollector>>,
}

impl ComponentContext {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<InputColumn>,
        outputs: Vec<InputColumn>,
        annotations: Arc<dyn RowAnnotationFactory>,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            annotations,
            collections: BoundedCollectionFactory::default(),
            streams: HashMap::new(),
        }
    }

    pub fn with_collections(mut self, collections: BoundedCollectionFactory) -> Self {
        self.collections = collections;
        self
    }

    pub(crate) fn with_streams(mut self, streams: HashMap<String, Arc<OutputRowCollector>>) -> Self {
        self.streams = streams;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[InputColumn] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[InputColumn] {
        &self.outputs
    }

    pub fn annotation_factory(&self) -> Arc<dyn RowAnnotationFactory> {
        Arc::clone(&self.annotations)
    }

    pub fn collection_factory(&self) -> BoundedCollectionFactory {
        self.collections
    }

    /// The collector of an output data stream, present only when a job consumes it.
    pub fn output_stream(&self, name: &str) -> Option<Arc<OutputRowCollector>> {
        self.streams.get(name).cloned()
    }
}
