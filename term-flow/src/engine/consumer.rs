//! Runtime wrapper around one component instance.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::metrics::ComponentMetrics;
use super::{InputRow, OutputRowCollector};
use crate::components::{
    BoundedCollectionFactory, ComponentContext, ComponentInstance, ComponentRole, RowAnnotationFactory,
};
use crate::error::{FlowError, Result};
use crate::job::{ComponentDefinition, ComponentId, FilterOutcomes, Requirement};
use crate::result::ResultHandle;
use crate::sources::RowQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Initialized,
    Closed,
}

/// One component of one execution: its instance, lifecycle latch and the
/// requirements it inherits from the producers of its inputs.
///
/// Row invocations hold the lifecycle read lock, `init` and `close` take the
/// write lock. Once closed, no further invocation is accepted and a second
/// close is a no-op.
pub(crate) struct RowProcessingConsumer {
    definition: Arc<ComponentDefinition>,
    instance: ComponentInstance,
    lifecycle: RwLock<Lifecycle>,
    source_requirements: Vec<Requirement>,
    streams: Vec<Arc<OutputRowCollector>>,
    metrics: ComponentMetrics,
}

impl RowProcessingConsumer {
    /// Creates the component instance. Factory errors are configuration errors.
    pub(crate) fn instantiate(
        definition: Arc<ComponentDefinition>,
        annotations: Arc<dyn RowAnnotationFactory>,
        collections: BoundedCollectionFactory,
        streams: HashMap<String, Arc<OutputRowCollector>>,
    ) -> Result<Self> {
        let ctx = ComponentContext::new(
            definition.name(),
            definition.inputs().to_vec(),
            definition.outputs().to_vec(),
            annotations,
        )
        .with_collections(collections)
        .with_streams(streams.clone());
        let instance = definition
            .descriptor()
            .instantiate(definition.config(), &ctx)
            .map_err(|e| {
                if e.is_configuration() {
                    e
                } else {
                    FlowError::configuration(format!("Failed to create {definition}: {e}"))
                }
            })?;
        Ok(Self {
            definition,
            instance,
            lifecycle: RwLock::new(Lifecycle::Created),
            source_requirements: Vec::new(),
            streams: streams.into_values().collect(),
            metrics: ComponentMetrics::default(),
        })
    }

    pub(crate) fn definition(&self) -> &Arc<ComponentDefinition> {
        &self.definition
    }

    pub(crate) fn id(&self) -> ComponentId {
        self.definition.id()
    }

    pub(crate) fn role(&self) -> ComponentRole {
        self.instance.role()
    }

    pub(crate) fn source_requirements(&self) -> &[Requirement] {
        &self.source_requirements
    }

    pub(crate) fn set_source_requirements(&mut self, requirements: Vec<Requirement>) {
        self.source_requirements = requirements;
    }

    /// Decides whether the component runs for a row with the given outcomes.
    ///
    /// The component's own requirement must hold. A component without one
    /// additionally needs at least one of the paths producing its inputs to
    /// have fired for the row.
    pub(crate) fn is_eligible(&self, outcomes: &FilterOutcomes) -> bool {
        let own = self.definition.requirement();
        if !own.is_satisfied(outcomes) {
            return false;
        }
        !own.is_none()
            || self.source_requirements.is_empty()
            || self.source_requirements.iter().any(|r| r.is_satisfied(outcomes))
    }

    pub(crate) fn init(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.write();
        if *lifecycle != Lifecycle::Created {
            return Err(FlowError::invalid_state(format!(
                "{} cannot be initialized in state {:?}",
                self.definition, *lifecycle
            )));
        }
        self.instance.init()?;
        *lifecycle = Lifecycle::Initialized;
        debug!(component = %self.definition, "Component initialized");
        Ok(())
    }

    /// Runs the component for one row, updating the row's values or outcomes.
    pub(crate) fn consume(&self, row: &mut InputRow, outcomes: &mut FilterOutcomes, weight: u64) -> Result<()> {
        let lifecycle = self.lifecycle.read();
        if *lifecycle != Lifecycle::Initialized {
            return Err(FlowError::invalid_state(format!(
                "{} cannot process rows in state {:?}",
                self.definition, *lifecycle
            )));
        }
        self.metrics.invoked();
        let outcome = self.invoke(row, outcomes, weight);
        if outcome.is_err() {
            self.metrics.failed();
        }
        outcome
    }

    fn invoke(&self, row: &mut InputRow, outcomes: &mut FilterOutcomes, weight: u64) -> Result<()> {
        match &self.instance {
            ComponentInstance::Filter(filter) => {
                let category = filter.categorize(row)?;
                if !self.definition.descriptor().has_category(&category) {
                    return Err(FlowError::component(
                        self.definition.name(),
                        format!("unknown category '{category}'"),
                    ));
                }
                outcomes.add(self.id(), category);
            }
            ComponentInstance::Transformer(transformer) => {
                let values = transformer.transform(row)?;
                let outputs = self.definition.outputs();
                if values.len() != outputs.len() {
                    return Err(FlowError::component(
                        self.definition.name(),
                        format!("produced {} values for {} output columns", values.len(), outputs.len()),
                    ));
                }
                for (column, value) in outputs.iter().zip(values) {
                    row.set(column.id, value);
                }
            }
            ComponentInstance::Analyzer(analyzer) => analyzer.run(row, weight)?,
        }
        Ok(())
    }

    pub(crate) fn optimize_query(&self, query: &RowQuery, category: &str) -> Option<RowQuery> {
        match &self.instance {
            ComponentInstance::Filter(filter) => filter.optimize_query(query, category),
            _ => None,
        }
    }

    /// The analyzer's result. Must be called before `close`.
    pub(crate) fn result(&self) -> Result<Option<ResultHandle>> {
        match &self.instance {
            ComponentInstance::Analyzer(analyzer) => analyzer.result().map(Some),
            _ => Ok(None),
        }
    }

    /// Closes the instance and its output data streams.
    ///
    /// Returns `Ok(false)` when the consumer was already closed.
    pub(crate) fn close(&self) -> Result<bool> {
        let mut lifecycle = self.lifecycle.write();
        if *lifecycle == Lifecycle::Closed {
            return Ok(false);
        }
        *lifecycle = Lifecycle::Closed;
        let closed = self.instance.close();
        for stream in &self.streams {
            stream.close();
        }
        debug!(
            component = %self.definition,
            invocations = self.metrics.invocations(),
            errors = self.metrics.errors(),
            "Component closed"
        );
        closed.map(|_| true)
    }
}
