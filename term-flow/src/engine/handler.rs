//! Processing of a single row through a chain of consumers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::consumer::RowProcessingConsumer;
use super::InputRow;
use crate::components::{BoundedCollectionFactory, InMemoryRowAnnotationFactory};
use crate::config::RunnerConfig;
use crate::error::{FlowError, Result};
use crate::job::{
    ComponentDefinition, ComponentId, FilterOutcome, FilterOutcomes, InputColumn, Job, Requirement,
    Value,
};
use crate::result::ResultHandle;

/// A failure of one component while processing one row.
#[derive(Debug, Clone)]
pub struct ComponentError {
    pub component: Arc<ComponentDefinition>,
    pub error: FlowError,
}

/// The outcome of pushing one row through the handler.
#[derive(Debug, Clone)]
pub struct ConsumeRowResult {
    /// The row with every virtual column computed for it.
    pub row: InputRow,
    pub outcomes: FilterOutcomes,
    pub errors: Vec<ComponentError>,
}

impl ConsumeRowResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the eligible components of a job, in dependency order, for one row at a time.
///
/// Used by the engine for every row task, and usable on its own through
/// [`ConsumeRowHandler::for_job`] to preview what a job does to given rows.
pub struct ConsumeRowHandler {
    source_columns: Vec<InputColumn>,
    consumers: Vec<Arc<RowProcessingConsumer>>,
    always_satisfied: Vec<FilterOutcome>,
    next_row: AtomicU64,
}

impl ConsumeRowHandler {
    /// Wires consumers, given in dependency order, and derives the requirements
    /// each inherits through its virtual inputs.
    pub(crate) fn new(source_columns: Vec<InputColumn>, consumers: Vec<RowProcessingConsumer>) -> Self {
        let mut inherited: HashMap<ComponentId, (Requirement, Vec<Requirement>)> = HashMap::new();
        let mut wired = Vec::with_capacity(consumers.len());

        for mut consumer in consumers {
            let mut sources: Vec<Requirement> = Vec::new();
            let mut push = |requirement: &Requirement| {
                if !sources.contains(requirement) {
                    sources.push(requirement.clone());
                }
            };
            for producer in consumer.definition().inputs().iter().filter_map(|c| c.producer()) {
                match inherited.get(&producer) {
                    Some((Requirement::None, upstream)) => upstream.iter().for_each(&mut push),
                    Some((own, _)) => push(own),
                    None => {}
                }
            }
            inherited.insert(
                consumer.id(),
                (consumer.definition().requirement().clone(), sources.clone()),
            );
            consumer.set_source_requirements(sources);
            wired.push(Arc::new(consumer));
        }

        Self {
            source_columns,
            consumers: wired,
            always_satisfied: Vec::new(),
            next_row: AtomicU64::new(1),
        }
    }

    /// A handler with fresh, initialized instances of the components of `job`.
    ///
    /// Output data streams are not materialized. Call [`close`](Self::close)
    /// when done.
    pub fn for_job(job: &Job) -> Result<Self> {
        let config = RunnerConfig::default();
        let annotations = InMemoryRowAnnotationFactory::shared(config.max_sample_rows);
        let collections = BoundedCollectionFactory::new(config.max_collection_entries);
        let consumers = job
            .components()
            .iter()
            .map(|c| {
                RowProcessingConsumer::instantiate(Arc::clone(c), Arc::clone(&annotations), collections, HashMap::new())
            })
            .collect::<Result<Vec<_>>>()?;
        let handler = Self::new(job.source_columns().to_vec(), consumers);
        for consumer in &handler.consumers {
            if let Err(e) = consumer.init() {
                handler.close()?;
                return Err(e);
            }
        }
        Ok(handler)
    }

    /// Replaces the active consumers after query optimization.
    pub(crate) fn optimized(
        mut self,
        consumers: Vec<Arc<RowProcessingConsumer>>,
        always_satisfied: Vec<FilterOutcome>,
    ) -> Self {
        self.consumers = consumers;
        self.always_satisfied = always_satisfied;
        self
    }

    pub(crate) fn consumers(&self) -> &[Arc<RowProcessingConsumer>] {
        &self.consumers
    }

    pub fn source_columns(&self) -> &[InputColumn] {
        &self.source_columns
    }

    /// Processes source values, matched to the job's source columns by position.
    pub fn consume_values(&self, values: Vec<Value>) -> ConsumeRowResult {
        let number = self.next_row.fetch_add(1, Ordering::Relaxed);
        let row = InputRow::from_source(number, number, &self.source_columns, values);
        self.consume_row(row)
    }

    pub fn consume_row(&self, row: InputRow) -> ConsumeRowResult {
        self.consume_weighted(row, 1)
    }

    /// Processes a row standing for `weight` identical rows.
    ///
    /// A failing component does not stop the others, but nothing reading its
    /// output runs for this row, directly or through further transformers.
    pub fn consume_weighted(&self, mut row: InputRow, weight: u64) -> ConsumeRowResult {
        let mut outcomes = FilterOutcomes::with_always_satisfied(self.always_satisfied.clone());
        let mut errors = Vec::new();
        let mut failed: Vec<ComponentId> = Vec::new();
        for consumer in &self.consumers {
            if !consumer.is_eligible(&outcomes) {
                continue;
            }
            let upstream_failed = consumer
                .definition()
                .inputs()
                .iter()
                .filter_map(|c| c.producer())
                .any(|producer| failed.contains(&producer));
            if upstream_failed {
                failed.push(consumer.id());
                continue;
            }
            if let Err(error) = consumer.consume(&mut row, &mut outcomes, weight) {
                failed.push(consumer.id());
                errors.push(ComponentError {
                    component: Arc::clone(consumer.definition()),
                    error,
                });
            }
        }
        ConsumeRowResult {
            row,
            outcomes,
            errors,
        }
    }

    /// Current results of the analyzers.
    pub fn results(&self) -> Vec<(Arc<ComponentDefinition>, Result<ResultHandle>)> {
        self.consumers
            .iter()
            .filter_map(|c| match c.result() {
                Ok(Some(handle)) => Some((Arc::clone(c.definition()), Ok(handle))),
                Ok(None) => None,
                Err(e) => Some((Arc::clone(c.definition()), Err(e))),
            })
            .collect()
    }

    /// Closes every component once. Returns the first close error.
    pub fn close(&self) -> Result<()> {
        let mut first = None;
        for consumer in &self.consumers {
            if let Err(e) = consumer.close() {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}
