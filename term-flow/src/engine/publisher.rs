//! Row-processing pipelines: one per job, one more per consumed output data stream.

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::consumer::RowProcessingConsumer;
use super::handler::ConsumeRowHandler;
use super::metrics::RowProcessingMetrics;
use super::optimizer::{optimize, OptimizedPlan};
use super::output_stream::OutputRowCollector;
use super::state::ExecutionState;
use super::task_runner::TaskRunner;
use super::InputRow;
use crate::components::{BoundedCollectionFactory, ComponentRole, InMemoryRowAnnotationFactory};
use crate::config::RunnerConfig;
use crate::error::{FlowError, Result};
use crate::job::{ComponentDefinition, Job, Value};
use crate::log_row;
use crate::result::{AnalyzerResult, ResultHandle, ResultListener};
use crate::sources::{RowQuery, RowSource};

/// Failure flag of a pipeline, chained to the pipeline feeding it.
///
/// A pipeline is poisoned by failures that leave its data incomplete: a
/// panicking row task, a failing source or a component that could not be
/// initialized. Analyzers of a poisoned pipeline, or of any pipeline fed by
/// it, report `PreviousErrorsExist` instead of a result.
#[derive(Debug, Default)]
pub(crate) struct PipelineHealth {
    poisoned: AtomicBool,
    upstream: Option<Arc<PipelineHealth>>,
}

impl PipelineHealth {
    pub(crate) fn new(upstream: Option<Arc<PipelineHealth>>) -> Arc<Self> {
        Arc::new(Self {
            poisoned: AtomicBool::new(false),
            upstream,
        })
    }

    pub(crate) fn poison(&self) {
        self.poisoned.store(true, Ordering::Release);
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
            || self.upstream.as_ref().is_some_and(|u| u.is_poisoned())
    }
}

/// Reads a source once and pushes every row through the job's components.
pub(crate) struct RowProcessingPublisher {
    job: Arc<Job>,
    source: Arc<dyn RowSource>,
    projection: Vec<usize>,
    consumers: Vec<Arc<RowProcessingConsumer>>,
    handler: Arc<ConsumeRowHandler>,
    plan: OptimizedPlan,
    runner: TaskRunner,
    state: Arc<ExecutionState>,
    health: Arc<PipelineHealth>,
    children: Vec<RowProcessingPublisher>,
    config: Arc<RunnerConfig>,
}

impl RowProcessingPublisher {
    /// Instantiates the components of `job` and of every nested job fed by
    /// its consumed output data streams. Fails on configuration errors.
    pub(crate) fn prepare(
        job: Arc<Job>,
        source: Arc<dyn RowSource>,
        base_query: RowQuery,
        state: Arc<ExecutionState>,
        config: Arc<RunnerConfig>,
        upstream: Option<Arc<PipelineHealth>>,
    ) -> Result<Self> {
        let names: Vec<String> = job.source_columns().iter().map(|c| c.name.clone()).collect();
        let projection = source.projection(&names)?;
        let health = PipelineHealth::new(upstream);
        let annotations = InMemoryRowAnnotationFactory::shared(config.max_sample_rows);
        let collections = BoundedCollectionFactory::new(config.max_collection_entries);

        let mut children = Vec::new();
        let mut instances = Vec::with_capacity(job.components().len());
        for definition in job.components() {
            let mut streams = HashMap::new();
            for stream in definition.output_streams() {
                let Some(child_job) = stream.job() else {
                    continue;
                };
                let (collector, child_source) = OutputRowCollector::channel(
                    stream.name(),
                    stream.columns().to_vec(),
                    child_job.name(),
                    config.stream_buffer_rows,
                );
                children.push(Self::prepare(
                    Arc::clone(child_job),
                    Arc::new(child_source),
                    RowQuery::all(),
                    Arc::clone(&state),
                    Arc::clone(&config),
                    Some(Arc::clone(&health)),
                )?);
                streams.insert(stream.name().to_string(), collector);
            }
            instances.push(RowProcessingConsumer::instantiate(
                Arc::clone(definition),
                Arc::clone(&annotations),
                collections,
                streams,
            )?);
        }

        let handler = ConsumeRowHandler::new(job.source_columns().to_vec(), instances);
        let consumers = handler.consumers().to_vec();
        let plan = if config.query_optimization {
            optimize(&consumers, base_query)
        } else {
            OptimizedPlan {
                query: base_query,
                consumers: consumers.clone(),
                always_satisfied: Vec::new(),
                eliminated: Vec::new(),
            }
        };
        let handler = handler.optimized(plan.consumers.clone(), plan.always_satisfied.clone());

        Ok(Self {
            job,
            source,
            projection,
            consumers,
            handler: Arc::new(handler),
            plan,
            // publishing to a stream may block, which only row tasks off the async threads can do
            runner: TaskRunner::new(&config, !children.is_empty()),
            state,
            health,
            children,
            config,
        })
    }

    /// Runs the pipeline and its nested pipelines to completion.
    ///
    /// Components are closed exactly once, whatever the outcome.
    pub(crate) fn run(self) -> BoxFuture<'static, ()> {
        async move {
            let job = Arc::clone(&self.job);
            let listener = Arc::clone(self.state.listener());

            for consumer in &self.consumers {
                if let Err(e) = consumer.init() {
                    self.state
                        .record_component_error(&job, consumer.definition(), None, e);
                    self.health.poison();
                }
            }

            let children: Vec<_> = self
                .children
                .into_iter()
                .map(|child| tokio::spawn(child.run()))
                .collect();

            let expected_rows = match self.source.expected_rows(&self.plan.query).await {
                Ok(rows) => rows,
                Err(e) => {
                    self.state.record_error(&job, None, e);
                    self.health.poison();
                    None
                }
            };
            let metrics = RowProcessingMetrics::new(
                job.name(),
                expected_rows,
                self.plan.query,
                self.plan.eliminated.clone(),
            );

            listener.row_processing_begin(&job, &metrics);
            for consumer in &self.consumers {
                listener.component_begin(&job, consumer.definition());
            }

            if !self.health.is_poisoned() {
                let pipeline = Pipeline {
                    job: Arc::clone(&job),
                    handler: Arc::clone(&self.handler),
                    state: Arc::clone(&self.state),
                    health: Arc::clone(&self.health),
                    metrics: metrics.clone(),
                    config: Arc::clone(&self.config),
                };
                pipeline
                    .produce(self.source.as_ref(), &self.plan.query, &self.projection, &self.runner)
                    .await;
            }
            self.runner.drain().await;

            let cancelled = self.state.is_cancelled();
            if !cancelled && !self.health.is_poisoned() {
                listener.row_processing_success(&job, &metrics);
            }
            if !cancelled {
                collect_results(&job, &self.consumers, &self.state, &self.health);
            }

            for consumer in &self.consumers {
                if let Err(e) = consumer.close() {
                    self.state
                        .record_component_error(&job, consumer.definition(), None, e);
                }
            }

            for child in children {
                if let Err(e) = child.await {
                    self.state
                        .record_error(&job, None, FlowError::internal(format!("nested pipeline failed: {e}")));
                }
            }
            info!(
                job = %job.name(),
                rows = metrics.processed_rows(),
                cancelled,
                "Pipeline finished"
            );
        }
        .boxed()
    }
}

/// What each row task needs.
#[derive(Clone)]
struct Pipeline {
    job: Arc<Job>,
    handler: Arc<ConsumeRowHandler>,
    state: Arc<ExecutionState>,
    health: Arc<PipelineHealth>,
    metrics: RowProcessingMetrics,
    config: Arc<RunnerConfig>,
}

impl Pipeline {
    fn is_stopped(&self) -> bool {
        self.state.is_cancelled() || self.health.is_poisoned()
    }

    async fn produce(&self, source: &dyn RowSource, query: &RowQuery, projection: &[usize], runner: &TaskRunner) {
        let mut rows = match source.open(query).await {
            Ok(rows) => rows,
            Err(e) => {
                self.state.record_error(&self.job, None, e);
                self.health.poison();
                return;
            }
        };

        let interval = self.config.progress_interval.max(1);
        let mut number = 0u64;
        while let Some(next) = rows.next().await {
            if self.is_stopped() {
                debug!(job = %self.job.name(), number, "Row production stopped");
                break;
            }
            let source_row = match next {
                Ok(row) => row,
                Err(e) => {
                    self.state.record_error(&self.job, None, e);
                    self.health.poison();
                    break;
                }
            };
            number += 1;
            let values = projection
                .iter()
                .map(|&i| source_row.values.get(i).cloned().unwrap_or(Value::Null))
                .collect();
            let row = InputRow::from_source(source_row.id, number, self.handler.source_columns(), values);
            let weight = source_row.weight;

            let task = self.clone();
            runner.execute(move || task.process(row, weight)).await;

            if number % interval == 0 {
                self.state
                    .listener()
                    .row_processing_progress(&self.job, &self.metrics, number);
            }
        }
    }

    fn process(&self, row: InputRow, weight: u64) {
        let row_id = row.id();
        log_row!(self.config.log, job = %self.job.name(), row_id, number = row.number(), weight, "Processing row");
        match catch_unwind(AssertUnwindSafe(|| self.handler.consume_weighted(row, weight))) {
            Ok(result) => {
                for failure in result.errors {
                    self.state
                        .record_component_error(&self.job, &failure.component, Some(row_id), failure.error);
                }
                self.metrics.row_processed();
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.state.record_error(
                    &self.job,
                    Some(row_id),
                    FlowError::internal(format!("row task panicked: {message}")),
                );
                self.health.poison();
            }
        }
    }
}

fn collect_results(
    job: &Arc<Job>,
    consumers: &[Arc<RowProcessingConsumer>],
    state: &Arc<ExecutionState>,
    health: &PipelineHealth,
) {
    let listener = state.listener();
    let poisoned = health.is_poisoned();
    for consumer in consumers {
        let definition = consumer.definition();
        if consumer.role() != ComponentRole::Analyzer {
            if !poisoned {
                listener.component_success(job, definition, None);
            }
            continue;
        }
        if poisoned {
            state.record_component_error(job, definition, None, FlowError::PreviousErrorsExist);
            continue;
        }
        match consumer.result() {
            Ok(Some(ResultHandle::Immediate(result))) => {
                state.store_result(job, Arc::clone(definition), ResultHandle::Immediate(Arc::clone(&result)));
                listener.component_success(job, definition, Some(&result));
            }
            Ok(Some(ResultHandle::Future(future))) => {
                state.store_result(job, Arc::clone(definition), ResultHandle::Future(future.clone()));
                future.add_listener(ComponentResultCallback {
                    job: Arc::clone(job),
                    component: Arc::clone(definition),
                    state: Arc::clone(state),
                });
            }
            Ok(None) => {}
            Err(e) => state.record_component_error(job, definition, None, e),
        }
    }
}

/// Reports an analyzer whose result arrives later once its future resolves.
struct ComponentResultCallback {
    job: Arc<Job>,
    component: Arc<ComponentDefinition>,
    state: Arc<ExecutionState>,
}

impl ResultListener for ComponentResultCallback {
    fn on_success(&self, result: &Arc<dyn AnalyzerResult>) {
        self.state
            .listener()
            .component_success(&self.job, &self.component, Some(result));
    }

    fn on_error(&self, error: &FlowError) {
        self.state
            .record_component_error(&self.job, &self.component, None, error.clone());
    }
}
