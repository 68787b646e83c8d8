//! Entry point for executing jobs.

use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, info, instrument};

use super::listener::{AnalysisListener, CompositeAnalysisListener, LoggingAnalysisListener};
use super::publisher::RowProcessingPublisher;
use super::state::ExecutionState;
use crate::config::RunnerConfig;
use crate::error::{FlowError, Result};
use crate::job::Job;
use crate::result::AnalysisResultFuture;
use crate::sources::{RowQuery, RowSource};

/// Executes jobs over row sources.
///
/// A runner can be reused: every call to [`run`](Self::run) creates fresh
/// component instances and returns its own [`AnalysisResultFuture`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use term_flow::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let registry = ComponentRegistry::builtin();
/// let mut builder = JobBuilder::new("profile");
/// let amount = builder.add_source_column("amount");
/// let number = builder.add_component(ComponentSpec::from_registry(registry, "number")?.with_input(&amount))?;
/// let job = builder.build()?;
///
/// let source = Arc::new(InMemoryRowSource::from_column("orders", "amount", vec![10i64, 20, 30]));
/// let future = AnalysisRunner::default().run(&job, source)?;
/// future.wait().await;
/// let result = future.result_for(number.id())?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct AnalysisRunner {
    config: RunnerConfig,
    listeners: Vec<Arc<dyn AnalysisListener>>,
}

impl AnalysisRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            listeners: Vec::new(),
        }
    }

    /// Adds a listener notified of every execution started by this runner.
    pub fn with_listener(mut self, listener: Arc<dyn AnalysisListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Starts executing `job` over `source`.
    ///
    /// Configuration errors (invalid settings, failing component factories,
    /// source columns missing from the source) are returned here, before any
    /// row is read. Everything that goes wrong afterwards is recorded on the
    /// returned future. Must be called within a tokio runtime.
    #[instrument(skip(self, job, source), fields(job = %job.name(), source = %source.name()))]
    pub fn run(&self, job: &Arc<Job>, source: Arc<dyn RowSource>) -> Result<AnalysisResultFuture> {
        self.config.validate()?;
        let handle = Handle::try_current()
            .map_err(|_| FlowError::invalid_state("AnalysisRunner::run must be called within a tokio runtime"))?;

        let mut listener = CompositeAnalysisListener::new(vec![Arc::new(LoggingAnalysisListener::new(
            self.config.log.clone(),
        ))]);
        for extra in &self.listeners {
            listener.add(Arc::clone(extra));
        }

        let state = ExecutionState::new(Arc::clone(job), Arc::new(listener));
        let config = Arc::new(self.config.clone());
        let publisher = RowProcessingPublisher::prepare(
            Arc::clone(job),
            source,
            RowQuery::all(),
            Arc::clone(&state),
            config,
            None,
        )?;

        let execution = Arc::clone(&state);
        let watchdog = Arc::clone(&state);
        handle.spawn(async move {
            let outcome = tokio::spawn(execute(execution, publisher)).await;
            if let Err(e) = outcome {
                error!(error = %e, "Execution task aborted");
                watchdog.record_error(
                    watchdog.job(),
                    None,
                    FlowError::internal(format!("execution task aborted: {e}")),
                );
                watchdog.mark_done();
            }
        });

        Ok(AnalysisResultFuture::new(state))
    }
}

async fn execute(state: Arc<ExecutionState>, publisher: RowProcessingPublisher) {
    let job = Arc::clone(state.job());
    let listener = Arc::clone(state.listener());
    listener.job_begin(&job, &state.metrics());

    publisher.run().await;

    // every pipeline has finished, so no further futures are registered
    for future in state.pending_futures() {
        future.wait().await;
    }

    let cancelled = state.settle();
    let metrics = state.record_end();
    if cancelled {
        listener.job_cancelled(&job, &metrics);
    } else if state.has_errors() {
        listener.job_failed(&job, &metrics, &state.errors());
    } else {
        listener.job_success(&job, &metrics);
    }
    info!(
        job = %job.name(),
        cancelled,
        errors = state.errors().len(),
        "Job execution finished"
    );
    state.mark_done();
}
