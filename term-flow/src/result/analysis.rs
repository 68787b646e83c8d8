//! The caller's handle on one job execution.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{AnalysisSummary, AnalyzerResult, ResultHandle};
use crate::engine::state::ExecutionState;
use crate::engine::AnalysisJobMetrics;
use crate::error::{FlowError, RecordedError, Result};
use crate::job::{ComponentDefinition, ComponentId, Job};

/// The result of one analyzer, with the (sub-)job it ran in.
#[derive(Debug, Clone)]
pub struct ComponentResult {
    pub job: String,
    pub component: Arc<ComponentDefinition>,
    pub result: ResultHandle,
}

/// Completion token of one job execution.
///
/// Clones observe the same execution. The execution is done once every
/// pipeline has finished, every component has been closed and every
/// [`AnalyzerResultFuture`](super::AnalyzerResultFuture) has resolved.
#[derive(Clone)]
pub struct AnalysisResultFuture {
    state: Arc<ExecutionState>,
}

impl AnalysisResultFuture {
    pub(crate) fn new(state: Arc<ExecutionState>) -> Self {
        Self { state }
    }

    pub fn job(&self) -> &Arc<Job> {
        self.state.job()
    }

    /// Waits until the execution is done.
    pub async fn wait(&self) {
        let mut done = self.state.subscribe();
        // the sender is owned by the state we hold, so this cannot close early
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Waits at most `timeout` for the execution to finish.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| FlowError::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)))
    }

    /// Requests cooperative cancellation.
    ///
    /// Rows already handed to workers finish; no new row is started. Has no
    /// effect on a finished execution.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    /// Done, not cancelled and without recorded errors.
    pub fn is_successful(&self) -> bool {
        self.is_done() && !self.is_errornous()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// True when the execution was cancelled or recorded at least one error.
    pub fn is_errornous(&self) -> bool {
        self.state.is_cancelled() || self.state.has_errors()
    }

    /// Errors recorded so far, in a deterministic order.
    pub fn errors(&self) -> Vec<RecordedError> {
        self.state.errors()
    }

    /// Results recorded so far, keyed by component. Never fails, even for an
    /// erroneous execution.
    pub fn result_map(&self) -> BTreeMap<ComponentId, ResultHandle> {
        self.state
            .results()
            .into_iter()
            .map(|r| (r.component.id(), r.result))
            .collect()
    }

    fn ensure_successful(&self) -> Result<()> {
        if !self.is_done() {
            return Err(FlowError::invalid_state(format!(
                "Execution of '{}' is still running",
                self.job().name()
            )));
        }
        if self.is_errornous() {
            return Err(FlowError::Errornous {
                errors: self.state.errors().len(),
            });
        }
        Ok(())
    }

    /// Every analyzer result of a successful execution, nested jobs included.
    pub fn results(&self) -> Result<Vec<ComponentResult>> {
        self.ensure_successful()?;
        Ok(self.state.results())
    }

    /// The results of a given concrete type.
    pub fn results_of<T: AnalyzerResult>(&self) -> Result<Vec<Arc<T>>> {
        Ok(self
            .results()?
            .iter()
            .filter_map(|r| r.result.downcast::<T>())
            .collect())
    }

    /// The result of one analyzer of a successful execution.
    pub fn result_for(&self, component: ComponentId) -> Result<ResultHandle> {
        self.ensure_successful()?;
        self.state
            .result(component)
            .map(|r| r.result)
            .ok_or_else(|| FlowError::invalid_state(format!("No result recorded for {component}")))
    }

    pub fn metrics(&self) -> AnalysisJobMetrics {
        self.state.metrics()
    }

    /// A serializable snapshot of results and errors.
    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary::collect(
            self.job().name(),
            &self.metrics(),
            self.is_successful(),
            self.is_cancelled(),
            &self.state.results(),
            self.errors(),
        )
    }
}

impl fmt::Debug for AnalysisResultFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisResultFuture")
            .field("job", &self.job().name())
            .field("done", &self.is_done())
            .field("cancelled", &self.is_cancelled())
            .field("errors", &self.state.errors().len())
            .finish()
    }
}
