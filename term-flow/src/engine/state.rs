//! Shared state of one job execution.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, warn};

use super::listener::AnalysisListener;
use super::metrics::AnalysisJobMetrics;
use crate::error::{FlowError, RecordedError};
use crate::job::{ComponentDefinition, ComponentId, Job};
use crate::result::{AnalyzerResultFuture, ComponentResult, ResultHandle};

/// Everything a running execution shares between its pipelines and the
/// [`AnalysisResultFuture`](crate::result::AnalysisResultFuture) handed to the caller.
pub(crate) struct ExecutionState {
    job: Arc<Job>,
    listener: Arc<dyn AnalysisListener>,
    cancelled: AtomicBool,
    /// Set once the outcome reported to listeners has been decided.
    settled: Mutex<bool>,
    errors: Mutex<Vec<RecordedError>>,
    results: Mutex<BTreeMap<ComponentId, ComponentResult>>,
    pending: Mutex<Vec<AnalyzerResultFuture>>,
    metrics: Mutex<AnalysisJobMetrics>,
    done: watch::Sender<bool>,
}

impl ExecutionState {
    pub(crate) fn new(job: Arc<Job>, listener: Arc<dyn AnalysisListener>) -> Arc<Self> {
        let (done, _) = watch::channel(false);
        let metrics = AnalysisJobMetrics::start(job.name());
        Arc::new(Self {
            job,
            listener,
            cancelled: AtomicBool::new(false),
            settled: Mutex::new(false),
            errors: Mutex::new(Vec::new()),
            results: Mutex::new(BTreeMap::new()),
            pending: Mutex::new(Vec::new()),
            metrics: Mutex::new(metrics),
            done,
        })
    }

    pub(crate) fn job(&self) -> &Arc<Job> {
        &self.job
    }

    pub(crate) fn listener(&self) -> &Arc<dyn AnalysisListener> {
        &self.listener
    }

    /// Requests cancellation. Has no effect once the outcome is settled.
    pub(crate) fn cancel(&self) {
        let settled = self.settled.lock();
        if *settled {
            return;
        }
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            warn!(job = %self.job.name(), "Cancellation requested");
        }
    }

    /// Freezes the cancellation flag and returns it.
    ///
    /// Called once all pipelines have finished, right before the outcome is
    /// reported, so a late `cancel` cannot contradict what listeners saw.
    pub(crate) fn settle(&self) -> bool {
        let mut settled = self.settled.lock();
        *settled = true;
        self.is_cancelled()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Records an error attributed to a component of the (sub-)job `job`.
    pub(crate) fn record_component_error(
        &self,
        job: &Job,
        component: &ComponentDefinition,
        row_id: Option<u64>,
        error: FlowError,
    ) {
        self.listener.error_in_component(job, component, row_id, &error);
        let mut recorded = RecordedError::new(job.name(), error).with_component(component.id(), component.name());
        if let Some(row_id) = row_id {
            recorded = recorded.with_row(row_id);
        }
        self.errors.lock().push(recorded);
    }

    /// Records an error not attributable to a single component.
    pub(crate) fn record_error(&self, job: &Job, row_id: Option<u64>, error: FlowError) {
        error!(job = %job.name(), ?row_id, %error, "Execution error");
        self.listener.error_unknown(job, &error);
        let mut recorded = RecordedError::new(job.name(), error);
        if let Some(row_id) = row_id {
            recorded = recorded.with_row(row_id);
        }
        self.errors.lock().push(recorded);
    }

    pub(crate) fn has_errors(&self) -> bool {
        !self.errors.lock().is_empty()
    }

    /// Recorded errors in a deterministic order.
    pub(crate) fn errors(&self) -> Vec<RecordedError> {
        let mut errors = self.errors.lock().clone();
        errors.sort();
        errors
    }

    pub(crate) fn store_result(&self, job: &Job, component: Arc<ComponentDefinition>, result: ResultHandle) {
        if let ResultHandle::Future(future) = &result {
            self.pending.lock().push(future.clone());
        }
        let entry = ComponentResult {
            job: job.name().to_string(),
            component,
            result,
        };
        self.results.lock().insert(entry.component.id(), entry);
    }

    pub(crate) fn results(&self) -> Vec<ComponentResult> {
        self.results.lock().values().cloned().collect()
    }

    pub(crate) fn result(&self, id: ComponentId) -> Option<ComponentResult> {
        self.results.lock().get(&id).cloned()
    }

    /// Result futures that were handed out by analyzers.
    pub(crate) fn pending_futures(&self) -> Vec<AnalyzerResultFuture> {
        self.pending.lock().clone()
    }

    pub(crate) fn metrics(&self) -> AnalysisJobMetrics {
        self.metrics.lock().clone()
    }

    pub(crate) fn record_end(&self) -> AnalysisJobMetrics {
        let mut metrics = self.metrics.lock();
        metrics.record_end();
        metrics.clone()
    }

    /// Marks the execution finished and wakes every waiter.
    pub(crate) fn mark_done(&self) {
        *self.settled.lock() = true;
        self.done.send_replace(true);
    }

    pub(crate) fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.done.subscribe()
    }
}
