//! Observers of job execution.
//!
//! Per execution, callbacks fire in this order: `job_begin`, then for every
//! pipeline `row_processing_begin`, `component_begin` per component, any
//! number of `row_processing_progress`, `row_processing_success`,
//! `component_success` per component, and finally exactly one of
//! `job_success`, `job_failed` or `job_cancelled`. Nested pipelines interleave
//! with their parent. Error callbacks may fire at any point.

use std::sync::Arc;
use tracing::{error, info, warn};

use super::metrics::{AnalysisJobMetrics, RowProcessingMetrics};
use crate::error::{FlowError, RecordedError};
use crate::job::{ComponentDefinition, Job};
use crate::logging::{truncate_field, LogConfig};
use crate::result::AnalyzerResult;
use crate::{log_lifecycle, perf_debug};

/// Receives lifecycle callbacks of a job execution. All methods default to no-ops.
#[allow(unused_variables)]
pub trait AnalysisListener: Send + Sync {
    fn job_begin(&self, job: &Job, metrics: &AnalysisJobMetrics) {}

    fn job_success(&self, job: &Job, metrics: &AnalysisJobMetrics) {}

    fn job_failed(&self, job: &Job, metrics: &AnalysisJobMetrics, errors: &[RecordedError]) {}

    fn job_cancelled(&self, job: &Job, metrics: &AnalysisJobMetrics) {}

    fn row_processing_begin(&self, job: &Job, metrics: &RowProcessingMetrics) {}

    fn row_processing_progress(&self, job: &Job, metrics: &RowProcessingMetrics, current_row: u64) {}

    fn row_processing_success(&self, job: &Job, metrics: &RowProcessingMetrics) {}

    fn component_begin(&self, job: &Job, component: &ComponentDefinition) {}

    /// `result` is present for analyzers only.
    fn component_success(
        &self,
        job: &Job,
        component: &ComponentDefinition,
        result: Option<&Arc<dyn AnalyzerResult>>,
    ) {
    }

    fn error_in_component(
        &self,
        job: &Job,
        component: &ComponentDefinition,
        row_id: Option<u64>,
        error: &FlowError,
    ) {
    }

    fn error_unknown(&self, job: &Job, error: &FlowError) {}
}

/// Forwards every callback to each of its listeners, in order.
#[derive(Clone, Default)]
pub struct CompositeAnalysisListener {
    listeners: Vec<Arc<dyn AnalysisListener>>,
}

impl CompositeAnalysisListener {
    pub fn new(listeners: Vec<Arc<dyn AnalysisListener>>) -> Self {
        Self { listeners }
    }

    pub fn add(&mut self, listener: Arc<dyn AnalysisListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl AnalysisListener for CompositeAnalysisListener {
    fn job_begin(&self, job: &Job, metrics: &AnalysisJobMetrics) {
        self.listeners.iter().for_each(|l| l.job_begin(job, metrics));
    }

    fn job_success(&self, job: &Job, metrics: &AnalysisJobMetrics) {
        self.listeners.iter().for_each(|l| l.job_success(job, metrics));
    }

    fn job_failed(&self, job: &Job, metrics: &AnalysisJobMetrics, errors: &[RecordedError]) {
        self.listeners.iter().for_each(|l| l.job_failed(job, metrics, errors));
    }

    fn job_cancelled(&self, job: &Job, metrics: &AnalysisJobMetrics) {
        self.listeners.iter().for_each(|l| l.job_cancelled(job, metrics));
    }

    fn row_processing_begin(&self, job: &Job, metrics: &RowProcessingMetrics) {
        self.listeners.iter().for_each(|l| l.row_processing_begin(job, metrics));
    }

    fn row_processing_progress(&self, job: &Job, metrics: &RowProcessingMetrics, current_row: u64) {
        self.listeners
            .iter()
            .for_each(|l| l.row_processing_progress(job, metrics, current_row));
    }

    fn row_processing_success(&self, job: &Job, metrics: &RowProcessingMetrics) {
        self.listeners.iter().for_each(|l| l.row_processing_success(job, metrics));
    }

    fn component_begin(&self, job: &Job, component: &ComponentDefinition) {
        self.listeners.iter().for_each(|l| l.component_begin(job, component));
    }

    fn component_success(
        &self,
        job: &Job,
        component: &ComponentDefinition,
        result: Option<&Arc<dyn AnalyzerResult>>,
    ) {
        self.listeners
            .iter()
            .for_each(|l| l.component_success(job, component, result));
    }

    fn error_in_component(
        &self,
        job: &Job,
        component: &ComponentDefinition,
        row_id: Option<u64>,
        error: &FlowError,
    ) {
        self.listeners
            .iter()
            .for_each(|l| l.error_in_component(job, component, row_id, error));
    }

    fn error_unknown(&self, job: &Job, error: &FlowError) {
        self.listeners.iter().for_each(|l| l.error_unknown(job, error));
    }
}

/// Reports execution through `tracing`, with detail controlled by a [`LogConfig`].
#[derive(Debug, Clone, Default)]
pub struct LoggingAnalysisListener {
    config: LogConfig,
}

impl LoggingAnalysisListener {
    pub fn new(config: LogConfig) -> Self {
        Self { config }
    }
}

impl AnalysisListener for LoggingAnalysisListener {
    fn job_begin(&self, job: &Job, _metrics: &AnalysisJobMetrics) {
        info!(job = %job.name(), components = job.components().len(), "Job execution started");
    }

    fn job_success(&self, job: &Job, metrics: &AnalysisJobMetrics) {
        let duration_ms = metrics.duration().map(|d| d.num_milliseconds());
        info!(job = %job.name(), ?duration_ms, "Job execution succeeded");
    }

    fn job_failed(&self, job: &Job, _metrics: &AnalysisJobMetrics, errors: &[RecordedError]) {
        error!(job = %job.name(), errors = errors.len(), "Job execution failed");
    }

    fn job_cancelled(&self, job: &Job, _metrics: &AnalysisJobMetrics) {
        warn!(job = %job.name(), "Job execution cancelled");
    }

    fn row_processing_begin(&self, job: &Job, metrics: &RowProcessingMetrics) {
        if self.config.pipeline_events {
            info!(
                job = %job.name(),
                expected_rows = ?metrics.expected_rows(),
                first_row = metrics.query().first_row,
                max_rows = ?metrics.query().max_rows,
                eliminated_filters = metrics.eliminated_filters().len(),
                "Row processing started"
            );
        }
    }

    fn row_processing_progress(&self, job: &Job, metrics: &RowProcessingMetrics, current_row: u64) {
        perf_debug!(
            self.config,
            job = %job.name(),
            current_row,
            processed = metrics.processed_rows(),
            "Row processing progress"
        );
    }

    fn row_processing_success(&self, job: &Job, metrics: &RowProcessingMetrics) {
        if self.config.pipeline_events {
            info!(job = %job.name(), rows = metrics.processed_rows(), "Row processing finished");
        }
    }

    fn component_begin(&self, job: &Job, component: &ComponentDefinition) {
        log_lifecycle!(self.config, job = %job.name(), component = %component, "Component started");
    }

    fn component_success(
        &self,
        job: &Job,
        component: &ComponentDefinition,
        result: Option<&Arc<dyn AnalyzerResult>>,
    ) {
        if let Some(result) = result {
            let rendered = truncate_field(&format!("{result:?}"), self.config.max_result_length);
            log_lifecycle!(self.config, job = %job.name(), component = %component, result = %rendered, "Component succeeded");
        } else {
            log_lifecycle!(self.config, job = %job.name(), component = %component, "Component succeeded");
        }
    }

    fn error_in_component(
        &self,
        job: &Job,
        component: &ComponentDefinition,
        row_id: Option<u64>,
        error: &FlowError,
    ) {
        warn!(job = %job.name(), component = %component, ?row_id, %error, "Error in component");
    }

    fn error_unknown(&self, job: &Job, error: &FlowError) {
        error!(job = %job.name(), %error, "Error during execution");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Counting {
        events: Mutex<Vec<&'static str>>,
    }

    impl AnalysisListener for Counting {
        fn job_begin(&self, _job: &Job, _metrics: &AnalysisJobMetrics) {
            self.events.lock().push("job_begin");
        }

        fn error_unknown(&self, _job: &Job, _error: &FlowError) {
            self.events.lock().push("error_unknown");
        }
    }

    #[test]
    fn test_composite_fans_out_in_order() {
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        let composite = CompositeAnalysisListener::new(vec![a.clone() as Arc<dyn AnalysisListener>, b.clone()]);
        let job = crate::job::JobBuilder::new("empty").build().unwrap();

        composite.job_begin(&job, &AnalysisJobMetrics::start("empty"));
        composite.error_unknown(&job, &FlowError::internal("x"));
        assert_eq!(*a.events.lock(), vec!["job_begin", "error_unknown"]);
        assert_eq!(*b.events.lock(), vec!["job_begin", "error_unknown"]);
    }
}
