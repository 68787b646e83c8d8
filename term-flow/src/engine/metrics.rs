//! Execution metrics handed to listeners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::job::ComponentId;
use crate::sources::RowQuery;

/// Timing of one job execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJobMetrics {
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AnalysisJobMetrics {
    pub(crate) fn start(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn record_end(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

/// Progress of one row-processing pipeline.
///
/// Clones share the processed-row counter.
#[derive(Debug, Clone)]
pub struct RowProcessingMetrics {
    job_name: String,
    expected_rows: Option<u64>,
    query: RowQuery,
    eliminated_filters: Vec<ComponentId>,
    processed: Arc<AtomicU64>,
}

impl RowProcessingMetrics {
    pub(crate) fn new(
        job_name: impl Into<String>,
        expected_rows: Option<u64>,
        query: RowQuery,
        eliminated_filters: Vec<ComponentId>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            expected_rows,
            query,
            eliminated_filters,
            processed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Rows the source reported for the effective query, if it knows up front.
    pub fn expected_rows(&self) -> Option<u64> {
        self.expected_rows
    }

    /// The query sent to the source after filter pushdown.
    pub fn query(&self) -> RowQuery {
        self.query
    }

    /// Filters folded into the query instead of running per row.
    pub fn eliminated_filters(&self) -> &[ComponentId] {
        &self.eliminated_filters
    }

    /// Rows whose processing task has completed.
    pub fn processed_rows(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    pub(crate) fn row_processed(&self) {
        self.processed.fetch_add(1, Ordering::AcqRel);
    }
}

/// Invocation counters of one component.
#[derive(Debug, Default)]
pub struct ComponentMetrics {
    invocations: AtomicU64,
    errors: AtomicU64,
}

impl ComponentMetrics {
    pub(crate) fn invoked(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}
