//! Serializable summaries of an execution.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::{ComponentResult, MetricValue};
use crate::engine::AnalysisJobMetrics;
use crate::error::{RecordedError, Result};
use crate::job::ComponentId;

/// Summary of one execution: timing, outcome, the metrics of every available
/// analyzer result and the recorded errors.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub job: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub successful: bool,
    pub cancelled: bool,
    pub components: Vec<ComponentSummary>,
    pub errors: Vec<RecordedError>,
}

/// Metrics of one analyzer result.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentSummary {
    pub id: ComponentId,
    pub name: String,
    pub component_type: String,
    /// The (sub-)job the component ran in.
    pub job: String,
    pub metrics: BTreeMap<String, MetricValue>,
}

impl AnalysisSummary {
    pub(crate) fn collect(
        job: &str,
        metrics: &AnalysisJobMetrics,
        successful: bool,
        cancelled: bool,
        results: &[ComponentResult],
        errors: Vec<RecordedError>,
    ) -> Self {
        // pending or failed futures have no metrics to report
        let components = results
            .iter()
            .filter_map(|r| {
                let result = r.result.get()?;
                Some(ComponentSummary {
                    id: r.component.id(),
                    name: r.component.name().to_string(),
                    component_type: r.component.descriptor().type_id().to_string(),
                    job: r.job.clone(),
                    metrics: result.metrics(),
                })
            })
            .collect();

        Self {
            job: job.to_string(),
            started_at: metrics.started_at,
            finished_at: metrics.finished_at,
            duration_ms: metrics.duration().map(|d| d.num_milliseconds()),
            successful,
            cancelled,
            components,
            errors,
        }
    }

    /// Total number of metrics over all components.
    pub fn total_metrics(&self) -> usize {
        self.components.iter().map(|c| c.metrics.len()).sum()
    }

    pub fn component(&self, name: &str) -> Option<&ComponentSummary> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
