//! Partitioned execution with result reduction.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::runner::AnalysisRunner;
use crate::error::{FlowError, Result};
use crate::job::{ComponentDefinition, ComponentId, Job};
use crate::result::{downcast_result, AnalysisResultFuture, AnalyzerResult};
use crate::sources::{RowQuery, RowSource, WindowedRowSource};

/// Runs a job over disjoint row windows of a source and merges the partial
/// results of every analyzer with its reducer.
///
/// Every analyzer in the job tree must declare a reducer, and the source
/// must report its row count up front.
#[derive(Clone)]
pub struct PartitionedAnalysisRunner {
    runner: AnalysisRunner,
    partitions: usize,
}

/// Merged analyzer results of a partitioned execution.
#[derive(Debug, Clone)]
pub struct PartitionedResults {
    partitions: usize,
    results: BTreeMap<ComponentId, (Arc<ComponentDefinition>, Arc<dyn AnalyzerResult>)>,
}

impl PartitionedResults {
    /// Number of windows the source was split into.
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    pub fn get(&self, component: ComponentId) -> Option<&Arc<dyn AnalyzerResult>> {
        self.results.get(&component).map(|(_, r)| r)
    }

    pub fn get_as<T: AnalyzerResult>(&self, component: ComponentId) -> Option<Arc<T>> {
        self.get(component).and_then(downcast_result::<T>)
    }

    /// All merged results of a given concrete type.
    pub fn of<T: AnalyzerResult>(&self) -> Vec<Arc<T>> {
        self.results
            .values()
            .filter_map(|(_, r)| downcast_result::<T>(r))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl PartitionedAnalysisRunner {
    pub fn new(runner: AnalysisRunner, partitions: usize) -> Self {
        Self { runner, partitions }
    }

    fn check_reducers(job: &Job) -> Result<()> {
        for component in job.all_components().iter().filter(|c| c.is_analyzer()) {
            if component.descriptor().reducer().is_none() {
                return Err(FlowError::configuration(format!(
                    "{component} has no result reducer and cannot run partitioned"
                )));
            }
        }
        Ok(())
    }

    fn windows(total: u64, partitions: usize) -> Vec<RowQuery> {
        let partitions = partitions as u64;
        let chunk = total.div_ceil(partitions).max(1);
        let mut windows = Vec::new();
        let mut first = 1;
        while windows.is_empty() || first <= total {
            windows.push(RowQuery::window(first, Some(chunk)));
            first += chunk;
        }
        windows
    }

    #[instrument(skip(self, job, source), fields(job = %job.name(), partitions = self.partitions))]
    pub async fn run(&self, job: &Arc<Job>, source: Arc<dyn RowSource>) -> Result<PartitionedResults> {
        if self.partitions == 0 {
            return Err(FlowError::configuration("partitions must be at least 1"));
        }
        Self::check_reducers(job)?;
        let total = source.expected_rows(&RowQuery::all()).await?.ok_or_else(|| {
            FlowError::configuration(format!(
                "Source '{}' does not report its row count and cannot be partitioned",
                source.name()
            ))
        })?;

        let windows = Self::windows(total, self.partitions);
        let futures: Vec<AnalysisResultFuture> = windows
            .iter()
            .map(|window| {
                let partition = WindowedRowSource::new(Arc::clone(&source), *window);
                self.runner.run(job, Arc::new(partition))
            })
            .collect::<Result<_>>()?;
        join_all(futures.iter().map(|f| f.wait())).await;

        let errors: usize = futures.iter().map(|f| f.errors().len()).sum();
        if futures.iter().any(|f| f.is_errornous()) {
            warn!(errors, "Partitioned execution was erroneous");
            return Err(FlowError::Errornous { errors });
        }

        let mut results = BTreeMap::new();
        for component in job.all_components().into_iter().filter(|c| c.is_analyzer()) {
            let Some(reducer) = component.descriptor().reducer() else {
                continue;
            };
            let mut partials = Vec::with_capacity(futures.len());
            for future in &futures {
                partials.push(future.result_for(component.id())?.resolve().await?);
            }
            let merged = reducer.reduce(&partials)?;
            results.insert(component.id(), (component, merged));
        }

        info!(windows = windows.len(), rows = total, "Partitioned execution merged");
        Ok(PartitionedResults {
            partitions: windows.len(),
            results,
        })
    }
}
