//! Per-value frequencies of a single column.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::components::{
    AnnotatedRows, Analyzer, BoundedMap, ComponentConfig, ComponentContext, RowAnnotation,
    RowAnnotationFactory,
};
use crate::engine::InputRow;
use crate::error::{FlowError, Result};
use crate::job::{ColumnId, InputColumn};
use crate::result::{
    merge_frequencies, reduce_count, AnalyzerResult, MetricValue, ResultHandle, TypedReducer,
};

/// Counts occurrences of each distinct value of its input column.
///
/// Counting locks only the map shard holding the value being updated. Nulls
/// are counted apart from named values. Counts are exact; sampled rows are
/// kept for at most as many distinct values as the context's bounded
/// collections allow.
pub struct ValueDistributionAnalyzer {
    input: InputColumn,
    counts: DashMap<String, u64>,
    nulls: AtomicU64,
    samples: Option<Samples>,
}

struct Samples {
    factory: Arc<dyn RowAnnotationFactory>,
    per_value: BoundedMap<RowAnnotation>,
    nulls: RowAnnotation,
}

impl ValueDistributionAnalyzer {
    pub fn from_config(config: &ComponentConfig, ctx: &ComponentContext) -> Result<Self> {
        let input = ctx.inputs().first().cloned().ok_or_else(|| {
            FlowError::configuration(format!("{} requires one input column", ctx.name()))
        })?;
        let samples = config.bool_or("record_samples", true)?.then(|| {
            let factory = ctx.annotation_factory();
            let nulls = factory.create_annotation();
            Samples {
                factory,
                per_value: ctx.collection_factory().create_map(),
                nulls,
            }
        });
        Ok(Self {
            input,
            counts: DashMap::new(),
            nulls: AtomicU64::new(0),
            samples,
        })
    }
}

impl Analyzer for ValueDistributionAnalyzer {
    fn run(&self, row: &InputRow, weight: u64) -> Result<()> {
        let columns = std::slice::from_ref(&self.input);
        match row.get(self.input.id).to_key() {
            None => {
                self.nulls.fetch_add(weight, Ordering::Relaxed);
                if let Some(samples) = &self.samples {
                    samples.factory.annotate(samples.nulls, row, columns, weight);
                }
            }
            Some(key) => {
                if let Some(samples) = &self.samples {
                    samples.per_value.upsert(
                        &key,
                        weight,
                        || samples.factory.create_annotation(),
                        |annotation| samples.factory.annotate(*annotation, row, columns, weight),
                    );
                }
                *self.counts.entry(key).or_insert(0) += weight;
            }
        }
        Ok(())
    }

    fn result(&self) -> Result<ResultHandle> {
        let counts: BTreeMap<String, u64> = self
            .counts
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        let null_count = self.nulls.load(Ordering::Acquire);
        let (samples, null_samples, unsampled_row_count, max_sample_rows) = match &self.samples {
            Some(s) => (
                s.per_value.snapshot(|annotation| s.factory.snapshot(*annotation)),
                s.factory.snapshot(s.nulls),
                s.per_value.overflow_count(),
                s.factory.max_sample_rows(),
            ),
            None => (BTreeMap::new(), AnnotatedRows::default(), 0, 0),
        };
        Ok(ResultHandle::immediate(ValueDistributionResult {
            column_id: self.input.id,
            column: self.input.name.clone(),
            total_count: counts.values().sum::<u64>() + null_count,
            null_count,
            counts,
            samples,
            null_samples,
            unsampled_row_count,
            max_sample_rows,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueDistributionResult {
    pub column_id: ColumnId,
    pub column: String,
    pub total_count: u64,
    pub null_count: u64,
    /// Counts of non-null values.
    pub counts: BTreeMap<String, u64>,
    pub samples: BTreeMap<String, AnnotatedRows>,
    pub null_samples: AnnotatedRows,
    /// Weighted non-null rows of values that got no sample because the
    /// sampled values were capped.
    #[serde(default)]
    pub unsampled_row_count: u64,
    pub max_sample_rows: usize,
}

impl ValueDistributionResult {
    pub fn count(&self, value: &str) -> u64 {
        self.counts.get(value).copied().unwrap_or(0)
    }

    /// Number of distinct values, counting null as one value when present.
    pub fn distinct_count(&self) -> usize {
        self.counts.len() + usize::from(self.null_count > 0)
    }

    /// Values occurring exactly once.
    pub fn unique_values(&self) -> Vec<&str> {
        self.counts
            .iter()
            .filter(|(_, c)| **c == 1)
            .map(|(v, _)| v.as_str())
            .collect()
    }

    /// The `n` most frequent values, ties broken by value.
    pub fn top_values(&self, n: usize) -> Vec<(&str, u64)> {
        let mut values: Vec<(&str, u64)> = self.counts.iter().map(|(v, c)| (v.as_str(), *c)).collect();
        values.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        values.truncate(n);
        values
    }
}

impl AnalyzerResult for ValueDistributionResult {
    fn metrics(&self) -> BTreeMap<String, MetricValue> {
        let counts = self
            .counts
            .iter()
            .map(|(v, c)| (v.clone(), MetricValue::from(*c)))
            .collect();
        BTreeMap::from([
            ("total_count".to_string(), self.total_count.into()),
            ("null_count".to_string(), self.null_count.into()),
            ("distinct_count".to_string(), (self.distinct_count() as u64).into()),
            ("unique_count".to_string(), (self.unique_values().len() as u64).into()),
            ("value_counts".to_string(), MetricValue::Map(counts)),
        ])
    }
}

/// Sums counts per value and merges sampled rows within the sample cap.
pub struct ValueDistributionReducer;

impl TypedReducer for ValueDistributionReducer {
    type Output = ValueDistributionResult;

    fn reduce_typed(&self, partials: &[Arc<ValueDistributionResult>]) -> Result<ValueDistributionResult> {
        let first = partials
            .first()
            .ok_or_else(|| FlowError::reduction("No partial results to reduce"))?;
        if let Some(other) = partials.iter().find(|p| p.column_id != first.column_id) {
            return Err(FlowError::reduction(format!(
                "Cannot merge value distributions of '{}' ({:?}) and '{}' ({:?})",
                first.column, first.column_id, other.column, other.column_id
            )));
        }
        let max_sample_rows = partials.iter().map(|p| p.max_sample_rows).max().unwrap_or(0);

        let mut samples: BTreeMap<String, AnnotatedRows> = BTreeMap::new();
        let values: Vec<&String> = partials.iter().flat_map(|p| p.samples.keys()).collect();
        for value in values {
            if samples.contains_key(value) {
                continue;
            }
            let merged = AnnotatedRows::merge(
                partials.iter().filter_map(|p| p.samples.get(value)),
                max_sample_rows,
            );
            samples.insert(value.clone(), merged);
        }

        Ok(ValueDistributionResult {
            column_id: first.column_id,
            column: first.column.clone(),
            total_count: reduce_count(partials.iter().map(|p| p.total_count)),
            null_count: reduce_count(partials.iter().map(|p| p.null_count)),
            counts: merge_frequencies(partials.iter().map(|p| &p.counts)),
            samples,
            null_samples: AnnotatedRows::merge(partials.iter().map(|p| &p.null_samples), max_sample_rows),
            unsampled_row_count: reduce_count(partials.iter().map(|p| p.unsampled_row_count)),
            max_sample_rows,
        })
    }
}
