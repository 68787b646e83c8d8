//! Numeric column statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::components::{
    AnnotatedRows, Analyzer, ComponentConfig, ComponentContext, RowAnnotation, RowAnnotationFactory,
};
use crate::engine::InputRow;
use crate::error::{FlowError, Result};
use crate::job::{ColumnId, InputColumn};
use crate::result::{
    reduce_count, reduce_max, reduce_min, reduce_weighted_mean, AnalyzerResult, MetricValue,
    ResultHandle, TypedReducer,
};

/// An `f64` updated lock-free through compare-and-swap on its bit pattern.
#[derive(Debug)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn update(&self, f: impl Fn(f64) -> f64) {
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
            Some(f(f64::from_bits(bits)).to_bits())
        });
    }
}

#[derive(Debug)]
struct ColumnAccumulator {
    column: InputColumn,
    rows: AtomicU64,
    nulls: AtomicU64,
    highest: AtomicF64,
    lowest: AtomicF64,
    sum: AtomicF64,
    sum_of_squares: AtomicF64,
    null_rows: RowAnnotation,
}

impl ColumnAccumulator {
    fn add(&self, value: Option<f64>, weight: u64) {
        self.rows.fetch_add(weight, Ordering::Relaxed);
        match value {
            None => {
                self.nulls.fetch_add(weight, Ordering::Relaxed);
            }
            Some(v) => {
                let w = weight as f64;
                self.highest.update(|h| h.max(v));
                self.lowest.update(|l| l.min(v));
                self.sum.update(|s| s + v * w);
                self.sum_of_squares.update(|s| s + v * v * w);
            }
        }
    }
}

/// Computes count, null count, extrema, sum, mean and standard deviation per input column.
pub struct NumberAnalyzer {
    columns: Vec<ColumnAccumulator>,
    annotations: Arc<dyn RowAnnotationFactory>,
    inputs: Vec<InputColumn>,
}

impl NumberAnalyzer {
    pub fn from_config(_config: &ComponentConfig, ctx: &ComponentContext) -> Result<Self> {
        let annotations = ctx.annotation_factory();
        let columns = ctx
            .inputs()
            .iter()
            .map(|column| ColumnAccumulator {
                column: column.clone(),
                rows: AtomicU64::new(0),
                nulls: AtomicU64::new(0),
                highest: AtomicF64::new(f64::NEG_INFINITY),
                lowest: AtomicF64::new(f64::INFINITY),
                sum: AtomicF64::new(0.0),
                sum_of_squares: AtomicF64::new(0.0),
                null_rows: annotations.create_annotation(),
            })
            .collect();
        Ok(Self {
            columns,
            annotations,
            inputs: ctx.inputs().to_vec(),
        })
    }
}

impl Analyzer for NumberAnalyzer {
    fn run(&self, row: &InputRow, weight: u64) -> Result<()> {
        for acc in &self.columns {
            let value = row.get(acc.column.id).as_f64();
            acc.add(value, weight);
            if value.is_none() {
                self.annotations.annotate(acc.null_rows, row, &self.inputs, weight);
            }
        }
        Ok(())
    }

    fn result(&self) -> Result<ResultHandle> {
        let columns = self
            .columns
            .iter()
            .map(|acc| {
                let row_count = acc.rows.load(Ordering::Acquire);
                let null_count = acc.nulls.load(Ordering::Acquire);
                let has_values = row_count > null_count;
                NumberColumnResult::from_sums(
                    acc.column.id,
                    acc.column.name.clone(),
                    row_count,
                    null_count,
                    has_values.then(|| acc.highest.load()),
                    has_values.then(|| acc.lowest.load()),
                    acc.sum.load(),
                    acc.sum_of_squares.load(),
                    self.annotations.snapshot(acc.null_rows),
                )
            })
            .collect();
        Ok(ResultHandle::immediate(NumberAnalyzerResult {
            columns,
            max_sample_rows: self.annotations.max_sample_rows(),
        }))
    }
}

/// Statistics of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberColumnResult {
    pub column_id: ColumnId,
    pub column: String,
    pub row_count: u64,
    pub null_count: u64,
    pub highest: Option<f64>,
    pub lowest: Option<f64>,
    pub sum: Option<f64>,
    pub sum_of_squares: Option<f64>,
    pub mean: Option<f64>,
    pub standard_deviation: Option<f64>,
    pub null_rows: AnnotatedRows,
}

impl NumberColumnResult {
    #[allow(clippy::too_many_arguments)]
    fn from_sums(
        column_id: ColumnId,
        column: String,
        row_count: u64,
        null_count: u64,
        highest: Option<f64>,
        lowest: Option<f64>,
        sum: f64,
        sum_of_squares: f64,
        null_rows: AnnotatedRows,
    ) -> Self {
        let n = row_count.saturating_sub(null_count);
        let (sum, sum_of_squares, mean) = if n == 0 {
            (None, None, None)
        } else {
            (Some(sum), Some(sum_of_squares), Some(sum / n as f64))
        };
        // sample standard deviation from the running sums
        let standard_deviation = match (sum, sum_of_squares) {
            (Some(s), Some(sq)) if n > 1 => {
                let n = n as f64;
                Some(((sq - s * s / n) / (n - 1.0)).max(0.0).sqrt())
            }
            _ => None,
        };
        Self {
            column_id,
            column,
            row_count,
            null_count,
            highest,
            lowest,
            sum,
            sum_of_squares,
            mean,
            standard_deviation,
            null_rows,
        }
    }

    /// Number of non-null values.
    pub fn value_count(&self) -> u64 {
        self.row_count.saturating_sub(self.null_count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberAnalyzerResult {
    pub columns: Vec<NumberColumnResult>,
    pub max_sample_rows: usize,
}

impl NumberAnalyzerResult {
    /// The first column named `name`. Names may repeat across inputs.
    pub fn column(&self, name: &str) -> Option<&NumberColumnResult> {
        self.columns.iter().find(|c| c.column == name)
    }

    pub fn column_by_id(&self, id: ColumnId) -> Option<&NumberColumnResult> {
        self.columns.iter().find(|c| c.column_id == id)
    }

    fn layout(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.columns.iter().map(|c| c.column_id)
    }
}

impl AnalyzerResult for NumberAnalyzerResult {
    fn metrics(&self) -> BTreeMap<String, MetricValue> {
        let mut metrics = BTreeMap::new();
        for c in &self.columns {
            let mut put = |name: &str, value: MetricValue| {
                metrics.insert(format!("{}.{name}", c.column), value);
            };
            put("row_count", c.row_count.into());
            put("null_count", c.null_count.into());
            for (name, value) in [
                ("highest", c.highest),
                ("lowest", c.lowest),
                ("sum", c.sum),
                ("mean", c.mean),
                ("standard_deviation", c.standard_deviation),
            ] {
                if let Some(v) = value {
                    put(name, v.into());
                }
            }
        }
        metrics
    }
}

/// Merges per-column statistics. Means are weighted by non-null value counts.
///
/// Partials must come from instances of the same component, so columns are
/// matched by position and their ids must agree.
pub struct NumberReducer;

impl TypedReducer for NumberReducer {
    type Output = NumberAnalyzerResult;

    fn reduce_typed(&self, partials: &[Arc<NumberAnalyzerResult>]) -> Result<NumberAnalyzerResult> {
        let first = partials
            .first()
            .ok_or_else(|| FlowError::reduction("No partial results to reduce"))?;
        if partials.iter().any(|p| !p.layout().eq(first.layout())) {
            return Err(FlowError::reduction(
                "Cannot merge number results with different input columns",
            ));
        }
        let max_sample_rows = partials.iter().map(|p| p.max_sample_rows).max().unwrap_or(0);

        let columns = first
            .columns
            .iter()
            .enumerate()
            .map(|(position, layout)| {
                let parts: Vec<&NumberColumnResult> = partials.iter().map(|p| &p.columns[position]).collect();
                let value_count = reduce_count(parts.iter().map(|c| c.value_count()));
                let sum = parts.iter().filter_map(|c| c.sum).sum::<f64>();
                let sum_of_squares = parts.iter().filter_map(|c| c.sum_of_squares).sum::<f64>();
                let mut merged = NumberColumnResult::from_sums(
                    layout.column_id,
                    layout.column.clone(),
                    reduce_count(parts.iter().map(|c| c.row_count)),
                    reduce_count(parts.iter().map(|c| c.null_count)),
                    reduce_max(parts.iter().filter_map(|c| c.highest)),
                    reduce_min(parts.iter().filter_map(|c| c.lowest)),
                    sum,
                    sum_of_squares,
                    AnnotatedRows::merge(parts.iter().map(|c| &c.null_rows), max_sample_rows),
                );
                if value_count > 0 {
                    merged.mean = reduce_weighted_mean(parts.iter().map(|c| (c.mean, c.value_count())));
                }
                merged
            })
            .collect();

        Ok(NumberAnalyzerResult {
            columns,
            max_sample_rows,
        })
    }
}
