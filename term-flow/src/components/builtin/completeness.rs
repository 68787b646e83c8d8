use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::components::{
    AnnotatedRows, Analyzer, ComponentConfig, ComponentContext, RowAnnotation, RowAnnotationFactory,
};
use crate::engine::{InputRow, OutputRowCollector};
use crate::error::{FlowError, Result};
use crate::job::InputColumn;
use crate::result::{reduce_count, AnalyzerResult, MetricValue, ResultHandle, TypedReducer};

pub const COMPLETE_STREAM: &str = "complete";
pub const INCOMPLETE_STREAM: &str = "incomplete";

/// How the fields of a row decide whether it is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvaluationMode {
    /// Incomplete if any input is null or blank.
    #[default]
    AllFields,
    /// Incomplete only if every input is null or blank.
    AnyField,
}

impl FromStr for EvaluationMode {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ALL_FIELDS" => Ok(Self::AllFields),
            "ANY_FIELD" => Ok(Self::AnyField),
            other => Err(FlowError::configuration(format!(
                "Unknown evaluation_mode '{other}', expected ALL_FIELDS or ANY_FIELD"
            ))),
        }
    }
}

/// Counts complete and incomplete rows, sampling the incomplete ones.
///
/// Rows are also published to the `complete` and `incomplete` output data
/// streams when a job consumes them.
pub struct CompletenessAnalyzer {
    inputs: Vec<InputColumn>,
    mode: EvaluationMode,
    valid: AtomicU64,
    invalid: AtomicU64,
    annotations: Arc<dyn RowAnnotationFactory>,
    incomplete_rows: RowAnnotation,
    complete_stream: Option<Arc<OutputRowCollector>>,
    incomplete_stream: Option<Arc<OutputRowCollector>>,
}

impl CompletenessAnalyzer {
    pub fn from_config(config: &ComponentConfig, ctx: &ComponentContext) -> Result<Self> {
        let mode = match config.get_str("evaluation_mode")? {
            Some(mode) => mode.parse()?,
            None => EvaluationMode::default(),
        };
        let annotations = ctx.annotation_factory();
        let incomplete_rows = annotations.create_annotation();
        Ok(Self {
            inputs: ctx.inputs().to_vec(),
            mode,
            valid: AtomicU64::new(0),
            invalid: AtomicU64::new(0),
            annotations,
            incomplete_rows,
            complete_stream: ctx.output_stream(COMPLETE_STREAM),
            incomplete_stream: ctx.output_stream(INCOMPLETE_STREAM),
        })
    }

    fn is_complete(&self, row: &InputRow) -> bool {
        let mut blanks = self.inputs.iter().map(|c| row.get(c.id).is_blank());
        match self.mode {
            EvaluationMode::AllFields => !blanks.any(|b| b),
            EvaluationMode::AnyField => !blanks.all(|b| b),
        }
    }
}

impl Analyzer for CompletenessAnalyzer {
    fn run(&self, row: &InputRow, weight: u64) -> Result<()> {
        let stream = if self.is_complete(row) {
            self.valid.fetch_add(weight, Ordering::Relaxed);
            &self.complete_stream
        } else {
            self.invalid.fetch_add(weight, Ordering::Relaxed);
            self.annotations
                .annotate(self.incomplete_rows, row, &self.inputs, weight);
            &self.incomplete_stream
        };
        if let Some(stream) = stream {
            stream.push_weighted(row.values_of(&self.inputs), weight)?;
        }
        Ok(())
    }

    fn result(&self) -> Result<ResultHandle> {
        Ok(ResultHandle::immediate(CompletenessResult {
            valid_row_count: self.valid.load(Ordering::Acquire),
            invalid_row_count: self.invalid.load(Ordering::Acquire),
            incomplete_rows: self.annotations.snapshot(self.incomplete_rows),
            max_sample_rows: self.annotations.max_sample_rows(),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessResult {
    pub valid_row_count: u64,
    pub invalid_row_count: u64,
    pub incomplete_rows: AnnotatedRows,
    pub max_sample_rows: usize,
}

impl CompletenessResult {
    pub fn total_row_count(&self) -> u64 {
        self.valid_row_count + self.invalid_row_count
    }

    /// Fraction of complete rows. An empty run counts as complete.
    pub fn completeness(&self) -> f64 {
        match self.total_row_count() {
            0 => 1.0,
            total => self.valid_row_count as f64 / total as f64,
        }
    }
}

impl AnalyzerResult for CompletenessResult {
    fn metrics(&self) -> BTreeMap<String, MetricValue> {
        BTreeMap::from([
            ("valid_row_count".to_string(), self.valid_row_count.into()),
            ("invalid_row_count".to_string(), self.invalid_row_count.into()),
            ("completeness".to_string(), self.completeness().into()),
        ])
    }
}

pub struct CompletenessReducer;

impl TypedReducer for CompletenessReducer {
    type Output = CompletenessResult;

    fn reduce_typed(&self, partials: &[Arc<CompletenessResult>]) -> Result<CompletenessResult> {
        let max_sample_rows = partials.iter().map(|p| p.max_sample_rows).max().unwrap_or(0);
        Ok(CompletenessResult {
            valid_row_count: reduce_count(partials.iter().map(|p| p.valid_row_count)),
            invalid_row_count: reduce_count(partials.iter().map(|p| p.invalid_row_count)),
            incomplete_rows: AnnotatedRows::merge(
                partials.iter().map(|p| &p.incomplete_rows),
                max_sample_rows,
            ),
            max_sample_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::InMemoryRowAnnotationFactory;
    use crate::job::{ColumnId, Value};

    fn run(mode: &str) -> Arc<CompletenessResult> {
        let columns = vec![
            InputColumn::physical(ColumnId::new(1), "a"),
            InputColumn::physical(ColumnId::new(2), "b"),
        ];
        let ctx = ComponentContext::new(
            "completeness",
            columns.clone(),
            Vec::new(),
            InMemoryRowAnnotationFactory::shared(10),
        );
        let config = ComponentConfig::new().with("evaluation_mode", mode);
        let analyzer = CompletenessAnalyzer::from_config(&config, &ctx).unwrap();
        let rows = [
            vec![Value::from("x"), Value::from("y")],
            vec![Value::from("x"), Value::Null],
            vec![Value::Null, Value::from(" ")],
        ];
        for (i, values) in rows.into_iter().enumerate() {
            let id = i as u64 + 1;
            analyzer.run(&InputRow::from_source(id, id, &columns, values), 1).unwrap();
        }
        analyzer.result().unwrap().downcast::<CompletenessResult>().unwrap()
    }

    #[test]
    fn test_all_fields_mode() {
        let result = run("ALL_FIELDS");
        assert_eq!(result.valid_row_count, 1);
        assert_eq!(result.invalid_row_count, 2);
        assert_eq!(result.incomplete_rows.rows.len(), 2);
    }

    #[test]
    fn test_any_field_mode() {
        let result = run("ANY_FIELD");
        assert_eq!(result.valid_row_count, 2);
        assert_eq!(result.invalid_row_count, 1);
        assert_eq!(result.incomplete_rows.rows[0].row_id, 3);
    }

    #[test]
    fn test_unknown_mode_is_configuration_error() {
        let err = "SOME_FIELDS".parse::<EvaluationMode>().unwrap_err();
        assert!(err.is_configuration());
    }
}
