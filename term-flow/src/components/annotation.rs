//! Row annotations: bounded samples of "interesting" rows for drill-to-detail.
//!
//! Analyzers create a [`RowAnnotation`] per value or category they track and
//! annotate rows into it. The factory keeps an exact weighted row count for
//! every annotation, but only stores up to `max_sample_rows` sample rows.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::engine::InputRow;
use crate::job::{InputColumn, Value};

/// Handle of one annotation created by a [`RowAnnotationFactory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowAnnotation(u64);

impl RowAnnotation {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A sampled row, restricted to the columns the annotating component reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    pub row_id: u64,
    pub values: Vec<Value>,
}

/// Detached snapshot of an annotation, carried inside analyzer results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedRows {
    /// Weighted number of annotated rows.
    pub row_count: u64,
    /// Sampled rows, at most the cap of the factory that produced them.
    pub rows: Vec<SampleRow>,
}

impl AnnotatedRows {
    /// True when every annotated row is present in the sample.
    pub fn is_complete(&self) -> bool {
        self.rows.len() as u64 == self.row_count
    }

    /// Merges snapshots from partial results.
    ///
    /// Samples of a partial are copied only while they are complete and fit
    /// within `max_sample_rows`; otherwise only the count is transferred.
    pub fn merge<'a>(
        partials: impl IntoIterator<Item = &'a AnnotatedRows>,
        max_sample_rows: usize,
    ) -> AnnotatedRows {
        let mut merged = AnnotatedRows::default();
        for partial in partials {
            merged.row_count += partial.row_count;
            if partial.is_complete() && merged.rows.len() + partial.rows.len() <= max_sample_rows {
                merged.rows.extend(partial.rows.iter().cloned());
            }
        }
        merged
    }
}

/// Storage for annotated rows, injected into components.
pub trait RowAnnotationFactory: Send + Sync {
    fn create_annotation(&self) -> RowAnnotation;

    /// Records `row` (with multiplicity `weight`) under the annotation.
    fn annotate(
        &self,
        annotation: RowAnnotation,
        row: &InputRow,
        columns: &[InputColumn],
        weight: u64,
    );

    fn row_count(&self, annotation: RowAnnotation) -> u64;

    fn snapshot(&self, annotation: RowAnnotation) -> AnnotatedRows;

    fn max_sample_rows(&self) -> usize;
}

/// In-memory [`RowAnnotationFactory`] with a per-annotation sample cap.
///
/// Counts and samples are kept per annotation in concurrent maps, so rows of
/// different annotations never contend.
#[derive(Debug)]
pub struct InMemoryRowAnnotationFactory {
    next_id: AtomicU64,
    counts: DashMap<RowAnnotation, u64>,
    samples: DashMap<RowAnnotation, Vec<SampleRow>>,
    max_sample_rows: usize,
}

impl InMemoryRowAnnotationFactory {
    pub fn new(max_sample_rows: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            counts: DashMap::new(),
            samples: DashMap::new(),
            max_sample_rows,
        }
    }

    pub fn shared(max_sample_rows: usize) -> Arc<dyn RowAnnotationFactory> {
        Arc::new(Self::new(max_sample_rows))
    }
}

impl RowAnnotationFactory for InMemoryRowAnnotationFactory {
    fn create_annotation(&self) -> RowAnnotation {
        let annotation = RowAnnotation(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.counts.insert(annotation, 0);
        annotation
    }

    fn annotate(
        &self,
        annotation: RowAnnotation,
        row: &InputRow,
        columns: &[InputColumn],
        weight: u64,
    ) {
        *self.counts.entry(annotation).or_insert(0) += weight;

        let mut samples = self.samples.entry(annotation).or_default();
        if samples.len() < self.max_sample_rows && !samples.iter().any(|s| s.row_id == row.id()) {
            samples.push(SampleRow {
                row_id: row.id(),
                values: row.values_of(columns),
            });
        }
    }

    fn row_count(&self, annotation: RowAnnotation) -> u64 {
        self.counts.get(&annotation).map_or(0, |c| *c)
    }

    fn snapshot(&self, annotation: RowAnnotation) -> AnnotatedRows {
        let mut rows = self
            .samples
            .get(&annotation)
            .map(|s| s.value().clone())
            .unwrap_or_default();
        rows.sort_by_key(|r| r.row_id);
        AnnotatedRows {
            row_count: self.row_count(annotation),
            rows,
        }
    }

    fn max_sample_rows(&self) -> usize {
        self.max_sample_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ColumnId;

    fn row(id: u64, value: &str) -> (InputRow, Vec<InputColumn>) {
        let column = InputColumn::physical(ColumnId::new(1), "v");
        let row = InputRow::from_source(id, id, std::slice::from_ref(&column), vec![Value::from(value)]);
        (row, vec![column])
    }

    #[test]
    fn test_samples_are_capped_but_counts_are_exact() {
        let factory = InMemoryRowAnnotationFactory::new(2);
        let annotation = factory.create_annotation();
        for id in 1..=5 {
            let (row, columns) = row(id, "x");
            factory.annotate(annotation, &row, &columns, 2);
        }

        let snapshot = factory.snapshot(annotation);
        assert_eq!(snapshot.row_count, 10);
        assert_eq!(snapshot.rows.len(), 2);
        assert!(!snapshot.is_complete());
    }

    #[test]
    fn test_merge_reannotates_complete_samples() {
        let a = AnnotatedRows {
            row_count: 1,
            rows: vec![SampleRow { row_id: 1, values: vec![Value::from("a")] }],
        };
        let b = AnnotatedRows {
            row_count: 1,
            rows: vec![SampleRow { row_id: 7, values: vec![Value::from("b")] }],
        };
        let merged = AnnotatedRows::merge([&a, &b], 10);
        assert_eq!(merged.row_count, 2);
        assert_eq!(merged.rows.len(), 2);
        assert!(merged.is_complete());
    }

    #[test]
    fn test_merge_transfers_count_when_cap_exceeded() {
        let sampled = AnnotatedRows {
            row_count: 40,
            rows: vec![SampleRow { row_id: 1, values: vec![] }; 2],
        };
        let complete = AnnotatedRows {
            row_count: 1,
            rows: vec![SampleRow { row_id: 3, values: vec![] }],
        };
        let merged = AnnotatedRows::merge([&sampled, &complete], 2);
        assert_eq!(merged.row_count, 41);
        assert_eq!(merged.rows.len(), 1);
    }
}
