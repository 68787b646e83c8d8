//! Row sources feeding the engine.
//!
//! A [`RowSource`] is read once per pipeline by a single producer. Sources
//! receive a [`RowQuery`] so that bounded windows (skip/limit) can be pushed
//! down instead of being evaluated per row.

mod table;

pub use table::TableRowSource;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{FlowError, Result};
use crate::job::Value;

/// A stream of rows produced by a source.
pub type RowStream = BoxStream<'static, Result<SourceRow>>;

/// A window over the physical rows of a source. Row ids start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowQuery {
    pub first_row: u64,
    pub max_rows: Option<u64>,
}

impl Default for RowQuery {
    fn default() -> Self {
        Self::all()
    }
}

impl RowQuery {
    /// Every row of the source.
    pub const fn all() -> Self {
        Self {
            first_row: 1,
            max_rows: None,
        }
    }

    pub fn window(first_row: u64, max_rows: Option<u64>) -> Self {
        Self {
            first_row: first_row.max(1),
            max_rows,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.first_row <= 1 && self.max_rows.is_none()
    }

    /// Exclusive upper bound of the window.
    pub fn end(&self) -> Option<u64> {
        self.max_rows.map(|m| self.first_row.saturating_add(m))
    }

    pub fn contains(&self, row_id: u64) -> bool {
        row_id >= self.first_row && self.end().map_or(true, |end| row_id < end)
    }

    /// The rows contained in both windows.
    pub fn intersect(&self, other: &RowQuery) -> RowQuery {
        let first_row = self.first_row.max(other.first_row);
        let end = match (self.end(), other.end()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        RowQuery {
            first_row,
            max_rows: end.map(|e| e.saturating_sub(first_row)),
        }
    }

    /// Number of rows selected from a source holding `total` rows.
    pub fn count_within(&self, total: u64) -> u64 {
        let available = total.saturating_sub(self.first_row.saturating_sub(1));
        self.max_rows.map_or(available, |m| m.min(available))
    }

    /// Applies the window to a stream of values numbered from 1.
    pub fn apply<S>(&self, values: S) -> RowStream
    where
        S: futures::Stream<Item = Result<Vec<Value>>> + Send + 'static,
    {
        self.apply_weighted(values.map(|r| r.map(|values| (values, 1))))
    }

    /// Like [`apply`](Self::apply), for rows that each stand for `weight` identical rows.
    pub fn apply_weighted<S>(&self, rows: S) -> RowStream
    where
        S: futures::Stream<Item = Result<(Vec<Value>, u64)>> + Send + 'static,
    {
        let first = self.first_row;
        let skipped = rows.skip(first.saturating_sub(1) as usize);
        let numbered = skipped.enumerate().map(move |(i, r)| {
            r.map(|(values, weight)| SourceRow::new(first + i as u64, values).with_weight(weight))
        });
        match self.max_rows {
            Some(max) => numbered.take(max as usize).boxed(),
            None => numbered.boxed(),
        }
    }
}

/// A physical row read from a source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// Position in the source, starting at 1.
    pub id: u64,
    pub values: Vec<Value>,
    /// Number of identical rows this row stands for.
    pub weight: u64,
}

impl SourceRow {
    pub fn new(id: u64, values: Vec<Value>) -> Self {
        Self { id, values, weight: 1 }
    }

    pub fn with_weight(mut self, weight: u64) -> Self {
        self.weight = weight;
        self
    }
}

/// A readable table of rows.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    /// Column names, in the order values appear in each row.
    fn column_names(&self) -> Vec<String>;

    /// Number of rows the query will yield, when known up front.
    async fn expected_rows(&self, query: &RowQuery) -> Result<Option<u64>>;

    /// Opens a stream over the rows selected by the query.
    async fn open(&self, query: &RowQuery) -> Result<RowStream>;

    /// Resolves column names to positions in this source's rows.
    fn projection(&self, columns: &[String]) -> Result<Vec<usize>> {
        let names = self.column_names();
        columns
            .iter()
            .map(|c| {
                names.iter().position(|n| n == c).ok_or_else(|| FlowError::ColumnNotFound {
                    job: self.name().to_string(),
                    column: c.clone(),
                })
            })
            .collect()
    }
}

/// A source over rows held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryRowSource {
    name: String,
    columns: Vec<String>,
    rows: Arc<Vec<Vec<Value>>>,
}

impl InMemoryRowSource {
    pub fn new(name: impl Into<String>, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Arc::new(rows),
        }
    }

    /// A single-column source.
    pub fn from_column<V: Into<Value>>(
        name: impl Into<String>,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let rows = values.into_iter().map(|v| vec![v.into()]).collect();
        Self::new(name, &[column], rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl RowSource for InMemoryRowSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    async fn expected_rows(&self, query: &RowQuery) -> Result<Option<u64>> {
        Ok(Some(query.count_within(self.rows.len() as u64)))
    }

    async fn open(&self, query: &RowQuery) -> Result<RowStream> {
        let rows = Arc::clone(&self.rows);
        let values = stream::iter((0..rows.len()).map(move |i| Ok(rows[i].clone())));
        Ok(query.apply(values))
    }
}

/// Restricts another source to a fixed window, e.g. one partition of a larger table.
pub struct WindowedRowSource {
    inner: Arc<dyn RowSource>,
    window: RowQuery,
    name: String,
}

impl WindowedRowSource {
    pub fn new(inner: Arc<dyn RowSource>, window: RowQuery) -> Self {
        let name = format!("{}[{}..]", inner.name(), window.first_row);
        Self {
            inner,
            window,
            name,
        }
    }

    pub fn window(&self) -> RowQuery {
        self.window
    }
}

#[async_trait]
impl RowSource for WindowedRowSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn column_names(&self) -> Vec<String> {
        self.inner.column_names()
    }

    async fn expected_rows(&self, query: &RowQuery) -> Result<Option<u64>> {
        self.inner.expected_rows(&self.window.intersect(query)).await
    }

    async fn open(&self, query: &RowQuery) -> Result<RowStream> {
        self.inner.open(&self.window.intersect(query)).await
    }
}
