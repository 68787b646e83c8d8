//! DataFusion-backed row source with skip/limit pushdown.

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::dataframe::DataFrame;
use datafusion::prelude::SessionContext;
use futures::stream::{self, StreamExt};
use tracing::debug;

use super::{RowQuery, RowSource, RowStream, SourceRow};
use crate::error::{FlowError, Result};
use crate::job::Value;

/// Reads the rows of a table registered in a DataFusion [`SessionContext`].
///
/// Row windows are pushed into the `DataFrame` as `limit(skip, fetch)`, so only
/// the selected rows are ever materialized.
///
/// # Example
///
/// ```rust,ignore
/// use datafusion::prelude::*;
/// use term_flow::sources::TableRowSource;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let ctx = SessionContext::new();
/// ctx.register_csv("customers", "customers.csv", CsvReadOptions::new()).await?;
/// let source = TableRowSource::new(ctx, "customers", &["name", "email"]);
/// # Ok(())
/// # }
/// ```
pub struct TableRowSource {
    ctx: SessionContext,
    table: String,
    columns: Vec<String>,
}

impl TableRowSource {
    pub fn new(ctx: SessionContext, table: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            ctx,
            table: table.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    async fn frame(&self, query: &RowQuery) -> Result<DataFrame> {
        let columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        let df = self
            .ctx
            .table(self.table.as_str())
            .await?
            .select_columns(&columns)?;

        if query.is_unbounded() {
            return Ok(df);
        }
        let skip = query.first_row.saturating_sub(1) as usize;
        let fetch = query.max_rows.map(|m| m as usize);
        Ok(df.limit(skip, fetch)?)
    }
}

#[async_trait]
impl RowSource for TableRowSource {
    fn name(&self) -> &str {
        &self.table
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    async fn expected_rows(&self, query: &RowQuery) -> Result<Option<u64>> {
        let count = self.frame(query).await?.count().await?;
        Ok(Some(count as u64))
    }

    async fn open(&self, query: &RowQuery) -> Result<RowStream> {
        debug!(table = %self.table, first_row = query.first_row, max_rows = ?query.max_rows, "Opening table stream");
        let batches = self.frame(query).await?.execute_stream().await?;
        let first_row = query.first_row;

        let rows = batches
            .map(|batch| -> Result<Vec<Vec<Value>>> { batch_rows(&batch?) })
            .flat_map(|rows| match rows {
                Ok(rows) => stream::iter(rows.into_iter().map(Ok).collect::<Vec<_>>()),
                Err(e) => stream::iter(vec![Err(e)]),
            })
            .enumerate()
            .map(move |(i, row)| row.map(|values| SourceRow::new(first_row + i as u64, values)));
        Ok(rows.boxed())
    }
}

/// Converts a record batch into rows of [`Value`]s.
fn batch_rows(batch: &RecordBatch) -> Result<Vec<Vec<Value>>> {
    let mut rows = vec![Vec::with_capacity(batch.num_columns()); batch.num_rows()];
    for column in batch.columns() {
        for (row, value) in rows.iter_mut().zip(column_values(column)?) {
            row.push(value);
        }
    }
    Ok(rows)
}

fn column_values(array: &ArrayRef) -> Result<Vec<Value>> {
    let data_type = array.data_type().clone();
    if data_type == DataType::Boolean {
        let values = downcast::<BooleanArray>(array)?;
        return Ok(collect(values, |a, i| Value::Boolean(a.value(i))));
    }
    if data_type.is_integer() {
        let casted = cast(array.as_ref(), &DataType::Int64)?;
        let values = downcast::<Int64Array>(&casted)?;
        return Ok(collect(values, |a, i| Value::Integer(a.value(i))));
    }
    if data_type.is_floating() || matches!(data_type, DataType::Decimal128(_, _)) {
        let casted = cast(array.as_ref(), &DataType::Float64)?;
        let values = downcast::<Float64Array>(&casted)?;
        return Ok(collect(values, |a, i| Value::Float(a.value(i))));
    }
    let casted = cast(array.as_ref(), &DataType::Utf8)?;
    let values = downcast::<StringArray>(&casted)?;
    Ok(collect(values, |a, i| Value::Text(a.value(i).to_string())))
}

fn downcast<T: 'static>(array: &ArrayRef) -> Result<&T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        FlowError::data_source(format!("Unexpected array type {}", array.data_type()))
    })
}

fn collect<A: Array>(array: &A, value: impl Fn(&A, usize) -> Value) -> Vec<Value> {
    (0..array.len())
        .map(|i| {
            if array.is_null(i) {
                Value::Null
            } else {
                value(array, i)
            }
        })
        .collect()
}
