//! Rows as seen by components.

use std::collections::HashMap;

use crate::job::{ColumnId, InputColumn, Value};

static NULL: Value = Value::Null;

/// One source record plus every virtual column computed for it so far.
///
/// Values are keyed by column identity. A column that has not been computed
/// for this row (for instance because its producer was not eligible) reads as
/// [`Value::Null`].
#[derive(Debug, Clone, PartialEq)]
pub struct InputRow {
    id: u64,
    number: u64,
    values: HashMap<ColumnId, Value>,
}

impl InputRow {
    /// Creates an empty row. `id` is the physical position in the source,
    /// `number` the 1-based processing sequence within the pipeline.
    pub fn new(id: u64, number: u64) -> Self {
        Self {
            id,
            number,
            values: HashMap::new(),
        }
    }

    /// Creates a row from source values, matched to columns by position.
    pub fn from_source(id: u64, number: u64, columns: &[InputColumn], values: Vec<Value>) -> Self {
        let mut row = Self::new(id, number);
        for (column, value) in columns.iter().zip(values) {
            row.values.insert(column.id, value);
        }
        row
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn get(&self, column: ColumnId) -> &Value {
        self.values.get(&column).unwrap_or(&NULL)
    }

    /// Values of the given columns, in order.
    pub fn values_of(&self, columns: &[InputColumn]) -> Vec<Value> {
        columns.iter().map(|c| self.get(c.id).clone()).collect()
    }

    pub fn set(&mut self, column: ColumnId, value: Value) {
        self.values.insert(column, value);
    }

    pub fn contains(&self, column: ColumnId) -> bool {
        self.values.contains_key(&column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_read_as_null() {
        let name = InputColumn::physical(ColumnId::new(1), "name");
        let row = InputRow::from_source(42, 1, &[name.clone()], vec![Value::from("foo")]);

        assert_eq!(row.get(name.id), &Value::from("foo"));
        assert_eq!(row.get(ColumnId::new(99)), &Value::Null);
        assert_eq!(row.id(), 42);
        assert_eq!(row.number(), 1);
    }

    #[test]
    fn test_name_collisions_are_distinct_columns() {
        let a = InputColumn::physical(ColumnId::new(1), "value");
        let b = InputColumn::physical(ColumnId::new(2), "value");
        let mut row = InputRow::new(1, 1);
        row.set(a.id, Value::Integer(1));
        row.set(b.id, Value::Integer(2));

        assert_eq!(row.values_of(&[a, b]), vec![Value::Integer(1), Value::Integer(2)]);
    }
}
