use crate::components::{ComponentConfig, ComponentContext, Transformer};
use crate::engine::InputRow;
use crate::error::{FlowError, Result};
use crate::job::{InputColumn, Value};

/// Publishes the character length of its single input, null for null input.
#[derive(Debug, Clone)]
pub struct StringLengthTransformer {
    input: InputColumn,
}

impl StringLengthTransformer {
    pub fn from_config(_config: &ComponentConfig, ctx: &ComponentContext) -> Result<Self> {
        let input = ctx.inputs().first().cloned().ok_or_else(|| {
            FlowError::configuration(format!("{} requires one input column", ctx.name()))
        })?;
        Ok(Self { input })
    }
}

impl Transformer for StringLengthTransformer {
    fn transform(&self, row: &InputRow) -> Result<Vec<Value>> {
        let length = row
            .get(self.input.id)
            .to_key()
            .map(|s| Value::Integer(s.chars().count() as i64));
        Ok(vec![length.unwrap_or_default()])
    }
}

/// Converts every input to a float, publishing null where it does not parse.
#[derive(Debug, Clone)]
pub struct ConvertToNumberTransformer {
    inputs: Vec<InputColumn>,
}

impl ConvertToNumberTransformer {
    pub fn from_config(_config: &ComponentConfig, ctx: &ComponentContext) -> Result<Self> {
        Ok(Self {
            inputs: ctx.inputs().to_vec(),
        })
    }
}

impl Transformer for ConvertToNumberTransformer {
    fn transform(&self, row: &InputRow) -> Result<Vec<Value>> {
        Ok(self
            .inputs
            .iter()
            .map(|c| row.get(c.id).as_f64().map_or(Value::Null, Value::Float))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::InMemoryRowAnnotationFactory;
    use crate::job::ColumnId;

    #[test]
    fn test_string_length_and_conversion() {
        let a = InputColumn::physical(ColumnId::new(1), "a");
        let b = InputColumn::physical(ColumnId::new(2), "b");
        let ctx = ComponentContext::new(
            "t",
            vec![a.clone(), b.clone()],
            Vec::new(),
            InMemoryRowAnnotationFactory::shared(1),
        );
        let row = InputRow::from_source(1, 1, &[a, b], vec![Value::from("héllo"), Value::from("x")]);

        let length = StringLengthTransformer::from_config(&ComponentConfig::new(), &ctx).unwrap();
        assert_eq!(length.transform(&row).unwrap(), vec![Value::Integer(5)]);
        assert_eq!(length.transform(&InputRow::new(2, 2)).unwrap(), vec![Value::Null]);

        let numbers = ConvertToNumberTransformer::from_config(&ComponentConfig::new(), &ctx).unwrap();
        let row = InputRow::from_source(
            3,
            3,
            ctx.inputs(),
            vec![Value::from(" 4.5"), Value::Integer(2)],
        );
        assert_eq!(numbers.transform(&row).unwrap(), vec![Value::Float(4.5), Value::Float(2.0)]);
    }
}
