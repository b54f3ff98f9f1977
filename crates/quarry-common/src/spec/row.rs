use crate::error::{CommonError, CommonResult};
use crate::spec::{ScalarValue, SchemaRef};

/// One result row: values in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: SchemaRef,
    values: Vec<ScalarValue>,
}

impl Row {
    pub fn try_new(schema: SchemaRef, values: Vec<ScalarValue>) -> CommonResult<Self> {
        if schema.len() != values.len() {
            return Err(CommonError::internal(format!(
                "row has {} value(s) but the schema has {} field(s)",
                values.len(),
                schema.len()
            )));
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<ScalarValue> {
        self.values
    }

    pub fn value(&self, index: usize) -> Option<&ScalarValue> {
        self.values.get(index)
    }

    pub fn get(&self, name: &str) -> Option<&ScalarValue> {
        self.schema.index_of(name).and_then(|i| self.values.get(i))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A materialized group of rows produced together by a connector.
///
/// The schema is carried separately so that a batch without rows still
/// describes the shape of the relation it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    schema: SchemaRef,
    rows: Vec<Row>,
}

impl RowBatch {
    pub fn new(schema: SchemaRef, rows: Vec<Row>) -> Self {
        Self { schema, rows }
    }

    pub fn try_from_values(schema: SchemaRef, values: Vec<Vec<ScalarValue>>) -> CommonResult<Self> {
        let rows = values
            .into_iter()
            .map(|v| Row::try_new(schema.clone(), v))
            .collect::<CommonResult<Vec<_>>>()?;
        Ok(Self { schema, rows })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Concatenates batches that share one schema.
    pub fn concat(schema: SchemaRef, batches: Vec<RowBatch>) -> Self {
        let rows = batches.into_iter().flat_map(|b| b.rows).collect();
        Self { schema, rows }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::spec::{DataType, Field, Schema};

    #[test]
    fn test_row_access_by_name() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Integer),
            Field::new("name", DataType::String),
        ]));
        let row = Row::try_new(schema, vec![3.into(), "Earth".into()]).unwrap();
        assert_eq!(row.get("name"), Some(&ScalarValue::from("Earth")));
        assert_eq!(row.value(0), Some(&ScalarValue::Integer(3)));
        assert_eq!(row.get("mass"), None);
    }

    #[test]
    fn test_row_arity_mismatch() {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Integer)]));
        assert!(Row::try_new(schema, vec![]).is_err());
    }
}
