use std::sync::Arc;

use quarry_common::spec::{DataType, Field, Row, ScalarValue, Schema, SchemaRef};
use serde_json::Value;

use crate::error::{ConnectorError, ConnectorResult};

pub fn scalar_from_json(value: Value) -> ScalarValue {
    match value {
        Value::Null => ScalarValue::Null,
        Value::Bool(v) => ScalarValue::Boolean(v),
        Value::Number(v) => match v.as_i64() {
            Some(i) => ScalarValue::Integer(i),
            None => v
                .as_f64()
                .map(ScalarValue::Float)
                .unwrap_or(ScalarValue::Null),
        },
        Value::String(v) => ScalarValue::String(v),
        v @ (Value::Array(_) | Value::Object(_)) => ScalarValue::Json(v),
    }
}

/// Turns self-describing records into rows of one schema.
///
/// The first record fixes the column names and their order. Later records
/// may omit columns (read as null) but must not add any. Column types settle
/// while records are decoded and become final once [`RecordDecoder::finish`]
/// first turns records into rows:
///
/// - a column whose values so far are all null takes the type of its first non-null value
/// - an integer column becomes a floating-point column when a float value arrives
/// - an integer value is accepted for a floating-point column
///
/// Any other mismatch, including a change that would be needed after the
/// types are final, fails with a schema error.
#[derive(Debug)]
pub struct RecordDecoder {
    source: String,
    fields: Option<Vec<Field>>,
    schema: Option<SchemaRef>,
    records: usize,
}

impl RecordDecoder {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            fields: None,
            schema: None,
            records: 0,
        }
    }

    /// The final schema, once rows have been produced.
    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    /// Makes the column types final and returns the schema.
    ///
    /// The schema is empty if no record has been decoded.
    pub fn freeze(&mut self) -> SchemaRef {
        let fields = &self.fields;
        self.schema
            .get_or_insert_with(|| Arc::new(Schema::new(fields.clone().unwrap_or_default())))
            .clone()
    }

    pub fn decode_json_line(&mut self, line: &str) -> ConnectorResult<Vec<ScalarValue>> {
        let value: Value = serde_json::from_str(line).map_err(|e| {
            ConnectorError::schema(format!(
                "invalid JSON in {} at record {}: {e}",
                self.source,
                self.records + 1
            ))
        })?;
        self.decode_json(value)
    }

    pub fn decode_json(&mut self, value: Value) -> ConnectorResult<Vec<ScalarValue>> {
        let Value::Object(object) = value else {
            return Err(ConnectorError::schema(format!(
                "expected a JSON object in {} at record {}",
                self.source,
                self.records + 1
            )));
        };
        let record = object
            .into_iter()
            .map(|(k, v)| (k, scalar_from_json(v)))
            .collect();
        self.decode(record)
    }

    /// Decodes one record into values ordered by the columns of the relation.
    pub fn decode(
        &mut self,
        record: Vec<(String, ScalarValue)>,
    ) -> ConnectorResult<Vec<ScalarValue>> {
        self.records += 1;
        let location = format!("record {} in {}", self.records, self.source);
        let frozen = self.schema.is_some();
        let fields = self.fields.get_or_insert_with(|| {
            record
                .iter()
                .map(|(name, value)| Field::new(name.clone(), value.data_type()))
                .collect()
        });
        let mut values = vec![ScalarValue::Null; fields.len()];
        for (name, value) in record {
            let Some(index) = fields.iter().position(|f| f.name == name) else {
                return Err(ConnectorError::schema(format!(
                    "unexpected column `{name}` in {location}"
                )));
            };
            values[index] = coerce(&mut fields[index], value, frozen, &location)?;
        }
        Ok(values)
    }

    /// Turns decoded records into rows sharing the final schema.
    pub fn finish(&mut self, records: Vec<Vec<ScalarValue>>) -> ConnectorResult<Vec<Row>> {
        let schema = self.freeze();
        records
            .into_iter()
            .map(|values| {
                let values = values
                    .into_iter()
                    .zip(schema.fields())
                    .map(|(value, field)| match (field.data_type, value) {
                        (DataType::Float, ScalarValue::Integer(v)) => ScalarValue::Float(v as f64),
                        (_, value) => value,
                    })
                    .collect();
                Row::try_new(schema.clone(), values).map_err(ConnectorError::from)
            })
            .collect()
    }
}

fn coerce(
    field: &mut Field,
    value: ScalarValue,
    frozen: bool,
    location: &str,
) -> ConnectorResult<ScalarValue> {
    match (field.data_type, value) {
        (_, ScalarValue::Null) => Ok(ScalarValue::Null),
        (DataType::Float, ScalarValue::Integer(v)) => Ok(ScalarValue::Float(v as f64)),
        (data_type, v) if v.data_type() == data_type => Ok(v),
        (DataType::Null, v) if !frozen => {
            field.data_type = v.data_type();
            Ok(v)
        }
        (DataType::Integer, ScalarValue::Float(v)) if !frozen => {
            field.data_type = DataType::Float;
            Ok(ScalarValue::Float(v))
        }
        (data_type, v) => Err(ConnectorError::schema(format!(
            "column `{}` has type {data_type} but {location} has {}",
            field.name,
            v.data_type()
        ))),
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn decode_lines(decoder: &mut RecordDecoder, lines: &[&str]) -> ConnectorResult<Vec<Row>> {
        let records = lines
            .iter()
            .map(|x| decoder.decode_json_line(x))
            .collect::<ConnectorResult<Vec<_>>>()?;
        decoder.finish(records)
    }

    #[test]
    fn test_first_record_fixes_schema() {
        let mut decoder = RecordDecoder::new("test");
        let rows = decode_lines(
            &mut decoder,
            &[
                r#"{"id": 1, "name": "Earth", "mass": 5.97, "tags": [1]}"#,
                r#"{"name": "Mars", "mass": 1, "id": 2}"#,
            ],
        )
        .unwrap();
        assert_eq!(
            decoder.schema().unwrap().to_string(),
            "(id: INTEGER, name: VARCHAR, mass: DOUBLE, tags: JSON)"
        );
        assert_eq!(rows[0].get("name"), Some(&ScalarValue::from("Earth")));
        assert_eq!(rows[1].get("mass"), Some(&ScalarValue::Float(1.0)));
        assert_eq!(rows[1].get("tags"), Some(&ScalarValue::Null));
        assert_eq!(rows[1].value(0), Some(&ScalarValue::Integer(2)));
    }

    #[test]
    fn test_incompatible_records() {
        let mut decoder = RecordDecoder::new("test");
        decoder.decode_json_line(r#"{"id": 1}"#).unwrap();
        assert!(matches!(
            decoder.decode_json_line(r#"{"id": "one"}"#),
            Err(ConnectorError::Schema(_))
        ));
        assert!(matches!(
            decoder.decode_json_line(r#"{"id": 2, "extra": true}"#),
            Err(ConnectorError::Schema(_))
        ));
        assert!(matches!(
            decoder.decode_json_line("[1, 2]"),
            Err(ConnectorError::Schema(_))
        ));
        assert!(matches!(
            decoder.decode_json_line("{not json"),
            Err(ConnectorError::Schema(_))
        ));
    }

    #[test]
    fn test_null_column_takes_first_value_type() {
        let mut decoder = RecordDecoder::new("test");
        decoder.decode_json_line(r#"{"a": null}"#).unwrap();
        decoder.decode_json_line(r#"{"a": 1}"#).unwrap();
        assert!(matches!(
            decoder.decode_json_line(r#"{"a": "text"}"#),
            Err(ConnectorError::Schema(_))
        ));

        let rows = decoder
            .finish(vec![vec![ScalarValue::Null], vec![ScalarValue::Integer(1)]])
            .unwrap();
        let schema = decoder.schema().unwrap();
        assert_eq!(schema.to_string(), "(a: INTEGER)");
        assert!(rows.iter().all(|r| r.schema() == schema));
    }

    #[test]
    fn test_integer_column_widens_to_float() {
        let mut decoder = RecordDecoder::new("test");
        let rows = decode_lines(
            &mut decoder,
            &[r#"{"x": 1}"#, r#"{"x": 1.5}"#, r#"{"x": 2}"#],
        )
        .unwrap();
        assert_eq!(decoder.schema().unwrap().to_string(), "(x: DOUBLE)");
        assert_eq!(
            rows.iter()
                .map(|r| r.value(0).cloned().unwrap())
                .collect::<Vec<_>>(),
            vec![
                ScalarValue::Float(1.0),
                ScalarValue::Float(1.5),
                ScalarValue::Float(2.0)
            ]
        );
    }

    #[test]
    fn test_types_are_final_after_rows_are_produced() {
        let mut decoder = RecordDecoder::new("test");
        let rows = decode_lines(&mut decoder, &[r#"{"x": 1, "y": null}"#]).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(matches!(
            decoder.decode_json_line(r#"{"x": 1.5}"#),
            Err(ConnectorError::Schema(_))
        ));
        assert!(matches!(
            decoder.decode_json_line(r#"{"y": true}"#),
            Err(ConnectorError::Schema(_))
        ));
        let row = decoder.decode_json_line(r#"{"y": null, "x": 3}"#).unwrap();
        let rows = decoder.finish(vec![row]).unwrap();
        assert_eq!(rows[0].value(0), Some(&ScalarValue::Integer(3)));
    }
}
