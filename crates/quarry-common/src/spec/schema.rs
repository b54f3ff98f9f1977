use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::spec::DataType;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

pub type SchemaRef = Arc<Schema>;

/// The ordered, named columns shared by every row of one result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Finds a column by name.
    /// An exact match wins over a case-insensitive one.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .or_else(|| {
                self.fields
                    .iter()
                    .position(|f| f.name.eq_ignore_ascii_case(name))
            })
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self
            .fields
            .iter()
            .map(|x| format!("{}: {}", x.name, x.data_type))
            .collect::<Vec<_>>();
        write!(f, "({})", fields.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_of_prefers_exact_match() {
        let schema = Schema::new(vec![
            Field::new("Name", DataType::String),
            Field::new("name", DataType::String),
            Field::new("id", DataType::Integer),
        ]);
        assert_eq!(schema.index_of("name"), Some(1));
        assert_eq!(schema.index_of("ID"), Some(2));
        assert_eq!(schema.index_of("missing"), None);
        assert_eq!(schema.to_string(), "(Name: VARCHAR, name: VARCHAR, id: INTEGER)");
    }
}
