use std::fmt;

use serde::{Deserialize, Serialize};

/// The logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    /// The type of a column whose only observed value so far is null.
    Null,
    Boolean,
    Integer,
    Float,
    String,
    /// A UTC timestamp with microsecond precision.
    Timestamp,
    /// Nested arrays and objects, kept as JSON values.
    Json,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Null => "NULL",
            DataType::Boolean => "BOOLEAN",
            DataType::Integer => "INTEGER",
            DataType::Float => "DOUBLE",
            DataType::String => "VARCHAR",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Json => "JSON",
        };
        write!(f, "{name}")
    }
}
