//! Column catalog supplied by the profiling collaborator

use arrow::datatypes::{DataType, Schema};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Int64,
    Float64,
    String,
    Datetime,
    Bool,
    Category,
    #[serde(other)]
    Other,
}

impl DType {
    pub const ALL: [DType; 7] = [
        DType::Int64,
        DType::Float64,
        DType::String,
        DType::Datetime,
        DType::Bool,
        DType::Category,
        DType::Other,
    ];

    pub fn is_numeric(&self) -> bool {
        matches!(self, DType::Int64 | DType::Float64)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Int64 => "int64",
            DType::Float64 => "float64",
            DType::String => "string",
            DType::Datetime => "datetime",
            DType::Bool => "bool",
            DType::Category => "category",
            DType::Other => "other",
        }
    }

    /// Map an Arrow physical type onto the logical type
    pub fn from_arrow(data_type: &DataType) -> Self {
        match data_type {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => DType::Int64,
            DataType::Float16 | DataType::Float32 | DataType::Float64 => DType::Float64,
            DataType::Utf8 | DataType::LargeUtf8 => DType::String,
            DataType::Boolean => DType::Bool,
            DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => DType::Datetime,
            DataType::Dictionary(_, _) => DType::Category,
            _ => DType::Other,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub dtype: DType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// Ordered column catalog for one dataset
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnCatalog {
    columns: Vec<ColumnDescriptor>,
}

impl ColumnCatalog {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        Self { columns }
    }

    pub fn from_schema(schema: &Schema) -> Self {
        Self::new(
            schema
                .fields()
                .iter()
                .map(|field| ColumnDescriptor::new(field.name(), DType::from_arrow(field.data_type())))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn dtype_of(&self, name: &str) -> Option<DType> {
        self.get(name).map(|c| c.dtype)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<ColumnDescriptor> for ColumnCatalog {
    fn from_iter<I: IntoIterator<Item = ColumnDescriptor>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, TimeUnit};

    #[test]
    fn test_numeric_types() {
        let numeric: Vec<_> = DType::ALL.iter().filter(|d| d.is_numeric()).collect();
        assert_eq!(numeric, vec![&DType::Int64, &DType::Float64]);
    }

    #[test]
    fn test_catalog_from_schema() {
        let schema = Schema::new(vec![
            Field::new("region", DataType::Utf8, true),
            Field::new("sales", DataType::Float64, true),
            Field::new("units", DataType::Int32, true),
            Field::new("at", DataType::Timestamp(TimeUnit::Millisecond, None), true),
        ]);
        let catalog = ColumnCatalog::from_schema(&schema);

        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["region", "sales", "units", "at"]);
        assert_eq!(catalog.dtype_of("units"), Some(DType::Int64));
        assert_eq!(catalog.dtype_of("at"), Some(DType::Datetime));
        assert_eq!(catalog.dtype_of("missing"), None);
    }

    #[test]
    fn test_unknown_dtype_deserializes_as_other() {
        let column: ColumnDescriptor =
            serde_json::from_str(r#"{"name": "blob", "dtype": "binary"}"#).unwrap();
        assert_eq!(column.dtype, DType::Other);
    }
}
