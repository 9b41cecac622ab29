use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use cb_core::ColumnCatalog;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Datetime layouts recognised in text columns
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Schema detector for analyzing sampled text and picking column types
pub struct SchemaDetector {
    sample_size: usize,
}

/// Information about a detected schema
#[derive(Debug, Clone)]
pub struct SchemaInfo {
    pub schema: Schema,
    pub catalog: ColumnCatalog,
    pub column_stats: IndexMap<String, ColumnStats>,
}

/// Statistics about a sampled column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnStats {
    pub null_count: usize,
    pub distinct_count: usize,
    pub min_value: Option<String>,
    pub max_value: Option<String>,
}

impl SchemaDetector {
    pub fn new() -> Self {
        Self { sample_size: 1000 }
    }

    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size.max(1);
        self
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Detect schema from sample rows; empty cells count as nulls
    pub fn detect_from_samples(&self, headers: &[String], samples: &[Vec<String>]) -> SchemaInfo {
        let samples = &samples[..samples.len().min(self.sample_size)];
        let mut fields = Vec::with_capacity(headers.len());
        let mut column_stats = IndexMap::new();

        for (col_idx, header) in headers.iter().enumerate() {
            let (data_type, stats) = Self::analyze_column(samples, col_idx);
            fields.push(Field::new(header, data_type, true));
            column_stats.insert(header.clone(), stats);
        }

        let schema = Schema::new(fields);
        SchemaInfo {
            catalog: ColumnCatalog::from_schema(&schema),
            schema,
            column_stats,
        }
    }

    fn analyze_column(samples: &[Vec<String>], col_idx: usize) -> (DataType, ColumnStats) {
        let mut null_count = 0;
        let mut values = Vec::new();
        let mut is_int = true;
        let mut is_float = true;
        let mut is_datetime = true;
        let mut is_bool = true;

        for row in samples {
            match row.get(col_idx).map(|v| v.trim()) {
                Some(value) if !value.is_empty() => {
                    if is_int && value.parse::<i64>().is_err() {
                        is_int = false;
                    }
                    if is_float && value.parse::<f64>().is_err() {
                        is_float = false;
                    }
                    if is_datetime && parse_datetime_millis(value).is_none() {
                        is_datetime = false;
                    }
                    if is_bool && parse_bool(value).is_none() {
                        is_bool = false;
                    }
                    values.push(value);
                }
                _ => null_count += 1,
            }
        }

        // All-null columns stay text
        let data_type = if values.is_empty() {
            DataType::Utf8
        } else if is_bool {
            DataType::Boolean
        } else if is_int {
            DataType::Int64
        } else if is_float {
            DataType::Float64
        } else if is_datetime {
            DataType::Timestamp(TimeUnit::Millisecond, None)
        } else {
            DataType::Utf8
        };

        let distinct_count = values.iter().collect::<HashSet<_>>().len();
        let stats = ColumnStats {
            null_count,
            distinct_count,
            min_value: values.iter().min().map(|v| v.to_string()),
            max_value: values.iter().max().map(|v| v.to_string()),
        };

        (data_type, stats)
    }
}

impl Default for SchemaDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `true`/`false` in any case
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Parse a date or datetime into milliseconds since the epoch (UTC)
pub fn parse_datetime_millis(value: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp_millis());
        }
    }
    None
}
