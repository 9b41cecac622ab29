use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::*;
use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;
use cb_core::ColumnCatalog;
use csv::ReaderBuilder;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::memory::MemoryExecutor;
use crate::schema::{parse_bool, parse_datetime_millis, ColumnStats, SchemaDetector};
use crate::DataError;

/// How a CSV file is read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvConfig {
    pub delimiter: u8,
    pub has_header: bool,
    /// Rows inspected for type detection
    pub sample_size: usize,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            sample_size: 1000,
        }
    }
}

impl CsvConfig {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }
}

/// CSV file loaded fully into a single record batch
pub struct CsvSource {
    path: PathBuf,
    schema: Arc<Schema>,
    catalog: ColumnCatalog,
    column_stats: IndexMap<String, ColumnStats>,
    batch: RecordBatch,
}

impl CsvSource {
    /// Read, type and load a CSV file
    pub async fn load(path: impl AsRef<Path>, config: CsvConfig) -> Result<Self, DataError> {
        let path = path.as_ref().to_path_buf();
        let source = tokio::task::spawn_blocking(move || Self::load_blocking(path, &config)).await??;
        tracing::info!(
            "Loaded {} rows x {} columns from {}",
            source.row_count(),
            source.catalog.len(),
            source.path.display()
        );
        Ok(source)
    }

    fn load_blocking(path: PathBuf, config: &CsvConfig) -> Result<Self, DataError> {
        let file = File::open(&path)?;
        let mut reader = ReaderBuilder::new()
            .delimiter(config.delimiter)
            .has_headers(config.has_header)
            .from_reader(BufReader::new(file));

        let mut headers: Vec<String> = if config.has_header {
            reader.headers()?.iter().map(|h| h.trim().to_string()).collect()
        } else {
            Vec::new()
        };

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(record.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        }

        if headers.is_empty() {
            let width = rows.first().map(|r| r.len()).unwrap_or(0);
            headers = (1..=width).map(|i| format!("column_{}", i)).collect();
        }
        if headers.is_empty() {
            return Err(DataError::SchemaDetection(format!(
                "{} has no columns",
                path.display()
            )));
        }

        let info = SchemaDetector::new()
            .with_sample_size(config.sample_size)
            .detect_from_samples(&headers, &rows);
        let schema = Arc::new(info.schema);

        let columns = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(col_idx, field)| build_array(field.data_type(), &rows, col_idx))
            .collect::<Vec<_>>();
        let batch = RecordBatch::try_new(schema.clone(), columns)?;

        Ok(Self {
            path,
            schema,
            catalog: info.catalog,
            column_stats: info.column_stats,
            batch,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    pub fn catalog(&self) -> &ColumnCatalog {
        &self.catalog
    }

    pub fn column_stats(&self) -> &IndexMap<String, ColumnStats> {
        &self.column_stats
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn row_count(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn source_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.csv")
    }

    /// Executor sharing this source's batch
    pub fn executor(&self) -> MemoryExecutor {
        MemoryExecutor::new(self.source_name(), self.batch.clone())
    }

    pub fn into_executor(self) -> MemoryExecutor {
        let name = self.source_name().to_string();
        MemoryExecutor::new(name, self.batch)
    }
}

/// Cells that do not parse as the detected type become nulls
fn build_array(data_type: &DataType, rows: &[Vec<String>], col_idx: usize) -> ArrayRef {
    let cells = rows
        .iter()
        .map(|row| row.get(col_idx).map(|v| v.trim()).filter(|v| !v.is_empty()));

    match data_type {
        DataType::Int64 => {
            let mut builder = Int64Builder::new();
            for cell in cells {
                builder.append_option(cell.and_then(|v| v.parse::<i64>().ok()));
            }
            Arc::new(builder.finish())
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::new();
            for cell in cells {
                builder.append_option(cell.and_then(|v| v.parse::<f64>().ok()));
            }
            Arc::new(builder.finish())
        }
        DataType::Boolean => {
            let mut builder = BooleanBuilder::new();
            for cell in cells {
                builder.append_option(cell.and_then(parse_bool));
            }
            Arc::new(builder.finish())
        }
        DataType::Timestamp(_, _) => {
            let mut builder = TimestampMillisecondBuilder::new();
            for cell in cells {
                builder.append_option(cell.and_then(parse_datetime_millis));
            }
            Arc::new(builder.finish())
        }
        _ => {
            let mut builder = StringBuilder::new();
            for cell in cells {
                builder.append_option(cell);
            }
            Arc::new(builder.finish())
        }
    }
}
