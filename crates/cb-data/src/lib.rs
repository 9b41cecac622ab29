//! Query compilation, execution and data sources for the chart builder

pub mod compiler;
pub mod executor;
pub mod memory;
pub mod query;
pub mod schema;
pub mod sources;
pub mod store;

use arrow::error::ArrowError;
use thiserror::Error;
use tokio::task::JoinError;

// Re-exports
pub use compiler::{compile, CompilerConfig, QueryCompiler};
pub use executor::{ExecutorError, QueryExecutor};
pub use memory::MemoryExecutor;
pub use query::{AggregationClause, AggregationQueryRequest, QueryResponse, Row, SortClause};
pub use schema::{ColumnStats, SchemaDetector, SchemaInfo};
pub use sources::{CsvConfig, CsvSource};
pub use store::{DashboardStore, DashboardSummary, MemoryDashboardStore, StoreError};

/// Errors that can occur while loading data
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(ArrowError),

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("Schema detection error: {0}")]
    SchemaDetection(String),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),
}

impl From<csv::Error> for DataError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => {
                DataError::Io(std::io::Error::new(io_err.kind(), error.to_string()))
            }
            _ => DataError::Csv(error.to_string()),
        }
    }
}

impl From<ArrowError> for DataError {
    fn from(error: ArrowError) -> Self {
        DataError::Arrow(error)
    }
}
