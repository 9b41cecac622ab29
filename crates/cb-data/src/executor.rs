//! Executor boundary

use async_trait::async_trait;
use thiserror::Error;

use crate::query::{AggregationQueryRequest, QueryResponse};

/// Errors raised while executing an aggregation query
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("query failed: {0}")]
    Failure(String),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("column '{column}' is not numeric and cannot be binned")]
    NotNumeric { column: String },

    #[error("executor task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for ExecutorError {
    fn from(error: tokio::task::JoinError) -> Self {
        ExecutorError::Task(error.to_string())
    }
}

/// Trait for aggregation backends
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run the request and return its rows
    async fn execute(&self, request: &AggregationQueryRequest) -> Result<QueryResponse, ExecutorError>;

    /// Name of the dataset this executor serves
    fn source_name(&self) -> &str;
}
