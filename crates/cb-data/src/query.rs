//! Aggregation query wire contract

use cb_core::{Aggregation, Filter, SortOrder};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One result row; key order is the executor's column order
pub type Row = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationClause {
    pub column: String,
    pub function: Aggregation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortClause {
    pub column: String,
    #[serde(default)]
    pub order: SortOrder,
}

/// Request sent to the aggregation executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationQueryRequest {
    #[serde(default)]
    pub group_by: Vec<String>,

    #[serde(default)]
    pub aggregations: Vec<AggregationClause>,

    #[serde(default)]
    pub sort_by: Vec<SortClause>,

    #[serde(default)]
    pub filters: Vec<Filter>,

    pub limit: usize,

    #[serde(default)]
    pub is_histogram: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub histogram_bins: Option<u32>,
}

/// Rows returned by the executor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    pub data: Vec<Row>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<usize>,

    /// Column order of `data`, when the executor reports it
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
}

impl QueryResponse {
    pub fn from_rows(data: Vec<Row>) -> Self {
        Self {
            data,
            total_rows: None,
            columns: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reported column order, falling back to the first row's keys
    pub fn column_names(&self) -> Vec<String> {
        if !self.columns.is_empty() {
            return self.columns.clone();
        }
        self.data
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Underlying row count, even when `data` was truncated for display
    pub fn row_count(&self) -> usize {
        self.total_rows.unwrap_or(self.data.len()).max(self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_keeps_row_key_order() {
        let response: QueryResponse = serde_json::from_str(
            r#"{"data": [{"zeta": 1, "alpha": 2, "mid": 3}]}"#,
        )
        .unwrap();
        assert_eq!(response.column_names(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(response.row_count(), 1);
    }

    #[test]
    fn test_reported_columns_win() {
        let response: QueryResponse = serde_json::from_value(json!({
            "data": [{"b": 1, "a": 2}],
            "columns": ["a", "b"],
            "total_rows": 40
        }))
        .unwrap();
        assert_eq!(response.column_names(), vec!["a", "b"]);
        assert_eq!(response.row_count(), 40);
    }
}
