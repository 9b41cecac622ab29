//! In-memory aggregation executor
//!
//! Runs aggregation requests against a single Arrow record batch: equality
//! filters, then either histogram binning, grouped aggregation, global
//! aggregation, or a raw row dump, followed by sort and limit.

use std::cmp::Ordering;

use arrow::array::{
    Array, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
    UInt32Array, UInt64Array,
};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use cb_core::naming::{BIN_END, BIN_START};
use cb_core::{AggregateKey, Aggregation, SortOrder};
use indexmap::IndexMap;
use serde_json::{Number, Value};

use crate::executor::{ExecutorError, QueryExecutor};
use crate::query::{AggregationQueryRequest, QueryResponse, Row, SortClause};

/// Default bin count when a histogram request omits one
const DEFAULT_BINS: u32 = 10;

/// Executor over a record batch held in memory
pub struct MemoryExecutor {
    name: String,
    batch: RecordBatch,
}

impl MemoryExecutor {
    pub fn new(name: impl Into<String>, batch: RecordBatch) -> Self {
        Self {
            name: name.into(),
            batch,
        }
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Execute synchronously on the calling thread
    pub fn run(&self, request: &AggregationQueryRequest) -> Result<QueryResponse, ExecutorError> {
        run_query(&self.batch, request)
    }
}

#[async_trait]
impl QueryExecutor for MemoryExecutor {
    async fn execute(&self, request: &AggregationQueryRequest) -> Result<QueryResponse, ExecutorError> {
        let batch = self.batch.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || run_query(&batch, &request)).await?
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

fn run_query(batch: &RecordBatch, request: &AggregationQueryRequest) -> Result<QueryResponse, ExecutorError> {
    let selected = filter_rows(batch, request)?;

    let (columns, mut rows) = if request.is_histogram {
        histogram(batch, request, &selected)?
    } else if !request.group_by.is_empty() {
        grouped(batch, request, &selected)?
    } else if !request.aggregations.is_empty() {
        global(batch, request, &selected)?
    } else {
        raw(batch, &selected)
    };

    sort_rows(&mut rows, &request.sort_by);

    let total_rows = rows.len();
    if request.limit > 0 {
        rows.truncate(request.limit);
    }

    tracing::debug!(
        "Executed query: {} matching rows, {} result rows (of {})",
        selected.len(),
        rows.len(),
        total_rows
    );

    Ok(QueryResponse {
        data: rows,
        total_rows: Some(total_rows),
        columns,
    })
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a dyn Array, ExecutorError> {
    batch
        .column_by_name(name)
        .map(|c| c.as_ref())
        .ok_or_else(|| ExecutorError::UnknownColumn(name.to_string()))
}

/// Indices of rows matching every equality filter
fn filter_rows(batch: &RecordBatch, request: &AggregationQueryRequest) -> Result<Vec<usize>, ExecutorError> {
    let filters = request
        .filters
        .iter()
        .map(|f| Ok((column(batch, &f.column)?, &f.value)))
        .collect::<Result<Vec<_>, ExecutorError>>()?;

    Ok((0..batch.num_rows())
        .filter(|&i| {
            filters
                .iter()
                .all(|(array, expected)| values_equal(&cell_value(*array, i), expected))
        })
        .collect())
}

fn histogram(
    batch: &RecordBatch,
    request: &AggregationQueryRequest,
    selected: &[usize],
) -> Result<(Vec<String>, Vec<Row>), ExecutorError> {
    let name = request
        .aggregations
        .first()
        .map(|a| a.column.as_str())
        .ok_or_else(|| ExecutorError::Failure("histogram request has no value column".into()))?;
    let array = column(batch, name)?;
    let bins = request.histogram_bins.unwrap_or(DEFAULT_BINS).max(1) as usize;
    let count_key = AggregateKey::histogram_count(name).into_string();
    let columns = vec![
        name.to_string(),
        BIN_START.to_string(),
        BIN_END.to_string(),
        count_key.clone(),
    ];

    let mut values = Vec::with_capacity(selected.len());
    for &i in selected {
        let cell = cell_value(array, i);
        if cell.is_null() {
            continue;
        }
        match as_number(&cell) {
            Some(v) => values.push(v),
            None => {
                return Err(ExecutorError::NotNumeric {
                    column: name.to_string(),
                })
            }
        }
    }
    if values.is_empty() {
        return Ok((columns, Vec::new()));
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = if max > min { (max - min) / bins as f64 } else { 1.0 };

    let mut counts = vec![0u64; bins];
    for v in values {
        let idx = (((v - min) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }

    let rows = counts
        .into_iter()
        .enumerate()
        .map(|(idx, count)| {
            let start = min + idx as f64 * width;
            let end = start + width;
            let mut row = Row::new();
            row.insert(name.to_string(), number(start + width / 2.0));
            row.insert(BIN_START.to_string(), number(start));
            row.insert(BIN_END.to_string(), number(end));
            row.insert(count_key.clone(), Value::from(count));
            row
        })
        .collect();

    Ok((columns, rows))
}

fn grouped(
    batch: &RecordBatch,
    request: &AggregationQueryRequest,
    selected: &[usize],
) -> Result<(Vec<String>, Vec<Row>), ExecutorError> {
    let keys = request
        .group_by
        .iter()
        .map(|name| column(batch, name))
        .collect::<Result<Vec<_>, _>>()?;
    let measures = measure_columns(batch, request)?;

    // First-seen group order
    let mut groups: IndexMap<String, (Vec<Value>, Vec<Accumulator>)> = IndexMap::new();
    for &i in selected {
        let key_values: Vec<Value> = keys.iter().map(|array| cell_value(*array, i)).collect();
        let (_, accumulators) = groups
            .entry(Value::Array(key_values.clone()).to_string())
            .or_insert_with(|| (key_values, vec![Accumulator::default(); measures.len()]));
        for (acc, (array, _)) in accumulators.iter_mut().zip(&measures) {
            acc.push(&cell_value(*array, i));
        }
    }

    let columns = request
        .group_by
        .iter()
        .cloned()
        .chain(measures.iter().map(|(_, clause)| clause.0.to_string()))
        .collect();

    let rows = groups
        .into_values()
        .map(|(key_values, accumulators)| {
            let mut row = Row::new();
            for (name, value) in request.group_by.iter().zip(key_values) {
                row.insert(name.clone(), value);
            }
            for (acc, (_, (key, function))) in accumulators.iter().zip(&measures) {
                row.insert(key.to_string(), acc.finish(*function));
            }
            row
        })
        .collect();

    Ok((columns, rows))
}

fn global(
    batch: &RecordBatch,
    request: &AggregationQueryRequest,
    selected: &[usize],
) -> Result<(Vec<String>, Vec<Row>), ExecutorError> {
    let measures = measure_columns(batch, request)?;
    let columns = measures.iter().map(|(_, (key, _))| key.to_string()).collect();
    if selected.is_empty() {
        return Ok((columns, Vec::new()));
    }

    let mut row = Row::new();
    for (array, (key, function)) in &measures {
        let mut acc = Accumulator::default();
        for &i in selected {
            acc.push(&cell_value(*array, i));
        }
        row.insert(key.to_string(), acc.finish(*function));
    }
    Ok((columns, vec![row]))
}

fn raw(batch: &RecordBatch, selected: &[usize]) -> (Vec<String>, Vec<Row>) {
    let schema = batch.schema();
    let columns: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
    let rows = selected
        .iter()
        .map(|&i| {
            columns
                .iter()
                .zip(batch.columns())
                .map(|(name, array)| (name.clone(), cell_value(array.as_ref(), i)))
                .collect()
        })
        .collect();
    (columns, rows)
}

type Measure<'a> = (&'a dyn Array, (AggregateKey, Aggregation));

fn measure_columns<'a>(
    batch: &'a RecordBatch,
    request: &AggregationQueryRequest,
) -> Result<Vec<Measure<'a>>, ExecutorError> {
    request
        .aggregations
        .iter()
        .map(|clause| {
            Ok((
                column(batch, &clause.column)?,
                (AggregateKey::new(&clause.column, clause.function), clause.function),
            ))
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
struct Accumulator {
    count: u64,
    numeric: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    fractional: bool,
}

impl Accumulator {
    fn push(&mut self, value: &Value) {
        if value.is_null() {
            return;
        }
        self.count += 1;
        if let Some(v) = as_number(value) {
            self.numeric += 1;
            self.sum += v;
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
            if !matches!(value, Value::Number(n) if n.is_i64() || n.is_u64()) {
                self.fractional = true;
            }
        }
    }

    fn finish(&self, function: Aggregation) -> Value {
        match function {
            Aggregation::Count => Value::from(self.count),
            Aggregation::Sum => self.scalar(Some(self.sum)),
            Aggregation::Avg if self.numeric > 0 => number(self.sum / self.numeric as f64),
            Aggregation::Avg => Value::Null,
            Aggregation::Min => self.scalar(self.min),
            Aggregation::Max => self.scalar(self.max),
        }
    }

    /// Keep integer columns integral for sum/min/max
    fn scalar(&self, value: Option<f64>) -> Value {
        match value {
            Some(v) if !self.fractional && v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
                Value::from(v as i64)
            }
            Some(v) => number(v),
            None => Value::Null,
        }
    }
}

fn sort_rows(rows: &mut [Row], clauses: &[SortClause]) {
    let Some(first) = rows.first() else {
        return;
    };
    // Clauses naming absent columns are skipped
    let clauses: Vec<&SortClause> = clauses.iter().filter(|c| first.contains_key(&c.column)).collect();
    if clauses.is_empty() {
        return;
    }

    rows.sort_by(|a, b| {
        for clause in &clauses {
            let ordering = compare_values(a.get(&clause.column), b.get(&clause.column), clause.order);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Nulls sort last in either direction
fn compare_values(a: Option<&Value>, b: Option<&Value>, order: SortOrder) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    let ordering = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(a), Some(b)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => label(a).cmp(&label(b)),
        },
    };
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

/// Read one cell as a JSON scalar
pub(crate) fn cell_value(array: &dyn Array, i: usize) -> Value {
    if array.is_null(i) {
        return Value::Null;
    }
    let any = array.as_any();
    if let Some(a) = any.downcast_ref::<Int64Array>() {
        Value::from(a.value(i))
    } else if let Some(a) = any.downcast_ref::<Float64Array>() {
        number(a.value(i))
    } else if let Some(a) = any.downcast_ref::<StringArray>() {
        Value::String(a.value(i).to_string())
    } else if let Some(a) = any.downcast_ref::<BooleanArray>() {
        Value::Bool(a.value(i))
    } else if let Some(a) = any.downcast_ref::<Int32Array>() {
        Value::from(a.value(i))
    } else if let Some(a) = any.downcast_ref::<Float32Array>() {
        number(a.value(i) as f64)
    } else if let Some(a) = any.downcast_ref::<UInt32Array>() {
        Value::from(a.value(i))
    } else if let Some(a) = any.downcast_ref::<UInt64Array>() {
        Value::from(a.value(i))
    } else {
        match arrow::util::display::array_value_to_string(array, i) {
            Ok(s) => Value::String(s),
            Err(_) => Value::Null,
        }
    }
}

fn number(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn values_equal(cell: &Value, expected: &Value) -> bool {
    match (as_number(cell), as_number(expected)) {
        (Some(x), Some(y)) if cell.is_number() || expected.is_number() => x == y,
        _ => label(cell) == label(expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::AggregationClause;
    use arrow::datatypes::{DataType, Field, Schema};
    use cb_core::Filter;
    use serde_json::json;
    use std::sync::Arc;

    fn sales() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("region", DataType::Utf8, true),
            Field::new("channel", DataType::Utf8, true),
            Field::new("sales", DataType::Float64, true),
            Field::new("units", DataType::Int64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["East", "West", "East", "North", "West", "East"])),
                Arc::new(StringArray::from(vec!["Online", "Retail", "Retail", "Online", "Online", "Online"])),
                Arc::new(Float64Array::from(vec![Some(50.0), Some(30.0), Some(70.0), Some(10.0), Some(50.0), None])),
                Arc::new(Int64Array::from(vec![5, 3, 7, 1, 5, 2])),
            ],
        )
        .unwrap()
    }

    fn request(group_by: &[&str], aggregations: &[(&str, Aggregation)]) -> AggregationQueryRequest {
        AggregationQueryRequest {
            group_by: group_by.iter().map(|s| s.to_string()).collect(),
            aggregations: aggregations
                .iter()
                .map(|(column, function)| AggregationClause {
                    column: column.to_string(),
                    function: *function,
                })
                .collect(),
            sort_by: Vec::new(),
            filters: Vec::new(),
            limit: 1000,
            is_histogram: false,
            histogram_bins: None,
        }
    }

    #[test]
    fn test_grouped_sum_sorted_desc() {
        let executor = MemoryExecutor::new("sales", sales());
        let mut req = request(&["region"], &[("sales", Aggregation::Sum)]);
        req.sort_by = vec![SortClause {
            column: "sales_sum".into(),
            order: SortOrder::Desc,
        }];

        let response = executor.run(&req).unwrap();
        assert_eq!(response.columns, vec!["region", "sales_sum"]);
        let regions: Vec<_> = response.data.iter().map(|r| r["region"].clone()).collect();
        assert_eq!(regions, vec![json!("East"), json!("West"), json!("North")]);
        assert_eq!(response.data[0]["sales_sum"], json!(120.0));
    }

    #[test]
    fn test_all_aggregations() {
        let executor = MemoryExecutor::new("sales", sales());
        let req = request(
            &["region"],
            &[
                ("units", Aggregation::Sum),
                ("sales", Aggregation::Avg),
                ("sales", Aggregation::Count),
                ("units", Aggregation::Min),
                ("units", Aggregation::Max),
            ],
        );
        let response = executor.run(&req).unwrap();
        let east = &response.data[0];

        assert_eq!(east["units_sum"], json!(14));
        assert_eq!(east["sales_avg"], json!(60.0));
        // Null sales are not counted
        assert_eq!(east["sales_count"], json!(2));
        assert_eq!(east["units_min"], json!(2));
        assert_eq!(east["units_max"], json!(7));
    }

    #[test]
    fn test_sub_group_is_long_shaped() {
        let executor = MemoryExecutor::new("sales", sales());
        let response = executor
            .run(&request(&["region", "channel"], &[("units", Aggregation::Sum)]))
            .unwrap();
        assert_eq!(response.data.len(), 5);
        assert_eq!(
            response.data[0],
            serde_json::from_value::<Row>(json!({"region": "East", "channel": "Online", "units_sum": 7})).unwrap()
        );
    }

    #[test]
    fn test_filters_and_global_aggregation() {
        let executor = MemoryExecutor::new("sales", sales());
        let mut req = request(&[], &[("units", Aggregation::Sum)]);
        req.filters = vec![Filter::eq("channel", "Online")];
        let response = executor.run(&req).unwrap();
        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data[0]["units_sum"], json!(13));

        req.filters = vec![Filter::eq("region", "South")];
        assert!(executor.run(&req).unwrap().data.is_empty());
    }

    #[test]
    fn test_numeric_filter_matches_across_representations() {
        let executor = MemoryExecutor::new("sales", sales());
        let mut req = request(&["region"], &[("units", Aggregation::Count)]);
        req.filters = vec![Filter::eq("units", "5")];
        let response = executor.run(&req).unwrap();
        assert_eq!(response.data.len(), 2);
    }

    #[test]
    fn test_histogram_bins() {
        let executor = MemoryExecutor::new("sales", sales());
        let mut req = request(&[], &[("units", Aggregation::Count)]);
        req.is_histogram = true;
        req.histogram_bins = Some(3);

        let response = executor.run(&req).unwrap();
        assert_eq!(response.data.len(), 3);
        let counts: Vec<_> = response.data.iter().map(|r| r["units_count"].clone()).collect();
        // units = 5,3,7,1,5,2 over [1,7] in bins of width 2; the max lands in the last bin
        assert_eq!(counts, vec![json!(2), json!(1), json!(3)]);
        assert_eq!(response.data[0]["units"], json!(2.0));
        assert_eq!(response.data[2][BIN_END], json!(7.0));
    }

    #[test]
    fn test_histogram_rejects_text() {
        let executor = MemoryExecutor::new("sales", sales());
        let mut req = request(&[], &[("region", Aggregation::Count)]);
        req.is_histogram = true;
        req.histogram_bins = Some(4);
        assert_eq!(
            executor.run(&req),
            Err(ExecutorError::NotNumeric {
                column: "region".into()
            })
        );
    }

    #[test]
    fn test_unknown_column() {
        let executor = MemoryExecutor::new("sales", sales());
        let req = request(&["store"], &[("sales", Aggregation::Sum)]);
        assert_eq!(executor.run(&req), Err(ExecutorError::UnknownColumn("store".into())));
    }

    #[test]
    fn test_limit_keeps_total() {
        let executor = MemoryExecutor::new("sales", sales());
        let mut req = request(&[], &[]);
        req.limit = 2;
        let response = executor.run(&req).unwrap();
        assert_eq!(response.data.len(), 2);
        assert_eq!(response.total_rows, Some(6));
        assert_eq!(response.columns, vec!["region", "channel", "sales", "units"]);
    }

    #[tokio::test]
    async fn test_execute_async() {
        let executor = MemoryExecutor::new("sales", sales());
        let response = executor
            .execute(&request(&["channel"], &[("units", Aggregation::Sum)]))
            .await
            .unwrap();
        assert_eq!(response.data.len(), 2);
        assert_eq!(executor.source_name(), "sales");
    }
}
