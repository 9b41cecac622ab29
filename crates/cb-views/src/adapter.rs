//! Query response → render model adaptation
//!
//! Output field names are never spelled out here; every lookup goes through
//! [`AggregateKey`], the same constructor the compiler uses.

use cb_core::naming::{BIN_END, BIN_START};
use cb_core::{AggregateKey, ChartKind, SpecField, VisualizationSpec};
use cb_data::{QueryResponse, Row};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::colors::categorical_color;
use crate::render::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdaptError {
    /// Zero rows; renders as a "no data" placeholder
    #[error("no data for {chart_kind} chart")]
    EmptyResult { chart_kind: ChartKind },

    #[error("{chart_kind} response is missing field '{field}'")]
    MalformedResponse { chart_kind: ChartKind, field: String },
}

impl AdaptError {
    fn malformed(chart_kind: ChartKind, field: impl Into<String>) -> Self {
        AdaptError::MalformedResponse {
            chart_kind,
            field: field.into(),
        }
    }

    /// Placeholder model standing in for the chart
    pub fn into_empty_model(self) -> RenderModel {
        match self {
            AdaptError::EmptyResult { chart_kind } => RenderModel::empty(chart_kind, EmptyReason::NoData),
            AdaptError::MalformedResponse { chart_kind, field } => RenderModel::empty(
                chart_kind,
                EmptyReason::Malformed {
                    detail: format!("missing field '{}'", field),
                },
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Rows shown by a table; the full count is still reported
    pub table_display_cap: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            table_display_cap: 100,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResultAdapter {
    config: AdapterConfig,
}

impl ResultAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Build the render model for one chart kind
    pub fn adapt(
        &self,
        chart_kind: ChartKind,
        spec: &VisualizationSpec,
        response: &QueryResponse,
    ) -> Result<RenderModel, AdaptError> {
        if response.is_empty() {
            return Err(AdaptError::EmptyResult { chart_kind });
        }

        let result = match chart_kind {
            ChartKind::Table => Ok(self.table(response)),
            ChartKind::Kpi => kpi(spec, &response.data),
            ChartKind::Histogram => histogram(spec, &response.data),
            ChartKind::Pie => pie(spec, &response.data),
            ChartKind::Funnel => funnel(spec, &response.data),
            ChartKind::Bar | ChartKind::Line | ChartKind::Area => {
                categorical(chart_kind, spec, &response.data)
            }
            ChartKind::DualAxis => dual_axis(spec, &response.data),
        };

        if let Err(AdaptError::MalformedResponse { field, .. }) = &result {
            tracing::warn!(
                "Malformed {} response: missing '{}' (columns: {:?})",
                chart_kind,
                field,
                response.column_names()
            );
        }
        result
    }

    fn table(&self, response: &QueryResponse) -> RenderModel {
        RenderModel::Table(TableModel {
            columns: response.column_names(),
            rows: response
                .data
                .iter()
                .take(self.config.table_display_cap)
                .cloned()
                .collect(),
            total_rows: response.row_count(),
        })
    }
}

/// Adapt plain rows with the default configuration
pub fn adapt(
    chart_kind: ChartKind,
    spec: &VisualizationSpec,
    rows: &[Row],
) -> Result<RenderModel, AdaptError> {
    ResultAdapter::default().adapt(chart_kind, spec, &QueryResponse::from_rows(rows.to_vec()))
}

fn kpi(spec: &VisualizationSpec, rows: &[Row]) -> Result<RenderModel, AdaptError> {
    let key = value_key(ChartKind::Kpi, spec)?;
    let value = rows
        .first()
        .and_then(|row| row.get(key.as_str()))
        .ok_or_else(|| AdaptError::malformed(ChartKind::Kpi, key.as_str()))?;
    Ok(RenderModel::Kpi(KpiModel {
        value: number(value),
        key,
    }))
}

fn histogram(spec: &VisualizationSpec, rows: &[Row]) -> Result<RenderModel, AdaptError> {
    let kind = ChartKind::Histogram;
    let column = spec
        .value_column
        .as_deref()
        .ok_or_else(|| AdaptError::malformed(kind, SpecField::ValueColumn.as_str()))?;
    let key = AggregateKey::histogram_count(column);

    let bins = rows
        .iter()
        .map(|row| {
            let count = row
                .get(key.as_str())
                .and_then(number)
                .ok_or_else(|| AdaptError::malformed(kind, key.as_str()))?;
            let start = row.get(BIN_START).and_then(number);
            let end = row.get(BIN_END).and_then(number);
            let x = row
                .get(column)
                .and_then(number)
                .or_else(|| start.zip(end).map(|(s, e)| (s + e) / 2.0))
                .ok_or_else(|| AdaptError::malformed(kind, column))?;
            Ok(HistogramBin { x, start, end, count })
        })
        .collect::<Result<Vec<_>, AdaptError>>()?;

    Ok(RenderModel::Histogram(HistogramModel { key, bins }))
}

fn pie(spec: &VisualizationSpec, rows: &[Row]) -> Result<RenderModel, AdaptError> {
    let kind = ChartKind::Pie;
    let key = value_key(kind, spec)?;
    let group_by = group_column(kind, spec)?;

    let slices = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            Ok(PieSlice {
                label: label_of(kind, row, group_by)?,
                value: value_of(kind, row, key.as_str())?,
                color: categorical_color(index),
            })
        })
        .collect::<Result<Vec<_>, AdaptError>>()?;

    Ok(RenderModel::Pie(PieModel { key, slices }))
}

fn funnel(spec: &VisualizationSpec, rows: &[Row]) -> Result<RenderModel, AdaptError> {
    let kind = ChartKind::Funnel;
    let key = value_key(kind, spec)?;
    let group_by = group_column(kind, spec)?;

    // Row order is stage order
    let stages = rows
        .iter()
        .map(|row| {
            Ok(FunnelStage {
                label: label_of(kind, row, group_by)?,
                value: value_of(kind, row, key.as_str())?,
            })
        })
        .collect::<Result<Vec<_>, AdaptError>>()?;

    Ok(RenderModel::Funnel(FunnelModel { key, stages }))
}

fn categorical(
    kind: ChartKind,
    spec: &VisualizationSpec,
    rows: &[Row],
) -> Result<RenderModel, AdaptError> {
    let key = value_key(kind, spec)?;
    let group_by = group_column(kind, spec)?;

    let (categories, series) = match spec.effective_sub_group() {
        None => {
            let mut table = Pivot::default();
            for row in rows {
                let category = label_of(kind, row, group_by)?;
                table.set(category, key.as_str().to_string(), value_of(kind, row, key.as_str())?);
            }
            table.into_series()
        }
        Some(sub_group) if rows.iter().all(|row| row.contains_key(sub_group)) => {
            // Long shape: one row per (category, sub-group value)
            let mut table = Pivot::default();
            for row in rows {
                let category = label_of(kind, row, group_by)?;
                let series = label_of(kind, row, sub_group)?;
                table.set(category, series, value_of(kind, row, key.as_str())?);
            }
            table.into_series()
        }
        Some(_) => {
            // Wide shape: one row per category, one key per series
            let mut table = Pivot::default();
            for row in rows {
                let category = label_of(kind, row, group_by)?;
                table.touch(&category);
                for (name, value) in row.iter().filter(|(name, _)| name.as_str() != group_by) {
                    table.set(category.clone(), name.clone(), number(value));
                }
            }
            table.into_series()
        }
    };

    Ok(RenderModel::Categorical(CategoricalModel {
        chart_kind: kind,
        categories,
        series,
        stacked: spec.stacked && kind.supports_stacking() && spec.effective_sub_group().is_some(),
    }))
}

fn dual_axis(spec: &VisualizationSpec, rows: &[Row]) -> Result<RenderModel, AdaptError> {
    let kind = ChartKind::DualAxis;
    let primary_key = value_key(kind, spec)?;
    let secondary_key = spec
        .secondary_key()
        .ok_or_else(|| AdaptError::malformed(kind, SpecField::SecondaryValueColumn.as_str()))?;
    let group_by = group_column(kind, spec)?;

    let mut categories = Vec::with_capacity(rows.len());
    let mut primary = Vec::with_capacity(rows.len());
    let mut secondary = Vec::with_capacity(rows.len());
    for row in rows {
        categories.push(label_of(kind, row, group_by)?);
        primary.push(value_of(kind, row, primary_key.as_str())?);
        secondary.push(value_of(kind, row, secondary_key.as_str())?);
    }

    Ok(RenderModel::DualAxis(DualAxisModel {
        categories,
        primary: Series::new(primary_key.into_string(), primary, categorical_color(0)),
        secondary: Series::new(secondary_key.into_string(), secondary, categorical_color(1)),
    }))
}

/// Category × series value grid, both axes in first-seen order
#[derive(Default)]
struct Pivot {
    categories: IndexSet<String>,
    series: IndexMap<String, IndexMap<String, Option<f64>>>,
}

impl Pivot {
    fn touch(&mut self, category: &str) {
        if !self.categories.contains(category) {
            self.categories.insert(category.to_string());
        }
    }

    fn set(&mut self, category: String, series: String, value: Option<f64>) {
        self.touch(&category);
        self.series.entry(series).or_default().insert(category, value);
    }

    fn into_series(self) -> (Vec<String>, Vec<Series>) {
        let categories: Vec<String> = self.categories.into_iter().collect();
        let series = self
            .series
            .into_iter()
            .enumerate()
            .map(|(index, (key, values))| {
                let aligned = categories
                    .iter()
                    .map(|category| values.get(category).copied().flatten())
                    .collect();
                Series::new(key, aligned, categorical_color(index))
            })
            .collect();
        (categories, series)
    }
}

fn value_key(kind: ChartKind, spec: &VisualizationSpec) -> Result<AggregateKey, AdaptError> {
    spec.value_key()
        .ok_or_else(|| AdaptError::malformed(kind, SpecField::ValueColumn.as_str()))
}

fn group_column(kind: ChartKind, spec: &VisualizationSpec) -> Result<&str, AdaptError> {
    spec.group_by
        .as_deref()
        .ok_or_else(|| AdaptError::malformed(kind, SpecField::GroupBy.as_str()))
}

/// Numeric cell; absent key is malformed, null is a gap
fn value_of(kind: ChartKind, row: &Row, key: &str) -> Result<Option<f64>, AdaptError> {
    row.get(key)
        .map(number)
        .ok_or_else(|| AdaptError::malformed(kind, key))
}

fn label_of(kind: ChartKind, row: &Row, key: &str) -> Result<String, AdaptError> {
    row.get(key)
        .map(label)
        .ok_or_else(|| AdaptError::malformed(kind, key))
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cb_core::{Aggregation, SortOrder};
    use serde_json::json;

    fn rows(value: Value) -> Vec<Row> {
        serde_json::from_value(value).unwrap()
    }

    fn bar() -> VisualizationSpec {
        VisualizationSpec::new(ChartKind::Bar)
            .with_group_by("region")
            .with_value_column("sales")
            .with_aggregation(Aggregation::Sum)
            .with_sort(SortOrder::Desc)
    }

    fn categorical_model(model: RenderModel) -> CategoricalModel {
        match model {
            RenderModel::Categorical(m) => m,
            other => panic!("expected categorical model, got {:?}", other),
        }
    }

    #[test]
    fn test_single_series_bar() {
        let data = rows(json!([
            {"region": "East", "sales_sum": 120},
            {"region": "West", "sales_sum": 80}
        ]));
        let model = categorical_model(adapt(ChartKind::Bar, &bar(), &data).unwrap());

        assert_eq!(model.categories, vec!["East", "West"]);
        assert_eq!(model.series.len(), 1);
        assert_eq!(model.series[0].key, "sales_sum");
        assert_eq!(model.series[0].values, vec![Some(120.0), Some(80.0)]);
        assert!(!model.stacked);
    }

    #[test]
    fn test_long_sub_group_pivot() {
        let spec = bar().with_sub_group("channel").with_stacked(true);
        let data = rows(json!([
            {"region": "East", "channel": "Online", "sales_sum": 70},
            {"region": "East", "channel": "Retail", "sales_sum": 50},
            {"region": "West", "channel": "Retail", "sales_sum": 30}
        ]));
        let model = categorical_model(adapt(ChartKind::Bar, &spec, &data).unwrap());

        assert_eq!(model.categories, vec!["East", "West"]);
        let keys: Vec<_> = model.series.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["Online", "Retail"]);
        assert_eq!(model.series[0].values, vec![Some(70.0), None]);
        assert_eq!(model.series[1].values, vec![Some(50.0), Some(30.0)]);
        assert_ne!(model.series[0].color, model.series[1].color);
        assert!(model.stacked);
    }

    #[test]
    fn test_wide_sub_group_shape() {
        let mut spec = bar().with_sub_group("channel");
        spec.chart_kind = ChartKind::Line;
        let data = rows(json!([
            {"region": "East", "Online": 70, "Retail": 50},
            {"region": "West", "Retail": 30}
        ]));
        let model = categorical_model(adapt(ChartKind::Line, &spec, &data).unwrap());

        let keys: Vec<_> = model.series.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["Online", "Retail"]);
        assert_eq!(model.series[0].values, vec![Some(70.0), None]);
        // Stacking is ignored for line charts
        assert!(!model.stacked);
    }

    #[test]
    fn test_kpi() {
        let spec = VisualizationSpec::new(ChartKind::Kpi)
            .with_value_column("sales")
            .with_aggregation(Aggregation::Avg);
        let model = adapt(ChartKind::Kpi, &spec, &rows(json!([{"sales_avg": 42.5}]))).unwrap();
        match model {
            RenderModel::Kpi(kpi) => {
                assert_eq!(kpi.key.as_str(), "sales_avg");
                assert_eq!(kpi.value, Some(42.5));
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = adapt(ChartKind::Kpi, &spec, &rows(json!([{"sales_sum": 1}]))).unwrap_err();
        assert_eq!(
            err,
            AdaptError::MalformedResponse {
                chart_kind: ChartKind::Kpi,
                field: "sales_avg".into()
            }
        );
    }

    #[test]
    fn test_empty_rows_are_empty_result_for_every_kind() {
        for kind in ChartKind::ALL {
            let mut spec = bar().with_secondary_value_column("margin").with_bins(4);
            spec.chart_kind = kind;
            assert_eq!(
                adapt(kind, &spec, &[]),
                Err(AdaptError::EmptyResult { chart_kind: kind })
            );
        }
    }

    #[test]
    fn test_histogram_bins() {
        let spec = VisualizationSpec::new(ChartKind::Histogram)
            .with_value_column("price")
            .with_bins(2);
        let data = rows(json!([
            {"price": 5.0, "bin_start": 0.0, "bin_end": 10.0, "price_count": 3},
            {"bin_start": 10.0, "bin_end": 20.0, "price_count": 1}
        ]));
        match adapt(ChartKind::Histogram, &spec, &data).unwrap() {
            RenderModel::Histogram(h) => {
                assert_eq!(h.key.as_str(), "price_count");
                assert_eq!(h.bins[0].x, 5.0);
                assert_eq!(h.bins[1].x, 15.0);
                assert_eq!(h.bins[1].count, 1.0);
            }
            other => panic!("unexpected {:?}", other),
        }

        let bad = rows(json!([{"price": 5.0}]));
        assert!(matches!(
            adapt(ChartKind::Histogram, &spec, &bad),
            Err(AdaptError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_pie_colors_follow_row_position() {
        let mut spec = bar();
        spec.chart_kind = ChartKind::Pie;
        let data = rows(json!([
            {"region": "East", "sales_sum": 120},
            {"region": "West", "sales_sum": 80},
            {"region": "North", "sales_sum": 10}
        ]));
        match adapt(ChartKind::Pie, &spec, &data).unwrap() {
            RenderModel::Pie(pie) => {
                let labels: Vec<_> = pie.slices.iter().map(|s| s.label.as_str()).collect();
                assert_eq!(labels, vec!["East", "West", "North"]);
                for (index, slice) in pie.slices.iter().enumerate() {
                    assert_eq!(slice.color, categorical_color(index));
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_funnel_keeps_row_order() {
        let spec = VisualizationSpec::new(ChartKind::Funnel)
            .with_group_by("stage")
            .with_value_column("users")
            .with_aggregation(Aggregation::Count);
        let data = rows(json!([
            {"stage": "visit", "users_count": 100},
            {"stage": "signup", "users_count": 40},
            {"stage": "paid", "users_count": 45}
        ]));
        match adapt(ChartKind::Funnel, &spec, &data).unwrap() {
            RenderModel::Funnel(f) => {
                let labels: Vec<_> = f.stages.iter().map(|s| s.label.as_str()).collect();
                assert_eq!(labels, vec!["visit", "signup", "paid"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_dual_axis_shares_categories() {
        let spec = VisualizationSpec::new(ChartKind::DualAxis)
            .with_group_by("month")
            .with_value_column("sales")
            .with_secondary_value_column("margin")
            .with_aggregation(Aggregation::Avg);
        let data = rows(json!([
            {"month": "Jan", "sales_avg": 10, "margin_avg": 0.2},
            {"month": "Feb", "sales_avg": 12, "margin_avg": 0.25}
        ]));
        match adapt(ChartKind::DualAxis, &spec, &data).unwrap() {
            RenderModel::DualAxis(d) => {
                assert_eq!(d.categories, vec!["Jan", "Feb"]);
                assert_eq!(d.primary.key, "sales_avg");
                assert_eq!(d.secondary.key, "margin_avg");
                assert_eq!(d.secondary.values, vec![Some(0.2), Some(0.25)]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_table_caps_display_rows() {
        let data: Vec<Row> = (0..150)
            .map(|i| serde_json::from_value(json!({"id": i, "sales": i * 2})).unwrap())
            .collect();
        let spec = VisualizationSpec::new(ChartKind::Table).with_value_column("sales");
        match adapt(ChartKind::Table, &spec, &data).unwrap() {
            RenderModel::Table(table) => {
                assert_eq!(table.rows.len(), 100);
                assert_eq!(table.total_rows, 150);
                assert!(table.is_truncated());
                assert_eq!(table.columns, vec!["id", "sales"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_malformed_becomes_placeholder() {
        let err = adapt(ChartKind::Bar, &bar(), &rows(json!([{"region": "East"}]))).unwrap_err();
        let model = err.into_empty_model();
        assert!(model.is_empty());
        assert_eq!(model.chart_kind(), ChartKind::Bar);
    }
}
