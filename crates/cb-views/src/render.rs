//! Render models
//!
//! One variant per drawable shape. Render models are derived from a query
//! response and never persisted.

use cb_core::{AggregateKey, ChartKind};
use cb_data::Row;
use serde::Serialize;

use crate::colors::{ColorClass, Rgb};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum RenderModel {
    Table(TableModel),
    Kpi(KpiModel),
    Histogram(HistogramModel),
    Pie(PieModel),
    Funnel(FunnelModel),
    /// Bar, line and area charts
    Categorical(CategoricalModel),
    DualAxis(DualAxisModel),
    Empty(EmptyModel),
}

impl RenderModel {
    pub fn chart_kind(&self) -> ChartKind {
        match self {
            RenderModel::Table(_) => ChartKind::Table,
            RenderModel::Kpi(_) => ChartKind::Kpi,
            RenderModel::Histogram(_) => ChartKind::Histogram,
            RenderModel::Pie(_) => ChartKind::Pie,
            RenderModel::Funnel(_) => ChartKind::Funnel,
            RenderModel::Categorical(model) => model.chart_kind,
            RenderModel::DualAxis(_) => ChartKind::DualAxis,
            RenderModel::Empty(model) => model.chart_kind,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RenderModel::Empty(_))
    }

    pub fn empty(chart_kind: ChartKind, reason: EmptyReason) -> Self {
        RenderModel::Empty(EmptyModel { chart_kind, reason })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableModel {
    pub columns: Vec<String>,
    /// Display rows, capped
    pub rows: Vec<Row>,
    /// Row count before the display cap
    pub total_rows: usize,
}

impl TableModel {
    pub fn is_truncated(&self) -> bool {
        self.total_rows > self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiModel {
    pub key: AggregateKey,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    /// Bin representative value
    pub x: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    pub count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramModel {
    pub key: AggregateKey,
    pub bins: Vec<HistogramBin>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub label: String,
    pub value: Option<f64>,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieModel {
    pub key: AggregateKey,
    pub slices: Vec<PieSlice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelStage {
    pub label: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelModel {
    pub key: AggregateKey,
    pub stages: Vec<FunnelStage>,
}

/// One named series over a shared category axis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub key: String,
    /// Aligned with the model's categories; `None` where no row matched
    pub values: Vec<Option<f64>>,
    pub color: Rgb,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_classes: Option<Vec<ColorClass>>,
}

impl Series {
    pub fn new(key: impl Into<String>, values: Vec<Option<f64>>, color: Rgb) -> Self {
        Self {
            key: key.into(),
            values,
            color,
            point_classes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoricalModel {
    pub chart_kind: ChartKind,
    pub categories: Vec<String>,
    pub series: Vec<Series>,
    /// Rendering directive, data is not accumulated
    pub stacked: bool,
}

impl CategoricalModel {
    pub fn is_single_series(&self) -> bool {
        self.series.len() == 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DualAxisModel {
    pub categories: Vec<String>,
    pub primary: Series,
    pub secondary: Series,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EmptyReason {
    /// The query matched no rows
    NoData,
    /// The response lacked an expected field
    Malformed { detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmptyModel {
    pub chart_kind: ChartKind,
    #[serde(flatten)]
    pub reason: EmptyReason,
}

impl EmptyModel {
    /// Placeholder text shown in place of the chart
    pub fn placeholder(&self) -> &'static str {
        match self.reason {
            EmptyReason::NoData => "No data",
            EmptyReason::Malformed { .. } => "This chart could not be drawn",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_placeholders() {
        let model = EmptyModel {
            chart_kind: ChartKind::Kpi,
            reason: EmptyReason::NoData,
        };
        assert_eq!(model.placeholder(), "No data");

        let model = EmptyModel {
            chart_kind: ChartKind::Bar,
            reason: EmptyReason::Malformed {
                detail: "sales_sum".into(),
            },
        };
        assert_eq!(model.placeholder(), "This chart could not be drawn");
    }
}
