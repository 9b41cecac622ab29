//! Visualization spec model
//!
//! A [`VisualizationSpec`] is the persisted, editable description of a single
//! chart. Fields that do not apply to the current [`ChartKind`] are kept as-is
//! so a spec survives being switched between kinds and back.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::naming::AggregateKey;

/// The nine supported chart kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    #[default]
    Bar,
    Line,
    Area,
    Pie,
    Table,
    Kpi,
    Histogram,
    Funnel,
    DualAxis,
}

impl ChartKind {
    pub const ALL: [ChartKind; 9] = [
        ChartKind::Bar,
        ChartKind::Line,
        ChartKind::Area,
        ChartKind::Pie,
        ChartKind::Table,
        ChartKind::Kpi,
        ChartKind::Histogram,
        ChartKind::Funnel,
        ChartKind::DualAxis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Area => "area",
            ChartKind::Pie => "pie",
            ChartKind::Table => "table",
            ChartKind::Kpi => "kpi",
            ChartKind::Histogram => "histogram",
            ChartKind::Funnel => "funnel",
            ChartKind::DualAxis => "dual_axis",
        }
    }

    /// Whether a primary grouping column is required.
    ///
    /// Tables and KPIs aggregate without a category axis; a histogram's
    /// x-axis is the binned value column itself.
    pub fn requires_group_by(&self) -> bool {
        !matches!(self, ChartKind::Table | ChartKind::Kpi | ChartKind::Histogram)
    }

    /// Whether `sub_group` splits the chart into one series per value
    pub fn supports_sub_group(&self) -> bool {
        matches!(self, ChartKind::Bar | ChartKind::Line | ChartKind::Area)
    }

    /// Whether `stacked` is meaningful (still requires a sub-group)
    pub fn supports_stacking(&self) -> bool {
        matches!(self, ChartKind::Bar | ChartKind::Area)
    }

    /// Whether clicking a point emits a cross-filter
    pub fn supports_point_selection(&self) -> bool {
        matches!(self, ChartKind::Bar | ChartKind::Line)
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregation applied to the value column(s)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl Aggregation {
    pub const ALL: [Aggregation; 5] = [
        Aggregation::Sum,
        Aggregation::Avg,
        Aggregation::Count,
        Aggregation::Min,
        Aggregation::Max,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Avg => "avg",
            Aggregation::Count => "count",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
        }
    }

    /// Count is the only aggregation defined for non-numeric columns
    pub fn requires_numeric(&self) -> bool {
        !matches!(self, Aggregation::Count)
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Requested sort; the compiler always sorts on the aggregated value key
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    #[serde(default)]
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(order: SortOrder) -> Self {
        Self { column: None, order }
    }
}

/// Names of the spec fields, used in validation messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecField {
    ChartKind,
    GroupBy,
    SubGroup,
    ValueColumn,
    SecondaryValueColumn,
    Aggregation,
    Sort,
    Stacked,
    Bins,
    ConditionalColoring,
}

impl SpecField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecField::ChartKind => "chart_kind",
            SpecField::GroupBy => "group_by",
            SpecField::SubGroup => "sub_group",
            SpecField::ValueColumn => "value_column",
            SpecField::SecondaryValueColumn => "secondary_value_column",
            SpecField::Aggregation => "aggregation",
            SpecField::Sort => "sort",
            SpecField::Stacked => "stacked",
            SpecField::Bins => "bins",
            SpecField::ConditionalColoring => "conditional_coloring",
        }
    }
}

impl fmt::Display for SpecField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The declarative description of one chart
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisualizationSpec {
    #[serde(default)]
    pub chart_kind: ChartKind,

    /// Primary categorical column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,

    /// Secondary categorical column; one series per distinct value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_column: Option<String>,

    /// Right-hand axis column for dual-axis charts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_value_column: Option<String>,

    #[serde(default)]
    pub aggregation: Aggregation,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,

    #[serde(default)]
    pub stacked: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bins: Option<u32>,

    #[serde(default)]
    pub conditional_coloring: bool,
}

impl VisualizationSpec {
    pub fn new(chart_kind: ChartKind) -> Self {
        Self {
            chart_kind,
            ..Default::default()
        }
    }

    pub fn with_group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by = Some(column.into());
        self
    }

    pub fn with_sub_group(mut self, column: impl Into<String>) -> Self {
        self.sub_group = Some(column.into());
        self
    }

    pub fn with_value_column(mut self, column: impl Into<String>) -> Self {
        self.value_column = Some(column.into());
        self
    }

    pub fn with_secondary_value_column(mut self, column: impl Into<String>) -> Self {
        self.secondary_value_column = Some(column.into());
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_sort(mut self, order: SortOrder) -> Self {
        self.sort = Some(SortSpec::new(order));
        self
    }

    pub fn with_stacked(mut self, stacked: bool) -> Self {
        self.stacked = stacked;
        self
    }

    pub fn with_bins(mut self, bins: u32) -> Self {
        self.bins = Some(bins);
        self
    }

    pub fn with_conditional_coloring(mut self, enabled: bool) -> Self {
        self.conditional_coloring = enabled;
        self
    }

    /// Output key of the primary aggregated column
    pub fn value_key(&self) -> Option<AggregateKey> {
        self.value_column
            .as_deref()
            .map(|column| AggregateKey::new(column, self.aggregation))
    }

    /// Output key of the secondary aggregated column (dual-axis only)
    pub fn secondary_key(&self) -> Option<AggregateKey> {
        if self.chart_kind != ChartKind::DualAxis {
            return None;
        }
        self.secondary_value_column
            .as_deref()
            .map(|column| AggregateKey::new(column, self.aggregation))
    }

    /// Sub-group column, if the current chart kind uses one
    pub fn effective_sub_group(&self) -> Option<&str> {
        if self.chart_kind.supports_sub_group() {
            self.sub_group.as_deref()
        } else {
            None
        }
    }

    /// Above/below-mean coloring applies to bar charts without a sub-group
    pub fn colors_by_mean(&self) -> bool {
        self.conditional_coloring && self.chart_kind == ChartKind::Bar && self.effective_sub_group().is_none()
    }

    /// First required field that is not set for the current chart kind
    pub fn missing_field(&self) -> Option<SpecField> {
        if self.chart_kind.requires_group_by() && is_blank(&self.group_by) {
            return Some(SpecField::GroupBy);
        }
        if is_blank(&self.value_column) {
            return Some(SpecField::ValueColumn);
        }
        if self.chart_kind == ChartKind::DualAxis && is_blank(&self.secondary_value_column) {
            return Some(SpecField::SecondaryValueColumn);
        }
        if self.chart_kind == ChartKind::Histogram && self.bins.is_none() {
            return Some(SpecField::Bins);
        }
        None
    }

    /// Whether every field the chart kind requires is present
    pub fn is_complete(&self) -> bool {
        self.missing_field().is_none()
    }

    /// Apply a single editor action, returning whether anything changed
    pub fn apply(&mut self, edit: SpecEdit) -> bool {
        let before = self.clone();
        match edit {
            SpecEdit::ChartKind(kind) => self.chart_kind = kind,
            SpecEdit::GroupBy(column) => self.group_by = column,
            SpecEdit::SubGroup(column) => self.sub_group = column,
            SpecEdit::ValueColumn(column) => self.value_column = column,
            SpecEdit::SecondaryValueColumn(column) => self.secondary_value_column = column,
            SpecEdit::Aggregation(aggregation) => self.aggregation = aggregation,
            SpecEdit::Sort(sort) => self.sort = sort,
            SpecEdit::Stacked(stacked) => self.stacked = stacked,
            SpecEdit::Bins(bins) => self.bins = bins,
            SpecEdit::ConditionalColoring(enabled) => self.conditional_coloring = enabled,
        }
        *self != before
    }
}

fn is_blank(field: &Option<String>) -> bool {
    field.as_deref().map_or(true, |s| s.trim().is_empty())
}

/// A single editor action on a spec
#[derive(Debug, Clone, PartialEq)]
pub enum SpecEdit {
    ChartKind(ChartKind),
    GroupBy(Option<String>),
    SubGroup(Option<String>),
    ValueColumn(Option<String>),
    SecondaryValueColumn(Option<String>),
    Aggregation(Aggregation),
    Sort(Option<SortSpec>),
    Stacked(bool),
    Bins(Option<u32>),
    ConditionalColoring(bool),
}

impl SpecEdit {
    pub fn field(&self) -> SpecField {
        match self {
            SpecEdit::ChartKind(_) => SpecField::ChartKind,
            SpecEdit::GroupBy(_) => SpecField::GroupBy,
            SpecEdit::SubGroup(_) => SpecField::SubGroup,
            SpecEdit::ValueColumn(_) => SpecField::ValueColumn,
            SpecEdit::SecondaryValueColumn(_) => SpecField::SecondaryValueColumn,
            SpecEdit::Aggregation(_) => SpecField::Aggregation,
            SpecEdit::Sort(_) => SpecField::Sort,
            SpecEdit::Stacked(_) => SpecField::Stacked,
            SpecEdit::Bins(_) => SpecField::Bins,
            SpecEdit::ConditionalColoring(_) => SpecField::ConditionalColoring,
        }
    }
}
