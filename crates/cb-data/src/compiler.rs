//! Spec → aggregation query compilation
//!
//! Compilation is a pure function of `(spec, filters)`: the same pair always
//! yields an identical request, which keeps row order (and therefore palette
//! assignment in the adapter) stable across re-renders.

use cb_core::{
    AggregateKey, Aggregation, ChartKind, FilterSet, SortOrder, SpecField, ValidationError,
    VisualizationSpec,
};
use serde::{Deserialize, Serialize};

use crate::query::{AggregationClause, AggregationQueryRequest, SortClause};

/// Row limits applied by the compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Limit for every chart kind except KPI
    pub row_limit: usize,

    /// Limit for KPI queries, which read a single scalar
    pub kpi_limit: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            row_limit: 1000,
            kpi_limit: 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    config: CompilerConfig,
}

impl QueryCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Build the executor request for a spec.
    ///
    /// Fields that do not apply to the chart kind are ignored. Fails only when
    /// a field the chart kind needs is missing; callers are expected to have
    /// run the validator first.
    pub fn compile(
        &self,
        spec: &VisualizationSpec,
        filters: &FilterSet,
    ) -> Result<AggregationQueryRequest, ValidationError> {
        let value_column = present(&spec.value_column, SpecField::ValueColumn)?;

        let request = match spec.chart_kind {
            ChartKind::Histogram => {
                let bins = spec.bins.ok_or(ValidationError::missing(SpecField::Bins))?;
                AggregationQueryRequest {
                    group_by: Vec::new(),
                    aggregations: vec![AggregationClause {
                        column: value_column.to_string(),
                        function: Aggregation::Count,
                    }],
                    sort_by: Vec::new(),
                    filters: filters.to_filters(),
                    limit: self.config.row_limit,
                    is_histogram: true,
                    histogram_bins: Some(bins),
                }
            }
            kind => AggregationQueryRequest {
                group_by: self.group_by(spec)?,
                aggregations: self.aggregations(spec, value_column)?,
                sort_by: self.sort_by(spec, value_column),
                filters: filters.to_filters(),
                limit: if kind == ChartKind::Kpi {
                    self.config.kpi_limit
                } else {
                    self.config.row_limit
                },
                is_histogram: false,
                histogram_bins: None,
            },
        };

        tracing::debug!(
            "Compiled {} spec: group_by={:?}, aggregations={}, filters={}, limit={}",
            spec.chart_kind,
            request.group_by,
            request.aggregations.len(),
            request.filters.len(),
            request.limit
        );

        Ok(request)
    }

    fn group_by(&self, spec: &VisualizationSpec) -> Result<Vec<String>, ValidationError> {
        let mut group_by = Vec::new();
        match spec.chart_kind {
            ChartKind::Kpi => return Ok(group_by),
            ChartKind::Table => {
                if let Some(column) = spec.group_by.as_deref().filter(|c| !c.trim().is_empty()) {
                    group_by.push(column.to_string());
                }
            }
            _ => group_by.push(present(&spec.group_by, SpecField::GroupBy)?.to_string()),
        }
        if let Some(sub_group) = spec.effective_sub_group().filter(|c| !c.trim().is_empty()) {
            group_by.push(sub_group.to_string());
        }
        Ok(group_by)
    }

    fn aggregations(
        &self,
        spec: &VisualizationSpec,
        value_column: &str,
    ) -> Result<Vec<AggregationClause>, ValidationError> {
        let mut aggregations = vec![AggregationClause {
            column: value_column.to_string(),
            function: spec.aggregation,
        }];
        if spec.chart_kind == ChartKind::DualAxis {
            let secondary = present(&spec.secondary_value_column, SpecField::SecondaryValueColumn)?;
            aggregations.push(AggregationClause {
                column: secondary.to_string(),
                function: spec.aggregation,
            });
        }
        Ok(aggregations)
    }

    fn sort_by(&self, spec: &VisualizationSpec, value_column: &str) -> Vec<SortClause> {
        let order = match (&spec.sort, spec.chart_kind) {
            (_, ChartKind::Kpi) => None,
            (Some(sort), _) => Some(sort.order),
            // Funnel stages are drawn in row order, widest first
            (None, ChartKind::Funnel) => Some(SortOrder::Desc),
            (None, _) => None,
        };
        order
            .map(|order| {
                vec![SortClause {
                    column: AggregateKey::new(value_column, spec.aggregation).into_string(),
                    order,
                }]
            })
            .unwrap_or_default()
    }
}

/// Compile with the default row limits
pub fn compile(
    spec: &VisualizationSpec,
    filters: &FilterSet,
) -> Result<AggregationQueryRequest, ValidationError> {
    QueryCompiler::default().compile(spec, filters)
}

fn present(value: &Option<String>, field: SpecField) -> Result<&str, ValidationError> {
    value
        .as_deref()
        .filter(|column| !column.trim().is_empty())
        .ok_or(ValidationError::missing(field))
}
