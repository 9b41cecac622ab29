//! Point selection → cross-filter deltas

use cb_core::{FilterDelta, VisualizationSpec};
use serde_json::Value;

/// Delta for a selected point on the grouping axis
pub fn on_point_selected(group_by_column: &str, point_value: impl Into<Value>) -> FilterDelta {
    FilterDelta::new(group_by_column, point_value)
}

/// Delta for a selection on this chart, if its kind supports point selection
/// and it has a grouping column
pub fn selection_delta(spec: &VisualizationSpec, point_value: impl Into<Value>) -> Option<FilterDelta> {
    if !spec.chart_kind.supports_point_selection() {
        return None;
    }
    let column = spec.group_by.as_deref().filter(|c| !c.trim().is_empty())?;
    Some(on_point_selected(column, point_value))
}
