use std::sync::Arc;
use parking_lot::RwLock;
use ahash::AHashMap;

use crate::filters::{FilterDelta, FilterSet};
use crate::ChartId;

/// How a cross-filter delta is merged into the shared filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Set the column to the selected value
    #[default]
    Replace,
    /// Remove the filter if it already holds the selected value, otherwise set it
    Toggle,
}

/// Cross-filter participation of one chart
#[derive(Debug, Clone)]
pub struct ViewSyncSettings {
    /// Whether point selections on this chart emit cross-filters
    pub emit_cross_filters: bool,

    /// Whether this chart is re-queried when the shared filters change
    pub receive_filters: bool,
}

impl Default for ViewSyncSettings {
    fn default() -> Self {
        Self {
            emit_cross_filters: true,
            receive_filters: true,
        }
    }
}

/// Dashboard-wide filter state owned by the host.
///
/// Charts only read from it; the host merges deltas coming from the
/// interaction broker.
pub struct FilterState {
    filters: Arc<RwLock<FilterSet>>,

    /// Per-chart sync settings
    view_settings: Arc<RwLock<AHashMap<ChartId, ViewSyncSettings>>>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::with_filters(FilterSet::new())
    }

    pub fn with_filters(filters: FilterSet) -> Self {
        Self {
            filters: Arc::new(RwLock::new(filters)),
            view_settings: Arc::new(RwLock::new(AHashMap::new())),
        }
    }

    /// Snapshot of the current filters
    pub fn filters(&self) -> FilterSet {
        self.filters.read().clone()
    }

    pub fn set_filters(&self, filters: FilterSet) {
        *self.filters.write() = filters;
    }

    pub fn clear(&self) {
        self.filters.write().clear();
    }

    /// Merge a delta and return the resulting filters
    pub fn apply_delta(&self, delta: &FilterDelta, policy: MergePolicy) -> FilterSet {
        let mut filters = self.filters.write();
        match policy {
            MergePolicy::Replace => {
                filters.insert(delta.column.clone(), delta.value.clone());
            }
            MergePolicy::Toggle => {
                if filters.get(&delta.column) == Some(&delta.value) {
                    filters.remove(&delta.column);
                } else {
                    filters.insert(delta.column.clone(), delta.value.clone());
                }
            }
        }
        tracing::debug!("Filters after {:?} of {}: {:?}", policy, delta.column, *filters);
        filters.clone()
    }

    /// Register a chart with sync settings
    pub fn register_view(&self, chart_id: ChartId, settings: ViewSyncSettings) {
        self.view_settings.write().insert(chart_id, settings);
    }

    /// Unregister a chart
    pub fn unregister_view(&self, chart_id: &ChartId) {
        self.view_settings.write().remove(chart_id);
    }

    pub fn should_emit(&self, chart_id: &ChartId) -> bool {
        self.view_settings
            .read()
            .get(chart_id)
            .map(|s| s.emit_cross_filters)
            .unwrap_or(true)
    }

    pub fn should_receive(&self, chart_id: &ChartId) -> bool {
        self.view_settings
            .read()
            .get(chart_id)
            .map(|s| s.receive_filters)
            .unwrap_or(true)
    }
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_replace_and_toggle() {
        let state = FilterState::new();
        let east = FilterDelta::new("region", "East");
        let west = FilterDelta::new("region", "West");

        let filters = state.apply_delta(&east, MergePolicy::Replace);
        assert_eq!(filters.get("region"), Some(&json!("East")));

        let filters = state.apply_delta(&west, MergePolicy::Toggle);
        assert_eq!(filters.get("region"), Some(&json!("West")));

        let filters = state.apply_delta(&west, MergePolicy::Toggle);
        assert!(filters.is_empty());
        assert!(state.filters().is_empty());

        state.apply_delta(&east, MergePolicy::Replace);
        state.clear();
        assert!(state.filters().is_empty());
    }

    #[test]
    fn test_view_settings_default_to_participating() {
        let state = FilterState::new();
        let chart = Uuid::new_v4();
        assert!(state.should_emit(&chart));
        assert!(state.should_receive(&chart));

        state.register_view(
            chart,
            ViewSyncSettings {
                emit_cross_filters: false,
                receive_filters: true,
            },
        );
        assert!(!state.should_emit(&chart));

        state.unregister_view(&chart);
        assert!(state.should_emit(&chart));
    }
}
