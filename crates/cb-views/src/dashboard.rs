//! Dashboard host: one view controller per chart plus the shared filters

use std::sync::Arc;

use cb_core::{
    ChartId, ColumnCatalog, DashboardDocument, DashboardId, EventBus, FilterDelta, FilterSet,
    FilterState, MergePolicy, VisualizationSpec, ViewSyncSettings,
};
use cb_data::{QueryCompiler, QueryExecutor};
use indexmap::IndexMap;
use serde_json::Value;
use uuid::Uuid;

use crate::adapter::ResultAdapter;
use crate::controller::{ControllerError, ViewController};

pub struct DashboardSession {
    id: Option<DashboardId>,
    name: String,
    dataset_id: String,
    layout: Value,
    catalog: ColumnCatalog,
    filter_state: FilterState,
    merge_policy: MergePolicy,
    event_bus: Arc<EventBus>,
    compiler: QueryCompiler,
    adapter: ResultAdapter,
    /// Insertion order is chart order in the saved document
    charts: IndexMap<ChartId, ViewController>,
}

impl DashboardSession {
    pub fn new(name: impl Into<String>, dataset_id: impl Into<String>, catalog: ColumnCatalog) -> Self {
        Self {
            id: None,
            name: name.into(),
            dataset_id: dataset_id.into(),
            layout: Value::Null,
            catalog,
            filter_state: FilterState::new(),
            merge_policy: MergePolicy::default(),
            event_bus: Arc::new(EventBus::new()),
            compiler: QueryCompiler::default(),
            adapter: ResultAdapter::default(),
            charts: IndexMap::new(),
        }
    }

    /// Open a saved dashboard, hydrating one chart per persisted spec
    pub fn from_document(document: DashboardDocument, catalog: ColumnCatalog) -> Result<Self, ControllerError> {
        let mut session = Self::new(document.name, document.dataset_id, catalog);
        session.id = document.id;
        session.layout = document.layout;
        session.filter_state.set_filters(document.filters);
        for spec in document.charts {
            session.add_chart(Some(spec))?;
        }
        Ok(session)
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    pub fn with_compiler(mut self, compiler: QueryCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_adapter(mut self, adapter: ResultAdapter) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn id(&self) -> Option<DashboardId> {
        self.id
    }

    /// Record the id assigned by the store after a first save
    pub fn set_id(&mut self, id: DashboardId) {
        self.id = Some(id);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn filters(&self) -> FilterSet {
        self.filter_state.filters()
    }

    pub fn chart(&self, id: &ChartId) -> Option<&ViewController> {
        self.charts.get(id)
    }

    pub fn chart_mut(&mut self, id: &ChartId) -> Option<&mut ViewController> {
        self.charts.get_mut(id)
    }

    pub fn chart_ids(&self) -> Vec<ChartId> {
        self.charts.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    /// Add a chart, optionally hydrated from a persisted spec
    pub fn add_chart(&mut self, spec: Option<VisualizationSpec>) -> Result<ChartId, ControllerError> {
        self.add_chart_with(spec, ViewSyncSettings::default())
    }

    pub fn add_chart_with(
        &mut self,
        spec: Option<VisualizationSpec>,
        settings: ViewSyncSettings,
    ) -> Result<ChartId, ControllerError> {
        let id = Uuid::new_v4();
        let mut controller = ViewController::new(id, self.catalog.clone())
            .with_compiler(self.compiler.clone())
            .with_adapter(self.adapter.clone())
            .with_event_bus(self.event_bus.clone())
            .with_filters(self.filter_state.filters());
        controller.mount(spec)?;

        self.filter_state.register_view(id, settings);
        self.charts.insert(id, controller);
        tracing::info!("Added chart {} to dashboard '{}'", id, self.name);
        Ok(id)
    }

    /// Tear down and drop a chart, returning its last spec
    pub fn remove_chart(&mut self, id: &ChartId) -> Option<VisualizationSpec> {
        let mut controller = self.charts.shift_remove(id)?;
        controller.teardown();
        self.filter_state.unregister_view(id);
        tracing::info!("Removed chart {} from dashboard '{}'", id, self.name);
        Some(controller.spec().clone())
    }

    /// Route a point selection through the shared filters. Every chart that
    /// receives filters goes stale if the merged filters changed.
    pub fn select_point(
        &mut self,
        chart_id: &ChartId,
        value: impl Into<Value>,
    ) -> Result<Option<FilterDelta>, ControllerError> {
        if !self.filter_state.should_emit(chart_id) {
            return Ok(None);
        }
        let Some(controller) = self.charts.get_mut(chart_id) else {
            return Ok(None);
        };
        let Some(delta) = controller.select_point(value)? else {
            return Ok(None);
        };

        let merged = self.filter_state.apply_delta(&delta, self.merge_policy);
        self.propagate(merged)?;
        Ok(Some(delta))
    }

    /// Replace the dashboard filters
    pub fn set_filters(&mut self, filters: FilterSet) -> Result<(), ControllerError> {
        self.filter_state.set_filters(filters.clone());
        self.propagate(filters)
    }

    pub fn clear_filters(&mut self) -> Result<(), ControllerError> {
        self.filter_state.clear();
        self.propagate(FilterSet::new())
    }

    fn propagate(&mut self, filters: FilterSet) -> Result<(), ControllerError> {
        for (id, controller) in self.charts.iter_mut() {
            if self.filter_state.should_receive(id) {
                controller.set_filters(filters.clone())?;
            }
        }
        Ok(())
    }

    /// Run every chart that needs a query; returns how many rendered or failed
    pub async fn refresh_all(&mut self, executor: &dyn QueryExecutor) -> Result<usize, ControllerError> {
        let mut applied = 0;
        for controller in self.charts.values_mut() {
            if controller.run(executor).await? {
                applied += 1;
            }
        }
        tracing::debug!("Refreshed {} of {} charts", applied, self.charts.len());
        Ok(applied)
    }

    /// Snapshot for the storage collaborator
    pub fn to_document(&self) -> DashboardDocument {
        DashboardDocument {
            id: self.id,
            name: self.name.clone(),
            dataset_id: self.dataset_id.clone(),
            filters: self.filter_state.filters(),
            charts: self.charts.values().map(|c| c.spec().clone()).collect(),
            layout: self.layout.clone(),
        }
    }
}
