//! Per-chart view controller
//!
//! Drives one chart through hydration, validation, compilation, execution and
//! adaptation. Every compile is tagged with a generation number; a response
//! is applied only if its generation is the latest one issued, so a slow
//! response can never overwrite a newer configuration.
//!
//! The controller never performs I/O itself. [`ViewController::poll`] hands
//! out the next request, the host executes it, and
//! [`ViewController::complete`] feeds the result back. [`ViewController::run`]
//! chains the three for hosts that execute inline.

use std::sync::Arc;

use cb_core::events::events::{ChartFailed, ChartRendered, CrossFilterEmitted, SpecChanged};
use cb_core::{
    validate, ChartId, ColumnCatalog, EventBus, FilterDelta, FilterSet, SpecEdit, SpecField,
    SpecSubscriber, SpecSubscribers, ValidationError, VisualizationSpec,
};
use cb_data::{AggregationQueryRequest, ExecutorError, QueryCompiler, QueryExecutor, QueryResponse};
use serde_json::Value;
use thiserror::Error;

use crate::adapter::ResultAdapter;
use crate::colors::colorize;
use crate::interaction::selection_delta;
use crate::render::RenderModel;

/// Lifecycle of a chart instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Uninitialized,
    Hydrating,
    /// Mounted, nothing compiled yet
    Ready,
    /// Inputs changed since the last compile
    Stale,
    Compiling { generation: u64 },
    RenderReady { generation: u64 },
    Error,
    TornDown,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("chart {0} has been removed")]
    TornDown(ChartId),

    #[error("chart {0} is not mounted")]
    NotMounted(ChartId),
}

/// Error shown in place of a chart
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ViewError {
    pub message: String,
    /// Spec field the user should change
    pub field: Option<SpecField>,
    /// Whether retrying the same spec may succeed
    pub retryable: bool,
}

impl ViewError {
    pub fn from_validation(error: &ValidationError) -> Self {
        Self {
            message: error.to_string(),
            field: Some(error.field()),
            retryable: false,
        }
    }

    pub fn from_executor(error: &ExecutorError) -> Self {
        Self {
            message: format!("{}. Refresh to try again.", error),
            field: None,
            retryable: true,
        }
    }
}

/// A compiled request waiting for the executor
#[derive(Debug, Clone, PartialEq)]
pub struct PendingQuery {
    pub chart_id: ChartId,
    pub generation: u64,
    pub request: AggregationQueryRequest,
}

pub struct ViewController {
    id: ChartId,
    state: ViewState,
    spec: VisualizationSpec,
    hydrated: bool,
    filters: FilterSet,
    catalog: ColumnCatalog,
    compiler: QueryCompiler,
    adapter: ResultAdapter,
    /// Highest generation issued
    generation: u64,
    render: Option<RenderModel>,
    last_error: Option<ViewError>,
    subscribers: SpecSubscribers,
    event_bus: Option<Arc<EventBus>>,
}

impl ViewController {
    pub fn new(id: ChartId, catalog: ColumnCatalog) -> Self {
        Self {
            id,
            state: ViewState::Uninitialized,
            spec: VisualizationSpec::default(),
            hydrated: false,
            filters: FilterSet::new(),
            catalog,
            compiler: QueryCompiler::default(),
            adapter: ResultAdapter::default(),
            generation: 0,
            render: None,
            last_error: None,
            subscribers: SpecSubscribers::new(),
            event_bus: None,
        }
    }

    pub fn with_compiler(mut self, compiler: QueryCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_adapter(mut self, adapter: ResultAdapter) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    pub fn id(&self) -> ChartId {
        self.id
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn spec(&self) -> &VisualizationSpec {
        &self.spec
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn catalog(&self) -> &ColumnCatalog {
        &self.catalog
    }

    /// Latest generation issued
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn render_model(&self) -> Option<&RenderModel> {
        self.render.as_ref()
    }

    /// Error or hint for the current spec
    pub fn last_error(&self) -> Option<&ViewError> {
        self.last_error.as_ref()
    }

    /// Mount the chart, hydrating from a persisted spec if there is one
    pub fn mount(&mut self, persisted: Option<VisualizationSpec>) -> Result<(), ControllerError> {
        match self.state {
            ViewState::TornDown => return Err(ControllerError::TornDown(self.id)),
            ViewState::Uninitialized => {}
            _ => return Ok(()),
        }
        self.transition(ViewState::Hydrating);
        if let Some(spec) = persisted {
            self.hydrate(spec)?;
        }
        self.transition(ViewState::Ready);
        Ok(())
    }

    /// Merge a persisted spec. Applies only the first time one is seen for
    /// this chart and only before any edit; later calls are ignored and
    /// return false. Hydration is not broadcast to subscribers.
    pub fn hydrate(&mut self, spec: VisualizationSpec) -> Result<bool, ControllerError> {
        self.ensure_not_torn_down()?;
        if self.hydrated {
            tracing::debug!("Chart {} already hydrated, ignoring persisted spec", self.id);
            return Ok(false);
        }
        self.hydrated = true;
        self.spec = spec;
        self.mark_stale("hydrated");
        Ok(true)
    }

    /// Apply one editor action; broadcasts the spec if anything changed
    pub fn edit(&mut self, edit: SpecEdit) -> Result<bool, ControllerError> {
        self.ensure_live()?;
        let field = edit.field();
        if !self.spec.apply(edit) {
            return Ok(false);
        }
        self.hydrated = true;
        self.mark_stale(field.as_str());
        self.broadcast();
        Ok(true)
    }

    /// Replace the whole spec as an edit
    pub fn replace_spec(&mut self, spec: VisualizationSpec) -> Result<bool, ControllerError> {
        self.ensure_live()?;
        if self.spec == spec {
            return Ok(false);
        }
        self.spec = spec;
        self.hydrated = true;
        self.mark_stale("spec replaced");
        self.broadcast();
        Ok(true)
    }

    /// External dashboard filters changed
    pub fn set_filters(&mut self, filters: FilterSet) -> Result<bool, ControllerError> {
        self.ensure_live()?;
        if self.filters == filters {
            return Ok(false);
        }
        self.filters = filters;
        self.mark_stale("filters");
        Ok(true)
    }

    /// Column catalog changed, e.g. the dataset was re-profiled
    pub fn set_columns(&mut self, catalog: ColumnCatalog) -> Result<bool, ControllerError> {
        self.ensure_live()?;
        if self.catalog == catalog {
            return Ok(false);
        }
        self.catalog = catalog;
        self.mark_stale("columns");
        Ok(true)
    }

    /// Force a recompile with unchanged inputs, e.g. to retry after an
    /// executor failure
    pub fn refresh(&mut self) -> Result<(), ControllerError> {
        self.ensure_live()?;
        self.mark_stale("refresh");
        Ok(())
    }

    /// Issue the next query if the chart needs one.
    ///
    /// An incomplete spec stays `Stale` with a hint in
    /// [`last_error`](Self::last_error); any other validation failure moves
    /// to `Error` without reaching the executor.
    pub fn poll(&mut self) -> Result<Option<PendingQuery>, ControllerError> {
        self.ensure_live()?;
        if !matches!(self.state, ViewState::Ready | ViewState::Stale) {
            return Ok(None);
        }

        let request = match validate(&self.spec, &self.catalog)
            .and_then(|()| self.compiler.compile(&self.spec, &self.filters))
        {
            Ok(request) => request,
            Err(error) if error.is_incomplete() => {
                self.last_error = Some(ViewError::from_validation(&error));
                self.transition(ViewState::Stale);
                return Ok(None);
            }
            Err(error) => {
                self.fail(ViewError::from_validation(&error));
                return Ok(None);
            }
        };

        self.generation += 1;
        self.render = None;
        self.last_error = None;
        self.transition(ViewState::Compiling {
            generation: self.generation,
        });

        Ok(Some(PendingQuery {
            chart_id: self.id,
            generation: self.generation,
            request,
        }))
    }

    /// Apply an executor result. Returns false when the result belongs to a
    /// superseded generation and was discarded.
    pub fn complete(
        &mut self,
        generation: u64,
        result: Result<QueryResponse, ExecutorError>,
    ) -> Result<bool, ControllerError> {
        self.ensure_live()?;
        if generation != self.generation || self.state != (ViewState::Compiling { generation }) {
            tracing::debug!(
                "Chart {} discarding response for generation {} (latest {}, state {:?})",
                self.id,
                generation,
                self.generation,
                self.state
            );
            return Ok(false);
        }

        match result {
            Ok(response) => {
                let model = match self.adapter.adapt(self.spec.chart_kind, &self.spec, &response) {
                    Ok(model) => colorize(model, self.spec.colors_by_mean()),
                    Err(error) => error.into_empty_model(),
                };
                let empty = model.is_empty();
                self.render = Some(model);
                self.transition(ViewState::RenderReady { generation });
                self.publish(ChartRendered {
                    chart_id: self.id,
                    generation,
                    chart_kind: self.spec.chart_kind,
                    empty,
                });
            }
            Err(error) => {
                tracing::error!("Chart {} query failed: {}", self.id, error);
                self.fail(ViewError::from_executor(&error));
            }
        }
        Ok(true)
    }

    /// Poll, execute and complete in one step. Returns whether a result was
    /// applied.
    pub async fn run(&mut self, executor: &dyn QueryExecutor) -> Result<bool, ControllerError> {
        let Some(pending) = self.poll()? else {
            return Ok(false);
        };
        let result = executor.execute(&pending.request).await;
        self.complete(pending.generation, result)
    }

    /// Cross-filter for a clicked point, if this chart supports selection.
    /// The caller owns merging it into the dashboard filters.
    pub fn select_point(&mut self, value: impl Into<Value>) -> Result<Option<FilterDelta>, ControllerError> {
        self.ensure_live()?;
        let delta = selection_delta(&self.spec, value);
        if let Some(delta) = &delta {
            self.publish(CrossFilterEmitted {
                chart_id: self.id,
                column: delta.column.clone(),
                value: delta.value.clone(),
            });
        }
        Ok(delta)
    }

    /// Register for spec changes; held weakly
    pub fn subscribe(&self, subscriber: &Arc<dyn SpecSubscriber>) {
        self.subscribers.add(subscriber);
    }

    /// Remove the chart; every later call fails with `TornDown`
    pub fn teardown(&mut self) {
        if self.state == ViewState::TornDown {
            return;
        }
        self.transition(ViewState::TornDown);
        self.render = None;
        self.subscribers.clear();
    }

    fn ensure_not_torn_down(&self) -> Result<(), ControllerError> {
        match self.state {
            ViewState::TornDown => Err(ControllerError::TornDown(self.id)),
            _ => Ok(()),
        }
    }

    fn ensure_live(&self) -> Result<(), ControllerError> {
        match self.state {
            ViewState::TornDown => Err(ControllerError::TornDown(self.id)),
            ViewState::Uninitialized => Err(ControllerError::NotMounted(self.id)),
            _ => Ok(()),
        }
    }

    /// Ready and in-flight charts stay where they are while hydrating
    fn mark_stale(&mut self, cause: &str) {
        match self.state {
            ViewState::Ready
            | ViewState::Compiling { .. }
            | ViewState::RenderReady { .. }
            | ViewState::Error => {
                tracing::debug!("Chart {} stale: {}", self.id, cause);
                self.transition(ViewState::Stale);
            }
            _ => {}
        }
    }

    fn fail(&mut self, error: ViewError) {
        self.publish(ChartFailed {
            chart_id: self.id,
            message: error.message.clone(),
            retryable: error.retryable,
        });
        self.last_error = Some(error);
        self.render = None;
        self.transition(ViewState::Error);
    }

    fn transition(&mut self, next: ViewState) {
        if self.state != next {
            tracing::debug!("Chart {} {:?} -> {:?}", self.id, self.state, next);
            self.state = next;
        }
    }

    fn broadcast(&self) {
        self.subscribers.notify(self.id, &self.spec);
        self.publish(SpecChanged {
            chart_id: self.id,
            spec: self.spec.clone(),
        });
    }

    fn publish<E: cb_core::events::Event>(&self, event: E) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cb_core::{Aggregation, ChartKind, ColumnDescriptor, DType, SortOrder};
    use cb_data::Row;
    use parking_lot::Mutex;
    use serde_json::json;

    fn catalog() -> ColumnCatalog {
        ColumnCatalog::new(vec![
            ColumnDescriptor::new("region", DType::String),
            ColumnDescriptor::new("channel", DType::String),
            ColumnDescriptor::new("sales", DType::Float64),
        ])
    }

    fn bar() -> VisualizationSpec {
        VisualizationSpec::new(ChartKind::Bar)
            .with_group_by("region")
            .with_value_column("sales")
            .with_aggregation(Aggregation::Sum)
            .with_sort(SortOrder::Desc)
    }

    fn response(value: Value) -> QueryResponse {
        QueryResponse::from_rows(serde_json::from_value::<Vec<Row>>(value).unwrap())
    }

    fn mounted(spec: Option<VisualizationSpec>) -> ViewController {
        let mut view = ViewController::new(ChartId::new_v4(), catalog());
        view.mount(spec).unwrap();
        view
    }

    #[test]
    fn test_mount_and_first_compile() {
        let mut view = ViewController::new(ChartId::new_v4(), catalog());
        assert_eq!(view.poll(), Err(ControllerError::NotMounted(view.id())));

        view.mount(Some(bar())).unwrap();
        assert_eq!(view.state(), ViewState::Ready);

        let pending = view.poll().unwrap().unwrap();
        assert_eq!(pending.generation, 1);
        assert_eq!(view.state(), ViewState::Compiling { generation: 1 });
        assert_eq!(view.poll().unwrap(), None);

        let applied = view
            .complete(1, Ok(response(json!([{"region": "East", "sales_sum": 120}]))))
            .unwrap();
        assert!(applied);
        assert_eq!(view.state(), ViewState::RenderReady { generation: 1 });
        assert!(matches!(view.render_model(), Some(RenderModel::Categorical(_))));
    }

    #[test]
    fn test_hydration_applies_once() {
        let mut view = mounted(Some(bar()));
        let other = bar().with_value_column("units");
        assert!(!view.hydrate(other).unwrap());
        assert_eq!(view.spec(), &bar());
    }

    #[test]
    fn test_edits_win_over_late_hydration() {
        let mut view = mounted(None);
        view.edit(SpecEdit::GroupBy(Some("region".into()))).unwrap();
        let edited = view.spec().clone();

        assert!(!view.hydrate(bar()).unwrap());
        assert_eq!(view.spec(), &edited);

        let mut fresh = mounted(None);
        assert!(fresh.hydrate(bar()).unwrap());
        assert_eq!(fresh.spec(), &bar());
    }

    #[test]
    fn test_sub_grouped_bar_is_not_colored() {
        let rendered = |spec: VisualizationSpec, rows: Value| {
            let mut view = mounted(Some(spec));
            let pending = view.poll().unwrap().unwrap();
            view.complete(pending.generation, Ok(response(rows))).unwrap();
            match view.render_model() {
                Some(RenderModel::Categorical(model)) => model.clone(),
                other => panic!("unexpected {:?}", other),
            }
        };

        // A single sub-group value in the data is still a sub-grouped chart
        let model = rendered(
            bar().with_sub_group("channel").with_conditional_coloring(true),
            json!([
                {"region": "East", "channel": "Online", "sales_sum": 120},
                {"region": "West", "channel": "Online", "sales_sum": 80}
            ]),
        );
        assert_eq!(model.series.len(), 1);
        assert!(model.series[0].point_classes.is_none());

        let model = rendered(
            bar().with_conditional_coloring(true),
            json!([
                {"region": "East", "sales_sum": 120},
                {"region": "West", "sales_sum": 80}
            ]),
        );
        assert!(model.series[0].point_classes.is_some());
    }

    #[test]
    fn test_non_numeric_histogram_never_compiles() {
        let spec = VisualizationSpec::new(ChartKind::Histogram)
            .with_value_column("region")
            .with_aggregation(Aggregation::Count)
            .with_bins(5);
        let mut view = mounted(Some(spec));
        assert_eq!(view.poll().unwrap(), None);
        assert_eq!(view.state(), ViewState::Error);
        assert_eq!(view.generation(), 0);

        let error = view.last_error().unwrap();
        assert!(!error.retryable);
        assert_eq!(error.field, Some(SpecField::ValueColumn));
    }

    #[test]
    fn test_incomplete_spec_waits_in_stale() {
        let mut view = mounted(None);
        view.edit(SpecEdit::GroupBy(Some("region".into()))).unwrap();
        assert_eq!(view.state(), ViewState::Stale);

        assert_eq!(view.poll().unwrap(), None);
        assert_eq!(view.state(), ViewState::Stale);
        assert_eq!(view.last_error().and_then(|e| e.field), Some(SpecField::ValueColumn));

        view.edit(SpecEdit::ValueColumn(Some("sales".into()))).unwrap();
        assert!(view.poll().unwrap().is_some());
    }

    #[test]
    fn test_incompatible_aggregation_never_compiles() {
        let spec = bar().with_value_column("region").with_aggregation(Aggregation::Avg);
        let mut view = mounted(Some(spec));
        assert_eq!(view.poll().unwrap(), None);
        assert_eq!(view.state(), ViewState::Error);
        assert_eq!(view.generation(), 0);
        assert!(!view.last_error().unwrap().retryable);
    }

    #[test]
    fn test_stale_generation_is_discarded() {
        let mut view = mounted(Some(bar()));
        let first = view.poll().unwrap().unwrap();

        view.edit(SpecEdit::Sort(None)).unwrap();
        let second = view.poll().unwrap().unwrap();
        assert_eq!(second.generation, first.generation + 1);

        let newer = response(json!([{"region": "West", "sales_sum": 80}]));
        assert!(view.complete(second.generation, Ok(newer)).unwrap());
        let shown = view.render_model().cloned();

        let older = response(json!([{"region": "East", "sales_sum": 120}]));
        assert!(!view.complete(first.generation, Ok(older)).unwrap());
        assert_eq!(view.render_model().cloned(), shown);
        assert_eq!(view.state(), ViewState::RenderReady { generation: 2 });
    }

    #[test]
    fn test_executor_failure_is_retryable() {
        let mut view = mounted(Some(bar()));
        let pending = view.poll().unwrap().unwrap();
        view.complete(pending.generation, Err(ExecutorError::Failure("timeout".into())))
            .unwrap();

        assert_eq!(view.state(), ViewState::Error);
        assert!(view.last_error().unwrap().retryable);

        view.refresh().unwrap();
        assert_eq!(view.state(), ViewState::Stale);
        assert_eq!(view.poll().unwrap().unwrap().generation, 2);
    }

    #[test]
    fn test_empty_and_malformed_render_placeholders() {
        let mut view = mounted(Some(bar()));
        let pending = view.poll().unwrap().unwrap();
        view.complete(pending.generation, Ok(QueryResponse::default())).unwrap();
        assert!(view.render_model().unwrap().is_empty());

        view.refresh().unwrap();
        let pending = view.poll().unwrap().unwrap();
        view.complete(pending.generation, Ok(response(json!([{"region": "East"}]))))
            .unwrap();
        assert!(view.render_model().unwrap().is_empty());
        assert_eq!(view.state(), ViewState::RenderReady { generation: 2 });
    }

    #[test]
    fn test_edits_broadcast_to_subscribers() {
        struct Recorder(Mutex<Vec<VisualizationSpec>>);
        impl SpecSubscriber for Recorder {
            fn on_spec_change(&self, _chart_id: ChartId, spec: &VisualizationSpec) {
                self.0.lock().push(spec.clone());
            }
        }

        let mut view = mounted(Some(bar()));
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let subscriber: Arc<dyn SpecSubscriber> = recorder.clone();
        view.subscribe(&subscriber);

        view.edit(SpecEdit::Aggregation(Aggregation::Max)).unwrap();
        // Unchanged value is not broadcast
        view.edit(SpecEdit::Aggregation(Aggregation::Max)).unwrap();
        view.edit(SpecEdit::ValueColumn(None)).unwrap();

        let seen = recorder.0.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].value_column, None);
    }

    #[test]
    fn test_filter_and_column_changes_mark_stale() {
        let mut view = mounted(Some(bar()));
        let pending = view.poll().unwrap().unwrap();
        view.complete(pending.generation, Ok(response(json!([{"region": "East", "sales_sum": 1}]))))
            .unwrap();

        assert!(view.set_filters(FilterSet::new().with("region", "East")).unwrap());
        assert_eq!(view.state(), ViewState::Stale);
        let pending = view.poll().unwrap().unwrap();
        assert_eq!(pending.request.filters.len(), 1);

        assert!(view.set_columns(ColumnCatalog::default()).unwrap());
        assert_eq!(view.state(), ViewState::Stale);
    }

    #[test]
    fn test_teardown_is_terminal() {
        let mut view = mounted(Some(bar()));
        let pending = view.poll().unwrap().unwrap();
        view.teardown();

        let id = view.id();
        assert_eq!(view.poll(), Err(ControllerError::TornDown(id)));
        assert_eq!(
            view.complete(pending.generation, Ok(QueryResponse::default())),
            Err(ControllerError::TornDown(id))
        );
        assert_eq!(view.edit(SpecEdit::Stacked(true)), Err(ControllerError::TornDown(id)));
        assert_eq!(view.mount(None), Err(ControllerError::TornDown(id)));
        assert!(view.render_model().is_none());
    }

    #[test]
    fn test_select_point_emits_cross_filter() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe_fn(move |event: &CrossFilterEmitted| {
            sink.lock().push((event.column.clone(), event.value.clone()));
        });

        let mut view = ViewController::new(ChartId::new_v4(), catalog()).with_event_bus(bus);
        view.mount(Some(bar())).unwrap();

        let delta = view.select_point("East").unwrap().unwrap();
        assert_eq!(delta, FilterDelta::new("region", "East"));
        assert_eq!(*seen.lock(), vec![("region".to_string(), json!("East"))]);

        view.edit(SpecEdit::ChartKind(ChartKind::Pie)).unwrap();
        assert_eq!(view.select_point("East").unwrap(), None);
    }
}
