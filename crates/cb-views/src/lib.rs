//! Render models and per-chart view control for the chart builder
//!
//! Responses from the executor are adapted into a [`RenderModel`] per chart
//! kind, optionally colorized, and driven through the [`ViewController`]
//! state machine. [`DashboardSession`] hosts several controllers over shared
//! dashboard filters.

pub mod adapter;
pub mod colors;
pub mod controller;
pub mod dashboard;
pub mod interaction;
pub mod render;

pub use adapter::{adapt, AdaptError, AdapterConfig, ResultAdapter};
pub use colors::{categorical_color, colorize, ColorClass, Rgb, PALETTE};
pub use controller::{ControllerError, PendingQuery, ViewController, ViewError, ViewState};
pub use dashboard::DashboardSession;
pub use interaction::{on_point_selected, selection_delta};
pub use render::{
    CategoricalModel, DualAxisModel, EmptyModel, EmptyReason, FunnelModel, FunnelStage,
    HistogramBin, HistogramModel, KpiModel, PieModel, PieSlice, RenderModel, Series, TableModel,
};
