//! Core functionality for the chart builder
//!
//! This crate provides the declarative visualization spec, the column catalog
//! it is validated against, and the state a dashboard host shares between
//! charts.

pub mod columns;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod filters;
pub mod naming;
pub mod spec;
pub mod subscriber;
pub mod sync;
pub mod validate;

// Re-export commonly used types
pub use columns::{ColumnCatalog, ColumnDescriptor, DType};
pub use dashboard::{DashboardDocument, DashboardId};
pub use error::ValidationError;
pub use events::EventBus;
pub use filters::{Filter, FilterDelta, FilterOperator, FilterSet};
pub use naming::AggregateKey;
pub use spec::{Aggregation, ChartKind, SortOrder, SortSpec, SpecEdit, SpecField, VisualizationSpec};
pub use subscriber::{SpecSubscriber, SpecSubscribers};
pub use sync::{FilterState, MergePolicy, ViewSyncSettings};
pub use validate::validate;

/// Chart instance identifier
pub type ChartId = uuid::Uuid;
