//! Persisted dashboard document

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::filters::FilterSet;
use crate::spec::VisualizationSpec;

pub type DashboardId = Uuid;

/// Wire shape exchanged with the storage collaborator.
///
/// `layout` is opaque to this crate and passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DashboardId>,

    pub name: String,

    pub dataset_id: String,

    #[serde(default)]
    pub filters: FilterSet,

    #[serde(default)]
    pub charts: Vec<VisualizationSpec>,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub layout: Value,
}

impl DashboardDocument {
    pub fn new(name: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            dataset_id: dataset_id.into(),
            filters: FilterSet::new(),
            charts: Vec::new(),
            layout: Value::Null,
        }
    }

    pub fn with_chart(mut self, spec: VisualizationSpec) -> Self {
        self.charts.push(spec);
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
