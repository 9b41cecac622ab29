//! Dashboard persistence

use async_trait::async_trait;
use cb_core::{DashboardDocument, DashboardId};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("dashboard {0} not found")]
    NotFound(DashboardId),

    #[error("could not serialize dashboard: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Listing entry for a saved dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub id: DashboardId,
    pub name: String,
    pub dataset_id: String,
    pub chart_count: usize,
    pub saved_at: DateTime<Utc>,
}

/// Persistence collaborator for dashboard documents
#[async_trait]
pub trait DashboardStore: Send + Sync {
    /// Upsert: a document without an id is created and assigned one, a
    /// document with an id replaces the stored copy. Returns the id.
    async fn save(&self, document: DashboardDocument) -> Result<DashboardId, StoreError>;

    async fn load(&self, id: DashboardId) -> Result<DashboardDocument, StoreError>;

    /// Most recently saved first
    async fn list(&self) -> Result<Vec<DashboardSummary>, StoreError>;

    async fn delete(&self, id: DashboardId) -> Result<(), StoreError>;
}

struct StoredDashboard {
    json: String,
    summary: DashboardSummary,
}

/// Store keeping serialized documents in memory
#[derive(Default)]
pub struct MemoryDashboardStore {
    dashboards: RwLock<IndexMap<DashboardId, StoredDashboard>>,
}

impl MemoryDashboardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.dashboards.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.dashboards.read().is_empty()
    }
}

#[async_trait]
impl DashboardStore for MemoryDashboardStore {
    async fn save(&self, mut document: DashboardDocument) -> Result<DashboardId, StoreError> {
        let id = *document.id.get_or_insert_with(Uuid::new_v4);
        let json = serde_json::to_string(&document)?;
        let summary = DashboardSummary {
            id,
            name: document.name.clone(),
            dataset_id: document.dataset_id.clone(),
            chart_count: document.charts.len(),
            saved_at: Utc::now(),
        };

        let replaced = self
            .dashboards
            .write()
            .insert(id, StoredDashboard { json, summary })
            .is_some();
        tracing::debug!(
            "{} dashboard {} ({})",
            if replaced { "Replaced" } else { "Created" },
            id,
            document.name
        );
        Ok(id)
    }

    async fn load(&self, id: DashboardId) -> Result<DashboardDocument, StoreError> {
        let dashboards = self.dashboards.read();
        let stored = dashboards.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(serde_json::from_str(&stored.json)?)
    }

    async fn list(&self) -> Result<Vec<DashboardSummary>, StoreError> {
        let mut summaries: Vec<_> = self
            .dashboards
            .read()
            .values()
            .map(|stored| stored.summary.clone())
            .collect();
        // Stable sort keeps later inserts ahead on equal timestamps
        summaries.reverse();
        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(summaries)
    }

    async fn delete(&self, id: DashboardId) -> Result<(), StoreError> {
        self.dashboards
            .write()
            .shift_remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}
