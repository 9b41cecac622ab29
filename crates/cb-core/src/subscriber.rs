//! Spec change subscription

use std::sync::{Arc, Weak};
use parking_lot::RwLock;

use crate::spec::VisualizationSpec;
use crate::ChartId;

/// Trait for hosts that persist or mirror a chart's spec
pub trait SpecSubscriber: Send + Sync {
    /// Called with the latest spec, complete or not, after every change
    fn on_spec_change(&self, chart_id: ChartId, spec: &VisualizationSpec);
}

/// Weakly-held subscriber list; dropped subscribers are pruned on notify
#[derive(Default)]
pub struct SpecSubscribers {
    subscribers: RwLock<Vec<Weak<dyn SpecSubscriber>>>,
}

impl SpecSubscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber
    pub fn add(&self, subscriber: &Arc<dyn SpecSubscriber>) {
        self.subscribers.write().push(Arc::downgrade(subscriber));
    }

    /// Notify all live subscribers
    pub fn notify(&self, chart_id: ChartId, spec: &VisualizationSpec) {
        let mut subscribers = self.subscribers.write();

        subscribers.retain(|weak| weak.strong_count() > 0);

        for weak in subscribers.iter() {
            if let Some(subscriber) = weak.upgrade() {
                subscriber.on_spec_change(chart_id, spec);
            }
        }
    }

    pub fn clear(&self) {
        self.subscribers.write().clear();
    }

    /// Number of subscribers still alive
    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ChartKind;
    use parking_lot::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<ChartKind>>,
    }

    impl SpecSubscriber for Recorder {
        fn on_spec_change(&self, _chart_id: ChartId, spec: &VisualizationSpec) {
            self.seen.lock().push(spec.chart_kind);
        }
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let subscribers = SpecSubscribers::new();
        let kept = Arc::new(Recorder::default());
        let kept_dyn: Arc<dyn SpecSubscriber> = kept.clone();
        subscribers.add(&kept_dyn);

        {
            let dropped: Arc<dyn SpecSubscriber> = Arc::new(Recorder::default());
            subscribers.add(&dropped);
            assert_eq!(subscribers.len(), 2);
        }

        subscribers.notify(Uuid::new_v4(), &VisualizationSpec::new(ChartKind::Pie));
        assert_eq!(subscribers.len(), 1);
        assert_eq!(*kept.seen.lock(), vec![ChartKind::Pie]);
    }
}
