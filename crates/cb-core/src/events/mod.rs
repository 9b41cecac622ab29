use std::sync::Arc;
use parking_lot::Mutex;
use ahash::AHashMap;

type SharedHandler = Arc<Mutex<Box<dyn EventHandler>>>;

/// Host-facing event bus.
///
/// Handlers run with the bus unlocked, so a handler may publish or
/// subscribe on the same bus. A handler is never re-entered: a nested
/// publish skips handlers that are still running.
pub struct EventBus {
    handlers: Arc<Mutex<AHashMap<std::any::TypeId, Vec<SharedHandler>>>>,
}

/// Event trait that all events must implement
pub trait Event: Send + Sync + 'static {
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Handler trait for event handlers
pub trait EventHandler: Send + Sync {
    fn handle(&mut self, event: &dyn Event);
}

/// Events surfaced to the dashboard host
pub mod events {
    use super::Event;
    use crate::spec::{ChartKind, VisualizationSpec};
    use crate::ChartId;
    use serde_json::Value;

    /// A chart's spec was edited
    #[derive(Debug, Clone)]
    pub struct SpecChanged {
        pub chart_id: ChartId,
        pub spec: VisualizationSpec,
    }

    /// A point selection produced a cross-filter
    #[derive(Debug, Clone)]
    pub struct CrossFilterEmitted {
        pub chart_id: ChartId,
        pub column: String,
        pub value: Value,
    }

    /// A compile-execute-adapt cycle finished
    #[derive(Debug, Clone)]
    pub struct ChartRendered {
        pub chart_id: ChartId,
        pub generation: u64,
        pub chart_kind: ChartKind,
        pub empty: bool,
    }

    /// A chart moved to the error state
    #[derive(Debug, Clone)]
    pub struct ChartFailed {
        pub chart_id: ChartId,
        pub message: String,
        pub retryable: bool,
    }

    // Implement Event trait for all event types
    macro_rules! impl_event {
        ($($t:ty),*) => {
            $(
                impl Event for $t {
                    fn as_any(&self) -> &dyn std::any::Any {
                        self
                    }
                }
            )*
        }
    }

    impl_event!(
        SpecChanged,
        CrossFilterEmitted,
        ChartRendered,
        ChartFailed
    );
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(AHashMap::new())),
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<E: Event>(&self, handler: Box<dyn EventHandler>) {
        let type_id = std::any::TypeId::of::<E>();
        let mut handlers = self.handlers.lock();
        handlers
            .entry(type_id)
            .or_insert_with(Vec::new)
            .push(Arc::new(Mutex::new(handler)));
    }

    /// Subscribe a closure that receives the concrete event type
    pub fn subscribe_fn<E, F>(&self, mut f: F)
    where
        E: Event,
        F: FnMut(&E) + Send + Sync + 'static,
    {
        self.subscribe::<E>(handler_from_fn(move |event: &dyn Event| {
            if let Some(event) = event.as_any().downcast_ref::<E>() {
                f(event);
            }
        }));
    }

    /// Publish an event
    pub fn publish<E: Event>(&self, event: E) {
        let type_id = std::any::TypeId::of::<E>();
        let snapshot: Vec<SharedHandler> = match self.handlers.lock().get(&type_id) {
            Some(event_handlers) => event_handlers.clone(),
            None => return,
        };

        for handler in snapshot {
            match handler.try_lock() {
                Some(mut handler) => handler.handle(&event),
                None => tracing::debug!("Skipping re-entrant event handler"),
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper struct for creating event handlers from closures
pub struct ClosureEventHandler<F> {
    handler: F,
}

impl<F> EventHandler for ClosureEventHandler<F>
where
    F: FnMut(&dyn Event) + Send + Sync,
{
    fn handle(&mut self, event: &dyn Event) {
        (self.handler)(event);
    }
}

/// Create an event handler from a closure
pub fn handler_from_fn<F>(f: F) -> Box<dyn EventHandler>
where
    F: FnMut(&dyn Event) + Send + Sync + 'static,
{
    Box::new(ClosureEventHandler { handler: f })
}
