use std::sync::Arc;

use crate::coordinator::DispatchCoordinator;
use crate::courier::registry::CourierRegistry;
use crate::fraud::FraudEvaluator;
use crate::store::OrderStore;

/// Shared wiring handed to the HTTP handlers. Everything here is cheap to
/// clone; the heavy state lives behind the Arcs.
#[derive(Clone)]
pub struct DispatchContext {
    pub store: Arc<dyn OrderStore>,
    pub registry: Arc<CourierRegistry>,
    pub coordinator: Arc<DispatchCoordinator>,
    pub fraud: Arc<FraudEvaluator>,
}

impl DispatchContext {
    pub fn new(store: Arc<dyn OrderStore>, registry: Arc<CourierRegistry>) -> Self {
        let coordinator = Arc::new(DispatchCoordinator::new(
            store.clone(),
            registry.clone(),
            None,
        ));
        let fraud = Arc::new(FraudEvaluator::new(registry.clone()));
        Self {
            store,
            registry,
            coordinator,
            fraud,
        }
    }

    pub fn with_coordinator(
        store: Arc<dyn OrderStore>,
        registry: Arc<CourierRegistry>,
        coordinator: Arc<DispatchCoordinator>,
    ) -> Self {
        let fraud = Arc::new(FraudEvaluator::new(registry.clone()));
        Self {
            store,
            registry,
            coordinator,
            fraud,
        }
    }
}
