use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::courier::adapter::CourierAdapter;

/// Courier providers keyed by identifier. The coordinator and the fraud
/// evaluator resolve adapters here; wiring a new provider touches only the
/// registration call in `main`.
pub struct CourierRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn CourierAdapter>>>,
}

impl CourierRegistry {
    pub fn new() -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, adapter: Arc<dyn CourierAdapter>) {
        let id = adapter.provider_id().to_lowercase();
        info!("🔌 Registered courier provider: {}", id);
        self.adapters.write().insert(id, adapter);
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn CourierAdapter>> {
        self.adapters.read().get(&provider_id.to_lowercase()).cloned()
    }

    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for CourierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::courier::adapter::{CourierDispatchResult, CourierError};
    use crate::model::{FraudVerdict, Order};
    use async_trait::async_trait;

    struct NullAdapter(&'static str);

    #[async_trait]
    impl CourierAdapter for NullAdapter {
        async fn dispatch(&self, _order: &Order) -> Result<CourierDispatchResult, CourierError> {
            Err(CourierError::Rejected("not wired".to_string()))
        }

        async fn check_fraud_risk(&self, _order: &Order) -> Result<FraudVerdict, CourierError> {
            Err(CourierError::Rejected("not wired".to_string()))
        }

        fn provider_id(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = CourierRegistry::new();
        registry.register(Arc::new(NullAdapter("steadfast")));

        assert!(registry.get("Steadfast").is_some());
        assert!(registry.get("STEADFAST").is_some());
        assert!(registry.get("pathao").is_none());
    }

    #[test]
    fn provider_ids_are_sorted() {
        let registry = CourierRegistry::new();
        registry.register(Arc::new(NullAdapter("pathao")));
        registry.register(Arc::new(NullAdapter("steadfast")));
        assert_eq!(registry.provider_ids(), vec!["pathao", "steadfast"]);
    }
}
