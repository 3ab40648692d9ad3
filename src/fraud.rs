use std::sync::Arc;

use tracing::info;

use crate::coordinator::DispatchError;
use crate::courier::registry::CourierRegistry;
use crate::metrics;
use crate::model::{FraudVerdict, Order, RiskLevel};

/// Fraud Risk Evaluator
///
/// Stateless wrapper around the provider adapters' risk lookup. The verdict
/// is advisory input to a human decision: it is never persisted and neither
/// the state machine nor the dispatch coordinator reads it. Only an explicit
/// "send anyway" from staff proceeds past a High verdict.
pub struct FraudEvaluator {
    registry: Arc<CourierRegistry>,
}

impl FraudEvaluator {
    pub fn new(registry: Arc<CourierRegistry>) -> Self {
        Self { registry }
    }

    pub async fn check(
        &self,
        order: &Order,
        provider_id: &str,
    ) -> Result<FraudVerdict, DispatchError> {
        let provider_id = provider_id.to_lowercase();
        let adapter = self
            .registry
            .get(&provider_id)
            .ok_or_else(|| DispatchError::ConfigurationMissing(provider_id.clone()))?;

        if order.phone.trim().is_empty() {
            return Err(DispatchError::MissingRequiredField("phone".to_string()));
        }

        metrics::inc_fraud_checks();
        let verdict = adapter.check_fraud_risk(order).await?;

        if verdict.level == RiskLevel::High {
            metrics::inc_fraud_high_risk();
        }

        info!(
            order_id = %order.order_id,
            provider = %provider_id,
            label = %verdict.risk_label,
            level = ?verdict.level,
            "Fraud check completed"
        );

        Ok(verdict)
    }
}
