use async_trait::async_trait;
use thiserror::Error;

use crate::model::{CourierMeta, FraudVerdict, Order};

#[derive(Error, Debug)]
pub enum CourierError {
    #[error("Provider auth error: {0}")]
    Auth(String),
    #[error("Order failed provider validation: {0}")]
    Validation(String),
    #[error("Provider transport error: {0}")]
    Transport(String),
    #[error("Rejected by provider: {0}")]
    Rejected(String),
}

impl CourierError {
    /// Only transport-class failures are safe to retry; the coordinator's
    /// idempotency guard is re-evaluated before every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CourierError::Transport(_))
    }
}

/// Normalized result of a successful dispatch. Consumed immediately by the
/// coordinator; not retained anywhere else.
#[derive(Debug, Clone)]
pub struct CourierDispatchResult {
    pub tracking_id: String,
    pub meta: CourierMeta,
    pub raw: serde_json::Value,
}

/// Uniform contract over heterogeneous courier APIs. Adding a provider means
/// implementing this trait and registering it, never touching the
/// coordinator.
#[async_trait]
pub trait CourierAdapter: Send + Sync {
    /// Hand the order to the provider for physical delivery.
    async fn dispatch(&self, order: &Order) -> Result<CourierDispatchResult, CourierError>;

    /// Read-only risk lookup for the order's recipient. No side effects on
    /// the order.
    async fn check_fraud_risk(&self, order: &Order) -> Result<FraudVerdict, CourierError>;

    /// Stable provider identifier, e.g. "steadfast".
    fn provider_id(&self) -> &str;
}

/// Field checks shared by every provider, run before any network call.
/// A recipient phone number is universally required.
pub(crate) fn require_dispatch_fields(order: &Order) -> Result<(), CourierError> {
    if order.phone.trim().is_empty() {
        return Err(CourierError::Validation(
            "recipient phone number is required".to_string(),
        ));
    }
    if order.customer_name.trim().is_empty() {
        return Err(CourierError::Validation(
            "recipient name is required".to_string(),
        ));
    }
    if order.address.trim().is_empty() {
        return Err(CourierError::Validation(
            "recipient address is required".to_string(),
        ));
    }
    Ok(())
}
