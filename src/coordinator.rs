/// Dispatch Coordinator
///
/// Orchestrates "send this order to courier X": precondition checks, the
/// provider call, and the four-field commit, with at-most-one successful
/// dispatch per (order, provider) pair.
///
/// Correctness rests on two checks rather than locks:
///   1. the idempotency guard, re-evaluated against a fresh read on every
///      attempt, and
///   2. the store's compare-and-swap commit, which refuses to land on top
///      of a concurrent edit.
///
/// On any failure the persisted order is byte-for-byte unchanged: nothing is
/// written until the provider call has succeeded, and then everything is
/// written at once.
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::courier::adapter::{CourierAdapter, CourierError};
use crate::courier::registry::CourierRegistry;
use crate::metrics;
use crate::model::Order;
use crate::state_machine::{self, InvalidTransition, OrderStatus};
use crate::store::{OrderStore, StoreError, VersionedOrder};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Total attempts for transport-class failures, first try included.
    pub max_attempts: u32,
    /// Base backoff between attempts; grows linearly per attempt.
    pub retry_backoff_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

/// The full error surface the admin shell sees. Every kind maps to a
/// distinct, actionable message; nothing escapes the coordinator as an
/// unstructured failure.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No courier provider configured for '{0}'")]
    ConfigurationMissing(String),
    #[error("Order is missing required field: {0}")]
    MissingRequiredField(String),
    #[error("Order already sent to {provider}, tracking id is {tracking_id}")]
    AlreadyDispatched {
        provider: String,
        tracking_id: String,
    },
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("Provider auth error: {0}")]
    ProviderAuth(String),
    #[error("Provider validation error: {0}")]
    ProviderValidation(String),
    #[error("Provider transport error: {0}")]
    ProviderTransport(String),
    #[error("Rejected by provider: {0}")]
    ProviderRejected(String),
    #[error("Order {0} changed elsewhere, reload before retrying")]
    StaleOrderState(String),
    #[error("Order not found: {0}")]
    OrderNotFound(String),
}

impl DispatchError {
    /// Stable machine-readable code for API payloads and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing(_) => "configuration_missing",
            Self::MissingRequiredField(_) => "missing_required_field",
            Self::AlreadyDispatched { .. } => "already_dispatched",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::ProviderAuth(_) => "provider_auth_error",
            Self::ProviderValidation(_) => "provider_validation_error",
            Self::ProviderTransport(_) => "provider_transport_error",
            Self::ProviderRejected(_) => "provider_rejected",
            Self::StaleOrderState(_) => "stale_order_state",
            Self::OrderNotFound(_) => "order_not_found",
        }
    }
}

impl From<CourierError> for DispatchError {
    fn from(err: CourierError) -> Self {
        match err {
            CourierError::Auth(msg) => DispatchError::ProviderAuth(msg),
            CourierError::Validation(msg) => DispatchError::ProviderValidation(msg),
            CourierError::Transport(msg) => DispatchError::ProviderTransport(msg),
            CourierError::Rejected(msg) => DispatchError::ProviderRejected(msg),
        }
    }
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) | StoreError::Duplicate(id) => {
                DispatchError::OrderNotFound(id)
            }
            StoreError::StaleOrderState { order_id, .. } => {
                DispatchError::StaleOrderState(order_id)
            }
        }
    }
}

/// What a successful dispatch hands back to the caller.
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    pub order: Order,
    pub version: u64,
    pub provider: String,
    pub tracking_id: String,
    pub attempts: u32,
}

pub struct DispatchCoordinator {
    store: Arc<dyn OrderStore>,
    registry: Arc<CourierRegistry>,
    config: CoordinatorConfig,
}

impl DispatchCoordinator {
    pub fn new(
        store: Arc<dyn OrderStore>,
        registry: Arc<CourierRegistry>,
        config: Option<CoordinatorConfig>,
    ) -> Self {
        let config = config.unwrap_or_default();
        info!(
            max_attempts = config.max_attempts,
            retry_backoff_ms = config.retry_backoff_ms,
            "DispatchCoordinator initialized"
        );
        Self {
            store,
            registry,
            config,
        }
    }

    /// Send the order to the given provider. Transport failures retry up to
    /// the configured attempt budget; every other failure surfaces on the
    /// first occurrence.
    pub async fn send_to_courier(
        &self,
        order_id: &str,
        provider_id: &str,
    ) -> Result<DispatchReceipt, DispatchError> {
        let provider_id = provider_id.to_lowercase();
        let adapter = self
            .registry
            .get(&provider_id)
            .ok_or_else(|| DispatchError::ConfigurationMissing(provider_id.clone()))?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .dispatch_once(order_id, &provider_id, adapter.as_ref(), attempt)
                .await
            {
                Err(DispatchError::ProviderTransport(reason))
                    if attempt < self.config.max_attempts =>
                {
                    warn!(
                        order_id,
                        provider = %provider_id,
                        attempt,
                        reason = %reason,
                        "Transport failure, retrying dispatch"
                    );
                    metrics::inc_dispatch_retries();
                    sleep(Duration::from_millis(
                        self.config.retry_backoff_ms * attempt as u64,
                    ))
                    .await;
                }
                Err(err) => {
                    metrics::inc_dispatch_failures();
                    if matches!(err, DispatchError::StaleOrderState(_)) {
                        metrics::inc_stale_commits();
                    }
                    warn!(
                        order_id,
                        provider = %provider_id,
                        attempt,
                        kind = err.kind(),
                        "Dispatch failed: {}",
                        err
                    );
                    return Err(err);
                }
                Ok(receipt) => {
                    metrics::inc_dispatch_success();
                    info!(
                        order_id,
                        provider = %provider_id,
                        tracking_id = %receipt.tracking_id,
                        attempts = receipt.attempts,
                        "🚚 Order handed to courier"
                    );
                    return Ok(receipt);
                }
            }
        }
    }

    /// One dispatch attempt against a fresh read of the order. Preconditions
    /// are re-evaluated here every time so a retry observes concurrent
    /// writes, including a dispatch that landed from another session.
    async fn dispatch_once(
        &self,
        order_id: &str,
        provider_id: &str,
        adapter: &dyn CourierAdapter,
        attempt: u32,
    ) -> Result<DispatchReceipt, DispatchError> {
        let VersionedOrder { order, version } = self.store.get(order_id).await?;

        if order.phone.trim().is_empty() {
            return Err(DispatchError::MissingRequiredField("phone".to_string()));
        }

        // Idempotency guard: at most one successful dispatch per
        // (order, provider). Returns the existing tracking id.
        if let (Some(provider), Some(tracking_id)) = (&order.courier_provider, &order.tracking_id)
        {
            if provider == provider_id {
                metrics::inc_already_dispatched();
                return Err(DispatchError::AlreadyDispatched {
                    provider: provider.clone(),
                    tracking_id: tracking_id.clone(),
                });
            }
            // Provider switch: a consignment exists with another courier;
            // the new dispatch replaces provider, tracking id and meta as
            // one unit in the commit below.
            info!(
                order_id,
                from_provider = %provider,
                to_provider = %provider_id,
                "Provider switch requested"
            );
        }

        if order.status.is_terminal() {
            return Err(InvalidTransition {
                from: order.status,
                to: OrderStatus::SentToCourier,
                reason: format!("{} is a terminal status", order.status),
            }
            .into());
        }

        let started = Instant::now();
        let result = adapter.dispatch(&order).await?;
        metrics::observe_courier_latency(started.elapsed().as_secs_f64());

        // Tracking id, provider, meta and the status flip land as a single
        // snapshot; the CAS commit refuses to overwrite a concurrent edit.
        let next = state_machine::apply_courier_handoff(
            &order,
            provider_id,
            result.tracking_id.clone(),
            result.meta,
        )?;

        let committed = self.store.commit(next, version).await?;

        Ok(DispatchReceipt {
            order: committed.order,
            version: committed.version,
            provider: provider_id.to_string(),
            tracking_id: result.tracking_id,
            attempts: attempt,
        })
    }

    /// Manual staff transition through the state machine, committed with the
    /// same conflict detection as dispatch.
    pub async fn change_status(
        &self,
        order_id: &str,
        target: OrderStatus,
    ) -> Result<VersionedOrder, DispatchError> {
        let VersionedOrder { order, version } = self.store.get(order_id).await?;
        let next = state_machine::apply_transition(&order, target)?;
        let committed = self.store.commit(next, version).await?;
        Ok(committed)
    }

    /// Current persisted snapshot, for callers re-fetching after
    /// `StaleOrderState`.
    pub async fn fetch_order(&self, order_id: &str) -> Result<VersionedOrder, DispatchError> {
        Ok(self.store.get(order_id).await?)
    }
}
