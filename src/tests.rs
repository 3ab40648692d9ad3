use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal_macros::dec;

use crate::coordinator::{CoordinatorConfig, DispatchCoordinator, DispatchError};
use crate::courier::adapter::{CourierAdapter, CourierDispatchResult, CourierError};
use crate::courier::registry::CourierRegistry;
use crate::model::{CourierMeta, FraudVerdict, Order};
use crate::state_machine::OrderStatus;
use crate::store::{MemoryOrderStore, OrderStore, StoreError, VersionedOrder};

/// Scripted courier double. Pop one scripted outcome per dispatch call;
/// an empty script means success with a generated tracking id.
struct MockAdapter {
    provider: &'static str,
    dispatch_calls: AtomicUsize,
    script: Mutex<VecDeque<Result<String, CourierError>>>,
}

impl MockAdapter {
    fn new(provider: &'static str) -> Arc<Self> {
        Arc::new(Self {
            provider,
            dispatch_calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
        })
    }

    fn push(&self, outcome: Result<String, CourierError>) {
        self.script.lock().push_back(outcome);
    }

    fn calls(&self) -> usize {
        self.dispatch_calls.load(Ordering::SeqCst)
    }

    fn meta_for(&self, tracking_id: &str) -> CourierMeta {
        if self.provider == "pathao" {
            CourierMeta::Pathao {
                consignment_id: tracking_id.to_string(),
                delivery_fee: dec!(80),
                order_status: "Pending".to_string(),
            }
        } else {
            CourierMeta::Steadfast {
                consignment_id: 4200,
                tracking_code: tracking_id.to_string(),
                consignment_status: "in_review".to_string(),
            }
        }
    }
}

#[async_trait]
impl CourierAdapter for MockAdapter {
    async fn dispatch(&self, order: &Order) -> Result<CourierDispatchResult, CourierError> {
        let n = self.dispatch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("TRK-{}-{}-{}", self.provider, order.order_id, n)));
        let tracking_id = outcome?;
        Ok(CourierDispatchResult {
            meta: self.meta_for(&tracking_id),
            raw: serde_json::json!({ "tracking": tracking_id }),
            tracking_id,
        })
    }

    async fn check_fraud_risk(&self, _order: &Order) -> Result<FraudVerdict, CourierError> {
        Ok(FraudVerdict::new(self.provider, "safe".to_string(), None, None))
    }

    fn provider_id(&self) -> &str {
        self.provider
    }
}

/// Store double that injects one concurrent edit between the coordinator's
/// read and its commit: before the first commit goes through, another
/// "session" cancels the order, bumping the persisted version.
struct VersionSkewStore {
    inner: MemoryOrderStore,
    armed: AtomicBool,
}

impl VersionSkewStore {
    fn new() -> Self {
        Self {
            inner: MemoryOrderStore::new(),
            armed: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderStore for VersionSkewStore {
    async fn get(&self, order_id: &str) -> Result<VersionedOrder, StoreError> {
        self.inner.get(order_id).await
    }

    async fn insert(&self, order: Order) -> Result<VersionedOrder, StoreError> {
        self.inner.insert(order).await
    }

    async fn commit(
        &self,
        order: Order,
        expected_version: u64,
    ) -> Result<VersionedOrder, StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            let current = self.inner.get(&order.order_id).await?;
            let mut concurrent = current.order.clone();
            concurrent.status = OrderStatus::Cancelled;
            self.inner.commit(concurrent, current.version).await?;
        }
        self.inner.commit(order, expected_version).await
    }
}

fn sample_order(id: &str) -> Order {
    let mut order = Order::new(
        id.to_string(),
        "Rahim Uddin".to_string(),
        "01712345678".to_string(),
        "House 12, Road 5, Dhanmondi".to_string(),
        "P-100".to_string(),
        "Cotton Panjabi".to_string(),
        1,
        dec!(1800),
    );
    order.delivery_charge = dec!(120);
    order
}

fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        max_attempts: 3,
        retry_backoff_ms: 1,
    }
}

async fn fixture(order: Order) -> (Arc<MemoryOrderStore>, Arc<MockAdapter>, DispatchCoordinator) {
    let store = Arc::new(MemoryOrderStore::new());
    store.insert(order).await.unwrap();

    let adapter = MockAdapter::new("steadfast");
    let registry = Arc::new(CourierRegistry::new());
    registry.register(adapter.clone());

    let coordinator = DispatchCoordinator::new(store.clone(), registry, Some(fast_config()));
    (store, adapter, coordinator)
}

#[tokio::test]
async fn happy_path_commits_all_four_fields_together() {
    let (store, _adapter, coordinator) = fixture(sample_order("O1")).await;

    let receipt = coordinator.send_to_courier("O1", "Steadfast").await.unwrap();
    assert_eq!(receipt.provider, "steadfast");
    assert!(!receipt.tracking_id.is_empty());
    assert_eq!(receipt.attempts, 1);

    let persisted = store.get("O1").await.unwrap();
    assert_eq!(persisted.version, 2);
    assert_eq!(persisted.order.status, OrderStatus::SentToCourier);
    assert_eq!(persisted.order.courier_provider.as_deref(), Some("steadfast"));
    assert_eq!(
        persisted.order.tracking_id.as_deref(),
        Some(receipt.tracking_id.as_str())
    );
    assert!(persisted.order.courier_meta.is_some());
}

#[tokio::test]
async fn second_dispatch_to_same_provider_returns_existing_tracking_id() {
    let (store, adapter, coordinator) = fixture(sample_order("O1")).await;

    let receipt = coordinator.send_to_courier("O1", "steadfast").await.unwrap();
    let err = coordinator
        .send_to_courier("O1", "steadfast")
        .await
        .unwrap_err();

    match err {
        DispatchError::AlreadyDispatched {
            provider,
            tracking_id,
        } => {
            assert_eq!(provider, "steadfast");
            assert_eq!(tracking_id, receipt.tracking_id);
        }
        other => panic!("expected AlreadyDispatched, got {:?}", other.kind()),
    }

    // Exactly one consignment reached the provider; the guard stopped the
    // second attempt before the adapter.
    assert_eq!(adapter.calls(), 1);
    let persisted = store.get("O1").await.unwrap();
    assert_eq!(persisted.version, 2);
    assert_eq!(
        persisted.order.tracking_id.as_deref(),
        Some(receipt.tracking_id.as_str())
    );
}

#[tokio::test]
async fn missing_phone_fails_before_any_network_call() {
    let mut order = sample_order("O2");
    order.phone = "".to_string();
    let (store, adapter, coordinator) = fixture(order).await;

    let err = coordinator
        .send_to_courier("O2", "steadfast")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "missing_required_field");
    assert_eq!(adapter.calls(), 0);

    let persisted = store.get("O2").await.unwrap();
    assert_eq!(persisted.version, 1);
    assert_eq!(persisted.order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn unknown_provider_is_configuration_missing() {
    let (_store, adapter, coordinator) = fixture(sample_order("O3")).await;

    let err = coordinator.send_to_courier("O3", "redx").await.unwrap_err();
    assert_eq!(err.kind(), "configuration_missing");
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn failed_dispatch_leaves_order_byte_for_byte_unchanged() {
    let (store, adapter, coordinator) = fixture(sample_order("O4")).await;
    adapter.push(Err(CourierError::Rejected("address unserviceable".into())));

    let before = store.get("O4").await.unwrap();
    let err = coordinator
        .send_to_courier("O4", "steadfast")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "provider_rejected");

    let after = store.get("O4").await.unwrap();
    assert_eq!(after.version, before.version);
    assert_eq!(after.order.status, OrderStatus::Pending);
    assert!(after.order.tracking_id.is_none());
    assert!(after.order.courier_provider.is_none());
    assert!(after.order.courier_meta.is_none());
}

#[tokio::test]
async fn transport_failures_retry_until_success() {
    let (_store, adapter, coordinator) = fixture(sample_order("O5")).await;
    adapter.push(Err(CourierError::Transport("connect timeout".into())));
    adapter.push(Err(CourierError::Transport("connect timeout".into())));

    let receipt = coordinator.send_to_courier("O5", "steadfast").await.unwrap();
    assert_eq!(receipt.attempts, 3);
    assert_eq!(adapter.calls(), 3);
}

#[tokio::test]
async fn transport_failures_exhaust_the_attempt_budget() {
    let (_store, adapter, coordinator) = fixture(sample_order("O6")).await;
    for _ in 0..3 {
        adapter.push(Err(CourierError::Transport("503".into())));
    }

    let err = coordinator
        .send_to_courier("O6", "steadfast")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "provider_transport_error");
    assert_eq!(adapter.calls(), 3);
}

#[tokio::test]
async fn business_rejections_are_never_retried() {
    let (_store, adapter, coordinator) = fixture(sample_order("O7")).await;
    adapter.push(Err(CourierError::Rejected("malformed address".into())));
    // A success sits behind it; it must not be reached.
    adapter.push(Ok("TRK-GHOST".to_string()));

    let err = coordinator
        .send_to_courier("O7", "steadfast")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "provider_rejected");
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn provider_switch_overwrites_courier_fields_as_one_unit() {
    let store = Arc::new(MemoryOrderStore::new());
    store.insert(sample_order("O8")).await.unwrap();

    let steadfast = MockAdapter::new("steadfast");
    let pathao = MockAdapter::new("pathao");
    let registry = Arc::new(CourierRegistry::new());
    registry.register(steadfast.clone());
    registry.register(pathao.clone());
    let coordinator = DispatchCoordinator::new(store.clone(), registry, Some(fast_config()));

    let first = coordinator.send_to_courier("O8", "steadfast").await.unwrap();
    // Steadfast refused the parcel at the hub; staff retry with Pathao.
    let second = coordinator.send_to_courier("O8", "pathao").await.unwrap();
    assert_ne!(first.tracking_id, second.tracking_id);

    let persisted = store.get("O8").await.unwrap();
    assert_eq!(persisted.version, 3);
    assert_eq!(persisted.order.courier_provider.as_deref(), Some("pathao"));
    assert_eq!(
        persisted.order.tracking_id.as_deref(),
        Some(second.tracking_id.as_str())
    );
    assert!(matches!(
        persisted.order.courier_meta,
        Some(CourierMeta::Pathao { .. })
    ));
}

#[tokio::test]
async fn concurrent_edit_fails_with_stale_order_state() {
    let store = Arc::new(VersionSkewStore::new());
    store.insert(sample_order("O9")).await.unwrap();

    let adapter = MockAdapter::new("steadfast");
    let registry = Arc::new(CourierRegistry::new());
    registry.register(adapter.clone());
    let coordinator =
        DispatchCoordinator::new(store.clone(), registry, Some(fast_config()));

    // Another session cancels the order between our read and our commit.
    store.arm();
    let err = coordinator
        .send_to_courier("O9", "steadfast")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "stale_order_state");

    // The concurrent writer wins; the failed dispatch wrote nothing.
    let persisted = store.get("O9").await.unwrap();
    assert_eq!(persisted.version, 2);
    assert_eq!(persisted.order.status, OrderStatus::Cancelled);
    assert!(persisted.order.tracking_id.is_none());

    // The provider call did happen; reconciliation is the operator's move,
    // which is exactly why the error demands a re-fetch.
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn dispatching_a_terminal_order_is_an_invalid_transition() {
    let mut order = sample_order("O10");
    order.status = OrderStatus::Delivered;
    let (_store, adapter, coordinator) = fixture(order).await;

    let err = coordinator
        .send_to_courier("O10", "steadfast")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn manual_status_change_cannot_enter_sent_to_courier() {
    let (_store, _adapter, coordinator) = fixture(sample_order("O11")).await;

    let err = coordinator
        .change_status("O11", OrderStatus::SentToCourier)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");
}

#[tokio::test]
async fn manual_status_change_commits_through_the_version_check() {
    let (store, _adapter, coordinator) = fixture(sample_order("O12")).await;

    let committed = coordinator
        .change_status("O12", OrderStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(committed.version, 2);
    assert_eq!(committed.order.status, OrderStatus::Confirmed);

    let persisted = store.get("O12").await.unwrap();
    assert_eq!(persisted.order.status, OrderStatus::Confirmed);
}
