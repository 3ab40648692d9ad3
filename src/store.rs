use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::model::Order;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Order not found: {0}")]
    NotFound(String),
    #[error("Order {order_id} changed elsewhere (expected version {expected}, found {found})")]
    StaleOrderState {
        order_id: String,
        expected: u64,
        found: u64,
    },
    #[error("Order already exists: {0}")]
    Duplicate(String),
}

/// An order snapshot together with the version it was read at. Commits carry
/// the version back so concurrent edits are detected, never overwritten.
#[derive(Debug, Clone)]
pub struct VersionedOrder {
    pub order: Order,
    pub version: u64,
}

/// Persistence collaborator for order records.
///
/// The coordinator's contract is void without `commit`'s compare-and-swap
/// semantics: the write must land only if the persisted version still equals
/// `expected_version`. A database-backed implementation is a drop-in.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, order_id: &str) -> Result<VersionedOrder, StoreError>;

    async fn insert(&self, order: Order) -> Result<VersionedOrder, StoreError>;

    /// Compare-and-swap commit of a full order snapshot.
    async fn commit(&self, order: Order, expected_version: u64)
        -> Result<VersionedOrder, StoreError>;
}

/// In-memory order store. Backs the service in development and the test
/// suite; version numbers start at 1 and bump on every commit.
pub struct MemoryOrderStore {
    orders: DashMap<String, VersionedOrder>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

impl Default for MemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn get(&self, order_id: &str) -> Result<VersionedOrder, StoreError> {
        self.orders
            .get(order_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))
    }

    async fn insert(&self, order: Order) -> Result<VersionedOrder, StoreError> {
        let order_id = order.order_id.clone();
        if self.orders.contains_key(&order_id) {
            return Err(StoreError::Duplicate(order_id));
        }
        let versioned = VersionedOrder { order, version: 1 };
        self.orders.insert(order_id, versioned.clone());
        Ok(versioned)
    }

    async fn commit(
        &self,
        order: Order,
        expected_version: u64,
    ) -> Result<VersionedOrder, StoreError> {
        let order_id = order.order_id.clone();
        match self.orders.get_mut(&order_id) {
            None => Err(StoreError::NotFound(order_id)),
            Some(mut entry) => {
                if entry.version != expected_version {
                    return Err(StoreError::StaleOrderState {
                        order_id,
                        expected: expected_version,
                        found: entry.version,
                    });
                }
                let committed = VersionedOrder {
                    order,
                    version: expected_version + 1,
                };
                *entry = committed.clone();
                Ok(committed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::OrderStatus;
    use rust_decimal_macros::dec;

    fn sample_order(id: &str) -> Order {
        Order::new(
            id.to_string(),
            "Nusrat".to_string(),
            "01611111111".to_string(),
            "Uttara Sector 4".to_string(),
            "P-9".to_string(),
            "Kurti".to_string(),
            1,
            dec!(1250),
        )
    }

    #[tokio::test]
    async fn insert_then_get_round_trips_at_version_one() {
        let store = MemoryOrderStore::new();
        store.insert(sample_order("O-1")).await.unwrap();

        let fetched = store.get("O-1").await.unwrap();
        assert_eq!(fetched.version, 1);
        assert_eq!(fetched.order.order_id, "O-1");
    }

    #[tokio::test]
    async fn duplicate_insert_is_refused() {
        let store = MemoryOrderStore::new();
        store.insert(sample_order("O-1")).await.unwrap();
        assert!(matches!(
            store.insert(sample_order("O-1")).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn commit_bumps_version() {
        let store = MemoryOrderStore::new();
        store.insert(sample_order("O-1")).await.unwrap();

        let mut order = store.get("O-1").await.unwrap().order;
        order.status = OrderStatus::Confirmed;
        let committed = store.commit(order, 1).await.unwrap();
        assert_eq!(committed.version, 2);
        assert_eq!(committed.order.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn stale_commit_is_rejected_and_leaves_record_untouched() {
        let store = MemoryOrderStore::new();
        store.insert(sample_order("O-1")).await.unwrap();

        // Writer A reads at v1, writer B commits first.
        let read_a = store.get("O-1").await.unwrap();
        let mut order_b = read_a.order.clone();
        order_b.status = OrderStatus::Cancelled;
        store.commit(order_b, 1).await.unwrap();

        let mut order_a = read_a.order;
        order_a.status = OrderStatus::Confirmed;
        let err = store.commit(order_a, read_a.version).await.unwrap_err();
        assert!(matches!(err, StoreError::StaleOrderState { found: 2, .. }));

        // Writer B's commit survives.
        let current = store.get("O-1").await.unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn commit_of_unknown_order_is_not_found() {
        let store = MemoryOrderStore::new();
        assert!(matches!(
            store.commit(sample_order("ghost"), 1).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
