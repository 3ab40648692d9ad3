/// Order Status State Machine
///
/// Single source of truth for which lifecycle moves are legal given an
/// order's current status.
///
/// ```text
///   Pending ── Confirmed ── OnHold ── Processing ── Shipped
///      │            (free staff movement between all of these)
///      │
///      └──[dispatch coordinator only]──> SentToCourier
///
///   Terminal: Delivered, Cancelled, Refund, ReturnedReceive
/// ```
///
/// Staff can move an order between non-terminal states freely — real orders
/// get manually corrected, put on hold, pulled back from the courier desk.
/// Two rules ARE enforced:
///   1. Terminal states have no outgoing transitions.
///   2. `SentToCourier` is only reachable through the dispatch coordinator's
///      successful-dispatch path, because that status must carry a
///      provider/tracking pair committed in the same write.
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::info;

use crate::model::{CourierMeta, Order};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    OnHold,
    Processing,
    Shipped,
    /// Handed to a courier provider. Coordinator-only entry.
    SentToCourier,
    /// Terminal
    Delivered,
    /// Terminal
    Cancelled,
    Return,
    /// Terminal
    Refund,
    /// Terminal
    ReturnedReceive,
}

impl OrderStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::Cancelled | Self::Refund | Self::ReturnedReceive
        )
    }

    /// Every status, in display order. Used by the admin shell to build the
    /// status dropdown.
    pub fn all() -> &'static [OrderStatus] {
        &[
            Self::Pending,
            Self::Confirmed,
            Self::OnHold,
            Self::Processing,
            Self::Shipped,
            Self::SentToCourier,
            Self::Delivered,
            Self::Cancelled,
            Self::Return,
            Self::Refund,
            Self::ReturnedReceive,
        ]
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid transition {from} -> {to}: {reason}")]
pub struct InvalidTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub reason: String,
}

/// Whether a manual staff transition to `target` is legal for this order.
///
/// Returns false only when the order sits in a terminal state, or when the
/// target is `SentToCourier` (that door belongs to the coordinator).
pub fn can_transition(order: &Order, target: OrderStatus) -> bool {
    if order.status.is_terminal() {
        return false;
    }
    if target == OrderStatus::SentToCourier {
        return false;
    }
    true
}

/// Pure transition: returns a new order snapshot with the target status.
/// The caller is responsible for committing the snapshot.
pub fn apply_transition(order: &Order, target: OrderStatus) -> Result<Order, InvalidTransition> {
    if order.status.is_terminal() {
        return Err(InvalidTransition {
            from: order.status,
            to: target,
            reason: format!("{} is a terminal status", order.status),
        });
    }
    if target == OrderStatus::SentToCourier {
        return Err(InvalidTransition {
            from: order.status,
            to: target,
            reason: "SentToCourier requires a successful courier dispatch".to_string(),
        });
    }

    info!(
        order_id = %order.order_id,
        from = %order.status,
        to = %target,
        "Status transition"
    );

    let mut next = order.clone();
    next.status = target;
    next.updated_at = Utc::now();
    Ok(next)
}

/// Coordinator-only entry into `SentToCourier`.
///
/// Writes the courier hand-off fields and the status flip as one snapshot so
/// a tracking id can never exist without its provider, or the other way
/// around. Crate-private on purpose: the public surface cannot reach this.
pub(crate) fn apply_courier_handoff(
    order: &Order,
    provider_id: &str,
    tracking_id: String,
    meta: CourierMeta,
) -> Result<Order, InvalidTransition> {
    if order.status.is_terminal() {
        return Err(InvalidTransition {
            from: order.status,
            to: OrderStatus::SentToCourier,
            reason: format!("{} is a terminal status", order.status),
        });
    }

    info!(
        order_id = %order.order_id,
        from = %order.status,
        provider = provider_id,
        tracking_id = %tracking_id,
        "Courier hand-off"
    );

    let mut next = order.clone();
    next.courier_provider = Some(provider_id.to_string());
    next.tracking_id = Some(tracking_id);
    next.courier_meta = Some(meta);
    next.status = OrderStatus::SentToCourier;
    next.updated_at = Utc::now();
    Ok(next)
}
