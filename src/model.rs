use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::state_machine::OrderStatus;

/// Provider-specific consignment metadata returned at dispatch time.
///
/// Tagged by provider so each adapter owns its own payload shape instead of
/// dumping into a free-form map. Adding a courier means adding an arm here
/// and an adapter implementation, nothing else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum CourierMeta {
    Steadfast {
        consignment_id: i64,
        tracking_code: String,
        consignment_status: String,
    },
    Pathao {
        consignment_id: String,
        delivery_fee: Decimal,
        order_status: String,
    },
}

impl CourierMeta {
    pub fn provider_id(&self) -> &'static str {
        match self {
            CourierMeta::Steadfast { .. } => "steadfast",
            CourierMeta::Pathao { .. } => "pathao",
        }
    }
}

/// The server-persisted order record. One writer per order, enforced by the
/// dispatch coordinator together with the store's version check.
///
/// Invariant: `tracking_id` is present iff `courier_provider` is present and
/// a dispatch to that provider succeeded at least once. Both are written in
/// the same commit, never separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    pub address: String,
    #[serde(default)]
    pub division: Option<String>,
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub amount: Decimal,
    #[serde(default)]
    pub delivery_charge: Decimal,
    pub status: OrderStatus,
    #[serde(default)]
    pub courier_provider: Option<String>,
    #[serde(default)]
    pub tracking_id: Option<String>,
    #[serde(default)]
    pub courier_meta: Option<CourierMeta>,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Fresh order as the storefront hands it over. Status starts at Pending;
    /// courier fields stay unset until the coordinator commits a dispatch.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: String,
        customer_name: String,
        phone: String,
        address: String,
        product_id: String,
        product_name: String,
        quantity: u32,
        amount: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            customer_name,
            phone,
            email: None,
            address,
            division: None,
            product_id,
            product_name,
            quantity,
            amount,
            delivery_charge: Decimal::ZERO,
            status: OrderStatus::Pending,
            courier_provider: None,
            tracking_id: None,
            courier_meta: None,
            note: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Amount the courier collects on delivery.
    pub fn cod_amount(&self) -> Decimal {
        self.amount + self.delivery_charge
    }

    pub fn is_dispatched_to(&self, provider_id: &str) -> bool {
        self.tracking_id.is_some() && self.courier_provider.as_deref() == Some(provider_id)
    }
}

/// Bucketed risk classification. Provider vocabularies are not stable, so
/// anything unrecognized lands in High rather than silently passing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Keyword bucketing of a provider's free-text risk label.
    /// `pass|safe|low` -> Low, `review|medium|warn` -> Medium, else High.
    pub fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        if ["pass", "safe", "low"].iter().any(|kw| label.contains(*kw)) {
            return RiskLevel::Low;
        }
        if ["review", "medium", "warn"]
            .iter()
            .any(|kw| label.contains(*kw))
        {
            return RiskLevel::Medium;
        }
        RiskLevel::High
    }
}

/// Advisory risk verdict for one dispatch attempt. Held by the caller for
/// the duration of the edit session and discarded; never persisted and never
/// consumed by the state machine or the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudVerdict {
    pub provider: String,
    pub risk_label: String,
    pub level: RiskLevel,
    #[serde(default)]
    pub risk_score: Option<Decimal>,
    #[serde(default)]
    pub remarks: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl FraudVerdict {
    pub fn new(
        provider: &str,
        risk_label: String,
        risk_score: Option<Decimal>,
        remarks: Option<String>,
    ) -> Self {
        let level = RiskLevel::from_label(&risk_label);
        Self {
            provider: provider.to_string(),
            risk_label,
            level,
            risk_score,
            remarks,
            checked_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_order() -> Order {
        let mut order = Order::new(
            "O1".to_string(),
            "Rahim Uddin".to_string(),
            "01712345678".to_string(),
            "House 12, Road 5, Dhanmondi".to_string(),
            "P-100".to_string(),
            "Cotton Panjabi".to_string(),
            2,
            dec!(1800),
        );
        order.delivery_charge = dec!(120);
        order
    }

    #[test]
    fn cod_amount_includes_delivery_charge() {
        let order = sample_order();
        assert_eq!(order.cod_amount(), dec!(1920));
    }

    #[test]
    fn fresh_order_has_no_courier_fields() {
        let order = sample_order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.courier_provider.is_none());
        assert!(order.tracking_id.is_none());
        assert!(order.courier_meta.is_none());
        assert!(!order.is_dispatched_to("steadfast"));
    }

    #[test]
    fn courier_meta_serializes_with_provider_tag() {
        let meta = CourierMeta::Steadfast {
            consignment_id: 991,
            tracking_code: "TRK991".to_string(),
            consignment_status: "in_review".to_string(),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["provider"], "steadfast");
        assert_eq!(json["consignment_id"], 991);
    }

    #[test]
    fn verdict_buckets_from_label() {
        let verdict = FraudVerdict::new("steadfast", "PASS".to_string(), None, None);
        assert_eq!(verdict.level, RiskLevel::Low);

        let verdict = FraudVerdict::new("pathao", "needs review".to_string(), None, None);
        assert_eq!(verdict.level, RiskLevel::Medium);

        let verdict = FraudVerdict::new("pathao", "???".to_string(), None, None);
        assert_eq!(verdict.level, RiskLevel::High);
    }
}
