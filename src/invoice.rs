use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::model::Order;

/// Printable invoice for an order. A pure read of order plus courier
/// metadata; emitting one never feeds back into the dispatch core.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDocument {
    pub invoice_no: String,
    pub order_id: String,
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    pub product_name: String,
    pub quantity: u32,
    pub amount: Decimal,
    pub delivery_charge: Decimal,
    pub total: Decimal,
    pub courier: Option<CourierBlock>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourierBlock {
    pub provider: String,
    pub tracking_id: String,
}

impl InvoiceDocument {
    pub fn from_order(order: &Order) -> Self {
        let courier = match (&order.courier_provider, &order.tracking_id) {
            (Some(provider), Some(tracking_id)) => Some(CourierBlock {
                provider: provider.clone(),
                tracking_id: tracking_id.clone(),
            }),
            _ => None,
        };

        Self {
            invoice_no: format!("INV-{}", order.order_id.to_uppercase()),
            order_id: order.order_id.clone(),
            customer_name: order.customer_name.clone(),
            phone: order.phone.clone(),
            address: order.address.clone(),
            product_name: order.product_name.clone(),
            quantity: order.quantity,
            amount: order.amount,
            delivery_charge: order.delivery_charge,
            total: order.cod_amount(),
            courier,
            issued_at: Utc::now(),
        }
    }

    /// Plain-text rendering for the admin print view.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Invoice {}\n", self.invoice_no));
        out.push_str(&format!("Order   {}\n\n", self.order_id));
        out.push_str(&format!("Bill to: {}\n", self.customer_name));
        out.push_str(&format!("Phone:   {}\n", self.phone));
        out.push_str(&format!("Address: {}\n\n", self.address));
        out.push_str(&format!(
            "{} x{}  {}\n",
            self.product_name, self.quantity, self.amount
        ));
        out.push_str(&format!("Delivery charge  {}\n", self.delivery_charge));
        out.push_str(&format!("Total (COD)      {}\n", self.total));
        if let Some(courier) = &self.courier {
            out.push_str(&format!(
                "\nCourier: {} / {}\n",
                courier.provider, courier.tracking_id
            ));
        }
        out
    }
}
