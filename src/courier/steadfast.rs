use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use std::env;
use std::time::Duration;

use crate::config::CourierConfig;
use crate::courier::adapter::{
    require_dispatch_fields, CourierAdapter, CourierDispatchResult, CourierError,
};
use crate::model::{CourierMeta, FraudVerdict, Order};
use crate::rate_limiter::TokenBucket;

pub const PROVIDER_ID: &str = "steadfast";

const DEFAULT_BASE_URL: &str = "https://portal.packzy.com/api/v1";
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Steadfast courier adapter. Static API-key auth, JSON REST.
pub struct SteadfastAdapter {
    api_key: String,
    secret_key: String,
    base_url: String,
    client: Client,
    http_limiter: TokenBucket,
}

impl SteadfastAdapter {
    pub fn new(config: Option<&CourierConfig>) -> Result<Self, CourierError> {
        let api_key = config
            .and_then(|c| c.get_api_key())
            .or_else(|| env::var("STEADFAST_API_KEY").ok())
            .ok_or_else(|| {
                CourierError::Auth(
                    "STEADFAST_API_KEY not set (check config or env)".to_string(),
                )
            })?;

        let secret_key = config
            .and_then(|c| c.get_secret_key())
            .or_else(|| env::var("STEADFAST_SECRET_KEY").ok())
            .ok_or_else(|| {
                CourierError::Auth(
                    "STEADFAST_SECRET_KEY not set (check config or env)".to_string(),
                )
            })?;

        let base_url = config
            .and_then(|c| c.base_url.clone())
            .or_else(|| env::var("STEADFAST_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        // Merchant API allows ~10 req/sec; keep a small burst headroom.
        let rate_limit = config.and_then(|c| c.rate_limit).unwrap_or(10) as f64;
        let http_limiter = TokenBucket::new(20, rate_limit);

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CourierError::Transport(e.to_string()))?;

        Ok(SteadfastAdapter {
            api_key,
            secret_key,
            base_url,
            client,
            http_limiter,
        })
    }

    fn recipient_address(order: &Order) -> String {
        match &order.division {
            Some(division) => format!("{}, {}", order.address, division),
            None => order.address.clone(),
        }
    }

    fn classify_status(status: StatusCode, body: &str) -> CourierError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return CourierError::Auth(format!("Steadfast auth failed: {}", body));
        }
        if status.is_server_error() {
            return CourierError::Transport(format!("Steadfast {}: {}", status, body));
        }
        CourierError::Rejected(format!("Steadfast {}: {}", status, body))
    }
}

#[async_trait]
impl CourierAdapter for SteadfastAdapter {
    async fn dispatch(&self, order: &Order) -> Result<CourierDispatchResult, CourierError> {
        require_dispatch_fields(order)?;
        self.http_limiter.acquire(1).await;

        let payload = serde_json::json!({
            "invoice": order.order_id,
            "recipient_name": order.customer_name,
            "recipient_phone": order.phone,
            "recipient_address": Self::recipient_address(order),
            "cod_amount": order.cod_amount(),
            "note": order.note,
        });

        let url = format!("{}/create_order", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("Secret-Key", &self.secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CourierError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| CourierError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(Self::classify_status(status, &text));
        }

        // A malformed success body is NOT retried: the consignment may
        // already exist upstream, and re-sending would duplicate it.
        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| CourierError::Rejected(format!("Unexpected response: {}", e)))?;

        if json["status"].as_i64() != Some(200) {
            let message = json["message"].as_str().unwrap_or("consignment refused");
            return Err(CourierError::Rejected(message.to_string()));
        }

        let consignment = &json["consignment"];
        let tracking_code = consignment["tracking_code"]
            .as_str()
            .ok_or_else(|| {
                CourierError::Rejected("response carried no tracking_code".to_string())
            })?
            .to_string();
        let consignment_id = consignment["consignment_id"].as_i64().unwrap_or_default();
        let consignment_status = consignment["status"]
            .as_str()
            .unwrap_or("in_review")
            .to_string();

        Ok(CourierDispatchResult {
            tracking_id: tracking_code.clone(),
            meta: CourierMeta::Steadfast {
                consignment_id,
                tracking_code,
                consignment_status,
            },
            raw: json,
        })
    }

    async fn check_fraud_risk(&self, order: &Order) -> Result<FraudVerdict, CourierError> {
        if order.phone.trim().is_empty() {
            return Err(CourierError::Validation(
                "recipient phone number is required".to_string(),
            ));
        }
        self.http_limiter.acquire(1).await;

        let url = format!("{}/fraud_check/{}", self.base_url, order.phone.trim());
        let resp = self
            .client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .header("Secret-Key", &self.secret_key)
            .send()
            .await
            .map_err(|e| CourierError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| CourierError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(Self::classify_status(status, &text));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| CourierError::Rejected(format!("Unexpected response: {}", e)))?;

        let fraud = &json["fraud"];
        let risk_label = fraud["risk_label"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();
        let risk_score = fraud["risk_score"]
            .as_f64()
            .and_then(Decimal::from_f64_retain);
        let remarks = fraud["remarks"].as_str().map(str::to_string);

        Ok(FraudVerdict::new(
            PROVIDER_ID,
            risk_label,
            risk_score,
            remarks,
        ))
    }

    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn division_is_appended_to_address() {
        let mut order = Order::new(
            "O-5".to_string(),
            "Salma".to_string(),
            "01911111111".to_string(),
            "College Road 3".to_string(),
            "P-2".to_string(),
            "Shawl".to_string(),
            1,
            dec!(450),
        );
        assert_eq!(SteadfastAdapter::recipient_address(&order), "College Road 3");

        order.division = Some("Chattogram".to_string());
        assert_eq!(
            SteadfastAdapter::recipient_address(&order),
            "College Road 3, Chattogram"
        );
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            SteadfastAdapter::classify_status(StatusCode::UNAUTHORIZED, "bad key"),
            CourierError::Auth(_)
        ));
        assert!(matches!(
            SteadfastAdapter::classify_status(StatusCode::BAD_GATEWAY, "upstream"),
            CourierError::Transport(_)
        ));
        assert!(matches!(
            SteadfastAdapter::classify_status(StatusCode::UNPROCESSABLE_ENTITY, "bad address"),
            CourierError::Rejected(_)
        ));
    }
}
