use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use std::env;
use std::time::{Duration, Instant};

use crate::config::CourierConfig;
use crate::courier::adapter::{
    require_dispatch_fields, CourierAdapter, CourierDispatchResult, CourierError,
};
use crate::model::{CourierMeta, FraudVerdict, Order};
use crate::rate_limiter::TokenBucket;

pub const PROVIDER_ID: &str = "pathao";

const DEFAULT_BASE_URL: &str = "https://api-hermes.pathao.com";
const REQUEST_TIMEOUT_SECS: u64 = 15;
// Re-issue slightly before the provider-side expiry.
const TOKEN_EXPIRY_SLACK_SECS: u64 = 60;

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Pathao merchant adapter. OAuth2 password grant with a cached bearer
/// token, re-issued on expiry.
pub struct PathaoAdapter {
    client_id: String,
    client_secret: String,
    username: String,
    password: String,
    store_id: String,
    base_url: String,
    client: Client,
    http_limiter: TokenBucket,
    token: Mutex<Option<CachedToken>>,
}

impl PathaoAdapter {
    pub fn new(config: Option<&CourierConfig>) -> Result<Self, CourierError> {
        let client_id = config
            .and_then(|c| c.get_api_key())
            .or_else(|| env::var("PATHAO_CLIENT_ID").ok())
            .ok_or_else(|| {
                CourierError::Auth("PATHAO_CLIENT_ID not set (check config or env)".to_string())
            })?;

        let client_secret = config
            .and_then(|c| c.get_secret_key())
            .or_else(|| env::var("PATHAO_CLIENT_SECRET").ok())
            .ok_or_else(|| {
                CourierError::Auth(
                    "PATHAO_CLIENT_SECRET not set (check config or env)".to_string(),
                )
            })?;

        let username = config
            .and_then(|c| c.username.clone())
            .or_else(|| env::var("PATHAO_USERNAME").ok())
            .ok_or_else(|| {
                CourierError::Auth("PATHAO_USERNAME not set (check config or env)".to_string())
            })?;

        let password = config
            .and_then(|c| c.password.clone())
            .or_else(|| env::var("PATHAO_PASSWORD").ok())
            .ok_or_else(|| {
                CourierError::Auth("PATHAO_PASSWORD not set (check config or env)".to_string())
            })?;

        let store_id = config
            .and_then(|c| c.store_id.clone())
            .or_else(|| env::var("PATHAO_STORE_ID").ok())
            .ok_or_else(|| {
                CourierError::Auth("PATHAO_STORE_ID not set (check config or env)".to_string())
            })?;

        let base_url = config
            .and_then(|c| c.base_url.clone())
            .or_else(|| env::var("PATHAO_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let rate_limit = config.and_then(|c| c.rate_limit).unwrap_or(10) as f64;
        let http_limiter = TokenBucket::new(20, rate_limit);

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CourierError::Transport(e.to_string()))?;

        Ok(PathaoAdapter {
            client_id,
            client_secret,
            username,
            password,
            store_id,
            base_url,
            client,
            http_limiter,
            token: Mutex::new(None),
        })
    }

    /// Cached bearer token, re-issued through the password grant when the
    /// cache is cold or past expiry.
    async fn bearer_token(&self) -> Result<String, CourierError> {
        {
            let guard = self.token.lock();
            if let Some(cached) = guard.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        self.http_limiter.acquire(1).await;

        let url = format!("{}/aladdin/api/v1/issue-token", self.base_url);
        let payload = serde_json::json!({
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "username": self.username,
            "password": self.password,
            "grant_type": "password",
        });

        let resp = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CourierError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| CourierError::Transport(e.to_string()))?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CourierError::Auth(format!(
                "Pathao token issue refused: {}",
                text
            )));
        }
        if !status.is_success() {
            return Err(CourierError::Transport(format!(
                "Pathao token issue failed {}: {}",
                status, text
            )));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| CourierError::Auth(format!("Unexpected token response: {}", e)))?;

        let access_token = json["access_token"]
            .as_str()
            .ok_or_else(|| CourierError::Auth("token response carried no access_token".into()))?
            .to_string();
        let expires_in = json["expires_in"].as_u64().unwrap_or(3600);
        let lifetime = expires_in.saturating_sub(TOKEN_EXPIRY_SLACK_SECS).max(1);

        let mut guard = self.token.lock();
        *guard = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });

        Ok(access_token)
    }

    fn classify_status(status: StatusCode, body: &str) -> CourierError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return CourierError::Auth(format!("Pathao auth failed: {}", body));
        }
        if status.is_server_error() {
            return CourierError::Transport(format!("Pathao {}: {}", status, body));
        }
        CourierError::Rejected(format!("Pathao {}: {}", status, body))
    }

    fn success_rate_label(rate: f64) -> &'static str {
        if rate >= 0.8 {
            "safe"
        } else if rate >= 0.5 {
            "review"
        } else {
            "high risk"
        }
    }
}

#[async_trait]
impl CourierAdapter for PathaoAdapter {
    async fn dispatch(&self, order: &Order) -> Result<CourierDispatchResult, CourierError> {
        require_dispatch_fields(order)?;
        let token = self.bearer_token().await?;
        self.http_limiter.acquire(1).await;

        let payload = serde_json::json!({
            "store_id": self.store_id,
            "merchant_order_id": order.order_id,
            "recipient_name": order.customer_name,
            "recipient_phone": order.phone,
            "recipient_address": order.address,
            "recipient_city": order.division,
            "delivery_type": 48,
            "item_type": 2,
            "item_quantity": order.quantity,
            "item_description": order.product_name,
            "amount_to_collect": order.cod_amount(),
            "special_instruction": order.note,
        });

        let url = format!("{}/aladdin/api/v1/orders", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&token)
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

        // Success body that fails to parse is surfaced, not retried; the
        // consignment may already exist upstream.
        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| CourierError::Rejected(format!("Unexpected response: {}", e)))?;

        let data = &json["data"];
        let consignment_id = data["consignment_id"]
            .as_str()
            .ok_or_else(|| {
                CourierError::Rejected("response carried no consignment_id".to_string())
            })?
            .to_string();
        let order_status = data["order_status"].as_str().unwrap_or("Pending").to_string();
        let delivery_fee = data["delivery_fee"]
            .as_f64()
            .and_then(Decimal::from_f64_retain)
            .unwrap_or(Decimal::ZERO);

        Ok(CourierDispatchResult {
            tracking_id: consignment_id.clone(),
            meta: CourierMeta::Pathao {
                consignment_id,
                delivery_fee,
                order_status,
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
        let token = self.bearer_token().await?;
        self.http_limiter.acquire(1).await;

        let url = format!(
            "{}/aladdin/api/v1/courier/success-rate?phone={}",
            self.base_url,
            order.phone.trim()
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&token)
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

        let data = &json["data"];
        let rate = data["success_rate"].as_f64().unwrap_or(0.0);
        let delivered = data["successful_delivery"].as_u64().unwrap_or(0);
        let total = data["total_delivery"].as_u64().unwrap_or(0);

        Ok(FraudVerdict::new(
            PROVIDER_ID,
            Self::success_rate_label(rate).to_string(),
            Decimal::from_f64_retain(rate),
            Some(format!("{}/{} parcels delivered", delivered, total)),
        ))
    }

    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RiskLevel;

    #[test]
    fn success_rate_maps_to_labels() {
        assert_eq!(PathaoAdapter::success_rate_label(0.95), "safe");
        assert_eq!(PathaoAdapter::success_rate_label(0.8), "safe");
        assert_eq!(PathaoAdapter::success_rate_label(0.6), "review");
        assert_eq!(PathaoAdapter::success_rate_label(0.2), "high risk");
    }

    #[test]
    fn labels_bucket_into_verdict_levels() {
        assert_eq!(RiskLevel::from_label("safe"), RiskLevel::Low);
        assert_eq!(RiskLevel::from_label("review"), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_label("high risk"), RiskLevel::High);
    }

    #[test]
    fn auth_errors_are_not_retryable() {
        let err = PathaoAdapter::classify_status(StatusCode::UNAUTHORIZED, "expired");
        assert!(matches!(err, CourierError::Auth(_)));
        assert!(!err.is_retryable());
    }
}
