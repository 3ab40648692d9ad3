use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub service: Option<ServiceConfig>,
    pub couriers: Option<Couriers>,
    pub dispatch: Option<DispatchConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServiceConfig {
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DispatchConfig {
    #[serde(alias = "maxAttempts")]
    pub max_attempts: Option<u32>,
    #[serde(alias = "retryBackoffMs")]
    pub retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Couriers {
    pub steadfast: Option<CourierConfig>,
    pub pathao: Option<CourierConfig>,
    #[serde(flatten)]
    pub others: HashMap<String, CourierConfig>,
}

/// Per-provider credentials and tuning. Key names come from whichever
/// console the merchant copied them from, so the JSON aliases are wide:
/// Steadfast hands out api/secret keys, Pathao hands out a client id/secret
/// pair plus merchant login.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CourierConfig {
    #[serde(alias = "apiKey", alias = "clientId", alias = "client_id")]
    pub api_key: Option<String>,

    #[serde(
        alias = "apiSecret",
        alias = "secretKey",
        alias = "clientSecret",
        alias = "client_secret"
    )]
    pub secret_key: Option<String>,

    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(alias = "storeId")]
    pub store_id: Option<String>,

    #[serde(alias = "baseUrl")]
    pub base_url: Option<String>,

    #[serde(default)]
    pub enabled: bool,

    #[serde(alias = "rateLimit")]
    pub rate_limit: Option<u32>,
}

impl CourierConfig {
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key.clone().filter(|k| !k.trim().is_empty())
    }

    pub fn get_secret_key(&self) -> Option<String> {
        self.secret_key.clone().filter(|k| !k.trim().is_empty())
    }

    pub fn has_credentials(&self) -> bool {
        self.get_api_key().is_some() && self.get_secret_key().is_some()
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let home = env::var("HOME").unwrap_or_else(|_| ".".into());

        let s = Config::builder()
            // 1. Global config from ~/.bazar/config.json
            .add_source(File::with_name(&format!("{}/.bazar/config", home)).required(false))
            // 2. Project config from config/config.json
            .add_source(File::with_name("config/config").required(false))
            // 3. Local config from config/local.json (not checked in)
            .add_source(File::with_name("config/local").required(false))
            // 4. Environment overrides,
            //    e.g. BAZAR_COURIERS__STEADFAST__API_KEY
            .add_source(Environment::with_prefix("BAZAR").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_aliases_deserialize() {
        let json = r#"{
            "apiKey": "key-1",
            "apiSecret": "secret-1",
            "storeId": "st-9",
            "enabled": true,
            "rateLimit": 5
        }"#;

        let config: CourierConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.get_api_key().unwrap(), "key-1");
        assert_eq!(config.get_secret_key().unwrap(), "secret-1");
        assert_eq!(config.store_id.as_deref(), Some("st-9"));
        assert_eq!(config.rate_limit, Some(5));
        assert!(config.enabled);
    }

    #[test]
    fn pathao_style_client_credentials_also_map() {
        let json = r#"{
            "clientId": "cid-1",
            "clientSecret": "cs-1",
            "username": "shop@example.com",
            "password": "pw"
        }"#;

        let config: CourierConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.get_api_key().unwrap(), "cid-1");
        assert_eq!(config.get_secret_key().unwrap(), "cs-1");
        assert!(config.has_credentials());
    }

    #[test]
    fn blank_credentials_do_not_count() {
        let config = CourierConfig {
            api_key: Some("  ".to_string()),
            secret_key: Some("s".to_string()),
            ..Default::default()
        };
        assert!(!config.has_credentials());
    }
}
