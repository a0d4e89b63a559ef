use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HotstoreConfig {
    pub server: ServerConfig,
    pub store_backend: StoreBackendConfig,
    pub billing: BillingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: String,
    pub log_level: String,
    /// Public origin used for redirects and invitation links
    pub base_url: String,
    /// HMAC secret for session cookies
    pub session_secret: String,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
}

fn default_session_ttl_hours() -> i64 {
    24
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreBackendConfig {
    pub api_url: String,
    /// API token allowed to create users on the Store Backend
    pub admin_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BillingConfig {
    #[serde(default = "default_billing_api_url")]
    pub api_url: String,
    pub secret_key: String,
    pub webhook_secret: String,
    #[serde(default = "default_trial_days")]
    pub trial_days: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_billing_api_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_trial_days() -> u32 {
    14
}

impl Default for HotstoreConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 3000,
                db_path: "./data/hotstore".to_string(),
                log_level: "info".to_string(),
                base_url: "http://localhost:3000".to_string(),
                session_secret: String::new(),
                session_ttl_hours: default_session_ttl_hours(),
            },
            store_backend: StoreBackendConfig {
                api_url: "http://localhost:23001".to_string(),
                admin_token: String::new(),
                timeout_secs: default_timeout_secs(),
            },
            billing: BillingConfig {
                api_url: default_billing_api_url(),
                secret_key: String::new(),
                webhook_secret: String::new(),
                trial_days: default_trial_days(),
                timeout_secs: default_timeout_secs(),
            },
        }
    }
}

impl HotstoreConfig {
    pub fn load_or_default(path: &str) -> Self {
        if std::path::Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => {
                        info!("Config loaded from {}", path);
                        c
                    }
                    Err(e) => {
                        warn!("Error parsing config: {}. Using defaults.", e);
                        Self::default()
                    }
                },
                Err(e) => {
                    warn!("Error reading config: {}. Using defaults.", e);
                    Self::default()
                }
            }
        } else {
            info!("Config file not found at '{}'. Using defaults.", path);
            Self::default()
        }
    }

    /// Write the default configuration to `path`.
    pub fn write_default(path: &str) -> Result<(), crate::error::AppError> {
        let s = toml::to_string_pretty(&Self::default())
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        std::fs::write(path, s).map_err(|e| crate::error::AppError::Config(e.to_string()))
    }

    /// Secrets and deployment URLs come from the environment when set.
    pub fn apply_env(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(v) = lookup("BASE_URL") {
            self.server.base_url = v;
        }
        if let Some(v) = lookup("AUTH_SECRET") {
            self.server.session_secret = v;
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            self.server.db_path = v;
        }
        if let Some(v) = lookup("BTCPAY_API_URL") {
            self.store_backend.api_url = v;
        }
        if let Some(v) = lookup("BTCPAY_SERVER_CANMANAGEUSERS") {
            self.store_backend.admin_token = v;
        }
        if let Some(v) = lookup("STRIPE_SECRET_KEY") {
            self.billing.secret_key = v;
        }
        if let Some(v) = lookup("STRIPE_WEBHOOK_SECRET") {
            self.billing.webhook_secret = v;
        }
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.server.session_secret.len() < 32 {
            return Err(crate::error::AppError::Config(
                "session secret must be at least 32 characters (set AUTH_SECRET)".to_string(),
            ));
        }
        if self.server.session_ttl_hours <= 0 {
            return Err(crate::error::AppError::Config(
                "session_ttl_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
