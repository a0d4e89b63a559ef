//! Store Backend: the self-hosted payment processor that owns stores and wallets

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use http::HttpStoreBackend;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("request to store backend failed: {0}")]
    Transport(String),
    #[error("store backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unreadable store backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// The backend answered and refused; nothing was created on its side.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Status { .. })
    }
}

/// End-user processor credentials, forwarded as HTTP Basic auth
#[derive(Clone)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewBackendUser {
    pub email: String,
    pub password: String,
    pub is_administrator: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoreRequest {
    pub name: String,
    pub website: String,
    pub network_fee_mode: String,
}

impl CreateStoreRequest {
    /// Store named after the local creation time, e.g. `Hot_Store-2024-05-01-13-45-09`
    pub fn hot_store(website: &str) -> Self {
        Self {
            name: chrono::Local::now()
                .format("Hot_Store-%Y-%m-%d-%H-%M-%S")
                .to_string(),
            website: website.to_string(),
            network_fee_mode: "MultiplePaymentsOnly".to_string(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateWalletRequest {
    pub existing_mnemonic: Option<String>,
    pub passphrase: String,
    pub account_number: u32,
    pub save_private_keys: bool,
    #[serde(rename = "importKeysToRPC")]
    pub import_keys_to_rpc: bool,
    pub word_list: String,
    pub word_count: u32,
    pub script_pub_key_type: String,
}

impl GenerateWalletRequest {
    /// Hot wallet parameters shared by every currency
    pub fn hot_wallet(mnemonic: Option<String>) -> Self {
        Self {
            existing_mnemonic: mnemonic,
            passphrase: String::new(),
            account_number: 0,
            save_private_keys: false,
            import_keys_to_rpc: false,
            word_list: "English".to_string(),
            word_count: 12,
            script_pub_key_type: "Segwit".to_string(),
        }
    }
}

/// Payment methods provisioned on every new store
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletKind {
    #[serde(rename = "BTC")]
    Btc,
    #[serde(rename = "LBTC")]
    Lbtc,
    #[serde(rename = "USDT")]
    Usdt,
    #[serde(rename = "LCAD")]
    Lcad,
}

impl WalletKind {
    pub const ALL: [WalletKind; 4] = [Self::Btc, Self::Lbtc, Self::Usdt, Self::Lcad];

    /// Payment method code in Store Backend URLs
    pub fn code(&self) -> &'static str {
        match self {
            Self::Btc => "BTC",
            Self::Lbtc => "LBTC",
            Self::Usdt => "USDT",
            Self::Lcad => "LCAD",
        }
    }

    /// Name used in success/failure reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Btc => "BTC wallet",
            Self::Lbtc => "LBTC wallet",
            Self::Usdt => "USDT wallet",
            Self::Lcad => "LCAD wallet",
        }
    }

    /// Key of the wallet response in the action payload
    pub fn data_key(&self) -> &'static str {
        match self {
            Self::Btc => "btcWallet",
            Self::Lbtc => "lbtcWallet",
            Self::Usdt => "usdtWallet",
            Self::Lcad => "lcadWallet",
        }
    }
}

/// Operations the storefront needs from the Store Backend
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Register a processor account for a newly signed-up user
    async fn create_user(&self, user: &NewBackendUser) -> Result<serde_json::Value, BackendError>;

    async fn create_store(
        &self,
        creds: &BasicCredentials,
        request: &CreateStoreRequest,
    ) -> Result<serde_json::Value, BackendError>;

    async fn generate_wallet(
        &self,
        creds: &BasicCredentials,
        store_id: &str,
        kind: WalletKind,
        request: &GenerateWalletRequest,
    ) -> Result<serde_json::Value, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_request_wire_format() {
        let req = GenerateWalletRequest::hot_wallet(None);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["existingMnemonic"], serde_json::Value::Null);
        assert_eq!(v["importKeysToRPC"], false);
        assert_eq!(v["scriptPubKeyType"], "Segwit");
        assert_eq!(v["wordCount"], 12);
        assert_eq!(v["accountNumber"], 0);
    }

    #[test]
    fn test_store_request_wire_format() {
        let req = CreateStoreRequest::hot_store("https://pay.example.com");
        assert!(req.name.starts_with("Hot_Store-"));
        assert_eq!(req.name.len(), "Hot_Store-2024-01-01-00-00-00".len());

        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["networkFeeMode"], "MultiplePaymentsOnly");
        assert_eq!(v["website"], "https://pay.example.com");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = BasicCredentials {
            username: "a@x.io".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
