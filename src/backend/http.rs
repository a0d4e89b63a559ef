// HTTP client for the Store Backend REST API (BTCPay Greenfield compatible)
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    BackendError, BasicCredentials, CreateStoreRequest, GenerateWalletRequest, NewBackendUser,
    StoreBackend, WalletKind,
};

pub struct HttpStoreBackend {
    base_url: String,
    admin_token: String,
    client: Client,
}

impl HttpStoreBackend {
    pub fn new(base_url: &str, admin_token: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            admin_token: admin_token.to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // Helper for sending requests
    async fn send(&self, request: RequestBuilder) -> Result<serde_json::Value, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Store backend returned {}: {}", status, body);
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl StoreBackend for HttpStoreBackend {
    async fn create_user(&self, user: &NewBackendUser) -> Result<serde_json::Value, BackendError> {
        debug!("Creating store backend user {}", user.email);
        let request = self
            .client
            .post(self.url("/api/v1/users"))
            .header("Authorization", format!("token {}", self.admin_token))
            .json(user);
        self.send(request).await
    }

    async fn create_store(
        &self,
        creds: &BasicCredentials,
        request: &CreateStoreRequest,
    ) -> Result<serde_json::Value, BackendError> {
        debug!("Creating store {} for {}", request.name, creds.username);
        let request = self
            .client
            .post(self.url("/api/v1/stores"))
            .basic_auth(&creds.username, Some(&creds.password))
            .json(request);
        self.send(request).await
    }

    async fn generate_wallet(
        &self,
        creds: &BasicCredentials,
        store_id: &str,
        kind: WalletKind,
        request: &GenerateWalletRequest,
    ) -> Result<serde_json::Value, BackendError> {
        let path = format!(
            "/api/v1/stores/{}/payment-methods/{}/wallet/generate",
            urlencoding::encode(store_id),
            kind.code()
        );
        debug!("Generating {} on store {}", kind.code(), store_id);
        let request = self
            .client
            .post(self.url(&path))
            .basic_auth(&creds.username, Some(&creds.password))
            .json(request);
        self.send(request).await
    }
}
