#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hotstore::account::types::{Role, SubscriptionUpdate};
use hotstore::account::{Database, RequestContext, SessionKeys, User};
use hotstore::actions::{Services, Settings};
use hotstore::backend::{
    BackendError, BasicCredentials, CreateStoreRequest, GenerateWalletRequest, NewBackendUser,
    StoreBackend, WalletKind,
};
use hotstore::billing::{BillingError, BillingProvider, CheckoutCompletion, CheckoutRequest, Plan};

pub const SECRET: &str = "test-secret-test-secret-test-secret";
pub const PASSWORD: &str = "Correct-Horse-Battery1!";

/// Store Backend double that counts calls and fails on demand
#[derive(Default)]
pub struct MockBackend {
    pub user_calls: AtomicUsize,
    pub store_calls: AtomicUsize,
    pub wallet_calls: AtomicUsize,
    pub fail_user: Mutex<Option<BackendError>>,
    pub fail_store: Mutex<Option<BackendError>>,
    pub fail_wallets: Mutex<Vec<WalletKind>>,
    pub wallet_requests: Mutex<Vec<(String, WalletKind, GenerateWalletRequest)>>,
    pub store_credentials: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn failing_store(error: BackendError) -> Self {
        let mock = Self::default();
        *mock.fail_store.lock().unwrap() = Some(error);
        mock
    }

    pub fn failing_wallets(kinds: &[WalletKind]) -> Self {
        let mock = Self::default();
        *mock.fail_wallets.lock().unwrap() = kinds.to_vec();
        mock
    }

    pub fn calls(&self) -> (usize, usize) {
        (
            self.store_calls.load(Ordering::SeqCst),
            self.wallet_calls.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl StoreBackend for MockBackend {
    async fn create_user(&self, user: &NewBackendUser) -> Result<Value, BackendError> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.fail_user.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(json!({ "id": "backend-user", "email": user.email }))
    }

    async fn create_store(
        &self,
        creds: &BasicCredentials,
        request: &CreateStoreRequest,
    ) -> Result<Value, BackendError> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        self.store_credentials
            .lock()
            .unwrap()
            .push(creds.username.clone());
        if let Some(e) = self.fail_store.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(json!({ "id": "store-1", "name": request.name }))
    }

    async fn generate_wallet(
        &self,
        _creds: &BasicCredentials,
        store_id: &str,
        kind: WalletKind,
        request: &GenerateWalletRequest,
    ) -> Result<Value, BackendError> {
        self.wallet_calls.fetch_add(1, Ordering::SeqCst);
        self.wallet_requests
            .lock()
            .unwrap()
            .push((store_id.to_string(), kind, request.clone()));
        if self.fail_wallets.lock().unwrap().contains(&kind) {
            return Err(BackendError::Status {
                status: 422,
                body: format!("{} unavailable", kind.code()),
            });
        }
        Ok(json!({ "paymentMethod": kind.code(), "derivationScheme": "xpub-test" }))
    }
}

/// Billing double with a fixed catalogue and checkout outcome
#[derive(Default)]
pub struct MockBilling {
    pub completion: Mutex<Option<CheckoutCompletion>>,
    pub checkouts: Mutex<Vec<CheckoutRequest>>,
}

#[async_trait]
impl BillingProvider for MockBilling {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<String, BillingError> {
        self.checkouts.lock().unwrap().push(request.clone());
        Ok(format!("https://checkout.test/{}", request.price_id))
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        _return_url: &str,
    ) -> Result<String, BillingError> {
        Ok(format!("https://portal.test/{}", customer_id))
    }

    async fn retrieve_checkout(&self, _session_id: &str) -> Result<CheckoutCompletion, BillingError> {
        self.completion
            .lock()
            .unwrap()
            .clone()
            .ok_or(BillingError::MissingField("session"))
    }

    async fn product_name(&self, _product_id: &str) -> Result<String, BillingError> {
        Ok("Plus".to_string())
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, BillingError> {
        Err(BillingError::Transport("offline".to_string()))
    }
}

pub fn services_with(backend: Arc<MockBackend>, billing: Arc<MockBilling>) -> Services {
    Services {
        db: Database::temporary().unwrap(),
        backend,
        billing,
        sessions: SessionKeys::new(SECRET, 24).unwrap(),
        settings: Settings {
            base_url: "https://shop.test".to_string(),
            backend_url: "https://pay.test".to_string(),
            trial_days: 14,
        },
    }
}

pub fn services(backend: Arc<MockBackend>) -> Services {
    services_with(backend, Arc::new(MockBilling::default()))
}

/// A user with a team; `plan` of `None` leaves the team unsubscribed
pub fn seed_user(services: &Services, email: &str, plan: Option<&str>) -> User {
    let hash = hotstore::account::auth::hash_password(PASSWORD).unwrap();
    let user = services
        .db
        .create_user(email, hash, Role::Owner)
        .unwrap()
        .unwrap();
    let team = services.db.create_team(&format!("{}'s Team", email)).unwrap();
    services
        .db
        .add_team_member(user.id, team.id, Role::Owner)
        .unwrap();
    if let Some(plan) = plan {
        services
            .db
            .update_team_subscription(
                team.id,
                &SubscriptionUpdate {
                    stripe_customer_id: Some(format!("cus_{}", team.id)),
                    stripe_subscription_id: Some("sub_1".to_string()),
                    stripe_product_id: Some("prod_1".to_string()),
                    plan_name: Some(plan.to_string()),
                    subscription_status: "active".to_string(),
                },
            )
            .unwrap();
    }
    user
}

/// Context as the web layer builds it: the user is re-read per request
pub fn ctx_for(services: &Services, user_id: u64) -> RequestContext {
    let user = services.db.get_user(user_id).unwrap().unwrap();
    RequestContext::for_user(user)
}
