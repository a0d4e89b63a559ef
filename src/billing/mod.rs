//! Subscription billing through a hosted checkout / customer-portal provider
//!
//! The storefront never owns billing state. It starts checkout and portal
//! sessions, then mirrors plan name and status onto the team when the
//! provider reports a completed checkout or a subscription change.

pub mod stripe;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use stripe::StripeBilling;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BillingError {
    #[error("request to billing provider failed: {0}")]
    Transport(String),
    #[error("billing provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unreadable billing response: {0}")]
    Decode(String),
    #[error("billing response missing {0}")]
    MissingField(&'static str),
    #[error("invalid webhook signature")]
    InvalidSignature,
}

/// Parameters of a subscription checkout
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub price_id: String,
    pub customer_id: Option<String>,
    /// Our user id, echoed back by the provider on completion
    pub client_reference_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub trial_days: u32,
}

/// A completed checkout, resolved down to the purchased product
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutCompletion {
    pub client_reference_id: Option<String>,
    pub customer_id: String,
    pub subscription_id: String,
    pub product_id: String,
    pub plan_name: String,
    pub status: String,
}

/// A subscription as delivered by change notifications
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionEvent {
    pub customer_id: String,
    pub subscription_id: String,
    pub product_id: Option<String>,
    pub status: String,
}

/// A purchasable recurring price
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub price_id: Option<String>,
    pub product_id: Option<String>,
    pub name: String,
    pub unit_amount: u64, // cents
    pub currency: String,
    pub interval: String,
    pub trial_period_days: u32,
}

impl Plan {
    /// Catalogue shown when the provider has no matching product
    pub fn fallback(name: &str) -> Option<Self> {
        let unit_amount = match name {
            "Base" => 800,
            "Plus" => 1200,
            _ => return None,
        };
        Some(Self {
            price_id: None,
            product_id: None,
            name: name.to_string(),
            unit_amount,
            currency: "usd".to_string(),
            interval: "month".to_string(),
            trial_period_days: 7,
        })
    }
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Returns the hosted checkout URL
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<String, BillingError>;

    /// Returns the hosted customer-portal URL
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, BillingError>;

    async fn retrieve_checkout(&self, session_id: &str) -> Result<CheckoutCompletion, BillingError>;

    async fn product_name(&self, product_id: &str) -> Result<String, BillingError>;

    async fn list_plans(&self) -> Result<Vec<Plan>, BillingError>;
}
