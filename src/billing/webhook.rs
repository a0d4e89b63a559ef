//! Billing change notifications: signature check and team synchronisation

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{info, warn};

use super::{stripe::subscription_product, BillingError, BillingProvider, SubscriptionEvent};
use crate::account::types::SubscriptionUpdate;
use crate::account::Database;
use crate::error::AppResult;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed notification, in seconds
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Check a `t=<unix>,v1=<hex>` signature header against the raw payload.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<(), BillingError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = t.parse::<i64>().ok(),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(BillingError::InvalidSignature)?;
    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(BillingError::InvalidSignature);
    }

    for sig in signatures {
        let Ok(expected) = hex::decode(sig) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| BillingError::InvalidSignature)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }
    Err(BillingError::InvalidSignature)
}

/// Extract a subscription change from a notification body.
///
/// `Ok(None)` for event types the storefront does not act on.
pub fn parse_event(payload: &[u8]) -> Result<Option<SubscriptionEvent>, BillingError> {
    let event: Value =
        serde_json::from_slice(payload).map_err(|e| BillingError::Decode(e.to_string()))?;

    match event["type"].as_str() {
        Some("customer.subscription.updated") | Some("customer.subscription.deleted") => {}
        _ => return Ok(None),
    }

    let subscription = &event["data"]["object"];
    let customer_id = match &subscription["customer"] {
        Value::String(s) => s.clone(),
        other => other["id"]
            .as_str()
            .ok_or(BillingError::MissingField("customer"))?
            .to_string(),
    };
    Ok(Some(SubscriptionEvent {
        customer_id,
        subscription_id: subscription["id"]
            .as_str()
            .ok_or(BillingError::MissingField("subscription id"))?
            .to_string(),
        product_id: subscription_product(subscription),
        status: subscription["status"]
            .as_str()
            .ok_or(BillingError::MissingField("status"))?
            .to_string(),
    }))
}

/// Mirror a subscription change onto the team that owns the customer.
pub async fn handle_subscription_change(
    db: &Database,
    billing: &dyn BillingProvider,
    event: &SubscriptionEvent,
) -> AppResult<()> {
    let Some(team) = db.find_team_by_customer(&event.customer_id)? else {
        warn!("Team not found for billing customer {}", event.customer_id);
        return Ok(());
    };

    let update = match event.status.as_str() {
        "active" | "trialing" => {
            let plan_name = match &event.product_id {
                Some(product) => Some(billing.product_name(product).await?),
                None => None,
            };
            SubscriptionUpdate {
                stripe_customer_id: None,
                stripe_subscription_id: Some(event.subscription_id.clone()),
                stripe_product_id: event.product_id.clone(),
                plan_name,
                subscription_status: event.status.clone(),
            }
        }
        "canceled" | "unpaid" => SubscriptionUpdate {
            subscription_status: event.status.clone(),
            ..SubscriptionUpdate::default()
        },
        other => {
            info!("Ignoring subscription status {} for team {}", other, team.id);
            return Ok(());
        }
    };

    db.update_team_subscription(team.id, &update)?;
    info!(
        "Team {} subscription is now {}",
        team.id, update.subscription_status
    );
    Ok(())
}
